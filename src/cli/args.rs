//! CLI argument parsing using clap.
//!
//! Contains the Cli struct and the Commands enum.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

fn heading(title: &str) -> String {
    if console::colors_enabled() {
        console::style(title).cyan().bold().to_string()
    } else {
        title.to_string()
    }
}

/// Create custom help text with consistent styling
fn create_custom_help() -> String {
    let mut help = String::new();

    help.push_str(&format!("{}\n", heading("Quick Start:")));
    help.push_str("  $ livemd start                     # Start the preview server\n");
    help.push_str("  $ livemd add README.md             # Watch a file\n");
    help.push_str("  $ livemd add docs -r --filter md   # Watch every markdown file under docs\n");
    help.push_str("  $ livemd list                      # Show watched files\n");
    help.push_str("  $ livemd stop                      # Stop the server\n\n");

    help.push_str("Live preview of markdown and source files in the browser.\n\n");

    help.push_str(&heading("Usage:"));
    help.push_str(" livemd [OPTIONS] <COMMAND>\n\n");

    help.push_str(&format!("{}\n", heading("Commands:")));
    help.push_str("  start     Start the preview server\n");
    help.push_str("  add       Watch a file, or a directory with -r\n");
    help.push_str("  remove    Stop watching a file\n");
    help.push_str("  list      List watched files\n");
    help.push_str("  stop      Stop the running server\n");
    help.push_str("  port      Show or set the default port\n");
    help.push_str("  update    Update to the latest release\n");
    help.push_str("  version   Print version information\n");
    help.push_str("  help      Print this message or the help of the given subcommand(s)\n\n");

    help.push_str("See 'livemd help <command>' for more information on a specific command.\n\n");

    help.push_str(&format!("{}\n", heading("Options:")));
    help.push_str("  -c, --config <CONFIG>  Path to custom settings.toml file\n");
    help.push_str("  -h, --help             Print help\n");
    help.push_str("  -V, --version          Print version\n");

    help
}

/// Live file preview server
#[derive(Parser)]
#[command(
    name = "livemd",
    version = env!("CARGO_PKG_VERSION"),
    about = "Live preview of markdown and source files",
    long_about = "Watch files and push rendered previews to every open browser tab.",
    next_line_help = true,
    styles = clap_cargo_style(),
    override_help = create_custom_help()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the preview server
    #[command(
        about = "Start the preview server",
        after_help = "Examples:\n  livemd start\n  livemd start --port 4000\n\nIf the port is busy the next free one is used."
    )]
    Start {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Watch a file or directory
    #[command(
        about = "Watch a file, or a directory with -r",
        after_help = "Examples:\n  livemd add README.md\n  livemd add docs -r\n  livemd add src -r --filter rs,toml\n  livemd add notes.md --inactive"
    )]
    Add {
        /// File or directory to watch
        #[arg(value_name = "PATH")]
        path: String,

        /// Add every matching file under a directory
        #[arg(short, long)]
        recursive: bool,

        /// Comma separated extensions to include (overrides config)
        #[arg(long, value_delimiter = ',', value_name = "EXT")]
        filter: Vec<String>,

        /// Register without watching for changes
        #[arg(long)]
        inactive: bool,

        /// Skip the confirmation prompt for large directories
        #[arg(short, long)]
        yes: bool,
    },

    /// Stop watching a file
    #[command(about = "Stop watching a file")]
    Remove {
        /// File to remove
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// List watched files
    #[command(about = "List watched files")]
    List,

    /// Stop the running server
    #[command(about = "Stop the running server")]
    Stop,

    /// Show or set the default port
    #[command(
        about = "Show or set the default port",
        after_help = "Examples:\n  livemd port\n  livemd port 4000"
    )]
    Port {
        /// New default port
        port: Option<u16>,
    },

    /// Update to the latest release
    #[command(about = "Update to the latest release")]
    Update,

    /// Print version information
    #[command(about = "Print version information")]
    Version,
}
