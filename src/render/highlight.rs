//! Syntax highlighting with inline styles in GitHub colors.

use std::sync::OnceLock;

use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

const THEME: &str = "InspiredGitHub";

struct Highlighting {
    syntaxes: SyntaxSet,
    theme: Option<Theme>,
}

static HIGHLIGHTING: OnceLock<Highlighting> = OnceLock::new();

fn highlighting() -> &'static Highlighting {
    HIGHLIGHTING.get_or_init(|| {
        let mut themes = ThemeSet::load_defaults();
        Highlighting {
            syntaxes: SyntaxSet::load_defaults_newlines(),
            theme: themes.themes.remove(THEME),
        }
    })
}

/// Highlight `code` with the grammar of the first token that names one.
/// Tokens are language names or file extensions.
///
/// `None` when no grammar matches or the match is plain text.
pub fn highlight(code: &str, tokens: &[&str]) -> Option<String> {
    let set = highlighting();
    let theme = set.theme.as_ref()?;
    let syntax = tokens
        .iter()
        .filter(|token| !token.is_empty())
        .find_map(|token| set.syntaxes.find_syntax_by_token(token))?;
    if syntax.name == "Plain Text" {
        return None;
    }

    match highlighted_html_for_string(code, &set.syntaxes, syntax, theme) {
        Ok(html) => Some(html),
        Err(e) => {
            crate::debug_event!("render", "highlight failed", "{}: {e}", syntax.name);
            None
        }
    }
}
