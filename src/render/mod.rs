//! Rendering of watched files into viewer HTML.
//!
//! The hub treats rendering as a black box: anything implementing
//! [`Renderer`] will do, and any error keeps the previous content.

mod highlight;
mod html;

pub use html::HtmlRenderer;

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a regular file: {path}")]
    NotAFile { path: PathBuf },
}

/// Turns a file on disk into displayable content.
///
/// Must be safe to call concurrently for different paths.
pub trait Renderer: Send + Sync {
    fn render(&self, path: &Path) -> Result<String, RenderError>;
}

impl<F> Renderer for F
where
    F: Fn(&Path) -> Result<String, RenderError> + Send + Sync,
{
    fn render(&self, path: &Path) -> Result<String, RenderError> {
        self(path)
    }
}
