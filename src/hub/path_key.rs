//! Path identity under the platform's case rule.
//!
//! Every comparison or hash of a registered path goes through
//! [`CaseRule::key`], so there is exactly one place that decides whether
//! `Notes.md` and `notes.md` are the same file.

use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseRule {
    Sensitive,
    Insensitive,
}

impl CaseRule {
    /// Insensitive where the default filesystem is (Windows, macOS).
    pub fn platform_default() -> Self {
        if cfg!(any(windows, target_os = "macos")) {
            CaseRule::Insensitive
        } else {
            CaseRule::Sensitive
        }
    }

    pub fn key(self, path: &Path) -> PathKey {
        let text = path.to_string_lossy();
        match self {
            CaseRule::Sensitive => PathKey(text.into_owned()),
            CaseRule::Insensitive => PathKey(text.to_lowercase()),
        }
    }

    pub fn same(self, a: &Path, b: &Path) -> bool {
        self.key(a) == self.key(b)
    }
}

impl Default for CaseRule {
    fn default() -> Self {
        Self::platform_default()
    }
}

/// Normalized identity of a registered path. Only built by [`CaseRule::key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey(String);

impl PathKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_keeps_case() {
        let rule = CaseRule::Sensitive;
        assert!(!rule.same(Path::new("/docs/Notes.md"), Path::new("/docs/notes.md")));
        assert!(rule.same(Path::new("/docs/notes.md"), Path::new("/docs/notes.md")));
    }

    #[test]
    fn test_insensitive_folds_case() {
        let rule = CaseRule::Insensitive;
        assert!(rule.same(Path::new("C:/Docs/NOTES.md"), Path::new("c:/docs/notes.MD")));
        assert_eq!(rule.key(Path::new("/A/B")).as_str(), "/a/b");
    }

    #[test]
    fn test_platform_default() {
        let expected = if cfg!(any(windows, target_os = "macos")) {
            CaseRule::Insensitive
        } else {
            CaseRule::Sensitive
        };
        assert_eq!(CaseRule::platform_default(), expected);
        assert_eq!(CaseRule::default(), expected);
    }
}
