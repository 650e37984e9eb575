//! The module-loading capability and lexical path handling.
//!
//! The compiler never touches the filesystem directly: it asks a
//! [`ModuleLoader`] for source text by canonical path. The CLI supplies a
//! filesystem-backed loader; tests use [`MemoryLoader`].
//!
//! Paths are canonicalized *lexically* — `.` and `..` segments collapse,
//! backslashes normalize to slashes — without consulting the loader, so
//! module identity is stable no matter how an import spelled the path.

use std::collections::BTreeMap;
use std::fmt;

/// Why a module could not be loaded.
#[derive(Debug)]
pub enum LoadError {
    /// No module exists at the path.
    NotFound,
    /// The module exists but could not be read.
    Io(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::NotFound => write!(f, "module not found"),
            LoadError::Io(msg) => write!(f, "read error: {}", msg),
        }
    }
}

impl std::error::Error for LoadError {}

/// Source-text provider keyed by canonical path.
pub trait ModuleLoader {
    fn load(&self, canonical_path: &str) -> Result<String, LoadError>;
}

/// In-memory loader for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    modules: BTreeMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module under its canonical form of `path`.
    pub fn add(mut self, path: &str, source: &str) -> Self {
        self.modules.insert(clean_path(path), source.to_string());
        self
    }
}

impl ModuleLoader for MemoryLoader {
    fn load(&self, canonical_path: &str) -> Result<String, LoadError> {
        self.modules
            .get(canonical_path)
            .cloned()
            .ok_or(LoadError::NotFound)
    }
}

/// Lexically cleans a path: slash normalization, `.` removal, `..`
/// collapse. Purely textual; no filesystem access.
pub fn clean_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let absolute = normalized.starts_with('/');
    let mut out: Vec<&str> = Vec::new();

    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => match out.last() {
                Some(&"..") | None => {
                    if !absolute {
                        out.push("..");
                    }
                }
                Some(_) => {
                    out.pop();
                }
            },
            _ => out.push(segment),
        }
    }

    let joined = out.join("/");
    match (absolute, joined.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// The directory portion of a cleaned path (`""` for bare filenames).
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Resolves an import target against the importing module's directory.
pub fn resolve_import(importer: &str, target: &str) -> String {
    let normalized = target.replace('\\', "/");
    if normalized.starts_with('/') {
        return clean_path(&normalized);
    }
    let dir = parent_dir(importer);
    if dir.is_empty() {
        clean_path(&normalized)
    } else {
        clean_path(&format!("{}/{}", dir, normalized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_collapses_dot_and_dotdot() {
        assert_eq!(clean_path("a/./b/../c.pt"), "a/c.pt");
        assert_eq!(clean_path("./suite.pt"), "suite.pt");
        assert_eq!(clean_path("a//b.pt"), "a/b.pt");
    }

    #[test]
    fn clean_preserves_absolute_roots() {
        assert_eq!(clean_path("/a/../b.pt"), "/b.pt");
        assert_eq!(clean_path("/../x.pt"), "/x.pt");
    }

    #[test]
    fn clean_keeps_leading_parent_segments_for_relative_paths() {
        assert_eq!(clean_path("../shared/auth.pt"), "../shared/auth.pt");
        assert_eq!(clean_path("a/../../b.pt"), "../b.pt");
    }

    #[test]
    fn clean_normalizes_backslashes() {
        assert_eq!(clean_path("suites\\auth.pt"), "suites/auth.pt");
    }

    #[test]
    fn resolve_is_relative_to_importer_directory() {
        assert_eq!(resolve_import("suites/main.pt", "./auth.pt"), "suites/auth.pt");
        assert_eq!(resolve_import("suites/main.pt", "../common.pt"), "common.pt");
        assert_eq!(resolve_import("main.pt", "./auth.pt"), "auth.pt");
        assert_eq!(resolve_import("suites/main.pt", "/abs/x.pt"), "/abs/x.pt");
    }

    #[test]
    fn memory_loader_round_trips() {
        let loader = MemoryLoader::new().add("./a.pt", "base \"https://h\"\n");
        assert!(loader.load("a.pt").is_ok());
        assert!(matches!(loader.load("missing.pt"), Err(LoadError::NotFound)));
    }
}
