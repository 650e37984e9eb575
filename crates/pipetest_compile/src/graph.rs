//! Pass 0: the import graph.
//!
//! Starting from the entry module, imports are followed depth-first.
//! Each module is loaded once, parsed, and tracked through the classic
//! three states (unvisited / in-progress / done); a back-edge to an
//! in-progress module is an import cycle, reported once at the edge that
//! closes it. The final module list is sorted lexicographically by
//! canonical path — the deterministic traversal order every later pass
//! relies on.

use std::collections::HashMap;

use pipetest_base::{Code, Diagnostic, Span};
use pipetest_language::ast::{Program, Stmt};
use pipetest_language::parse;

use crate::loader::{resolve_import, LoadError, ModuleLoader};

/// A loaded, parsed source file.
#[derive(Debug)]
pub struct Module {
    /// Canonical (lexically cleaned) path; module identity.
    pub path: String,
    pub source: String,
    pub program: Program,
}

#[derive(Clone, Copy, PartialEq)]
enum State {
    InProgress,
    Done,
}

/// Loads the entry module and everything it transitively imports.
/// `entry` must already be canonical. The returned list is sorted by
/// path; parse diagnostics of every module are appended to `diags`.
pub fn load_modules(
    entry: &str,
    loader: &dyn ModuleLoader,
    diags: &mut Vec<Diagnostic>,
) -> Vec<Module> {
    let mut walker = Walker {
        loader,
        diags,
        states: HashMap::new(),
        modules: Vec::new(),
    };
    walker.visit(entry, None);

    let mut modules = walker.modules;
    modules.sort_by(|a, b| a.path.cmp(&b.path));
    modules
}

struct Walker<'a> {
    loader: &'a dyn ModuleLoader,
    diags: &'a mut Vec<Diagnostic>,
    states: HashMap<String, State>,
    modules: Vec<Module>,
}

impl Walker<'_> {
    /// `origin` is the importing file and the span of its import
    /// statement; `None` for the entry module.
    fn visit(&mut self, path: &str, origin: Option<(&str, Span)>) {
        match self.states.get(path) {
            Some(State::Done) => return,
            Some(State::InProgress) => {
                // Back-edge: the import that closes the cycle.
                let (file, span) = origin.unwrap_or((path, Span::NONE));
                self.diags.push(
                    Diagnostic::error(
                        Code::ImportCycle,
                        format!("import cycle through '{}'", path),
                        file,
                        span,
                    )
                    .with_hint("break the cycle by moving shared requests into a common module"),
                );
                return;
            }
            None => {}
        }

        let source = match self.loader.load(path) {
            Ok(source) => source,
            Err(err) => {
                let (file, span) = origin.unwrap_or((path, Span::NONE));
                let message = match err {
                    LoadError::NotFound => format!("module '{}' not found", path),
                    LoadError::Io(msg) => format!("cannot read module '{}': {}", path, msg),
                };
                self.diags.push(
                    Diagnostic::error(Code::ImportNotFound, message, file, span)
                        .with_hint("import paths resolve relative to the importing file"),
                );
                return;
            }
        };

        self.states.insert(path.to_string(), State::InProgress);

        let (program, parse_diags) = parse(path, &source);
        self.diags.extend(parse_diags);

        let imports: Vec<(String, Span)> = program
            .stmts
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Import { path: target, span } => {
                    Some((resolve_import(path, target), *span))
                }
                _ => None,
            })
            .collect();

        for (target, span) in imports {
            self.visit(&target, Some((path, span)));
        }

        self.states.insert(path.to_string(), State::Done);
        self.modules.push(Module {
            path: path.to_string(),
            source,
            program,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;

    fn load(entry: &str, loader: &MemoryLoader) -> (Vec<Module>, Vec<Diagnostic>) {
        let mut diags = Vec::new();
        let modules = load_modules(entry, loader, &mut diags);
        (modules, diags)
    }

    #[test]
    fn modules_come_back_in_lexicographic_order() {
        let loader = MemoryLoader::new()
            .add("main.pt", "import \"./zeta.pt\"\nimport \"./alpha.pt\"\n")
            .add("zeta.pt", "req z:\n\tGET /z\n")
            .add("alpha.pt", "req a:\n\tGET /a\n");
        let (modules, diags) = load("main.pt", &loader);
        assert!(diags.is_empty(), "{:?}", diags);
        let paths: Vec<&str> = modules.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["alpha.pt", "main.pt", "zeta.pt"]);
    }

    #[test]
    fn imports_resolve_relative_to_importer() {
        let loader = MemoryLoader::new()
            .add("suites/main.pt", "import \"../common.pt\"\n")
            .add("common.pt", "req c:\n\tGET /c\n");
        let (modules, diags) = load("suites/main.pt", &loader);
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(modules.len(), 2);
    }

    #[test]
    fn missing_import_is_reported_at_the_import_statement() {
        let loader = MemoryLoader::new().add("main.pt", "import \"./gone.pt\"\n");
        let (modules, diags) = load("main.pt", &loader);
        assert_eq!(modules.len(), 1);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, Code::ImportNotFound);
        assert_eq!(diags[0].file, "main.pt");
        assert_eq!(diags[0].line, 1);
    }

    #[test]
    fn missing_entry_is_reported_without_location() {
        let loader = MemoryLoader::new();
        let (modules, diags) = load("main.pt", &loader);
        assert!(modules.is_empty());
        assert_eq!(diags[0].code, Code::ImportNotFound);
        assert_eq!(diags[0].line, 0);
    }

    #[test]
    fn two_module_cycle_is_reported_once() {
        let loader = MemoryLoader::new()
            .add("a.pt", "import \"./b.pt\"\n")
            .add("b.pt", "import \"./a.pt\"\n");
        let (modules, diags) = load("a.pt", &loader);
        assert_eq!(modules.len(), 2);
        let cycles: Vec<_> = diags.iter().filter(|d| d.code == Code::ImportCycle).collect();
        assert_eq!(cycles.len(), 1);
        // Reported at the back-edge inside b.pt.
        assert_eq!(cycles[0].file, "b.pt");
    }

    #[test]
    fn self_import_is_a_cycle() {
        let loader = MemoryLoader::new().add("a.pt", "import \"./a.pt\"\n");
        let (_, diags) = load("a.pt", &loader);
        assert_eq!(diags.iter().filter(|d| d.code == Code::ImportCycle).count(), 1);
    }

    #[test]
    fn diamond_imports_load_each_module_once() {
        let loader = MemoryLoader::new()
            .add("main.pt", "import \"./a.pt\"\nimport \"./b.pt\"\n")
            .add("a.pt", "import \"./shared.pt\"\n")
            .add("b.pt", "import \"./shared.pt\"\n")
            .add("shared.pt", "req s:\n\tGET /s\n");
        let (modules, diags) = load("main.pt", &loader);
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(modules.len(), 4);
    }
}
