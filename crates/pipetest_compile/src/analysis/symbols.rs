//! Pass 1: the symbol table.
//!
//! Walks modules in canonical order and collects request declarations
//! (unique across all modules), flow declarations (entry module only,
//! unique by name), global lets (in walk order), and the entry module's
//! `base`/`timeout` settings. Parent references are resolved against the
//! completed request table.

use indexmap::IndexMap;
use pipetest_base::{Code, Diagnostic};
use pipetest_language::ast::{FlowDecl, LetBinding, ReqDecl, Stmt};

use crate::graph::Module;

pub struct ReqEntry<'m> {
    pub module: &'m Module,
    pub decl: &'m ReqDecl,
}

pub struct FlowEntry<'m> {
    pub module: &'m Module,
    pub decl: &'m FlowDecl,
}

/// Everything later passes need to know about declared names.
pub struct Symbols<'m> {
    pub entry: String,
    /// Requests keyed by name, first declaration wins.
    pub requests: IndexMap<String, ReqEntry<'m>>,
    /// Flows in entry-module declaration order.
    pub flows: Vec<FlowEntry<'m>>,
    /// Global lets in canonical module order.
    pub global_lets: Vec<(&'m Module, &'m LetBinding)>,
    pub base_url: Option<String>,
    pub timeout_millis: Option<f64>,
}

pub fn collect<'m>(
    modules: &'m [Module],
    entry: &str,
    diags: &mut Vec<Diagnostic>,
) -> Symbols<'m> {
    let mut symbols = Symbols {
        entry: entry.to_string(),
        requests: IndexMap::new(),
        flows: Vec::new(),
        global_lets: Vec::new(),
        base_url: None,
        timeout_millis: None,
    };
    let mut flow_names: IndexMap<&str, &FlowDecl> = IndexMap::new();

    for module in modules {
        let is_entry = module.path == entry;
        for stmt in &module.program.stmts {
            match stmt {
                Stmt::Base { url, .. } => {
                    if is_entry {
                        symbols.base_url = Some(url.clone());
                    }
                }
                Stmt::Timeout { millis, .. } => {
                    if is_entry {
                        symbols.timeout_millis = Some(*millis);
                    }
                }
                Stmt::Import { .. } => {}
                Stmt::Let(binding) => symbols.global_lets.push((module, binding)),
                Stmt::Req(decl) => {
                    if let Some(first) = symbols.requests.get(&decl.name.name) {
                        diags.push(
                            Diagnostic::error(
                                Code::SemDuplicateReqName,
                                format!("request '{}' is already declared", decl.name.name),
                                &module.path,
                                decl.name.span,
                            )
                            .with_related(
                                &first.module.path,
                                first.decl.name.span,
                                "first declared here",
                            )
                            .with_hint("request names are unique across all imported modules"),
                        );
                    } else {
                        symbols
                            .requests
                            .insert(decl.name.name.clone(), ReqEntry { module, decl });
                    }
                }
                Stmt::Flow(decl) => {
                    if !is_entry {
                        diags.push(
                            Diagnostic::error(
                                Code::ImportFlowInImportedFile,
                                format!("flow \"{}\" declared in an imported module", decl.name),
                                &module.path,
                                decl.name_span,
                            )
                            .with_hint("flows may only be declared in the entry module"),
                        );
                        continue;
                    }
                    if let Some(first) = flow_names.get(decl.name.as_str()) {
                        diags.push(
                            Diagnostic::error(
                                Code::SemDuplicateFlowName,
                                format!("flow \"{}\" is already declared", decl.name),
                                &module.path,
                                decl.name_span,
                            )
                            .with_related(&module.path, first.name_span, "first declared here"),
                        );
                    } else {
                        flow_names.insert(decl.name.as_str(), decl);
                        symbols.flows.push(FlowEntry { module, decl });
                    }
                }
            }
        }
    }

    // Parent references resolve against the completed table so forward
    // and cross-module references both work.
    for entry in symbols.requests.values() {
        if let Some(parent) = &entry.decl.parent {
            if !symbols.requests.contains_key(&parent.name) {
                diags.push(
                    Diagnostic::error(
                        Code::SemUnknownParentReq,
                        format!("unknown parent request '{}'", parent.name),
                        &entry.module.path,
                        parent.span,
                    )
                    .with_hint("the parent must be a declared request"),
                );
            }
        }
    }

    symbols
}
