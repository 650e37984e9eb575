//! Pass 2: request inheritance materialization.
//!
//! Computes each request's *effective line list* by merging parent lines
//! (resolved recursively, memoized) with the child's own lines:
//!
//! - **single-slot classes** (HTTP line, auth, json, pre-hook,
//!   post-hook): the child's lines replace the parent's entirely when
//!   the child declares any. Duplicates *within* one declaration are
//!   preserved so Pass 3 can reject them.
//! - **keyed classes** (headers, queries, lets): keyed by name,
//!   insertion order preserved, child overwrites the same key in place.
//! - **assertions**: child assertions replace the parent's wholesale;
//!   otherwise the parent's are inherited in order.
//!
//! Output order is canonical — HTTP, auth, headers, queries, json,
//! pre-hook, post-hook, assertions, lets — and doubles as the
//! evaluation order.
//!
//! Cycles are detected with the usual three-state walk; the resolution
//! that closes a cycle reports `E_SEM_INHERITANCE_CYCLE` once and
//! contributes an empty parent list.

use std::collections::HashSet;

use indexmap::IndexMap;
use pipetest_base::{Code, Diagnostic};
use pipetest_language::ast::ReqLine;

use crate::analysis::symbols::Symbols;
use crate::plan::EffLine;

/// Materializes every request, keyed by name in sorted order.
pub fn materialize(
    symbols: &Symbols<'_>,
    diags: &mut Vec<Diagnostic>,
) -> IndexMap<String, Vec<EffLine>> {
    let mut names: Vec<&String> = symbols.requests.keys().collect();
    names.sort();

    let mut resolver = Resolver {
        symbols,
        diags,
        memo: IndexMap::new(),
        in_progress: HashSet::new(),
    };
    for name in &names {
        resolver.resolve(name.as_str());
    }

    let mut out = IndexMap::new();
    for name in names {
        if let Some(lines) = resolver.memo.get(name.as_str()) {
            out.insert(name.clone(), lines.clone());
        }
    }
    out
}

struct Resolver<'s, 'm, 'd> {
    symbols: &'s Symbols<'m>,
    diags: &'d mut Vec<Diagnostic>,
    memo: IndexMap<String, Vec<EffLine>>,
    in_progress: HashSet<String>,
}

impl Resolver<'_, '_, '_> {
    fn resolve(&mut self, name: &str) -> Vec<EffLine> {
        if let Some(done) = self.memo.get(name) {
            return done.clone();
        }
        let Some(entry) = self.symbols.requests.get(name) else {
            return Vec::new();
        };
        self.in_progress.insert(name.to_string());

        let own: Vec<EffLine> = entry
            .decl
            .lines
            .iter()
            .map(|line| EffLine {
                file: entry.module.path.clone(),
                line: line.clone(),
            })
            .collect();

        let parent_lines = match &entry.decl.parent {
            Some(parent) if self.symbols.requests.contains_key(&parent.name) => {
                if self.in_progress.contains(&parent.name) {
                    self.diags.push(
                        Diagnostic::error(
                            Code::SemInheritanceCycle,
                            format!(
                                "request inheritance cycle: '{}' inherits from '{}'",
                                name, parent.name
                            ),
                            &entry.module.path,
                            parent.span,
                        )
                        .with_hint("a request cannot inherit from itself, directly or indirectly"),
                    );
                    Vec::new()
                } else {
                    self.resolve(&parent.name)
                }
            }
            // Unknown parents were reported in Pass 1.
            _ => Vec::new(),
        };

        let merged = merge(parent_lines, own);
        self.in_progress.remove(name);
        self.memo.insert(name.to_string(), merged.clone());
        merged
    }
}

#[derive(Default)]
struct Partition {
    https: Vec<EffLine>,
    auths: Vec<EffLine>,
    headers: IndexMap<String, EffLine>,
    queries: IndexMap<String, EffLine>,
    jsons: Vec<EffLine>,
    pres: Vec<EffLine>,
    posts: Vec<EffLine>,
    asserts: Vec<EffLine>,
    lets: IndexMap<String, EffLine>,
}

fn partition(lines: Vec<EffLine>) -> Partition {
    let mut p = Partition::default();
    for eff in lines {
        match &eff.line {
            ReqLine::Http { .. } => p.https.push(eff),
            ReqLine::Auth { .. } => p.auths.push(eff),
            ReqLine::Header { key, .. } => {
                p.headers.insert(key.clone(), eff);
            }
            ReqLine::Query { key, .. } => {
                p.queries.insert(key.clone(), eff);
            }
            ReqLine::Json { .. } => p.jsons.push(eff),
            ReqLine::PreHook(_) => p.pres.push(eff),
            ReqLine::PostHook(_) => p.posts.push(eff),
            ReqLine::Assert { .. } => p.asserts.push(eff),
            ReqLine::Let(binding) => {
                p.lets.insert(binding.name.name.clone(), eff);
            }
        }
    }
    p
}

/// Applies the child's lines over the parent's resolved lines.
fn merge(parent: Vec<EffLine>, child: Vec<EffLine>) -> Vec<EffLine> {
    let p = partition(parent);
    let c = partition(child);

    let pick = |parent: Vec<EffLine>, child: Vec<EffLine>| {
        if child.is_empty() {
            parent
        } else {
            child
        }
    };

    let https = pick(p.https, c.https);
    let auths = pick(p.auths, c.auths);
    let jsons = pick(p.jsons, c.jsons);
    let pres = pick(p.pres, c.pres);
    let posts = pick(p.posts, c.posts);
    let asserts = pick(p.asserts, c.asserts);

    // IndexMap keeps the original slot on overwrite: parent insertion
    // order survives, new child keys append.
    let mut headers = p.headers;
    for (key, line) in c.headers {
        headers.insert(key, line);
    }
    let mut queries = p.queries;
    for (key, line) in c.queries {
        queries.insert(key, line);
    }
    let mut lets = p.lets;
    for (key, line) in c.lets {
        lets.insert(key, line);
    }

    let mut out = Vec::new();
    out.extend(https);
    out.extend(auths);
    out.extend(headers.into_values());
    out.extend(queries.into_values());
    out.extend(jsons);
    out.extend(pres);
    out.extend(posts);
    out.extend(asserts);
    out.extend(lets.into_values());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::symbols;
    use crate::graph::load_modules;
    use crate::loader::MemoryLoader;

    fn materialize_src(src: &str) -> (IndexMap<String, Vec<EffLine>>, Vec<Diagnostic>) {
        let loader = MemoryLoader::new().add("main.pt", src);
        let mut diags = Vec::new();
        let modules = load_modules("main.pt", &loader, &mut diags);
        let syms = symbols::collect(&modules, "main.pt", &mut diags);
        let effective = materialize(&syms, &mut diags);
        (effective, diags)
    }

    fn line_kinds(lines: &[EffLine]) -> Vec<&'static str> {
        lines
            .iter()
            .map(|l| match &l.line {
                ReqLine::Http { .. } => "http",
                ReqLine::Auth { .. } => "auth",
                ReqLine::Header { .. } => "header",
                ReqLine::Query { .. } => "query",
                ReqLine::Json { .. } => "json",
                ReqLine::PreHook(_) => "pre",
                ReqLine::PostHook(_) => "post",
                ReqLine::Assert { .. } => "assert",
                ReqLine::Let(_) => "let",
            })
            .collect()
    }

    #[test]
    fn canonical_order_is_imposed() {
        let src = "req r:\n\tlet a = 1\n\t? status == 200\n\tpost hook { x = 1 }\n\tjson {b: 1}\n\tquery q = 1\n\theader H = \"v\"\n\tauth bearer \"t\"\n\tGET /x\n";
        let (eff, diags) = materialize_src(src);
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(
            line_kinds(&eff["r"]),
            vec!["http", "auth", "header", "query", "json", "post", "assert", "let"]
        );
    }

    #[test]
    fn child_overrides_single_slot_classes() {
        let src = "req parent:\n\tGET /p\n\tauth bearer \"p\"\nreq child(parent):\n\tPUT /c\n";
        let (eff, diags) = materialize_src(src);
        assert!(diags.is_empty(), "{:?}", diags);
        let lines = &eff["child"];
        // Child's HTTP line wins; parent auth survives.
        match &lines[0].line {
            ReqLine::Http { path, .. } => assert_eq!(path, "/c"),
            other => panic!("expected http, got {:?}", other),
        }
        assert_eq!(line_kinds(lines), vec!["http", "auth"]);
    }

    #[test]
    fn headers_merge_by_key_preserving_position() {
        let src = "req parent:\n\tGET /p\n\theader A = \"pa\"\n\theader B = \"pb\"\nreq child(parent):\n\theader B = \"cb\"\n\theader C = \"cc\"\n";
        let (eff, diags) = materialize_src(src);
        assert!(diags.is_empty(), "{:?}", diags);
        let keys: Vec<String> = eff["child"]
            .iter()
            .filter_map(|l| match &l.line {
                ReqLine::Header { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect();
        // B keeps its parent position, C appends.
        assert_eq!(keys, vec!["A", "B", "C"]);
        // And B carries the child's value expression.
        let b = eff["child"]
            .iter()
            .find_map(|l| match &l.line {
                ReqLine::Header { key, value, .. } if key == "B" => Some(value.clone()),
                _ => None,
            })
            .unwrap();
        assert!(matches!(
            b.kind,
            pipetest_language::ast::ExprKind::Str(ref s) if s == "cb"
        ));
    }

    #[test]
    fn child_assertions_replace_parent_assertions() {
        let src = "req parent:\n\tGET /p\n\t? status == 200\n\t? status < 500\nreq child(parent):\n\t? status == 201\n";
        let (eff, diags) = materialize_src(src);
        assert!(diags.is_empty(), "{:?}", diags);
        let asserts = eff["child"]
            .iter()
            .filter(|l| matches!(l.line, ReqLine::Assert { .. }))
            .count();
        assert_eq!(asserts, 1);
    }

    #[test]
    fn parent_assertions_inherit_when_child_declares_none() {
        let src = "req parent:\n\tGET /p\n\t? status == 200\nreq child(parent):\n\theader H = \"v\"\n";
        let (eff, diags) = materialize_src(src);
        assert!(diags.is_empty(), "{:?}", diags);
        let asserts = eff["child"]
            .iter()
            .filter(|l| matches!(l.line, ReqLine::Assert { .. }))
            .count();
        assert_eq!(asserts, 1);
    }

    #[test]
    fn grandparent_chains_apply_in_order() {
        let src = "req a:\n\tGET /a\n\theader H = \"a\"\nreq b(a):\n\theader H = \"b\"\nreq c(b):\n\theader H = \"c\"\n";
        let (eff, diags) = materialize_src(src);
        assert!(diags.is_empty(), "{:?}", diags);
        let value = eff["c"]
            .iter()
            .find_map(|l| match &l.line {
                ReqLine::Header { value, .. } => Some(value.clone()),
                _ => None,
            })
            .unwrap();
        assert!(matches!(
            value.kind,
            pipetest_language::ast::ExprKind::Str(ref s) if s == "c"
        ));
    }

    #[test]
    fn inheritance_cycle_reported_once_with_empty_contribution() {
        let src = "req a(b):\n\tGET /a\nreq b(a):\n\tGET /b\n";
        let (eff, diags) = materialize_src(src);
        let cycles = diags
            .iter()
            .filter(|d| d.code == Code::SemInheritanceCycle)
            .count();
        assert_eq!(cycles, 1);
        // Both requests still materialize their own lines.
        assert!(eff.contains_key("a"));
        assert!(eff.contains_key("b"));
    }

    #[test]
    fn inherited_lines_remember_their_declaring_file() {
        let loader = MemoryLoader::new()
            .add(
                "main.pt",
                "import \"./base.pt\"\nreq child(root):\n\theader H = \"c\"\n",
            )
            .add("base.pt", "req root:\n\tGET /r\n");
        let mut diags = Vec::new();
        let modules = load_modules("main.pt", &loader, &mut diags);
        let syms = symbols::collect(&modules, "main.pt", &mut diags);
        let eff = materialize(&syms, &mut diags);
        assert!(diags.is_empty(), "{:?}", diags);
        let http = &eff["child"][0];
        assert!(matches!(http.line, ReqLine::Http { .. }));
        assert_eq!(http.file, "base.pt");
    }
}
