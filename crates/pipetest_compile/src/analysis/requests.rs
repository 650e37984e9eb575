//! Pass 3: request validity over effective lines.
//!
//! Multiplicity rules run *after* inheritance so inherited lines count:
//! exactly one HTTP line, at most one pre-hook, post-hook, and json
//! body. Hook restrictions: no assignment may target `res`, and a
//! pre-hook may not reference the response (`res`, `#`, or the
//! `{{res}}`/`{{status}}` template forms) — the response does not exist
//! yet when a pre-hook runs.

use indexmap::IndexMap;
use pipetest_base::{template, Code, Diagnostic, Span};
use pipetest_language::ast::{ExprKind, HookBlock, HookStmt, LValueRoot, ReqLine};

use crate::analysis::symbols::Symbols;
use crate::plan::EffLine;

pub fn validate(
    effective: &IndexMap<String, Vec<EffLine>>,
    symbols: &Symbols<'_>,
    diags: &mut Vec<Diagnostic>,
) {
    for (name, lines) in effective {
        let Some(entry) = symbols.requests.get(name) else {
            continue;
        };

        check_multiplicity(name, lines, &entry.module.path, entry.decl.name.span, diags);

        for eff in lines {
            match &eff.line {
                ReqLine::PreHook(block) => {
                    check_hook_assignments(name, block, &eff.file, diags);
                    check_pre_hook_response_refs(name, block, &eff.file, diags);
                }
                ReqLine::PostHook(block) => {
                    check_hook_assignments(name, block, &eff.file, diags);
                }
                _ => {}
            }
        }
    }
}

fn check_multiplicity(
    name: &str,
    lines: &[EffLine],
    decl_file: &str,
    decl_span: Span,
    diags: &mut Vec<Diagnostic>,
) {
    let of_kind = |pred: fn(&ReqLine) -> bool| -> Vec<&EffLine> {
        lines.iter().filter(|l| pred(&l.line)).collect()
    };

    let https = of_kind(|l| matches!(l, ReqLine::Http { .. }));
    match https.len() {
        0 => diags.push(
            Diagnostic::error(
                Code::SemReqMissingHttpLine,
                format!("request '{}' has no HTTP line", name),
                decl_file,
                decl_span,
            )
            .with_request(name)
            .with_hint("add a line like 'GET /path'"),
        ),
        1 => {}
        _ => diags.push(
            Diagnostic::error(
                Code::SemReqMultipleHttpLines,
                format!("request '{}' has more than one HTTP line", name),
                &https[1].file,
                https[1].line.span(),
            )
            .with_request(name)
            .with_related(&https[0].file, https[0].line.span(), "first HTTP line here"),
        ),
    }

    let dup = |found: Vec<&EffLine>, code: Code, what: &str, diags: &mut Vec<Diagnostic>| {
        if found.len() > 1 {
            diags.push(
                Diagnostic::error(
                    code,
                    format!("request '{}' has more than one {}", name, what),
                    &found[1].file,
                    found[1].line.span(),
                )
                .with_request(name)
                .with_related(&found[0].file, found[0].line.span(), "first declared here"),
            );
        }
    };

    dup(
        of_kind(|l| matches!(l, ReqLine::PreHook(_))),
        Code::SemDuplicatePreHook,
        "pre hook",
        diags,
    );
    dup(
        of_kind(|l| matches!(l, ReqLine::PostHook(_))),
        Code::SemDuplicatePostHook,
        "post hook",
        diags,
    );
    dup(
        of_kind(|l| matches!(l, ReqLine::Json { .. })),
        Code::SemMultipleBodies,
        "json body",
        diags,
    );
}

/// Assignments whose target root is `res` are forbidden in any hook:
/// the response is immutable.
fn check_hook_assignments(
    name: &str,
    block: &HookBlock,
    file: &str,
    diags: &mut Vec<Diagnostic>,
) {
    for stmt in &block.stmts {
        if let HookStmt::Assign { target, span, .. } = stmt {
            if matches!(target.root, LValueRoot::Res) {
                diags.push(
                    Diagnostic::error(
                        Code::SemAssignToResForbidden,
                        "cannot assign to 'res': the response is read-only",
                        file,
                        *span,
                    )
                    .with_request(name)
                    .with_hint("capture the value into a variable instead"),
                );
            }
        }
    }
}

fn check_pre_hook_response_refs(
    name: &str,
    block: &HookBlock,
    file: &str,
    diags: &mut Vec<Diagnostic>,
) {
    for stmt in &block.stmts {
        stmt.walk_exprs(&mut |expr| {
            match &expr.kind {
                ExprKind::ResponseRoot => diags.push(
                    Diagnostic::error(
                        Code::SemPreHookReferencesRes,
                        "pre hook references '#' before any response exists",
                        file,
                        expr.span,
                    )
                    .with_request(name)
                    .with_hint("move this statement into a post hook"),
                ),
                ExprKind::Ident(id) if id == "res" => diags.push(
                    Diagnostic::error(
                        Code::SemPreHookReferencesRes,
                        "pre hook references 'res' before any response exists",
                        file,
                        expr.span,
                    )
                    .with_request(name)
                    .with_hint("move this statement into a post hook"),
                ),
                ExprKind::Str(text) => {
                    for placeholder in template::placeholder_names(text) {
                        if placeholder == "res" || placeholder == "status" {
                            diags.push(
                                Diagnostic::error(
                                    Code::SemPreHookReferencesRes,
                                    format!(
                                        "pre hook template references '{{{{{}}}}}' before any response exists",
                                        placeholder
                                    ),
                                    file,
                                    expr.span,
                                )
                                .with_request(name)
                                .with_hint(
                                    "response-scope placeholders are only available in post hooks",
                                ),
                            );
                        }
                    }
                }
                _ => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{inherit, symbols};
    use crate::graph::load_modules;
    use crate::loader::MemoryLoader;

    fn check(src: &str) -> Vec<Diagnostic> {
        let loader = MemoryLoader::new().add("main.pt", src);
        let mut diags = Vec::new();
        let modules = load_modules("main.pt", &loader, &mut diags);
        let syms = symbols::collect(&modules, "main.pt", &mut diags);
        let eff = inherit::materialize(&syms, &mut diags);
        validate(&eff, &syms, &mut diags);
        diags
    }

    fn codes(src: &str) -> Vec<Code> {
        check(src).into_iter().map(|d| d.code).collect()
    }

    #[test]
    fn missing_http_line() {
        assert!(codes("req r:\n\theader H = \"v\"\n").contains(&Code::SemReqMissingHttpLine));
    }

    #[test]
    fn multiple_http_lines_in_one_declaration() {
        assert!(codes("req r:\n\tGET /a\n\tPUT /b\n").contains(&Code::SemReqMultipleHttpLines));
    }

    #[test]
    fn child_override_of_parent_http_is_legal() {
        let src = "req p:\n\tGET /a\nreq c(p):\n\tPUT /b\n";
        assert!(codes(src).is_empty());
    }

    #[test]
    fn duplicate_hooks_and_bodies() {
        let src = "req r:\n\tGET /a\n\tpre hook { x = 1 }\n\tpre hook { y = 2 }\n";
        assert!(codes(src).contains(&Code::SemDuplicatePreHook));

        let src = "req r:\n\tGET /a\n\tpost hook { x = 1 }\n\tpost hook { y = 2 }\n";
        assert!(codes(src).contains(&Code::SemDuplicatePostHook));

        let src = "req r:\n\tGET /a\n\tjson {a: 1}\n\tjson {b: 2}\n";
        assert!(codes(src).contains(&Code::SemMultipleBodies));
    }

    #[test]
    fn assignment_to_res_is_forbidden_in_both_hooks() {
        let src = "req r:\n\tGET /a\n\tpost hook { res.x = 1 }\n";
        assert!(codes(src).contains(&Code::SemAssignToResForbidden));

        let src = "req r:\n\tGET /a\n\tpre hook { res.x = 1 }\n";
        let found = codes(src);
        assert!(found.contains(&Code::SemAssignToResForbidden));
        // The pre-hook also references res, which is reported separately.
        assert!(found.contains(&Code::SemPreHookReferencesRes));
    }

    #[test]
    fn pre_hook_referencing_response_expression() {
        let src = "req r:\n\tGET /a\n\tpre hook { let t = #.token }\n";
        assert!(codes(src).contains(&Code::SemPreHookReferencesRes));

        let src = "req r:\n\tGET /a\n\tpre hook { print res }\n";
        assert!(codes(src).contains(&Code::SemPreHookReferencesRes));
    }

    #[test]
    fn pre_hook_template_status_is_rejected() {
        let src = "req r:\n\tGET /x\n\tpre hook { print \"{{status}}\" }\n";
        let diags = check(src);
        let found: Vec<_> = diags
            .iter()
            .filter(|d| d.code == Code::SemPreHookReferencesRes)
            .collect();
        assert_eq!(found.len(), 1);
        assert!(found[0].hint.contains("post hook"));
    }

    #[test]
    fn pre_hook_req_template_is_legal() {
        let src = "req r:\n\tGET /x\n\tpre hook { print \"{{req}}\" }\n";
        assert!(codes(src).is_empty());
    }

    #[test]
    fn post_hook_response_references_are_legal() {
        let src = "req r:\n\tGET /x\n\tpost hook { seen = #.value; print \"{{status}}\" }\n";
        assert!(codes(src).is_empty());
    }
}
