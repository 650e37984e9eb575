//! Pass 4: flow structure and bindings.
//!
//! Chains must be non-empty, every step must name a known request, and
//! binding names (alias or request name) must be unique within a flow.

use pipetest_base::{Code, Diagnostic};

use crate::analysis::symbols::Symbols;

pub fn validate(symbols: &Symbols<'_>, diags: &mut Vec<Diagnostic>) {
    for entry in &symbols.flows {
        let flow = entry.decl;
        let file = &entry.module.path;

        if flow.steps.is_empty() {
            diags.push(
                Diagnostic::error(
                    Code::SemFlowMissingChain,
                    format!("flow \"{}\" has no chain", flow.name),
                    file,
                    flow.name_span,
                )
                .with_flow(&flow.name)
                .with_hint("a flow needs at least one request step"),
            );
            continue;
        }

        let mut bindings: Vec<(&str, pipetest_base::Span)> = Vec::new();
        for step in &flow.steps {
            if !symbols.requests.contains_key(&step.request.name) {
                diags.push(
                    Diagnostic::error(
                        Code::SemUnknownReqInFlow,
                        format!("unknown request '{}' in flow chain", step.request.name),
                        file,
                        step.request.span,
                    )
                    .with_flow(&flow.name)
                    .with_request(step.binding_label()),
                );
            }

            let binding = step.binding();
            if let Some((_, first)) = bindings.iter().find(|(name, _)| *name == binding) {
                diags.push(
                    Diagnostic::error(
                        Code::SemDuplicateFlowBinding,
                        format!("binding '{}' is used twice in flow \"{}\"", binding, flow.name),
                        file,
                        step.span,
                    )
                    .with_flow(&flow.name)
                    .with_request(step.binding_label())
                    .with_related(file, *first, "first bound here")
                    .with_hint("give the step an alias: 'request : alias'"),
                );
            } else {
                bindings.push((binding, step.span));
            }
        }
    }
}
