//! The report model: plan + run results → suite/testcase summary.
//!
//! One suite per plan flow, one test case per chain step, plus one case
//! for the flow's post-chain assertions when it declares any. Steps the
//! evaluator never reached (the flow aborted earlier) report as
//! skipped. Formatting (JUnit XML, console rendering) is out of scope;
//! the model serializes with serde and the CLI emits it as JSON.

use serde::Serialize;

use pipetest_base::Diagnostic;
use pipetest_compile::Plan;

use crate::evaluator::RunResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestCase {
    /// Step binding name, or `"assertions"` for the flow-assert case.
    pub name: String,
    /// The flow the case belongs to.
    pub classname: String,
    pub status: CaseStatus,
    /// Failure description, empty unless `status == Failed`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub failure: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Suite {
    pub name: String,
    pub tests: usize,
    pub failures: usize,
    pub skipped: usize,
    pub cases: Vec<TestCase>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub entry: String,
    pub tests: usize,
    pub failures: usize,
    pub skipped: usize,
    pub suites: Vec<Suite>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn passed(&self) -> bool {
        self.failures == 0 && self.diagnostics.is_empty()
    }

    pub fn from_run(plan: &Plan, run: &RunResult) -> Report {
        let mut suites = Vec::with_capacity(plan.flows.len());

        for flow in &plan.flows {
            let result = run.flows.iter().find(|f| f.name == flow.name);
            let mut cases = Vec::new();

            for step in &flow.steps {
                let outcome = result.and_then(|r| {
                    r.steps.iter().find(|s| s.binding == step.binding)
                });
                let case = match outcome {
                    Some(step_result) => {
                        let failed_assert =
                            step_result.asserts.iter().find(|a| !a.passed);
                        match failed_assert {
                            Some(assert) => TestCase {
                                name: step.binding.clone(),
                                classname: flow.name.clone(),
                                status: CaseStatus::Failed,
                                failure: assert.detail.clone(),
                            },
                            None => TestCase {
                                name: step.binding.clone(),
                                classname: flow.name.clone(),
                                status: CaseStatus::Passed,
                                failure: String::new(),
                            },
                        }
                    }
                    None => {
                        // The step never produced a result: either a
                        // step-level diagnostic aborted it, or an earlier
                        // step aborted the flow.
                        let failure = run
                            .diagnostics
                            .iter()
                            .find(|d| {
                                d.flow.as_deref() == Some(flow.name.as_str())
                                    && d.request.as_deref() == Some(step.label().as_str())
                            })
                            .map(|d| format!("{}: {}", d.code, d.message));
                        match failure {
                            Some(failure) => TestCase {
                                name: step.binding.clone(),
                                classname: flow.name.clone(),
                                status: CaseStatus::Failed,
                                failure,
                            },
                            None => TestCase {
                                name: step.binding.clone(),
                                classname: flow.name.clone(),
                                status: CaseStatus::Skipped,
                                failure: String::new(),
                            },
                        }
                    }
                };
                cases.push(case);
            }

            if !flow.asserts.is_empty() {
                let outcomes = result.map(|r| r.asserts.as_slice()).unwrap_or(&[]);
                let case = if outcomes.is_empty() {
                    TestCase {
                        name: "assertions".to_string(),
                        classname: flow.name.clone(),
                        status: CaseStatus::Skipped,
                        failure: String::new(),
                    }
                } else if let Some(failed) = outcomes.iter().find(|a| !a.passed) {
                    TestCase {
                        name: "assertions".to_string(),
                        classname: flow.name.clone(),
                        status: CaseStatus::Failed,
                        failure: failed.detail.clone(),
                    }
                } else {
                    TestCase {
                        name: "assertions".to_string(),
                        classname: flow.name.clone(),
                        status: CaseStatus::Passed,
                        failure: String::new(),
                    }
                };
                cases.push(case);
            }

            let failures = cases.iter().filter(|c| c.status == CaseStatus::Failed).count();
            let skipped = cases.iter().filter(|c| c.status == CaseStatus::Skipped).count();
            suites.push(Suite {
                name: flow.name.clone(),
                tests: cases.len(),
                failures,
                skipped,
                cases,
            });
        }

        Report {
            entry: plan.entry.clone(),
            tests: suites.iter().map(|s| s.tests).sum(),
            failures: suites.iter().map(|s| s.failures).sum(),
            skipped: suites.iter().map(|s| s.skipped).sum(),
            suites,
            diagnostics: run.diagnostics.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::execute;
    use crate::transport::MockTransport;
    use pipetest_compile::{compile, MemoryLoader};
    use serde_json::json;

    fn report_for(src: &str, transport: &MockTransport) -> Report {
        let loader = MemoryLoader::new().add("main.pt", src);
        let result = compile("main.pt", &loader);
        assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);
        let plan = result.plan.unwrap();
        let run = execute(&plan, transport);
        Report::from_run(&plan, &run)
    }

    #[test]
    fn passing_and_failing_flows_count_separately() {
        let src = concat!(
            "base \"https://h.test\"\n",
            "req ok:\n\tGET /ok\n\t? status == 200\n",
            "req picky:\n\tGET /ok\n\t? status == 201\n",
            "flow \"green\":\n\tok\n\t? ok.status == 200\n",
            "flow \"red\":\n\tpicky\n",
        );
        let transport = MockTransport::new().route("GET", "/ok", 200, &json!(null));
        let report = report_for(src, &transport);

        assert_eq!(report.suites.len(), 2);
        // Flows are plan-sorted: "green" before "red".
        let green = &report.suites[0];
        assert_eq!(green.name, "green");
        assert_eq!(green.failures, 0);
        assert_eq!(green.tests, 2); // step + flow assertions
        assert_eq!(green.cases[1].name, "assertions");
        assert_eq!(green.cases[1].status, CaseStatus::Passed);

        let red = &report.suites[1];
        assert_eq!(red.failures, 1);
        assert!(red.cases[0].failure.contains("left was 200"));
        assert!(!report.passed());
    }

    #[test]
    fn unreached_steps_report_as_failed_or_skipped() {
        let src = concat!(
            "base \"https://h.test\"\n",
            "req gone:\n\tGET /gone\n",
            "req after:\n\tGET /after\n",
            "flow \"f\":\n\tgone -> after\n",
        );
        // Nothing routed: the first dispatch errors, the second never runs.
        let transport = MockTransport::new();
        let report = report_for(src, &transport);

        let suite = &report.suites[0];
        assert_eq!(suite.cases[0].status, CaseStatus::Failed);
        assert!(suite.cases[0].failure.contains("E_RUNTIME_TRANSPORT"));
        assert_eq!(suite.cases[1].status, CaseStatus::Skipped);
        assert_eq!(report.failures, 1);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn report_serializes_for_ci() {
        let src = "base \"https://h.test\"\nreq ok:\n\tGET /ok\nflow \"f\":\n\tok\n";
        let transport = MockTransport::new().route("GET", "/ok", 200, &json!(null));
        let report = report_for(src, &transport);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["entry"], "main.pt");
        assert_eq!(value["suites"][0]["cases"][0]["status"], "passed");
    }
}
