use crate::equality::structural_eq;
use crate::registry::{Callable, CallableRegistry};
use crate::session::Selection;
use crate::types::{
    BatchReport, CaseResult, Evaluation, Got, SuiteCollection, SuiteResult, TestCase, TestSuite,
};
use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe, catch_unwind};
use std::sync::Once;
use tracing::{debug, info, warn};

/// Runs `suite` against the callable registered as `name`.
///
/// A name without a registered callable yields [`Evaluation::NotImplemented`]
/// and nothing is invoked. Errors and panics raised by the callable are
/// recorded on the failing case; they never escape this function.
pub fn evaluate(name: &str, suite: &TestSuite, registry: &CallableRegistry) -> Evaluation {
    let callable = match registry.get(name) {
        Some(c) if !name.is_empty() => c,
        _ => {
            debug!("{name}: not implemented");
            return Evaluation::NotImplemented {
                name: name.to_string(),
            };
        }
    };

    let results: Vec<CaseResult> = suite
        .cases
        .iter()
        .map(|case| run_case(callable.as_ref(), case))
        .collect();
    let passed = results.iter().filter(|r| r.passed).count();
    info!("{name}: {passed} of {} passed", results.len());

    Evaluation::Tested(SuiteResult {
        name: name.to_string(),
        total: results.len(),
        passed,
        results,
    })
}

fn run_case(callable: &dyn Callable, case: &TestCase) -> CaseResult {
    // The callable owns its copy of the arguments and may mutate it freely.
    let args = case.input.clone();
    let outcome = {
        let _quiet = QuietPanics::enter();
        catch_unwind(AssertUnwindSafe(|| callable.call(args)))
    };
    let got = match outcome {
        Ok(Ok(value)) => Got::Value(value),
        Ok(Err(e)) => Got::Error(format!("{e:#}")),
        Err(payload) => Got::Error(panic_message(payload.as_ref())),
    };
    let passed = match &got {
        Got::Value(v) => structural_eq(v, &case.expected),
        Got::Error(_) => false,
    };
    CaseResult {
        input: case.input.clone(),
        got,
        expected: case.expected.clone(),
        passed,
    }
}

thread_local! {
    static QUIET: Cell<bool> = const { Cell::new(false) };
}

/// Keeps the panic hook silent on this thread while a callable runs. The
/// panic is reported on the case instead of on stderr.
struct QuietPanics;

impl QuietPanics {
    fn enter() -> Self {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let previous = panic::take_hook();
            panic::set_hook(Box::new(move |info| {
                if !QUIET.with(Cell::get) {
                    previous(info);
                }
            }));
        });
        QUIET.with(|q| q.set(true));
        QuietPanics
    }

    #[cfg(test)]
    fn active() -> bool {
        QUIET.with(Cell::get)
    }
}

impl Drop for QuietPanics {
    fn drop(&mut self) {
        QUIET.with(|q| q.set(false));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Evaluates every suite of the collection, in collection order.
pub fn evaluate_all(collection: &SuiteCollection, registry: &CallableRegistry) -> BatchReport {
    let mut report = BatchReport::default();
    for (name, suite) in &collection.suites {
        report.push(evaluate(name, suite, registry));
    }
    report
}

/// Evaluates only the functions in focus for `selection`: the selected
/// problem, else the selected set, else everything.
pub fn evaluate_selection(
    collection: &SuiteCollection,
    registry: &CallableRegistry,
    selection: &Selection,
) -> BatchReport {
    let names = focused_names(collection, selection);
    let mut report = BatchReport::default();
    for name in names {
        match collection.suite(&name) {
            Some(suite) => report.push(evaluate(&name, suite, registry)),
            None => warn!("{name}: no test cases in the loaded data"),
        }
    }
    report
}

/// Function names to evaluate for a selection, in display order.
pub fn focused_names(collection: &SuiteCollection, selection: &Selection) -> Vec<String> {
    if let Some(problem) = &selection.problem {
        return vec![problem.clone()];
    }
    if let Some(set) = &selection.problem_set {
        match collection.problems_in(set) {
            Some(names) => return names.to_vec(),
            None => warn!("{set}: unknown problem set, showing everything"),
        }
    }
    collection.suites.keys().cloned().collect()
}
