use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub input: Vec<Value>,
    pub expected: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestSuite {
    pub name: String,
    pub cases: Vec<TestCase>,
}

/// Everything fetched for one session. Shared read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuiteCollection {
    pub sets: Vec<String>,
    pub problems: IndexMap<String, Vec<String>>,
    pub suites: IndexMap<String, TestSuite>,
}

impl SuiteCollection {
    pub fn suite(&self, name: &str) -> Option<&TestSuite> {
        self.suites.get(name)
    }

    /// Function names of a problem set, in the order the payload lists them.
    pub fn problems_in(&self, set: &str) -> Option<&[String]> {
        self.problems.get(set).map(Vec::as_slice)
    }
}

/// What a callable produced for one case.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Got {
    Value(Value),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseResult {
    pub input: Vec<Value>,
    pub got: Got,
    pub expected: Value,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteResult {
    pub name: String,
    pub results: Vec<CaseResult>,
    pub total: usize,
    pub passed: usize,
}

impl SuiteResult {
    pub fn failed(&self) -> usize {
        self.total - self.passed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Tested(SuiteResult),
    NotImplemented { name: String },
}

impl Evaluation {
    pub fn name(&self) -> &str {
        match self {
            Evaluation::Tested(r) => &r.name,
            Evaluation::NotImplemented { name } => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub tested: Vec<SuiteResult>, // Suites with a registered callable, collection order
    pub missing: Vec<String>,     // Suites whose function is not registered
}

impl BatchReport {
    pub fn push(&mut self, evaluation: Evaluation) {
        match evaluation {
            Evaluation::Tested(r) => self.tested.push(r),
            Evaluation::NotImplemented { name } => self.missing.push(name),
        }
    }

    pub fn total_cases(&self) -> usize {
        self.tested.iter().map(|r| r.total).sum()
    }

    pub fn passed_cases(&self) -> usize {
        self.tested.iter().map(|r| r.passed).sum()
    }

    pub fn failed_cases(&self) -> usize {
        self.total_cases() - self.passed_cases()
    }

    pub fn all_passed(&self) -> bool {
        self.failed_cases() == 0
    }
}
