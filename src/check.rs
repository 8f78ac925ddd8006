//! Cross-checks the three parts of the test data against each other.

use crate::types::SuiteCollection;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub sets_without_problems: BTreeSet<String>,
    pub unused_problem_sets: BTreeSet<String>,
    pub only_in_problem_sets: BTreeSet<String>,
    pub only_in_tests: BTreeSet<String>,
    pub set_count: usize,
    pub test_count: usize,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.sets_without_problems.is_empty()
            && self.unused_problem_sets.is_empty()
            && self.only_in_problem_sets.is_empty()
            && self.only_in_tests.is_empty()
    }
}

pub fn check_collection(collection: &SuiteCollection) -> ConsistencyReport {
    let sets: BTreeSet<&String> = collection.sets.iter().collect();
    let have_problems: BTreeSet<&String> = collection.problems.keys().collect();
    let in_problems: BTreeSet<&String> = collection.problems.values().flatten().collect();
    let in_tests: BTreeSet<&String> = collection.suites.keys().collect();

    ConsistencyReport {
        sets_without_problems: owned(sets.difference(&have_problems)),
        unused_problem_sets: owned(have_problems.difference(&sets)),
        only_in_problem_sets: owned(in_problems.difference(&in_tests)),
        only_in_tests: owned(in_tests.difference(&in_problems)),
        set_count: sets.len(),
        test_count: in_tests.len(),
    }
}

fn owned<S: ToString>(names: impl Iterator<Item = S>) -> BTreeSet<String> {
    names.map(|s| s.to_string()).collect()
}
