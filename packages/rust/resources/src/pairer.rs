//! Problem/solution pairing for assignment files.
//!
//! Each file name is tested against an ordered list of independent matchers;
//! the first match decides its role and assignment number:
//!
//! 1. inline solution: `hw<N>_sol…pdf` / `hw<N>_soln…pdf`
//! 2. separate solution: `sol<N>…pdf` / `soln<N>…pdf`
//! 3. homework: `hw<N>.pdf`
//! 4. problem set: `ps<N>.pdf`
//!
//! `N` is one or two digits and is zero-padded to two to form the key. The
//! `.pdf` suffix is matched as written (lower case).
//! Only keys that have both a problem and a solution produce a pair.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

use ocwharvest_shared::ProblemSolutionPair;

/// What an assignment file contributes to its pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentRole {
    Problem,
    Solution,
}

struct Matcher {
    role: AssignmentRole,
    pattern: Regex,
}

impl Matcher {
    fn new(role: AssignmentRole, pattern: &str) -> Self {
        Self {
            role,
            pattern: Regex::new(pattern).expect("valid regex"),
        }
    }
}

/// Matchers in priority order. Evaluation stops at the first hit.
static MATCHERS: LazyLock<[Matcher; 4]> = LazyLock::new(|| {
    [
        Matcher::new(AssignmentRole::Solution, r"hw([0-9]{1,2})_soln?.*\.pdf$"),
        Matcher::new(AssignmentRole::Solution, r"soln?([0-9]{1,2}).*\.pdf$"),
        Matcher::new(AssignmentRole::Problem, r"hw([0-9]{1,2})\.pdf$"),
        Matcher::new(AssignmentRole::Problem, r"ps([0-9]{1,2})\.pdf$"),
    ]
});

/// Classify one file name, returning its role and zero-padded assignment number.
pub fn classify_name(name: &str) -> Option<(AssignmentRole, String)> {
    MATCHERS.iter().find_map(|m| {
        m.pattern
            .captures(name)
            .map(|caps| (m.role, format!("{:0>2}", &caps[1])))
    })
}

/// Pairs plus the assignment numbers that were dropped for lack of a partner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pairing {
    /// Matched pairs, ascending by assignment number.
    pub pairs: Vec<ProblemSolutionPair>,
    /// Numbers seen only as a problem.
    pub unmatched_problems: Vec<String>,
    /// Numbers seen only as a solution.
    pub unmatched_solutions: Vec<String>,
}

/// Pair problem files with solution files.
///
/// Unmatched numbers are dropped; use [`pair_assignments_with_report`] to see them.
pub fn pair_assignments<I, S>(names: I) -> Vec<ProblemSolutionPair>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    pair_assignments_with_report(names).pairs
}

/// Pair problem files with solution files and report the leftovers.
///
/// When two files share a number and role, the later one wins.
pub fn pair_assignments_with_report<I, S>(names: I) -> Pairing
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut problems: BTreeMap<String, String> = BTreeMap::new();
    let mut solutions: BTreeMap<String, String> = BTreeMap::new();

    for name in names {
        let name = name.as_ref();
        match classify_name(name) {
            Some((AssignmentRole::Problem, id)) => {
                problems.insert(id, name.to_string());
            }
            Some((AssignmentRole::Solution, id)) => {
                solutions.insert(id, name.to_string());
            }
            None => {}
        }
    }

    let keys: BTreeSet<&String> = problems.keys().chain(solutions.keys()).collect();
    let mut pairing = Pairing::default();

    for key in keys {
        match (problems.get(key), solutions.get(key)) {
            (Some(problem), Some(solution)) => pairing.pairs.push(ProblemSolutionPair {
                id: key.clone(),
                problem_file: problem.clone(),
                solution_file: solution.clone(),
            }),
            (Some(_), None) => pairing.unmatched_problems.push(key.clone()),
            (None, Some(_)) => pairing.unmatched_solutions.push(key.clone()),
            (None, None) => {}
        }
    }

    pairing
}
