//! Parsing of collection addresses.
//!
//! Collections live at GitHub-style urls:
//!
//! ```text
//! https://github.com/<owner>/<name>/<collection>
//! https://github.com/<owner>/<name>/tree/<branch>/<collection>
//! ```
//!
//! The collection id is always the last path segment.

use std::sync::LazyLock;

use regex::Regex;

use crate::storage::RepoId;

static REPO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://github\.com/(.+?/.+?)/").expect("repo pattern compiles")
});

static BRANCH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://github\.com/.+?/.+?/tree/(.+?)/").expect("branch pattern compiles")
});

/// `owner/name` named by the address, if any.
pub fn repo_id(url: &str) -> Option<RepoId> {
    let captures = REPO_PATTERN.captures(url)?;
    RepoId::parse(captures.get(1)?.as_str()).ok()
}

/// The branch in a `/tree/<branch>/` address: the first segment after
/// `tree`, so `tree/feature/x/todos` yields `feature`.
pub fn branch(url: &str) -> Option<String> {
    let captures = BRANCH_PATTERN.captures(url)?;
    Some(captures.get(1)?.as_str().to_string())
}

/// The last path segment.
pub fn collection_id(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}
