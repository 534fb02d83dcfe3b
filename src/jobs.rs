//! Built-in job definitions embedded in the binary
//!
//! Lets users run `--job-def youtube-statistics` instead of pointing at a YAML file.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Built-in job YAML definitions
pub static BUILTIN_JOBS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "youtube-statistics",
        include_str!("../jobs/youtube-statistics.yaml"),
    );
    m
});

/// Get a built-in job definition by name
pub fn get_builtin(name: &str) -> Option<&'static str> {
    BUILTIN_JOBS.get(name).copied()
}

/// List all built-in job names, sorted
pub fn list_builtin() -> Vec<&'static str> {
    let mut names: Vec<_> = BUILTIN_JOBS.keys().copied().collect();
    names.sort_unstable();
    names
}
