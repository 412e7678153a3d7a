//! Ambient configuration read from `git config`, mirroring the way the
//! teacher crate shells out to `git` for everything rather than parsing
//! `.git/config` itself.

use crate::vcs::Repo;

#[derive(Debug, Clone)]
pub struct Config {
    /// `entropy.queueCapacity` — bound on in-flight rewrite requests.
    pub queue_capacity: usize,
    /// `entropy.updateRefs` — whether moving the branch ref is on the
    /// table at all, a persistent form of `--no-update`. When true
    /// (the default) the tool still asks `proceed? [y/N]` before
    /// touching the ref; when false it never offers to.
    pub update_refs: bool,
    /// `entropy.diffContext` — context lines requested from the initial
    /// staged diff (not the zero-context diffs used internally for
    /// re-basing amendments through parent diffs, which always pass
    /// `--unified=0`).
    pub diff_context: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            queue_capacity: crate::backend::DEFAULT_QUEUE_CAPACITY,
            update_refs: true,
            diff_context: 3,
        }
    }
}

impl Config {
    pub fn load(repo: &Repo) -> Config {
        let mut config = Config::default();

        if let Some(value) = get(repo, "entropy.queueCapacity") {
            if let Ok(parsed) = value.parse() {
                config.queue_capacity = parsed;
            }
        }
        if let Some(value) = get(repo, "entropy.updateRefs") {
            config.update_refs = parse_bool(&value).unwrap_or(config.update_refs);
        }
        if let Some(value) = get(repo, "entropy.diffContext") {
            if let Ok(parsed) = value.parse() {
                config.diff_context = parsed;
            }
        }

        config
    }
}

fn get(repo: &Repo, key: &str) -> Option<String> {
    repo.run(&["config", "--get", key])
        .ok()
        .map(|out| String::from_utf8_lossy(&out).trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
