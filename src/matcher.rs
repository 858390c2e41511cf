//! Decides whether a ref or an environment is in scope for a project or a wildcard.
//!
//! Regexps are compiled on every evaluation and compile errors are returned,
//! never treated as a silent mismatch.

use regex::Regex;

use crate::config::{ProjectPullEnvironments, ProjectPullRefs, Wildcard};
use crate::error::Result;
use crate::schemas::{Environment, Ref, RefKind};

/// Whether the ref kind is enabled and its name matches the kind's regexp.
pub fn ref_matches_pull_config(pull_refs: &ProjectPullRefs, r: &Ref) -> Result<bool> {
    let rule = match r.kind {
        RefKind::Branch => &pull_refs.branches,
        RefKind::Tag => &pull_refs.tags,
        RefKind::MergeRequest => &pull_refs.merge_requests,
    };

    if !rule.enabled {
        return Ok(false);
    }

    let re = Regex::new(&rule.regexp)?;
    Ok(re.is_match(&r.name))
}

/// Whether environment pulling is enabled and the name matches its regexp.
pub fn environment_matches_pull_config(
    pull_environments: &ProjectPullEnvironments,
    env: &Environment,
) -> Result<bool> {
    if !pull_environments.enabled {
        return Ok(false);
    }

    let re = Regex::new(&pull_environments.regexp)?;
    Ok(re.is_match(&env.name))
}

pub fn ref_matches_wildcard(wildcard: &Wildcard, r: &Ref) -> Result<bool> {
    if !owner_matches(wildcard, &r.project.name) {
        return Ok(false);
    }

    ref_matches_pull_config(&wildcard.pull.refs, r)
}

pub fn environment_matches_wildcard(wildcard: &Wildcard, env: &Environment) -> Result<bool> {
    if !owner_matches(wildcard, &env.project_name) {
        return Ok(false);
    }

    environment_matches_pull_config(&wildcard.pull.environments, env)
}

// An empty owner kind is a global wildcard. Otherwise a plain substring test
// on the project path, not a namespace comparison.
fn owner_matches(wildcard: &Wildcard, project_name: &str) -> bool {
    wildcard.owner.kind.is_empty() || project_name.contains(&wildcard.owner.name)
}
