//! Ref name validation following `git check-ref-format`.
//!
//! Valid ref names are either a top-level pseudo-ref made of uppercase
//! letters and underscores (`HEAD`, `FETCH_HEAD`), or a hierarchical name
//! under `refs/` where:
//! - No component is empty, starts with `.`, or ends with `.lock`
//! - No ASCII control character, space, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - No `..` or `@{`, and the name is not `@`
//! - The name does not end with `.` or `/`

use crate::error::{RefError, RefResult};

/// Namespace every non-pseudo ref lives under.
pub const REFS_NAMESPACE: &str = "refs/";

/// The ref naming the current branch.
pub const HEAD: &str = "HEAD";

/// Characters that are forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[char] = &[' ', '~', '^', ':', '?', '*', '[', '\\'];

/// Validate a full ref name such as `refs/heads/main` or `HEAD`.
///
/// # Examples
///
/// ```
/// use flatgit_refs::names::validate_ref_name;
///
/// assert!(validate_ref_name("HEAD").is_ok());
/// assert!(validate_ref_name("refs/heads/feature/auth").is_ok());
/// assert!(validate_ref_name("heads/main").is_err());
/// assert!(validate_ref_name("refs/heads/bad..name").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> RefResult<()> {
    if is_pseudo_ref(name) {
        return Ok(());
    }
    let Some(rest) = name.strip_prefix(REFS_NAMESPACE) else {
        return Err(invalid(name, "must be a pseudo-ref or start with 'refs/'"));
    };
    if rest.is_empty() {
        return Err(invalid(name, "must name something under 'refs/'"));
    }
    check_format(name).map_err(|reason| invalid(name, reason))
}

/// Validate a short branch name such as `main` or `feature/auth`.
///
/// The name is checked as if it were `refs/heads/<name>`.
pub fn validate_branch_name(name: &str) -> RefResult<()> {
    if name.is_empty() {
        return Err(invalid(name, "branch name must not be empty"));
    }
    check_format(name).map_err(|reason| invalid(name, reason))
}

/// Full ref name for a branch.
pub fn branch_ref(branch: &str) -> String {
    format!("{REFS_NAMESPACE}heads/{branch}")
}

fn is_pseudo_ref(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_uppercase() || b == b'_')
}

fn check_format(name: &str) -> Result<(), String> {
    if name == "@" {
        return Err("must not be '@'".into());
    }

    if let Some(ch) = name.chars().find(|ch| ch.is_ascii_control() || FORBIDDEN_CHARS.contains(ch)) {
        return Err(format!("contains forbidden character: {ch:?}"));
    }

    if name.contains("..") {
        return Err("must not contain '..'".into());
    }

    // Reflog syntax.
    if name.contains("@{") {
        return Err("must not contain '@{'".into());
    }

    if name.ends_with('.') {
        return Err("must not end with '.'".into());
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err("must not start or end with '/'".into());
    }

    for component in name.split('/') {
        if component.is_empty() {
            return Err("path components must not be empty".into());
        }
        if component.starts_with('.') {
            return Err(format!("component must not start with '.': {component:?}"));
        }
        if component.ends_with(".lock") {
            return Err(format!("component must not end with '.lock': {component:?}"));
        }
    }

    Ok(())
}

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}
