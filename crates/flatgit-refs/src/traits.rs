//! The [`RefStore`] trait defining the reference storage interface.

use crate::error::RefResult;
use crate::types::RefValue;

/// Storage backend for named references.
///
/// Implementations must be thread-safe (`Send + Sync`). Names are full ref
/// names: `HEAD` or hierarchical names under `refs/`. Conditional updates
/// report contention as `Ok(false)`, never as an error.
pub trait RefStore: Send + Sync {
    /// Read a ref by its full name (e.g. "refs/heads/main").
    ///
    /// Returns `Ok(None)` if the ref does not exist.
    fn read(&self, name: &str) -> RefResult<Option<RefValue>>;

    /// Replace the value of `name` with `new` iff its current value equals
    /// `expected`. `None` means the ref must not exist.
    ///
    /// Returns `Ok(false)` when the current value differs or another writer
    /// got there first.
    fn compare_and_swap(&self, name: &str, expected: Option<&RefValue>, new: &RefValue) -> RefResult<bool>;

    /// Create `name` only if it does not exist yet.
    ///
    /// Advisory: on an eventually-consistent service a concurrent creator
    /// may not be visible to the initial read.
    fn add_if_absent(&self, name: &str, value: &RefValue) -> RefResult<bool> {
        if self.read(name)?.is_some() {
            return Ok(false);
        }
        self.compare_and_swap(name, None, value)
    }

    /// Delete `name` iff its current value equals `expected`; `None`
    /// deletes unconditionally. An absent ref counts as removed.
    fn remove_if_equals(&self, name: &str, expected: Option<&RefValue>) -> RefResult<bool>;

    /// Point `name` at `target` unconditionally.
    fn set_symbolic(&self, name: &str, target: &str) -> RefResult<()>;

    /// Names of all refs under `refs/`, plus `HEAD` if it exists.
    fn names(&self) -> RefResult<Vec<String>>;

    /// All refs with their values.
    ///
    /// Refs deleted between listing and reading are skipped.
    fn list(&self) -> RefResult<Vec<(String, RefValue)>> {
        let mut refs = Vec::new();
        for name in self.names()? {
            if let Some(value) = self.read(&name)? {
                refs.push((name, value));
            }
        }
        Ok(refs)
    }
}
