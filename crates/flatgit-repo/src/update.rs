use flatgit_refs::RefValue;

/// One conditional change in a multi-ref update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefUpdate {
    pub name: String,
    /// Value the ref must currently have; `None` means it must not exist.
    pub expected: Option<RefValue>,
    /// Value to write; `None` deletes the ref.
    pub new: Option<RefValue>,
}

impl RefUpdate {
    pub fn create(name: impl Into<String>, value: RefValue) -> Self {
        Self {
            name: name.into(),
            expected: None,
            new: Some(value),
        }
    }

    pub fn replace(name: impl Into<String>, expected: RefValue, value: RefValue) -> Self {
        Self {
            name: name.into(),
            expected: Some(expected),
            new: Some(value),
        }
    }

    pub fn delete(name: impl Into<String>, expected: RefValue) -> Self {
        Self {
            name: name.into(),
            expected: Some(expected),
            new: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateStatus {
    Applied,
    /// The ref did not have the expected value; nothing was written.
    Rejected,
}

/// What happened to one [`RefUpdate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefUpdateOutcome {
    pub name: String,
    pub status: UpdateStatus,
}

impl RefUpdateOutcome {
    pub fn is_applied(&self) -> bool {
        self.status == UpdateStatus::Applied
    }
}
