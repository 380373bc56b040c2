//! Ref values in the git loose-ref file format.

use std::fmt;

use flatgit_types::ObjectId;

use crate::error::{RefError, RefResult};

const SYMBOLIC_PREFIX: &str = "ref: ";

/// What a ref points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RefValue {
    /// Points directly at an object.
    Direct(ObjectId),
    /// Points at another ref by name, e.g. `HEAD -> refs/heads/main`.
    Symbolic(String),
}

impl RefValue {
    pub fn symbolic(target: impl Into<String>) -> Self {
        Self::Symbolic(target.into())
    }

    pub fn as_direct(&self) -> Option<&ObjectId> {
        match self {
            Self::Direct(id) => Some(id),
            Self::Symbolic(_) => None,
        }
    }

    pub fn as_symbolic(&self) -> Option<&str> {
        match self {
            Self::Direct(_) => None,
            Self::Symbolic(target) => Some(target),
        }
    }

    /// `<40 hex>\n` or `ref: <target>\n`.
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{self}\n").into_bytes()
    }

    /// Parse the stored value of ref `name`. A missing trailing newline is
    /// accepted.
    pub fn decode(name: &str, bytes: &[u8]) -> RefResult<Self> {
        let malformed = |reason: String| RefError::Malformed {
            name: name.to_string(),
            reason,
        };

        let text = std::str::from_utf8(bytes).map_err(|e| malformed(format!("not utf-8: {e}")))?;
        let line = text.strip_suffix('\n').unwrap_or(text);
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(target) = line.strip_prefix(SYMBOLIC_PREFIX) {
            let target = target.trim();
            if target.is_empty() {
                return Err(malformed("empty symbolic target".into()));
            }
            return Ok(Self::Symbolic(target.to_string()));
        }

        ObjectId::from_hex(line.trim())
            .map(Self::Direct)
            .map_err(|e| malformed(format!("expected object id or 'ref: ': {e}")))
    }
}

impl fmt::Display for RefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(id) => write!(f, "{id}"),
            Self::Symbolic(target) => write!(f, "{SYMBOLIC_PREFIX}{target}"),
        }
    }
}

impl From<ObjectId> for RefValue {
    fn from(id: ObjectId) -> Self {
        Self::Direct(id)
    }
}
