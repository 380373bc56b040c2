use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::directory::DirectoryStore;
use crate::error::{KvError, KvResult};
use crate::memory::MemoryStore;
use crate::traits::{KeyValueStore, VersionedStore};

/// Access credentials embedded in a connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_id: String,
    pub secret: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_id", &self.access_id)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A parsed connection string: `scheme://[access-id[:secret]@]bucket[:prefix]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub scheme: String,
    pub credentials: Option<Credentials>,
    pub bucket: String,
    pub prefix: Option<String>,
}

impl FromStr for Location {
    type Err = KvError;

    fn from_str(s: &str) -> KvResult<Self> {
        let s = s.trim();
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| KvError::InvalidLocation(format!("missing scheme in {s:?}")))?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-') {
            return Err(KvError::InvalidLocation(format!("bad scheme {scheme:?}")));
        }

        let (credentials, target) = match rest.rsplit_once('@') {
            Some((auth, target)) => {
                let credentials = match auth.split_once(':') {
                    Some((id, secret)) => Credentials {
                        access_id: id.to_string(),
                        secret: Some(secret.to_string()),
                    },
                    None => Credentials {
                        access_id: auth.to_string(),
                        secret: None,
                    },
                };
                if credentials.access_id.is_empty() {
                    return Err(KvError::InvalidLocation("empty access id".into()));
                }
                (Some(credentials), target)
            }
            None => (None, rest),
        };

        let (bucket, prefix) = match target.split_once(':') {
            Some((bucket, prefix)) => (bucket, Some(prefix.to_string())),
            None => (target, None),
        };
        if bucket.is_empty() {
            return Err(KvError::InvalidLocation(format!("missing bucket in {s:?}")));
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            credentials,
            bucket: bucket.to_string(),
            prefix,
        })
    }
}

impl fmt::Display for Location {
    /// Renders the location without its secret.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(credentials) = &self.credentials {
            write!(f, "{}@", credentials.access_id)?;
        }
        f.write_str(&self.bucket)?;
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix}")?;
        }
        Ok(())
    }
}

/// An opened storage backend.
#[derive(Clone, Debug)]
pub enum Backend {
    Memory(Arc<MemoryStore>),
    Directory(Arc<DirectoryStore>),
}

impl Backend {
    /// The backend as a plain key-value store.
    pub fn kv(&self) -> Arc<dyn KeyValueStore> {
        match self {
            Self::Memory(store) => store.clone(),
            Self::Directory(store) => store.clone(),
        }
    }

    /// The backend as a versioned store, when it supports versioning.
    pub fn versioned(&self) -> Option<Arc<dyn VersionedStore>> {
        match self {
            Self::Memory(store) => Some(store.clone()),
            Self::Directory(_) => None,
        }
    }
}

/// Open the backend a location names.
///
/// `mem://<name>` gives a fresh in-memory store; `file://<path>` a directory
/// store rooted at `<path>`. Cloud schemes are not built in.
pub fn open(location: &Location) -> KvResult<Backend> {
    match location.scheme.as_str() {
        "mem" => Ok(Backend::Memory(Arc::new(MemoryStore::new()))),
        "file" => {
            if location.credentials.is_some() {
                tracing::warn!(location = %location, "credentials ignored for file storage");
            }
            Ok(Backend::Directory(Arc::new(DirectoryStore::open(&location.bucket)?)))
        }
        other => Err(KvError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortest_form() {
        let loc: Location = "mem://scratch".parse().unwrap();
        assert_eq!(loc.scheme, "mem");
        assert_eq!(loc.bucket, "scratch");
        assert_eq!(loc.credentials, None);
        assert_eq!(loc.prefix, None);
    }

    #[test]
    fn full_form() {
        let loc: Location = "s3://AKID:s3cr3t@my-bucket:repos/app.git".parse().unwrap();
        assert_eq!(loc.scheme, "s3");
        assert_eq!(loc.bucket, "my-bucket");
        assert_eq!(loc.prefix.as_deref(), Some("repos/app.git"));
        let creds = loc.credentials.clone().unwrap();
        assert_eq!(creds.access_id, "AKID");
        assert_eq!(creds.secret.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn id_without_secret() {
        let loc: Location = "s3://AKID@bucket".parse().unwrap();
        assert_eq!(loc.credentials.unwrap().secret, None);
    }

    #[test]
    fn secret_is_redacted() {
        let loc: Location = "s3://AKID:s3cr3t@bucket".parse().unwrap();
        assert!(!format!("{loc:?}").contains("s3cr3t"));
        assert!(!loc.to_string().contains("s3cr3t"));
        assert_eq!(loc.to_string(), "s3://AKID@bucket");
    }

    #[test]
    fn malformed_locations() {
        for bad in ["bucket", "://bucket", "mem://", "s3://@bucket", "s3://id:pw@"] {
            assert!(
                matches!(bad.parse::<Location>(), Err(KvError::InvalidLocation(_))),
                "{bad:?} parsed"
            );
        }
    }

    #[test]
    fn open_dispatches_on_scheme() {
        let mem = open(&"mem://x".parse().unwrap()).unwrap();
        assert!(mem.versioned().is_some());

        let dir = tempfile::tempdir().unwrap();
        let url = format!("file://{}", dir.path().display());
        let file = open(&url.parse().unwrap()).unwrap();
        assert!(file.versioned().is_none());
        file.kv().put("k", b"v").unwrap();
        assert!(dir.path().join("k").is_file());

        let err = open(&"s3://bucket".parse().unwrap()).unwrap_err();
        assert!(matches!(err, KvError::UnsupportedScheme(s) if s == "s3"));
    }
}
