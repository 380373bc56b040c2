use std::sync::Arc;

use flatgit_kv::KeyValueStore;
use flatgit_types::KeyLayout;
use tracing::{debug, warn};

use crate::error::RefResult;
use crate::names::{validate_ref_name, HEAD};
use crate::traits::RefStore;
use crate::types::RefValue;

/// Ref store keeping one key per ref, in git's loose-ref format.
///
/// Updates are single-key conditional writes against the exact bytes just
/// read, so a ref is never partially written. How strong the conditional
/// write is depends on the backing [`KeyValueStore`].
pub struct BucketRefStore {
    kv: Arc<dyn KeyValueStore>,
    layout: KeyLayout,
}

impl BucketRefStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, layout: KeyLayout) -> Self {
        Self { kv, layout }
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    /// Raw bytes and parsed value of `name`.
    fn load(&self, name: &str) -> RefResult<Option<(Vec<u8>, RefValue)>> {
        match self.kv.get(&self.layout.ref_key(name))? {
            Some(raw) => {
                let value = RefValue::decode(name, &raw)?;
                Ok(Some((raw, value)))
            }
            None => Ok(None),
        }
    }

    fn validate_value(value: &RefValue) -> RefResult<()> {
        match value {
            RefValue::Symbolic(target) => validate_ref_name(target),
            RefValue::Direct(_) => Ok(()),
        }
    }
}

impl RefStore for BucketRefStore {
    fn read(&self, name: &str) -> RefResult<Option<RefValue>> {
        validate_ref_name(name)?;
        Ok(self.load(name)?.map(|(_, value)| value))
    }

    fn compare_and_swap(&self, name: &str, expected: Option<&RefValue>, new: &RefValue) -> RefResult<bool> {
        validate_ref_name(name)?;
        Self::validate_value(new)?;

        let current = self.load(name)?;
        if current.as_ref().map(|(_, value)| value) != expected {
            debug!(name, ?expected, "ref changed before swap");
            return Ok(false);
        }

        let raw = current.as_ref().map(|(raw, _)| raw.as_slice());
        let swapped = self
            .kv
            .compare_and_put(&self.layout.ref_key(name), raw, &new.to_bytes())?;
        if swapped {
            debug!(name, value = %new, "updated ref");
        } else {
            debug!(name, "lost ref update race");
        }
        Ok(swapped)
    }

    fn remove_if_equals(&self, name: &str, expected: Option<&RefValue>) -> RefResult<bool> {
        validate_ref_name(name)?;
        let key = self.layout.ref_key(name);

        let Some(expected) = expected else {
            self.kv.delete(&key)?;
            debug!(name, "deleted ref");
            return Ok(true);
        };

        let Some((raw, current)) = self.load(name)? else {
            return Ok(true);
        };
        if &current != expected {
            return Ok(false);
        }
        let removed = self.kv.compare_and_delete(&key, &raw)?;
        if removed {
            debug!(name, "deleted ref");
        }
        Ok(removed)
    }

    fn set_symbolic(&self, name: &str, target: &str) -> RefResult<()> {
        validate_ref_name(name)?;
        let value = RefValue::symbolic(target);
        Self::validate_value(&value)?;
        self.kv.put(&self.layout.ref_key(name), &value.to_bytes())?;
        debug!(name, target, "set symbolic ref");
        Ok(())
    }

    fn names(&self) -> RefResult<Vec<String>> {
        let mut names = Vec::new();
        for meta in self.kv.list(&self.layout.refs_prefix())? {
            if meta.key.ends_with('/') {
                continue;
            }
            let Some(name) = self.layout.ref_name_from_key(&meta.key) else {
                continue;
            };
            if let Err(e) = validate_ref_name(name) {
                warn!(key = %meta.key, error = %e, "skipping key with invalid ref name");
                continue;
            }
            names.push(name.to_string());
        }
        if self.kv.exists(&self.layout.ref_key(HEAD))? {
            names.push(HEAD.to_string());
        }
        Ok(names)
    }
}

impl std::fmt::Debug for BucketRefStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketRefStore")
            .field("kv", &self.kv)
            .field("prefix", &self.layout.prefix())
            .finish()
    }
}
