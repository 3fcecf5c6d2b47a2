use std::sync::{PoisonError, RwLock};

use crs_utils::hash::{HashMap, new_map};

use crate::{EmitError, Procedure};

// -----------------------------------------------------------------------------
// ProcedureCache

/// Finalized procedures keyed by the data shape they were built for.
///
/// Each shape is built on first request. Two threads racing on the same key
/// may both build, the first insertion wins and both get that procedure.
/// Build failures are returned to the caller and never cached.
pub struct ProcedureCache(RwLock<HashMap<String, Procedure>>);

impl ProcedureCache {
    #[inline]
    pub const fn new() -> Self {
        Self(RwLock::new(new_map()))
    }

    pub fn get(&self, key: &str) -> Option<Procedure> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Returns the procedure for `key`, building it with `build` if absent.
    ///
    /// `build` runs without the cache locked, so it may itself use the cache.
    pub fn get_or_build<F>(&self, key: &str, build: F) -> Result<Procedure, EmitError>
    where
        F: FnOnce() -> Result<Procedure, EmitError>,
    {
        if let Some(procedure) = self.get(key) {
            return Ok(procedure);
        }
        let procedure = match build() {
            Ok(procedure) => procedure,
            Err(err) => {
                log::warn!("failed to build procedure for `{key}`: {err}");
                return Err(err);
            }
        };
        Ok(self
            .0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_owned())
            .or_insert(procedure)
            .clone())
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProcedureCache {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ProcedureCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcedureCache")
            .field("len", &self.len())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Tests
