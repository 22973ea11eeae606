//! In-process registry of image names held by live scenarios.
//!
//! Generated names are random, but the registry turns "unlikely to collide"
//! into "cannot collide": a name is handed out at most once until released.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use buildproof_common::error::{BuildproofError, Result};
use buildproof_common::types::ResourceName;

/// Attempts at drawing a fresh random name before giving up.
const MAX_DRAWS: usize = 8;

/// Tracks names currently owned by scenarios.
#[derive(Debug, Default)]
pub struct NameRegistry {
    held: Mutex<BTreeSet<ResourceName>>,
}

impl NameRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a specific name.
    ///
    /// # Errors
    ///
    /// Returns `NameCollision` if the name is already held.
    pub fn claim(&self, name: &ResourceName) -> Result<()> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if held.insert(name.clone()) {
            Ok(())
        } else {
            Err(BuildproofError::NameCollision {
                name: name.to_string(),
            })
        }
    }

    /// Generates and claims a fresh random name.
    ///
    /// # Errors
    ///
    /// Returns `NameCollision` if no unused name could be drawn.
    pub fn allocate(&self) -> Result<ResourceName> {
        let mut last = None;
        for _ in 0..MAX_DRAWS {
            let name = ResourceName::generate();
            match self.claim(&name) {
                Ok(()) => {
                    tracing::debug!(name = %name, "allocated scenario name");
                    return Ok(name);
                }
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap_or_else(|| BuildproofError::NameCollision {
            name: String::from("<none drawn>"),
        }))
    }

    /// Releases a name; returns whether it was held.
    pub fn release(&self, name: &ResourceName) -> bool {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).remove(name)
    }

    /// Returns whether a name is currently held.
    #[must_use]
    pub fn is_held(&self, name: &ResourceName) -> bool {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).contains(name)
    }

    /// Number of names currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns whether no name is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn repeated_claim_is_rejected() {
        let registry = NameRegistry::new();
        let name = ResourceName::new("buildproof-fixed");
        registry.claim(&name).expect("first claim");
        assert!(matches!(
            registry.claim(&name),
            Err(BuildproofError::NameCollision { .. })
        ));
        assert!(registry.release(&name));
        registry.claim(&name).expect("claim after release");
    }

    #[test]
    fn release_of_unknown_name_is_false() {
        assert!(!NameRegistry::new().release(&ResourceName::new("never-claimed")));
    }

    #[test]
    fn concurrent_allocations_are_distinct() {
        let registry = Arc::new(NameRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..32)
                        .map(|_| registry.allocate().expect("allocate"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all = BTreeSet::new();
        for handle in handles {
            for name in handle.join().expect("thread") {
                assert!(all.insert(name));
            }
        }
        assert_eq!(registry.len(), 8 * 32);
    }
}
