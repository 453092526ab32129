//! One in-flight action per entity. A second action on the same id is
//! refused until the first guard drops.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::lifecycle::EntityKind;

#[derive(Clone, Debug, Default)]
pub struct InFlightRegistry {
    held: Arc<Mutex<HashSet<(EntityKind, String)>>>,
}

#[derive(Debug)]
pub struct InFlightGuard {
    key: (EntityKind, String),
    held: Arc<Mutex<HashSet<(EntityKind, String)>>>,
}

impl InFlightRegistry {
    pub fn try_acquire(&self, entity: EntityKind, id: &str) -> Option<InFlightGuard> {
        let key = (entity, id.to_owned());
        let mut held = match self.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !held.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard { key, held: Arc::clone(&self.held) })
    }

    pub fn is_held(&self, entity: EntityKind, id: &str) -> bool {
        let held = match self.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        };
        held.contains(&(entity, id.to_owned()))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        match self.held.lock() {
            Ok(mut held) => {
                held.remove(&self.key);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::InFlightRegistry;
    use crate::lifecycle::EntityKind;

    #[test]
    fn second_acquire_on_same_entity_is_refused() {
        let registry = InFlightRegistry::default();
        let guard = registry.try_acquire(EntityKind::Request, "r-1").expect("first acquire");

        assert!(registry.try_acquire(EntityKind::Request, "r-1").is_none());
        assert!(registry.try_acquire(EntityKind::Request, "r-2").is_some());
        assert!(registry.try_acquire(EntityKind::FlightRequest, "r-1").is_some());

        drop(guard);
        assert!(!registry.is_held(EntityKind::Request, "r-1"));
        assert!(registry.try_acquire(EntityKind::Request, "r-1").is_some());
    }
}
