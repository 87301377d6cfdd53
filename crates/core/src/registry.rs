use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::CoreError;
use crate::models::config::RawOptions;
use crate::HoldingsCoordinator;

/// Coordinators owned by the composing application, keyed by configuration
/// entry id. Each entry is one account with its own session and snapshot;
/// entries share nothing.
#[derive(Debug, Default)]
pub struct CoordinatorRegistry {
    coordinators: HashMap<String, Arc<HoldingsCoordinator>>,
}

impl CoordinatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a coordinator. A coordinator previously registered under the
    /// same id is stopped and returned.
    pub fn insert(
        &mut self,
        entry_id: impl Into<String>,
        coordinator: HoldingsCoordinator,
    ) -> Option<Arc<HoldingsCoordinator>> {
        let previous = self
            .coordinators
            .insert(entry_id.into(), Arc::new(coordinator));
        if let Some(old) = &previous {
            old.stop();
        }
        previous
    }

    pub fn get(&self, entry_id: &str) -> Option<Arc<HoldingsCoordinator>> {
        self.coordinators.get(entry_id).cloned()
    }

    /// Unregister an entry and stop its scheduler.
    pub fn remove(&mut self, entry_id: &str) -> Option<Arc<HoldingsCoordinator>> {
        let removed = self.coordinators.remove(entry_id);
        if let Some(coordinator) = &removed {
            coordinator.stop();
        }
        removed
    }

    /// Route changed options to the coordinator of an entry.
    pub fn update_options(&self, entry_id: &str, options: &RawOptions) -> Result<(), CoreError> {
        self.coordinators
            .get(entry_id)
            .ok_or_else(|| CoreError::Configuration(format!("Unknown entry '{entry_id}'")))?
            .update_config(options)
    }

    /// Entry ids in sorted order.
    pub fn entry_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.coordinators.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<HoldingsCoordinator>)> {
        self.coordinators.iter().map(|(id, c)| (id.as_str(), c))
    }

    pub fn stop_all(&self) {
        for coordinator in self.coordinators.values() {
            coordinator.stop();
        }
    }

    pub fn len(&self) -> usize {
        self.coordinators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinators.is_empty()
    }
}
