//! Registry of native master backends.
//!
//! Provides a `BackendRegistry` for registering and creating native backends
//! by name. Constructed at startup and passed where needed; there is no
//! global registry.

use crate::native::SimulatedMaster;
use ecat_common::error::BridgeError;
use ecat_common::native::NativeMaster;
use std::collections::HashMap;
use std::sync::Arc;

/// A created backend.
#[derive(Clone)]
pub struct Backend {
    /// The native library handed to bridge instances.
    pub master: Arc<dyn NativeMaster>,
    /// Event source, present when the backend is simulated.
    pub simulator: Option<Arc<SimulatedMaster>>,
}

/// Factory function creating a backend.
pub type BackendFactory = fn() -> Backend;

/// Factory of the `simulation` backend.
pub fn simulation_backend() -> Backend {
    let sim = Arc::new(SimulatedMaster::new());
    Backend {
        master: sim.clone(),
        simulator: Some(sim),
    }
}

/// Registry of available native backends.
pub struct BackendRegistry {
    factories: HashMap<&'static str, BackendFactory>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry populated with the built-in backends.
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        reg.register("simulation", simulation_backend);
        reg
    }

    /// Register a backend factory.
    ///
    /// # Panics
    /// Panics if a backend with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: BackendFactory) {
        if self.factories.contains_key(name) {
            panic!("Backend '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Get a backend factory by name.
    pub fn get_factory(&self, name: &str) -> Option<BackendFactory> {
        self.factories.get(name).copied()
    }

    /// Create a backend by name.
    ///
    /// # Errors
    /// Returns `BridgeError::BackendNotFound` if no backend with the given name is registered.
    pub fn create(&self, name: &str) -> Result<Backend, BridgeError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| BridgeError::BackendNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_backend() -> Backend {
        let sim = Arc::new(SimulatedMaster::new().eval_limited());
        Backend {
            master: sim.clone(),
            simulator: Some(sim),
        }
    }

    #[test]
    fn builtin_has_simulation() {
        let reg = BackendRegistry::with_builtin();
        let backend = reg.create("simulation").expect("should create");
        assert_eq!(backend.master.name(), "simulation");
        assert!(backend.simulator.is_some());
    }

    #[test]
    fn backend_not_found() {
        let reg = BackendRegistry::new();
        let result = reg.create("nonexistent");
        assert!(matches!(result, Err(BridgeError::BackendNotFound(_))));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_registration_panics() {
        let mut reg = BackendRegistry::with_builtin();
        reg.register("simulation", eval_backend);
    }

    #[test]
    fn list_is_sorted() {
        let mut reg = BackendRegistry::with_builtin();
        reg.register("eval", eval_backend);
        assert_eq!(reg.list(), vec!["eval", "simulation"]);
        assert!(reg.get_factory("eval").is_some());
    }
}
