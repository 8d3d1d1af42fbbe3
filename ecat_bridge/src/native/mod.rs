//! Native master backends.
//!
//! - [`simulation`] - In-process simulation used for development and tests
//!
//! # Adding New Backends
//!
//! 1. Create a new submodule under `native/`
//! 2. Implement the `NativeMaster` trait from `ecat_common::native`
//! 3. Register its factory in [`BackendRegistry::with_builtin`](crate::backend_registry::BackendRegistry::with_builtin)

pub mod simulation;

pub use simulation::SimulatedMaster;
