//! Strata Core
//!
//! Resolves a small set of deployment inputs into the configuration of a
//! managed observability stack, and generates the bootstrap script that
//! wires the metrics agents on each host.
//!
//! Data flows one way: `InputSet` -> `resolver::resolve` -> `DerivedConfig`
//! -> `BootstrapContext` -> `bootstrap::render` -> `BootstrapScript`.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod input;
pub mod network;
pub mod profile;
pub mod resolver;
pub mod tags;
pub mod validation;

pub use config::DerivedConfig;
pub use error::{Error, RenderError, Result, SizingError, ValidationError, ValidationRule};
pub use input::InputSet;
pub use profile::{Environment, EnvironmentProfile};
pub use resolver::resolve;
