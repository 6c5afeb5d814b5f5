//! Service configuration: YAML document, environment overrides, validation.

pub mod loader;
pub mod types;
pub mod validation;


pub use loader::ConfigLoader;
pub use types::*;
