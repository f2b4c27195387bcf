pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{ConfigOverrides, load_config};
pub use models::*;
pub use validation::{ProxyConfigValidator, ValidationError, ValidationResult};
