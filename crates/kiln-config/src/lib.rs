pub mod bundler;
pub mod config;
pub mod dev;
pub mod discovery;
pub mod error;
pub mod validation;

// Re-export main types
pub use bundler::*;
pub use config::*;
pub use dev::*;
pub use error::*;

// Re-export discovery and validation
pub use discovery::{discover, ConfigDiscovery};
pub use validation::{validate, ConfigValidator, FsValidator, SchemaValidator};
