//! Configuration loading for wifassist.
//!
//! Uses figment to layer built-in defaults, an optional YAML file, and the
//! environment variables the deployment already exports.

pub mod schema;

pub use schema::{AssistantConfig, CallbackConfig, Config, FederationConfig};
