//! vault-core — shared types for the versioned filesystem: content keys,
//! resources, wire framing, configuration, and the unified error type.
//! Every other vault crate depends on this one.

pub mod config;
pub mod error;
pub mod key;
pub mod resource;
pub mod wire;

pub use error::VaultError;
pub use key::Key;
pub use resource::Resource;
