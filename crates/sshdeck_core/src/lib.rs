mod error;
mod key_discovery;
mod manager;
mod profile;
mod ssh_config;
mod store;

pub use error::ConfigError;
pub use key_discovery::discover_keys;
pub use manager::ConnectionManager;
pub use profile::{ForwardKind, SshProfile, normalize_forward};
pub use ssh_config::{IncludeState, SshConfigIntegration};
pub use store::ProfileStore;

pub use chrono;
