pub mod app;
pub mod config;
pub mod publisher;
pub mod server;
pub mod whitelist;

pub use crate::config::{Args, Config, ConfigError};
pub use crate::publisher::{PublishError, SnapshotPublisher, SnapshotTargets};
pub use crate::whitelist::{load_whitelist, parse_whitelist, WhitelistError};
