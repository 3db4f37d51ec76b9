//! Configuration of connected-mirror.
//!
//! ## connections.kdl
//!
//! Located at `~/.config/connected-mirror/connections.kdl` unless overridden
//! with `--config` or `CMIRROR_CONFIG`.
//!
//! Contains:
//! - `connection "<id>" { ... }` - One block per server connection
//! - `storage-root` - Root directory of the mirrors
//! - `http-timeout-secs` - Timeout of each HTTP request
//!
//! Tokens are never written in the file: a connection names the environment
//! variable holding its token with `token-env`.
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    CONFIG_ENV, ConfigOverrides, DATA_DIR_ENV, Resolved, ResolvedSettings, ValueSource, load_config, resolve,
    resolve_config_path, resolve_storage_root,
};
pub use schema::{ConnectionConfig, MirrorConfig};
