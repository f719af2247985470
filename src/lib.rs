//! Menagerie - a plugin-based object factory
//!
//! Loads animal plugins from shared libraries the host knows nothing about
//! at build time, constructs their instances under one of three allocation
//! strategies and dispatches through the C capability table each instance
//! carries.
//!
//! # Modules
//!
//! - [`plugins`]: module resolution, the factory and allocation strategies
//! - [`driver`]: batch construction with per-plugin failure reporting
//! - [`config`]: configuration management and serialization
//! - [`abi`]: the C contract shared with plugins (re-export of `menagerie_abi`)

pub use menagerie_abi as abi;

pub mod config;
pub mod driver;
pub mod plugins;
