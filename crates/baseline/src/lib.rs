//! # Baseline
//!
//! Desired-state declaration for the endpoint-management agent suite.
//!
//! This crate is the layer above the [`converge`] engine: a TOML
//! configuration schema ([`Config`]) and the assembly of that configuration
//! into a typed resource catalog ([`catalog`]) - agent packages, the install
//! tree, the sudoers entry, the core certificate and policy file, and the
//! refresh-only device-registration command that fires only when one of its
//! subscribed files actually changed.
//!
//! ## Example
//!
//! ```ignore
//! let config = baseline::Config::load(Path::new("/etc/agent-baseline.toml"))?;
//! let catalog = baseline::catalog(&config)?;
//! let report = converge::converge(&catalog, &hostkit::system()?, &Options::default())?;
//! ```

pub mod catalog;
pub mod config;

pub use catalog::catalog;
pub use config::Config;
