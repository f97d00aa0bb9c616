//! # Hostkit
//!
//! System collaborators for the [`converge`] engine on a Linux managed node.
//!
//! The engine specifies its collaborators at the interface only; this crate
//! is the live implementation:
//!
//! - [`pkg`]: the OS package manager (apt-get/dpkg-query or dnf/rpm)
//! - [`files`]: files and directories with owner, group, mode and content
//! - [`exec`]: one-shot commands, optionally as another user
//! - [`service`]: systemd unit state
//! - [`providers`]: one [`converge::Provider`] per resource kind
//!
//! ## Example
//!
//! ```ignore
//! let providers = hostkit::system()?;
//! let report = converge::converge(&catalog, &providers, &Options::default())?;
//! ```

pub mod error;
pub mod exec;
pub mod files;
pub mod pkg;
pub mod providers;
pub mod service;

// Re-export main types at crate root
pub use error::{Error, Result};
pub use files::Ownership;
pub use pkg::{PkgBackend, SystemPkg};
pub use providers::{
    DirectoryProvider, ExecProvider, FileProvider, PackageProvider, ServiceProvider, system,
};
