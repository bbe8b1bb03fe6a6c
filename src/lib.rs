//! Tideway Orgs - organization-scoped authorization for multi-tenant SaaS
//!
//! Provides the organization layer that sits between a user directory and
//! token issuance:
//!
//! - **Organizations**: tenant-scoped directory with slug/name uniqueness and archiving
//! - **Memberships**: role assignments with single-primary exclusivity per tenant
//! - **Roles**: template roles with per-organization permission overrides
//! - **Invitations**: single-use codes that create or merge memberships
//! - **Permission resolution**: global + organization permissions for a user
//! - **Ambient context**: flow-local "current organization" for claims rendering
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tideway_orgs::organizations::{
//!     CreateOrganization, OrganizationConfig, OrganizationManager,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     tideway_orgs::init_tracing();
//!
//!     let manager = OrganizationManager::new(store, OrganizationConfig::default());
//!     let org = manager
//!         .create(CreateOrganization::new("acme", "Acme Inc").tenant("t1"))
//!         .await?;
//!     Ok(())
//! }
//! ```

mod config;
pub mod error;
pub mod organizations;
pub mod utils;

pub use config::{Config, ConfigBuilder, ConfigError, LoggingConfig};
pub use error::{Result, StoreError};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "tideway_orgs=debug")
/// - `TIDEWAY_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("TIDEWAY_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing with a custom configuration
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::new(&config.logging.level);

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
