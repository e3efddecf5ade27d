//! AcuScan Core Library
//!
//! This crate provides the core functionality for AcuScan agents:
//! - ERP authentication (OAuth resource-owner flow with cookie fallback)
//! - Inventory lookup (filter escalation: exact, contains, startswith, full scan)
//! - Local item cache (SQLite, keyed by inventory id)
//! - Credential management (keyring with file fallback)
//!
//! # Features
//!
//! - `keyring-storage` (default): Use platform keyring for secret storage
//! - `file-storage`: Use file-based secret storage (for headless Linux)
//!
//! # Example
//!
//! ```no_run
//! use acuscan_core::{agent::InventoryAgent, auth, cache::ItemCache};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Authenticate (OAuth first, cookie session as fallback)
//!     let params = auth::LoginParams {
//!         base_url: "https://erp.example.com/entity-site".to_string(),
//!         tenant: "Company".to_string(),
//!         username: "scanner".to_string(),
//!         password: "secret".to_string(),
//!         client_id: None,
//!         client_secret: None,
//!         api_version: "24.200.001".to_string(),
//!     };
//!     let client = auth::login(&params).await?;
//!
//!     // Resolve a scanned barcode
//!     let agent = InventoryAgent::new(ItemCache::open_default()?);
//!     agent.install_session(client).await;
//!     let hit = agent.find("AALEGO500").await?;
//!     println!("{}: {}", hit.item.inventory_id(), hit.item.description());
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod auth;
pub mod cache;
pub mod config;
pub mod erp;

// Re-export commonly used types
pub use agent::InventoryAgent;
pub use auth::{AuthStatus, LoginParams, StoredSecret, StoredSettings};
pub use cache::{CachedItem, ItemCache};
pub use config::{ConfigSource, InstanceEndpointConfig, DEFAULT_API_VERSION};
pub use erp::client::{ApiError, AuthMode, ErpClient, VerifyResult};
pub use erp::lookup::{LookupError, SearchHit, SearchStrategy, DEFAULT_LOOKUP_BUDGET};
pub use erp::model::{FlatWarehouseRow, StockItem, WarehouseDetail};
