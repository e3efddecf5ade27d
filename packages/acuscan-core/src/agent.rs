//! Session-holding lookup agent.
//!
//! `InventoryAgent` owns the live ERP session, the local item cache, and the
//! single-lookup-at-a-time guard. The CLI (or any other front end) holds one
//! agent and calls `find` per scanned identifier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::cache::{CachedItem, ItemCache};
use crate::erp::client::ErpClient;
use crate::erp::lookup::{self, LookupError, SearchHit, DEFAULT_LOOKUP_BUDGET};

pub struct InventoryAgent {
    /// Current session, `None` when logged out or invalidated.
    session: Mutex<Option<Arc<ErpClient>>>,
    /// One lookup at a time; concurrent calls fail fast instead of queuing.
    busy: AtomicBool,
    cache: std::sync::Mutex<ItemCache>,
    budget: Duration,
}

impl InventoryAgent {
    pub fn new(cache: ItemCache) -> Self {
        Self::with_budget(cache, DEFAULT_LOOKUP_BUDGET)
    }

    pub fn with_budget(cache: ItemCache, budget: Duration) -> Self {
        Self {
            session: Mutex::new(None),
            busy: AtomicBool::new(false),
            cache: std::sync::Mutex::new(cache),
            budget,
        }
    }

    /// Install a freshly authenticated session, replacing any previous one.
    pub async fn install_session(&self, client: ErpClient) {
        let mut session = self.session.lock().await;
        *session = Some(Arc::new(client));
    }

    /// Drop the current session (logout or invalidation).
    pub async fn clear_session(&self) {
        let mut session = self.session.lock().await;
        *session = None;
    }

    pub async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Resolve one scanned identifier against the ERP and cache the hit.
    ///
    /// Fails fast with `Busy` if a lookup is already in flight. An
    /// `AuthExpired` result drops the session; the caller decides whether to
    /// also clear any remembered credential.
    pub async fn find(&self, identifier: &str) -> Result<SearchHit, LookupError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            tracing::warn!("Lookup already in progress, rejecting '{}'", identifier);
            return Err(LookupError::Busy);
        }

        let result = self.find_inner(identifier).await;
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    async fn find_inner(&self, identifier: &str) -> Result<SearchHit, LookupError> {
        let client = {
            let session = self.session.lock().await;
            match session.as_ref() {
                Some(c) => Arc::clone(c),
                None => return Err(LookupError::NotLoggedIn),
            }
        };

        match lookup::resolve(&client, identifier, self.budget).await {
            Ok(hit) => {
                if let Err(e) = self.cache_hit(&hit) {
                    tracing::warn!("Failed to cache item: {:#}", e);
                }
                Ok(hit)
            }
            Err(LookupError::AuthExpired) => {
                tracing::warn!("Session rejected mid-lookup, dropping it");
                self.clear_session().await;
                Err(LookupError::AuthExpired)
            }
            Err(e) => Err(e),
        }
    }

    fn cache_hit(&self, hit: &SearchHit) -> Result<CachedItem> {
        let cache = self
            .cache
            .lock()
            .map_err(|_| anyhow::anyhow!("Cache lock poisoned"))?;
        cache.upsert(&hit.item)
    }

    /// All cached items, most recent first.
    pub fn cached_items(&self) -> Result<Vec<CachedItem>> {
        let cache = self
            .cache
            .lock()
            .map_err(|_| anyhow::anyhow!("Cache lock poisoned"))?;
        cache.all()
    }

    /// Delete all cached items, returning how many were removed.
    pub fn clear_cache(&self) -> Result<usize> {
        let cache = self
            .cache
            .lock()
            .map_err(|_| anyhow::anyhow!("Cache lock poisoned"))?;
        cache.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_agent() -> InventoryAgent {
        InventoryAgent::new(ItemCache::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_find_without_session_fails_fast() {
        let agent = test_agent();
        let err = agent.find("ABC123").await.unwrap_err();
        assert!(matches!(err, LookupError::NotLoggedIn));
    }

    #[tokio::test]
    async fn test_busy_guard_releases_after_failed_lookup() {
        let agent = test_agent();
        // First call fails with NotLoggedIn but must release the guard
        let _ = agent.find("A").await;
        let err = agent.find("B").await.unwrap_err();
        assert!(matches!(err, LookupError::NotLoggedIn));
    }

    #[tokio::test]
    async fn test_concurrent_find_is_rejected_as_busy() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/entity/Default/24.200.001/StockItem"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "value": [ { "InventoryID": { "value": "SLOW1" } } ]
                    }))
                    .set_delay(Duration::from_millis(250)),
            )
            .mount(&server)
            .await;

        let agent = test_agent();
        let client = crate::erp::client::ErpClient::new(
            &server.uri(),
            "",
            "24.200.001",
            crate::erp::client::AuthMode::Bearer("tok".to_string()),
        )
        .unwrap();
        agent.install_session(client).await;

        // Second call arrives while the first is still waiting on the server
        let first = agent.find("SLOW1");
        let second = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            agent.find("SLOW1").await
        };
        let (first, second) = tokio::join!(first, second);

        assert!(first.is_ok());
        assert!(matches!(second.unwrap_err(), LookupError::Busy));
    }

    #[tokio::test]
    async fn test_clear_session_drops_it() {
        let agent = test_agent();
        assert!(!agent.has_session().await);

        let client = crate::erp::client::ErpClient::new(
            "http://localhost:1",
            "",
            "24.200.001",
            crate::erp::client::AuthMode::Bearer("tok".to_string()),
        )
        .unwrap();
        agent.install_session(client).await;
        assert!(agent.has_session().await);

        agent.clear_session().await;
        assert!(!agent.has_session().await);
    }
}
