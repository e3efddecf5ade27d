//! Escalating inventory lookup.
//!
//! A scanned or typed identifier is resolved against the stock item
//! collection through a sequence of server-side filters, falling back to a
//! single client-side scan for instances that silently ignore `$filter`:
//!
//! 1. `InventoryID eq '<id>'`
//! 2. `contains(InventoryID, '<id>')`
//! 3. `startswith(InventoryID, '<id>')`
//! 4. unfiltered fetch, matched client-side (at most once)
//!
//! All steps share one deadline. A 401 on any step aborts the whole lookup
//! immediately so the caller can force re-authentication.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use super::client::{ApiError, ErpClient};
use super::model::StockItem;

/// Total time budget for one lookup across all strategies.
pub const DEFAULT_LOOKUP_BUDGET: Duration = Duration::from_secs(30);

/// Related sub-records expanded inline so a hit needs no second round trip.
const EXPAND_WAREHOUSE_DETAILS: &str = "WarehouseDetails";

/// Which strategy produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    Exact,
    Contains,
    StartsWith,
    FullScan,
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchStrategy::Exact => write!(f, "exact"),
            SearchStrategy::Contains => write!(f, "contains"),
            SearchStrategy::StartsWith => write!(f, "startswith"),
            SearchStrategy::FullScan => write!(f, "full-scan"),
        }
    }
}

/// A resolved item plus the strategy that found it.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub item: StockItem,
    pub strategy: SearchStrategy,
}

/// Lookup failure taxonomy. None of these are retried automatically.
#[derive(Debug, Error)]
pub enum LookupError {
    /// No matching record after all strategies. Terminal.
    #[error("no matching inventory item")]
    NotFound,

    /// The server rejected the session (401). The caller must force a
    /// re-login; the lookup stops at the step that was rejected.
    #[error("session expired; log in again")]
    AuthExpired,

    /// The shared deadline elapsed before a strategy produced a result.
    #[error("lookup deadline exceeded")]
    Timeout,

    /// No session is installed.
    #[error("not logged in")]
    NotLoggedIn,

    /// A lookup is already in flight; the new request is ignored.
    #[error("a lookup is already in progress")]
    Busy,

    /// 5xx or other unexpected status, surfaced verbatim.
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    /// The final step's body decoded as neither the envelope nor a bare
    /// array, so there was nothing left to escalate to.
    #[error("undecodable response: {0}")]
    Decode(String),

    /// Connectivity/timeout at the transport level. Retryable by the user,
    /// not automatically.
    #[error("network error: {0}")]
    Network(String),
}

/// Double single quotes for interpolation into an OData filter literal.
/// This is the ERP's required filter-literal escaping, nothing more.
pub fn escape_filter_literal(raw: &str) -> String {
    raw.trim().replace('\'', "''")
}

/// Resolve `identifier` to at most one stock item.
pub async fn resolve(
    client: &ErpClient,
    identifier: &str,
    budget: Duration,
) -> Result<SearchHit, LookupError> {
    let deadline = Instant::now() + budget;
    let escaped = escape_filter_literal(identifier);

    let filtered_steps = [
        (SearchStrategy::Exact, format!("InventoryID eq '{escaped}'")),
        (SearchStrategy::Contains, format!("contains(InventoryID, '{escaped}')")),
        (SearchStrategy::StartsWith, format!("startswith(InventoryID, '{escaped}')")),
    ];

    for (strategy, filter) in filtered_steps {
        let items = query_step(client, Some(&filter), deadline, false).await?;
        if let Some(item) = items.into_iter().next() {
            tracing::debug!(%strategy, "lookup hit");
            return Ok(SearchHit { item, strategy });
        }
        tracing::debug!(%strategy, "no rows, escalating");
    }

    // Last resort: fetch the whole collection once and match here. This
    // diagnoses instances that ignore $filter; it is O(catalog size).
    let items = query_step(client, None, deadline, true).await?;
    let needle = identifier.trim().to_lowercase();
    let hit = items.into_iter().find(|item| {
        let id = item.inventory_id().to_lowercase();
        id == needle
            || id.contains(&needle)
            || item
                .id
                .as_deref()
                .map_or(false, |raw| raw.eq_ignore_ascii_case(identifier.trim()))
    });

    match hit {
        Some(item) => Ok(SearchHit { item, strategy: SearchStrategy::FullScan }),
        None => Err(LookupError::NotFound),
    }
}

async fn query_step(
    client: &ErpClient,
    filter: Option<&str>,
    deadline: Instant,
    final_step: bool,
) -> Result<Vec<StockItem>, LookupError> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .ok_or(LookupError::Timeout)?;

    let call = client.stock_items(filter, Some(EXPAND_WAREHOUSE_DETAILS));
    let result = tokio::time::timeout(remaining, call)
        .await
        .map_err(|_| LookupError::Timeout)?;

    match result {
        Ok(items) => Ok(items),
        Err(ApiError::Unauthorized) => Err(LookupError::AuthExpired),
        // A 404 on an early step just means "no rows"; only the final step
        // turns it into a hard miss.
        Err(ApiError::NotFound) if !final_step => Ok(Vec::new()),
        Err(ApiError::NotFound) => Err(LookupError::NotFound),
        // An undecodable body on an early step is treated like an empty
        // result so the next strategy still gets its chance.
        Err(ApiError::Decode(msg)) if !final_step => {
            tracing::warn!("undecodable response, escalating: {}", msg);
            Ok(Vec::new())
        }
        Err(ApiError::Decode(msg)) => Err(LookupError::Decode(msg)),
        Err(ApiError::Server { status, body }) => Err(LookupError::Server { status, body }),
        Err(ApiError::Network(e)) if e.is_timeout() => Err(LookupError::Timeout),
        Err(ApiError::Network(e)) => Err(LookupError::Network(e.to_string())),
    }
}
