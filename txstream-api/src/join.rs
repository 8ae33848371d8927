//! Confirmed and recent transactions fetched together.

use crate::auth::AuthProvider;
use crate::endpoint::bitbus::BitbusClient;
use crate::endpoint::bitsocket::BitsocketClient;
use crate::error::ApiError;
use crate::query;
use crate::record::tx_id;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::AbortOnDropHandle;
use tracing::debug;
use txstream_client::HttpTransport;

/// How far back the live leg looks. Blocks arrive every ~600 s on average,
/// so nearly every unconfirmed transaction seen within this window that was
/// mined since is already part of the confirmed leg.
pub const DEFAULT_RECENT_WINDOW: Duration = Duration::from_secs(2800);

const DEFAULT_LIMIT: usize = 100;
const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOptions {
    /// Upper bound on each side of the result.
    pub limit: usize,
    /// Both legs must finish within this.
    pub deadline: Duration,
    pub window: Duration,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            deadline: DEFAULT_DEADLINE,
            window: DEFAULT_RECENT_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct JoinResult {
    pub confirmed: Vec<Value>,
    /// Unconfirmed transactions, minus any already in `confirmed`.
    pub recent: Vec<Value>,
}

pub struct JoinClient<T: HttpTransport, A: AuthProvider> {
    bitbus: Arc<BitbusClient<T, A>>,
    bitsocket: Arc<BitsocketClient<T, A>>,
}

impl<T, A> JoinClient<T, A>
where
    T: HttpTransport + 'static,
    A: AuthProvider + 'static,
{
    pub fn new(bitbus: Arc<BitbusClient<T, A>>, bitsocket: Arc<BitsocketClient<T, A>>) -> Self {
        Self { bitbus, bitsocket }
    }

    /// Runs `query` against both sources at once and merges the answers.
    ///
    /// The first failing leg fails the join. When `options.deadline` passes
    /// first, both legs are aborted and [`ApiError::Timeout`] is returned.
    pub async fn fetch(&self, query: Value, options: &JoinOptions) -> Result<JoinResult, ApiError> {
        let now_ms = Utc::now().timestamp_millis();
        let historical = historical_query(query.clone(), options.limit)?;
        let live = live_query(query, options, now_ms)?;

        let bitbus = Arc::clone(&self.bitbus);
        let mut confirmed_leg =
            AbortOnDropHandle::new(tokio::spawn(async move { bitbus.fetch(historical).await }));
        let bitsocket = Arc::clone(&self.bitsocket);
        let mut recent_leg =
            AbortOnDropHandle::new(tokio::spawn(async move { bitsocket.fetch(live).await }));

        let legs = async {
            tokio::try_join!(
                leg_outcome(&mut confirmed_leg, "confirmed"),
                leg_outcome(&mut recent_leg, "recent"),
            )
        };
        let (confirmed, recent) = match tokio::time::timeout(options.deadline, legs).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                debug!(deadline = ?options.deadline, "join deadline exceeded");
                return Err(ApiError::Timeout(options.deadline));
            }
        };

        Ok(merge(confirmed, recent, options.limit))
    }

    /// Looks one transaction up in both sources. A confirmed copy wins over
    /// an unconfirmed one.
    pub async fn find(&self, txid: &str, deadline: Duration) -> Result<Option<Value>, ApiError> {
        let options = JoinOptions {
            limit: 1,
            deadline,
            ..JoinOptions::default()
        };
        let result = self
            .fetch(json!({ "find": { "tx.h": txid } }), &options)
            .await?;
        Ok(result
            .confirmed
            .into_iter()
            .chain(result.recent)
            .next())
    }
}

async fn leg_outcome(
    leg: &mut AbortOnDropHandle<Result<Vec<Value>, ApiError>>,
    name: &str,
) -> Result<Vec<Value>, ApiError> {
    match leg.await {
        Ok(outcome) => outcome,
        Err(err) => Err(ApiError::Stream(format!("{name} leg did not finish: {err}"))),
    }
}

/// Newest blocks first.
fn historical_query(query: Value, limit: usize) -> Result<Value, ApiError> {
    let mut envelope = query::expand(query)?;
    query::set_option(&mut envelope, "sort", json!({ "blk.i": -1 }))?;
    query::set_option(&mut envelope, "limit", json!(limit))?;
    Ok(envelope)
}

/// Newest unconfirmed first, within `options.window` of `now_ms`. Asks for
/// twice the limit so that enough remain after deduplication.
fn live_query(query: Value, options: &JoinOptions, now_ms: i64) -> Result<Value, ApiError> {
    let window_ms = i64::try_from(options.window.as_millis()).unwrap_or(i64::MAX);
    let mut envelope = query::expand(query)?;
    query::add_filter(
        &mut envelope,
        "timestamp",
        json!({ "$gt": now_ms.saturating_sub(window_ms) }),
    )?;
    query::set_option(&mut envelope, "sort", json!({ "timestamp": -1 }))?;
    query::set_option(&mut envelope, "limit", json!(options.limit.saturating_mul(2)))?;
    Ok(envelope)
}

/// Drops recent records already confirmed, then keeps at most `limit`.
/// Records without a transaction id are kept.
pub fn merge(confirmed: Vec<Value>, recent: Vec<Value>, limit: usize) -> JoinResult {
    let seen = confirmed
        .iter()
        .filter_map(tx_id)
        .map(str::to_string)
        .collect::<HashSet<_>>();
    let recent = recent
        .into_iter()
        .filter(|record| tx_id(record).is_none_or(|id| !seen.contains(id)))
        .take(limit)
        .collect();
    JoinResult { confirmed, recent }
}
