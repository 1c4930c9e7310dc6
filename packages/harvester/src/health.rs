//! Source health tracking: a failure-count-driven circuit breaker.
//!
//! The transitions are pure functions over the `Source` record; the
//! async wrappers do a read-modify-write through the store and nothing
//! else. Store errors propagate, they are never swallowed.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{HarvestError, Result};
use crate::store::{SourceStore, Store};
use crate::types::{HealthStatus, Source};

/// Consecutive failures at which a source is marked degraded.
pub const DEGRADED_THRESHOLD: u32 = 3;

/// Consecutive failures at which a source is marked dead and deactivated.
pub const DEAD_THRESHOLD: u32 = 7;

/// Apply a successful scrape to the record.
///
/// Resets the failure counter unconditionally; a single success clears
/// any prior degradation.
pub fn apply_success(source: &mut Source) {
    source.consecutive_failures = 0;
    source.health = HealthStatus::Healthy;
    source.last_error_at = None;
}

/// Apply a failed scrape to the record.
///
/// Invariant: `health == Dead` implies `is_active == false`.
pub fn apply_failure(source: &mut Source) {
    source.consecutive_failures += 1;
    source.last_error_at = Some(Utc::now());
    source.health = if source.consecutive_failures >= DEAD_THRESHOLD {
        source.is_active = false;
        HealthStatus::Dead
    } else if source.consecutive_failures >= DEGRADED_THRESHOLD {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
}

/// Record a successful scrape against the stored source.
pub async fn record_success<S>(store: &S, id: Uuid) -> Result<Source>
where
    S: SourceStore + ?Sized,
{
    let mut source = store
        .get_source(id)
        .await?
        .ok_or(HarvestError::SourceNotFound { id })?;
    apply_success(&mut source);
    store.put_source(&source).await?;
    Ok(source)
}

/// Record a failed scrape against the stored source.
pub async fn record_failure<S>(store: &S, id: Uuid) -> Result<Source>
where
    S: SourceStore + ?Sized,
{
    let mut source = store
        .get_source(id)
        .await?
        .ok_or(HarvestError::SourceNotFound { id })?;
    apply_failure(&mut source);
    store.put_source(&source).await?;

    match source.health {
        HealthStatus::Dead => warn!(
            source_id = %id,
            failures = source.consecutive_failures,
            "Source marked dead and deactivated"
        ),
        HealthStatus::Degraded => info!(
            source_id = %id,
            failures = source.consecutive_failures,
            "Source degraded"
        ),
        HealthStatus::Healthy => {}
    }

    Ok(source)
}

/// True if the newest known article is older than the threshold,
/// or if the source has no articles at all.
pub async fn is_stale<S>(store: &S, id: Uuid, threshold_days: i64) -> Result<bool>
where
    S: Store + ?Sized,
{
    let newest = store.latest_published_at(id).await?;
    Ok(match newest {
        Some(ts) => Utc::now() - ts > chrono::Duration::days(threshold_days),
        None => true,
    })
}
