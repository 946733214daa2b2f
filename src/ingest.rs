// 📥 Load Ingestion Coordinator
//
// Events are a cache over the ordered load sequence: each one assumes its two
// endpoint loads are neighbours. Inserting a load between them breaks that
// assumption, so the straddled events are dropped and recomputed against the
// new, closer neighbours.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::db::in_transaction;
use crate::diff::diff_loads;
use crate::error::Result;
use crate::loads::LoadRepository;
use crate::temporal::{AccountId, Load};

/// What one ingestion did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub load_id: i64,
    pub account_id: AccountId,
    pub added_dt: DateTime<Utc>,
    /// Events removed because the new load fell inside their interval
    pub invalidated: usize,
    /// Events written (predecessor → new, and new → successor)
    pub generated: usize,
    pub had_predecessor: bool,
    pub had_successor: bool,
}

/// Store a snapshot and bring the account's events up to date.
///
/// One transaction: nothing is visible unless every step succeeds.
pub fn ingest<F, R>(
    conn: &mut Connection,
    account_id: AccountId,
    followers: F,
    friends: R,
    load_timestamp: DateTime<Utc>,
) -> Result<IngestReport>
where
    F: IntoIterator<Item = AccountId>,
    R: IntoIterator<Item = AccountId>,
{
    let load = Load::new(account_id, followers, friends, load_timestamp);
    let report = in_transaction(conn, |tx| apply_load(&**tx, load))?;

    info!(
        account_id = report.account_id,
        load_id = report.load_id,
        at = %report.added_dt,
        invalidated = report.invalidated,
        generated = report.generated,
        "ingested load"
    );
    Ok(report)
}

/// The ingestion steps, against whatever transaction `repo` belongs to.
///
/// 1. store the load
/// 2. drop events whose interval strictly contains the new instant
/// 3. diff the preceding load (if any) against the new one
/// 4. diff the new load against the following one (if any; backfill)
pub fn apply_load<R>(repo: &R, mut load: Load) -> Result<IngestReport>
where
    R: LoadRepository + ?Sized,
{
    let account_id = load.account_id;
    let at = load.added_dt;

    let load_id = repo.insert_load(&load)?;
    load.id = Some(load_id);

    let invalidated = repo.delete_events_straddling(account_id, at)?;
    if invalidated > 0 {
        debug!(account_id, invalidated, "dropped straddled events");
    }

    let mut generated = 0;

    let preceding = repo.find_preceding_load(account_id, at)?;
    if let Some(prev) = &preceding {
        generated += repo.insert_events(&diff_loads(prev, &load)?)?;
    }

    let following = repo.find_following_load(account_id, at)?;
    if let Some(next) = &following {
        generated += repo.insert_events(&diff_loads(&load, next)?)?;
    }

    Ok(IngestReport {
        load_id,
        account_id,
        added_dt: at,
        invalidated,
        generated,
        had_predecessor: preceding.is_some(),
        had_successor: following.is_some(),
    })
}

/// Throw away every event of the account and rederive them from its loads.
///
/// Gives the same result as ingesting the loads in chronological order.
/// Returns the number of events written.
pub fn rebuild_events(conn: &mut Connection, account_id: AccountId) -> Result<usize> {
    let written = in_transaction(conn, |tx| regenerate_events(&**tx, account_id))?;
    info!(account_id, events = written, "rebuilt event history");
    Ok(written)
}

pub fn regenerate_events<R>(repo: &R, account_id: AccountId) -> Result<usize>
where
    R: LoadRepository + ?Sized,
{
    repo.delete_events_for_account(account_id)?;

    let loads = repo.loads_for_account(account_id)?;
    let mut written = 0;
    for pair in loads.windows(2) {
        written += repo.insert_events(&diff_loads(&pair[0], &pair[1])?)?;
    }

    Ok(written)
}

// ============================================================================
// TESTS
// ============================================================================
