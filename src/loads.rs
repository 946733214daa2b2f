// 📦 Load Repository
// Immutable snapshots per account, ordered by capture time, plus the
// derived event rows computed from adjacent pairs of them.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::{Result, TwackError};
use crate::temporal::{decode_ts, encode_ts, AccountId, Event, Load, Verb};

/// Storage operations the ingestion coordinator needs.
///
/// Implemented for `rusqlite::Connection`, and therefore usable through a
/// `rusqlite::Transaction` as well.
pub trait LoadRepository {
    /// Persist a new load. Returns its row id.
    fn insert_load(&self, load: &Load) -> Result<i64>;

    /// Latest load of the account strictly before `at`
    fn find_preceding_load(&self, account_id: AccountId, at: DateTime<Utc>) -> Result<Option<Load>>;

    /// Earliest load of the account strictly after `at`
    fn find_following_load(&self, account_id: AccountId, at: DateTime<Utc>) -> Result<Option<Load>>;

    /// All loads of the account, oldest first
    fn loads_for_account(&self, account_id: AccountId) -> Result<Vec<Load>>;

    /// Delete the account's events whose interval strictly contains `at`.
    /// Returns how many were removed.
    fn delete_events_straddling(&self, account_id: AccountId, at: DateTime<Utc>) -> Result<usize>;

    fn delete_events_for_account(&self, account_id: AccountId) -> Result<usize>;

    fn insert_events(&self, events: &[Event]) -> Result<usize>;

    /// All events of the account, newest interval first
    fn events_for_account(&self, account_id: AccountId) -> Result<Vec<Event>>;
}

const LOAD_COLUMNS: &str = "id, account_id, followers, friends, added_dt";

const EVENT_COLUMNS: &str =
    "account_id, subject_id, verb, object_id, event_start_dt, event_end_dt";

/// Raw load row, decoded outside the rusqlite row closure
type LoadRow = (i64, AccountId, String, String, String);

type EventRow = (AccountId, AccountId, String, AccountId, String, String);

fn load_row(row: &Row<'_>) -> rusqlite::Result<LoadRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn event_row(row: &Row<'_>) -> rusqlite::Result<EventRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn parse_stored_ts(s: &str) -> Result<DateTime<Utc>> {
    decode_ts(s).map_err(|e| TwackError::InvalidData(format!("bad timestamp '{}': {}", s, e)))
}

fn decode_load((id, account_id, followers, friends, added_dt): LoadRow) -> Result<Load> {
    let followers: BTreeSet<AccountId> = serde_json::from_str(&followers)?;
    let friends: BTreeSet<AccountId> = serde_json::from_str(&friends)?;

    Ok(Load {
        id: Some(id),
        account_id,
        followers,
        friends,
        added_dt: parse_stored_ts(&added_dt)?,
    })
}

fn decode_event((account_id, subject_id, verb, object_id, start, end): EventRow) -> Result<Event> {
    Ok(Event {
        account_id,
        subject_id,
        verb: verb.parse::<Verb>()?,
        object_id,
        event_start_dt: parse_stored_ts(&start)?,
        event_end_dt: parse_stored_ts(&end)?,
    })
}

fn load_exists(conn: &Connection, load: &Load) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM relationship_load WHERE account_id = ?1 AND added_dt = ?2)",
        params![load.account_id, encode_ts(load.added_dt)],
        |row| row.get(0),
    )?;
    Ok(exists)
}

impl LoadRepository for Connection {
    fn insert_load(&self, load: &Load) -> Result<i64> {
        let followers_json = serde_json::to_string(&load.followers)?;
        let friends_json = serde_json::to_string(&load.friends)?;

        let inserted = self.execute(
            "INSERT INTO relationship_load (account_id, followers, friends, added_dt)
             VALUES (?1, ?2, ?3, ?4)",
            params![load.account_id, followers_json, friends_json, encode_ts(load.added_dt)],
        );

        if let Err(e) = inserted {
            // Unique (account_id, added_dt) index, or an unknown account
            if TwackError::is_constraint_violation(&e) && load_exists(self, load)? {
                return Err(TwackError::DuplicateLoad {
                    account_id: load.account_id,
                    at: load.added_dt,
                });
            }
            return Err(e.into());
        }

        let id = self.last_insert_rowid();
        debug!(
            load_id = id,
            account_id = load.account_id,
            followers = load.followers.len(),
            friends = load.friends.len(),
            "stored load"
        );
        Ok(id)
    }

    fn find_preceding_load(&self, account_id: AccountId, at: DateTime<Utc>) -> Result<Option<Load>> {
        let row = self
            .query_row(
                &format!(
                    "SELECT {LOAD_COLUMNS} FROM relationship_load
                     WHERE account_id = ?1 AND added_dt < ?2
                     ORDER BY added_dt DESC
                     LIMIT 1"
                ),
                params![account_id, encode_ts(at)],
                load_row,
            )
            .optional()?;

        row.map(decode_load).transpose()
    }

    fn find_following_load(&self, account_id: AccountId, at: DateTime<Utc>) -> Result<Option<Load>> {
        let row = self
            .query_row(
                &format!(
                    "SELECT {LOAD_COLUMNS} FROM relationship_load
                     WHERE account_id = ?1 AND added_dt > ?2
                     ORDER BY added_dt ASC
                     LIMIT 1"
                ),
                params![account_id, encode_ts(at)],
                load_row,
            )
            .optional()?;

        row.map(decode_load).transpose()
    }

    fn loads_for_account(&self, account_id: AccountId) -> Result<Vec<Load>> {
        let mut stmt = self.prepare(&format!(
            "SELECT {LOAD_COLUMNS} FROM relationship_load
             WHERE account_id = ?1
             ORDER BY added_dt ASC"
        ))?;

        let rows = stmt
            .query_map(params![account_id], load_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(decode_load).collect()
    }

    fn delete_events_straddling(&self, account_id: AccountId, at: DateTime<Utc>) -> Result<usize> {
        let deleted = self.execute(
            "DELETE FROM relationship_event
             WHERE account_id = ?1
               AND event_start_dt < ?2
               AND event_end_dt > ?2",
            params![account_id, encode_ts(at)],
        )?;

        Ok(deleted)
    }

    fn delete_events_for_account(&self, account_id: AccountId) -> Result<usize> {
        let deleted = self.execute(
            "DELETE FROM relationship_event WHERE account_id = ?1",
            params![account_id],
        )?;

        Ok(deleted)
    }

    fn insert_events(&self, events: &[Event]) -> Result<usize> {
        let mut stmt = self.prepare_cached(&format!(
            "INSERT INTO relationship_event ({EVENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ))?;

        for event in events {
            stmt.execute(params![
                event.account_id,
                event.subject_id,
                event.verb.as_str(),
                event.object_id,
                encode_ts(event.event_start_dt),
                encode_ts(event.event_end_dt),
            ])?;
        }

        Ok(events.len())
    }

    fn events_for_account(&self, account_id: AccountId) -> Result<Vec<Event>> {
        let mut stmt = self.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM relationship_event
             WHERE account_id = ?1
             ORDER BY event_end_dt DESC, event_start_dt DESC, verb, subject_id, object_id"
        ))?;

        let rows = stmt
            .query_map(params![account_id], event_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(decode_event).collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::entities::AccountDirectory;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn setup() -> Connection {
        let conn = db::open_in_memory().unwrap();
        db::initialize_schema(&conn).unwrap();
        conn.upsert_account(1, "alice", day(1)).unwrap();
        conn.upsert_account(2, "bob", day(1)).unwrap();
        conn
    }

    fn event(account_id: AccountId, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event {
            account_id,
            subject_id: 99,
            verb: Verb::Follow,
            object_id: account_id,
            event_start_dt: start,
            event_end_dt: end,
        }
    }

    #[test]
    fn test_load_persists_sets() {
        let conn = setup();
        let load = Load::new(1, vec![3, 1, 2], vec![10], day(5));

        let id = conn.insert_load(&load).unwrap();
        let stored = conn.loads_for_account(1).unwrap();

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, Some(id));
        assert_eq!(stored[0].followers, load.followers);
        assert_eq!(stored[0].friends, load.friends);
        assert_eq!(stored[0].added_dt, day(5));
    }

    #[test]
    fn test_preceding_and_following_are_strict() {
        let conn = setup();
        for d in [1, 5, 9] {
            conn.insert_load(&Load::new(1, vec![], vec![], day(d))).unwrap();
        }
        // Another account's loads must never be picked
        conn.insert_load(&Load::new(2, vec![], vec![], day(6))).unwrap();

        let before = |d| conn.find_preceding_load(1, day(d)).unwrap().map(|l| l.added_dt);
        let after = |d| conn.find_following_load(1, day(d)).unwrap().map(|l| l.added_dt);

        assert_eq!(before(1), None);
        assert_eq!(before(5), Some(day(1)));
        assert_eq!(before(7), Some(day(5)));
        assert_eq!(before(20), Some(day(9)));
        assert_eq!(after(5), Some(day(9)));
        assert_eq!(after(6), Some(day(9)));
        assert_eq!(after(9), None);
    }

    #[test]
    fn test_duplicate_instant_rejected() {
        let conn = setup();
        conn.insert_load(&Load::new(1, vec![1], vec![], day(3))).unwrap();

        let err = conn.insert_load(&Load::new(1, vec![2], vec![], day(3))).unwrap_err();
        assert!(matches!(err, TwackError::DuplicateLoad { account_id: 1, .. }));

        // Same instant for a different account is fine
        conn.insert_load(&Load::new(2, vec![2], vec![], day(3))).unwrap();
    }

    #[test]
    fn test_load_for_unknown_account_is_storage_error() {
        let conn = setup();
        let err = conn.insert_load(&Load::new(777, vec![], vec![], day(3))).unwrap_err();
        assert!(matches!(err, TwackError::Storage(_)));
    }

    #[test]
    fn test_straddle_delete_is_strict_and_scoped() {
        let conn = setup();
        conn.insert_events(&[
            event(1, day(1), day(5)),
            event(1, day(5), day(9)),
            event(2, day(1), day(9)),
        ])
        .unwrap();

        // Endpoint touch: nothing to delete
        assert_eq!(conn.delete_events_straddling(1, day(5)).unwrap(), 0);

        assert_eq!(conn.delete_events_straddling(1, day(3)).unwrap(), 1);
        let left = conn.events_for_account(1).unwrap();
        assert_eq!(left, vec![event(1, day(5), day(9))]);

        // Account 2's long interval survived
        assert_eq!(conn.events_for_account(2).unwrap().len(), 1);
    }

    #[test]
    fn test_events_newest_first() {
        let conn = setup();
        conn.insert_events(&[event(1, day(1), day(2)), event(1, day(2), day(3))])
            .unwrap();

        let events = conn.events_for_account(1).unwrap();
        assert_eq!(events[0].event_end_dt, day(3));
        assert_eq!(events[1].event_end_dt, day(2));

        assert_eq!(conn.delete_events_for_account(1).unwrap(), 2);
        assert!(conn.events_for_account(1).unwrap().is_empty());
    }
}
