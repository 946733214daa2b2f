// 👤 Account Entity - stable numeric identity, mutable handle
//
// "The handle is a VALUE (can change), the numeric id is IDENTITY (never changes)"
//
// Loads and events reference the id, so a renamed account keeps its history.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TwackError};
use crate::temporal::{decode_ts, encode_ts, AccountId};

// ============================================================================
// ACCOUNT ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable identity - NEVER changes
    pub id: AccountId,

    /// Current handle (screen name)
    pub screen_name: String,

    /// First time this account was resolved
    pub added_dt: DateTime<Utc>,

    /// Last time the handle changed
    pub updated_dt: DateTime<Utc>,
}

// ============================================================================
// ACCOUNT DIRECTORY
// ============================================================================

/// Handle ↔ id mapping, cached so repeated loads skip the profile lookup.
pub trait AccountDirectory {
    /// Id currently associated with `screen_name`, if known
    fn find_account_id(&self, screen_name: &str) -> Result<Option<AccountId>>;

    fn find_account(&self, id: AccountId) -> Result<Option<Account>>;

    /// Insert the account, or record its new handle
    fn upsert_account(&self, id: AccountId, screen_name: &str, at: DateTime<Utc>) -> Result<()>;
}

impl AccountDirectory for Connection {
    fn find_account_id(&self, screen_name: &str) -> Result<Option<AccountId>> {
        // Handles can be recycled; the most recently updated owner wins
        let id = self
            .query_row(
                "SELECT id FROM twitter_account
                 WHERE screen_name = ?1
                 ORDER BY updated_dt DESC
                 LIMIT 1",
                params![screen_name],
                |row| row.get(0),
            )
            .optional()?;

        Ok(id)
    }

    fn find_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = self
            .query_row(
                "SELECT id, screen_name, added_dt, updated_dt
                 FROM twitter_account WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, AccountId>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, screen_name, added, updated)| {
            Ok(Account {
                id,
                screen_name,
                added_dt: parse_stored(&added)?,
                updated_dt: parse_stored(&updated)?,
            })
        })
        .transpose()
    }

    fn upsert_account(&self, id: AccountId, screen_name: &str, at: DateTime<Utc>) -> Result<()> {
        let at = encode_ts(at);
        let changed = self.execute(
            "INSERT INTO twitter_account (id, screen_name, added_dt, updated_dt)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(id) DO UPDATE
                SET screen_name = excluded.screen_name,
                    updated_dt = excluded.updated_dt
                WHERE screen_name <> excluded.screen_name",
            params![id, screen_name, at],
        )?;

        debug!(account_id = id, screen_name, changed, "upserted account");
        Ok(())
    }
}

fn parse_stored(s: &str) -> Result<DateTime<Utc>> {
    decode_ts(s).map_err(|e| TwackError::InvalidData(format!("bad timestamp '{}': {}", s, e)))
}

// ============================================================================
// TESTS
// ============================================================================
