// High-level interface to the tracker, as used by the command line.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::db::{self, in_transaction};
use crate::entities::AccountDirectory;
use crate::error::Result;
use crate::ingest::{self, IngestReport};
use crate::loads::LoadRepository;
use crate::temporal::{AccountId, Event};
use crate::twitter::SocialApi;

pub struct Application<A: SocialApi> {
    conn: Connection,
    api: A,
}

impl<A: SocialApi> Application<A> {
    pub fn new(conn: Connection, api: A) -> Self {
        Application { conn, api }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Create the schema in an empty database
    pub fn initialize_schema(&mut self) -> Result<()> {
        in_transaction(&mut self.conn, |tx| db::initialize_schema(tx))
    }

    /// Destroy the schema and all tracked history
    pub fn reset_schema(&mut self) -> Result<()> {
        in_transaction(&mut self.conn, |tx| db::reset_schema(tx))
    }

    /// Map a handle to its numeric id, asking the API on a cache miss.
    pub fn resolve(&mut self, screen_name: &str) -> Result<AccountId> {
        if let Some(id) = self.conn.find_account_id(screen_name)? {
            return Ok(id);
        }

        // Network call stays outside the write transaction
        let profile = self.api.fetch_profile(screen_name)?;
        let now = Utc::now();
        in_transaction(&mut self.conn, |tx| {
            tx.upsert_account(profile.id, &profile.screen_name, now)
        })?;

        info!(screen_name, account_id = profile.id, "resolved new account");
        Ok(profile.id)
    }

    /// Capture the account's current followers and friends.
    pub fn ingest_for_handle(&mut self, screen_name: &str) -> Result<IngestReport> {
        self.ingest_for_handle_at(screen_name, Utc::now())
    }

    /// Same as [`Self::ingest_for_handle`], with an explicit capture time.
    pub fn ingest_for_handle_at(&mut self, screen_name: &str, at: DateTime<Utc>) -> Result<IngestReport> {
        let account_id = self.resolve(screen_name)?;
        let followers = self.api.fetch_follower_ids(screen_name)?;
        let friends = self.api.fetch_friend_ids(screen_name)?;
        debug!(
            screen_name,
            followers = followers.len(),
            friends = friends.len(),
            "fetched relationships"
        );

        ingest::ingest(&mut self.conn, account_id, followers, friends, at)
    }

    /// Regenerate the account's events from its loads.
    /// `None` when the handle has never been loaded.
    pub fn rebuild_events(&mut self, screen_name: &str) -> Result<Option<usize>> {
        match self.conn.find_account_id(screen_name)? {
            Some(account_id) => ingest::rebuild_events(&mut self.conn, account_id).map(Some),
            None => Ok(None),
        }
    }

    /// Event history of the account, newest first.
    /// `None` when the handle has never been loaded.
    pub fn history(&self, screen_name: &str) -> Result<Option<Vec<Event>>> {
        match self.conn.find_account_id(screen_name)? {
            Some(account_id) => self.conn.events_for_account(account_id).map(Some),
            None => Ok(None),
        }
    }
}
