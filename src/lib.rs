// Twack - follower/friend history tracker
// Exposes all modules for use in the CLI and tests

pub mod app;
pub mod config;
pub mod db;
pub mod diff;         // Diff Engine: pure set-difference between two loads
pub mod entities;     // Account identity and handle directory
pub mod error;
pub mod ingest;       // Ingestion coordinator: store, invalidate, regenerate
pub mod loads;        // Load Repository
pub mod logging;
pub mod temporal;     // Load / Event / timestamp model
pub mod twitter;

// Re-export commonly used types
pub use app::Application;
pub use config::{AppConfig, DatabaseConfig, TwitterConfig};
pub use diff::{compute_events, diff_loads};
pub use entities::{Account, AccountDirectory};
pub use error::{Result, TwackError};
pub use ingest::{apply_load, ingest, rebuild_events, regenerate_events, IngestReport};
pub use loads::LoadRepository;
pub use temporal::{AccountId, Event, Load, Verb};
pub use twitter::{Profile, SocialApi, TwitterClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
