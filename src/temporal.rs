// ⏰ Temporal Model
// Loads are immutable snapshots on a per-account timeline.
// Events are derived facts, valid over the interval between two adjacent loads.

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::TwackError;

/// Numeric account identity (never changes, unlike the handle)
pub type AccountId = i64;

// ============================================================================
// TIMESTAMPS
// ============================================================================

/// Drop sub-microsecond precision so stored and in-memory instants agree.
pub fn truncate_micros(dt: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = dt.nanosecond() / 1_000 * 1_000;
    dt.with_nanosecond(nanos).unwrap_or(dt)
}

/// Fixed-width RFC 3339 text. Lexicographic order equals chronological
/// order, which the straddle and adjacency queries rely on.
pub fn encode_ts(dt: DateTime<Utc>) -> String {
    truncate_micros(dt).to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_ts(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// VERB
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Follow,
    Unfollow,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Follow => "follow",
            Verb::Unfollow => "unfollow",
        }
    }

    pub fn inverse(&self) -> Verb {
        match self {
            Verb::Follow => Verb::Unfollow,
            Verb::Unfollow => Verb::Follow,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = TwackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "follow" => Ok(Verb::Follow),
            "unfollow" => Ok(Verb::Unfollow),
            other => Err(TwackError::InvalidData(format!("unknown verb '{}'", other))),
        }
    }
}

// ============================================================================
// LOAD
// ============================================================================

/// Load - complete follower and friend sets of one account at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Load {
    /// Row id, None until persisted
    pub id: Option<i64>,
    pub account_id: AccountId,
    pub followers: BTreeSet<AccountId>,
    pub friends: BTreeSet<AccountId>,
    pub added_dt: DateTime<Utc>,
}

impl Load {
    /// Build a load from raw ID lists. Duplicates collapse into sets.
    pub fn new<F, R>(account_id: AccountId, followers: F, friends: R, added_dt: DateTime<Utc>) -> Self
    where
        F: IntoIterator<Item = AccountId>,
        R: IntoIterator<Item = AccountId>,
    {
        Load {
            id: None,
            account_id,
            followers: followers.into_iter().collect(),
            friends: friends.into_iter().collect(),
            added_dt: truncate_micros(added_dt),
        }
    }
}

// ============================================================================
// EVENT
// ============================================================================

/// Event - one directed relationship change between two adjacent loads
///
/// `event_start_dt` is the earlier load's timestamp, `event_end_dt` the later
/// one's. The change happened somewhere inside that window.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Event {
    /// Account whose loads produced this event
    pub account_id: AccountId,
    pub subject_id: AccountId,
    pub verb: Verb,
    pub object_id: AccountId,
    pub event_start_dt: DateTime<Utc>,
    pub event_end_dt: DateTime<Utc>,
}

impl Event {
    /// True when `at` falls strictly inside the validity interval.
    /// Touching an endpoint does not count.
    pub fn straddled_by(&self, at: DateTime<Utc>) -> bool {
        self.event_start_dt < at && at < self.event_end_dt
    }

    /// The (subject, verb, object) triple, ignoring time
    pub fn relation(&self) -> (AccountId, Verb, AccountId) {
        (self.subject_id, self.verb, self.object_id)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event {
            account_id: 1,
            subject_id: 2,
            verb: Verb::Follow,
            object_id: 1,
            event_start_dt: start,
            event_end_dt: end,
        }
    }

    #[test]
    fn test_encoded_timestamps_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let later = early + chrono::Duration::milliseconds(1500);
        let much_later = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();

        let a = encode_ts(early);
        let b = encode_ts(later);
        let c = encode_ts(much_later);

        assert_eq!(a.len(), b.len());
        assert!(a < b && b < c);
        assert_eq!(decode_ts(&b).unwrap(), later);
    }

    #[test]
    fn test_truncate_drops_nanoseconds() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();

        assert_eq!(truncate_micros(dt).nanosecond(), 123_456_000);
        assert_eq!(decode_ts(&encode_ts(dt)).unwrap(), truncate_micros(dt));
    }

    #[test]
    fn test_straddle_is_strict() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let t3 = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        let e = event(t1, t3);

        assert!(e.straddled_by(t2));
        assert!(!e.straddled_by(t1));
        assert!(!e.straddled_by(t3));
        assert!(!event(t1, t2).straddled_by(t3));
    }

    #[test]
    fn test_load_dedups_ids() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let load = Load::new(7, vec![1, 2, 2, 1], vec![5, 5], t);

        assert_eq!(load.followers.len(), 2);
        assert_eq!(load.friends.len(), 1);
        assert!(load.id.is_none());
    }

    #[test]
    fn test_verb_round_trip_and_inverse() {
        assert_eq!("follow".parse::<Verb>().unwrap(), Verb::Follow);
        assert_eq!(Verb::Follow.inverse(), Verb::Unfollow);
        assert!("block".parse::<Verb>().is_err());
    }
}
