// 🔀 Diff Engine
// Pure set-difference between two loads of the same account.
// No storage, no clock: the same inputs always give the same events.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::error::{Result, TwackError};
use crate::temporal::{truncate_micros, AccountId, Event, Load, Verb};

/// Compute the relationship changes between two snapshots.
///
/// Four disjoint categories, in this order:
/// 1. new followers      → `(follower, follow, account)`
/// 2. lost followers     → `(follower, unfollow, account)`
/// 3. new friends        → `(account, follow, friend)`
/// 4. abandoned friends  → `(account, unfollow, friend)`
///
/// Every event spans `[prev_ts, curr_ts]`. ID lists are deduplicated first.
/// Fails with [`TwackError::Ordering`] unless `prev_ts < curr_ts`.
pub fn compute_events<A, B, C, D>(
    account_id: AccountId,
    prev_ts: DateTime<Utc>,
    curr_ts: DateTime<Utc>,
    prev_friends: A,
    curr_friends: B,
    prev_followers: C,
    curr_followers: D,
) -> Result<Vec<Event>>
where
    A: IntoIterator<Item = AccountId>,
    B: IntoIterator<Item = AccountId>,
    C: IntoIterator<Item = AccountId>,
    D: IntoIterator<Item = AccountId>,
{
    let prev_ts = truncate_micros(prev_ts);
    let curr_ts = truncate_micros(curr_ts);
    if prev_ts >= curr_ts {
        return Err(TwackError::Ordering {
            prev: prev_ts,
            curr: curr_ts,
        });
    }

    let prev_friends: BTreeSet<AccountId> = prev_friends.into_iter().collect();
    let curr_friends: BTreeSet<AccountId> = curr_friends.into_iter().collect();
    let prev_followers: BTreeSet<AccountId> = prev_followers.into_iter().collect();
    let curr_followers: BTreeSet<AccountId> = curr_followers.into_iter().collect();

    let event = |subject_id, verb, object_id| Event {
        account_id,
        subject_id,
        verb,
        object_id,
        event_start_dt: prev_ts,
        event_end_dt: curr_ts,
    };

    let mut events = Vec::new();

    events.extend(
        curr_followers
            .difference(&prev_followers)
            .map(|&id| event(id, Verb::Follow, account_id)),
    );
    events.extend(
        prev_followers
            .difference(&curr_followers)
            .map(|&id| event(id, Verb::Unfollow, account_id)),
    );
    events.extend(
        curr_friends
            .difference(&prev_friends)
            .map(|&id| event(account_id, Verb::Follow, id)),
    );
    events.extend(
        prev_friends
            .difference(&curr_friends)
            .map(|&id| event(account_id, Verb::Unfollow, id)),
    );

    Ok(events)
}

/// Diff two stored loads. Both must belong to the same account.
pub fn diff_loads(prev: &Load, curr: &Load) -> Result<Vec<Event>> {
    if prev.account_id != curr.account_id {
        return Err(TwackError::AccountMismatch {
            left: prev.account_id,
            right: curr.account_id,
        });
    }

    compute_events(
        curr.account_id,
        prev.added_dt,
        curr.added_dt,
        prev.friends.iter().copied(),
        curr.friends.iter().copied(),
        prev.followers.iter().copied(),
        curr.followers.iter().copied(),
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    const ACCOUNT: AccountId = 100;

    fn t1() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn t2() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    fn relations(events: &[Event]) -> Vec<(AccountId, Verb, AccountId)> {
        let mut out: Vec<_> = events.iter().map(Event::relation).collect();
        out.sort();
        out
    }

    #[test]
    fn test_concrete_scenario_yields_four_events() {
        let events = compute_events(
            ACCOUNT,
            t1(),
            t2(),
            vec![10, 20],
            vec![20, 30],
            vec![1, 2],
            vec![2, 3],
        )
        .unwrap();

        assert_eq!(
            relations(&events),
            vec![
                (1, Verb::Unfollow, ACCOUNT),
                (3, Verb::Follow, ACCOUNT),
                (ACCOUNT, Verb::Follow, 30),
                (ACCOUNT, Verb::Unfollow, 10),
            ]
        );
        assert!(events
            .iter()
            .all(|e| e.event_start_dt == t1() && e.event_end_dt == t2() && e.account_id == ACCOUNT));
    }

    #[test]
    fn test_identical_snapshots_yield_nothing() {
        let events = compute_events(
            ACCOUNT,
            t1(),
            t2(),
            vec![10, 20],
            vec![20, 10],
            vec![1, 2, 3],
            vec![3, 2, 1],
        )
        .unwrap();

        assert!(events.is_empty());
    }

    #[test]
    fn test_duplicate_ids_are_ignored() {
        let events = compute_events(
            ACCOUNT,
            t1(),
            t2(),
            vec![],
            vec![30, 30, 30],
            vec![1, 1],
            vec![],
        )
        .unwrap();

        assert_eq!(
            relations(&events),
            vec![(1, Verb::Unfollow, ACCOUNT), (ACCOUNT, Verb::Follow, 30)]
        );
    }

    #[test]
    fn test_non_increasing_timestamps_rejected() {
        let same = compute_events(ACCOUNT, t1(), t1(), vec![], vec![], vec![], vec![]);
        let backwards = compute_events(ACCOUNT, t2(), t1(), vec![], vec![], vec![], vec![]);

        assert!(matches!(same, Err(TwackError::Ordering { .. })));
        assert!(matches!(backwards, Err(TwackError::Ordering { .. })));
    }

    #[test]
    fn test_categories_are_disjoint() {
        // Account that is both a follower and a friend, on both sides of the change
        let events = compute_events(
            ACCOUNT,
            t1(),
            t2(),
            vec![5, 6, 7],
            vec![6, 7, 8, 9],
            vec![5, 7, 8],
            vec![6, 7, 9],
        )
        .unwrap();

        let unique: HashSet<_> = events.iter().map(Event::relation).collect();
        assert_eq!(unique.len(), events.len());
        // 2 new followers + 2 lost followers + 2 new friends + 1 abandoned friend
        assert_eq!(events.len(), 7);
    }

    #[test]
    fn test_reverse_diff_inverts_verbs() {
        let a = Load::new(ACCOUNT, vec![1, 2, 4], vec![10, 20], t1());
        let mut b = Load::new(ACCOUNT, vec![2, 3], vec![20, 30, 40], t2());

        let forward = diff_loads(&a, &b).unwrap();

        // Same sets, swapped in time
        let mut a_later = a.clone();
        a_later.added_dt = t2();
        b.added_dt = t1();
        let backward = diff_loads(&b, &a_later).unwrap();

        let mut inverted: Vec<_> = backward
            .iter()
            .map(|e| (e.subject_id, e.verb.inverse(), e.object_id))
            .collect();
        inverted.sort();

        assert_eq!(forward.len(), backward.len());
        assert_eq!(relations(&forward), inverted);
    }

    #[test]
    fn test_diff_loads_rejects_foreign_account() {
        let a = Load::new(1, vec![], vec![], t1());
        let b = Load::new(2, vec![], vec![], t2());

        assert!(matches!(
            diff_loads(&a, &b),
            Err(TwackError::AccountMismatch { left: 1, right: 2 })
        ));
    }
}
