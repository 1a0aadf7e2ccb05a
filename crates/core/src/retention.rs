//! Backup retention selection.
//!
//! Pure logic: given the retention settings and the set of completed
//! backups, decide which ones should be deleted. Deleting files and rows is
//! the caller's job.

use chrono::Duration;
use serde::Serialize;

use crate::types::{DbId, Timestamp};

/// Retention settings taken from the backup configuration.
///
/// A value of `0` disables the corresponding cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_backups: i32,
    pub retention_days: i32,
}

impl RetentionPolicy {
    pub fn is_unbounded(&self) -> bool {
        self.max_backups <= 0 && self.retention_days <= 0
    }
}

/// The minimal view of a completed backup needed for retention decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionCandidate {
    pub id: DbId,
    pub created_at: Timestamp,
}

/// Why a backup was selected for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionReason {
    /// Outside the newest `max_backups`.
    CountCap,
    /// Older than `retention_days`.
    AgeCap,
}

/// A backup selected for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionDecision {
    pub id: DbId,
    pub reason: RetentionReason,
}

/// Select the completed backups to delete under `policy` at time `now`.
///
/// - Count cap keeps the `max_backups` most recently created candidates.
/// - Age cap deletes anything created before `now - retention_days`,
///   whether or not the count cap would keep it.
///
/// Each id appears at most once. When both caps apply, the count cap is
/// reported as the reason.
pub fn select_for_deletion(
    policy: RetentionPolicy,
    candidates: &[RetentionCandidate],
    now: Timestamp,
) -> Vec<RetentionDecision> {
    let mut ordered: Vec<RetentionCandidate> = candidates.to_vec();
    // Newest first; ties broken by id so the outcome is deterministic.
    ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

    let cutoff = (policy.retention_days > 0)
        .then(|| now - Duration::days(i64::from(policy.retention_days)));

    ordered
        .iter()
        .enumerate()
        .filter_map(|(rank, candidate)| {
            let over_count = policy.max_backups > 0 && rank >= policy.max_backups as usize;
            let too_old = cutoff.is_some_and(|c| candidate.created_at < c);

            if over_count {
                Some(RetentionDecision {
                    id: candidate.id,
                    reason: RetentionReason::CountCap,
                })
            } else if too_old {
                Some(RetentionDecision {
                    id: candidate.id,
                    reason: RetentionReason::AgeCap,
                })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    /// `n` candidates, id `i` created `i` hours before now (id 1 is newest).
    fn hourly(n: i64) -> Vec<RetentionCandidate> {
        (1..=n)
            .map(|i| RetentionCandidate {
                id: i,
                created_at: now() - Duration::hours(i),
            })
            .collect()
    }

    fn ids(decisions: &[RetentionDecision]) -> Vec<DbId> {
        let mut ids: Vec<DbId> = decisions.iter().map(|d| d.id).collect();
        ids.sort();
        ids
    }

    #[test]
    fn unbounded_policy_deletes_nothing() {
        let policy = RetentionPolicy {
            max_backups: 0,
            retention_days: 0,
        };
        assert!(policy.is_unbounded());
        assert!(select_for_deletion(policy, &hourly(50), now()).is_empty());
    }

    #[test]
    fn count_cap_keeps_newest_k() {
        let policy = RetentionPolicy {
            max_backups: 3,
            retention_days: 0,
        };
        let decisions = select_for_deletion(policy, &hourly(8), now());
        assert_eq!(decisions.len(), 5);
        assert_eq!(ids(&decisions), vec![4, 5, 6, 7, 8]);
        assert!(decisions.iter().all(|d| d.reason == RetentionReason::CountCap));
    }

    #[test]
    fn count_cap_is_independent_of_input_order() {
        let policy = RetentionPolicy {
            max_backups: 2,
            retention_days: 0,
        };
        let mut candidates = hourly(5);
        candidates.reverse();
        assert_eq!(ids(&select_for_deletion(policy, &candidates, now())), vec![3, 4, 5]);
    }

    #[test]
    fn count_cap_not_exceeded_deletes_nothing() {
        let policy = RetentionPolicy {
            max_backups: 10,
            retention_days: 0,
        };
        assert!(select_for_deletion(policy, &hourly(10), now()).is_empty());
    }

    #[test]
    fn age_cap_deletes_old_backups_even_within_count() {
        let policy = RetentionPolicy {
            max_backups: 100,
            retention_days: 7,
        };
        let candidates = vec![
            RetentionCandidate {
                id: 1,
                created_at: now() - Duration::days(1),
            },
            RetentionCandidate {
                id: 2,
                created_at: now() - Duration::days(8),
            },
        ];
        let decisions = select_for_deletion(policy, &candidates, now());
        assert_eq!(
            decisions,
            vec![RetentionDecision {
                id: 2,
                reason: RetentionReason::AgeCap
            }]
        );
    }

    #[test]
    fn young_backup_kept_without_count_cap() {
        let policy = RetentionPolicy {
            max_backups: 0,
            retention_days: 30,
        };
        let candidates = vec![RetentionCandidate {
            id: 1,
            created_at: now() - Duration::days(29),
        }];
        assert!(select_for_deletion(policy, &candidates, now()).is_empty());
    }

    #[test]
    fn both_caps_union_without_duplicates() {
        let policy = RetentionPolicy {
            max_backups: 2,
            retention_days: 1,
        };
        let mut candidates = hourly(4);
        candidates.push(RetentionCandidate {
            id: 99,
            created_at: now() - Duration::days(3),
        });
        let decisions = select_for_deletion(policy, &candidates, now());
        assert_eq!(ids(&decisions), vec![3, 4, 99]);
    }
}
