//! Allocation planning.
//!
//! Pure decision logic: given a file size and a quota snapshot per account,
//! decide where the bytes go. No I/O happens here.

use crate::error::{ErrorKind, Result};
use crate::quota::QuotaReport;
use colossus_metadata::AccountId;

/// One chunk of a chunked plan. `byte_end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub index: u32,
    pub account: AccountId,
    pub byte_start: u64,
    pub byte_end: u64,
}

impl Assignment {
    pub fn size(&self) -> u64 {
        self.byte_end - self.byte_start + 1
    }
}

/// Where an upload's bytes will be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// The whole file fits on one account.
    Single { account: AccountId },
    /// Byte ranges in chunk-index order, each on a different account.
    Chunked(Vec<Assignment>),
}

/// Decide where `size` bytes go.
///
/// Accounts whose quota errored or that have no free space are ignored. The
/// rest are ranked by free space, largest first; equal free space keeps the
/// order of `candidates` (connection order). If the top account can hold the
/// whole file it gets all of it. Otherwise the file is cut into chunks, each
/// account taking as much of the remainder as it has room for, in rank order.
///
/// Returns [`NoCapacity`](ErrorKind::NoCapacity) when even all accounts
/// together can't hold the file.
pub fn plan(size: u64, candidates: &[(AccountId, QuotaReport)]) -> Result<Plan> {
    if size == 0 {
        exn::bail!(ErrorKind::InvalidInput("cannot place an empty file".to_string()));
    }
    let mut ranked: Vec<(AccountId, u64)> = candidates
        .iter()
        .filter(|(_, quota)| !quota.error && quota.free > 0)
        .map(|(account, quota)| (*account, quota.free))
        .collect();
    // `sort_by` is stable.
    ranked.sort_by(|(_, a), (_, b)| b.cmp(a));

    match ranked.first() {
        None => exn::bail!(ErrorKind::NoCapacity { needed: size, available: 0 }),
        Some(&(account, free)) if free >= size => return Ok(Plan::Single { account }),
        Some(_) => {},
    }

    let mut assignments = Vec::new();
    let mut offset = 0u64;
    for (account, free) in ranked {
        if offset == size {
            break;
        }
        let take = free.min(size - offset);
        if take == 0 {
            continue;
        }
        assignments.push(Assignment {
            index: assignments.len() as u32,
            account,
            byte_start: offset,
            byte_end: offset + take - 1,
        });
        offset += take;
    }
    if offset < size {
        exn::bail!(ErrorKind::NoCapacity { needed: size, available: offset });
    }
    Ok(Plan::Chunked(assignments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const MB: u64 = 1024 * 1024;

    fn candidates(free: &[Option<u64>]) -> Vec<(AccountId, QuotaReport)> {
        free.iter()
            .enumerate()
            .map(|(i, free)| {
                let report = match free {
                    Some(free) => QuotaReport::new(*free, 0),
                    None => QuotaReport::unavailable(),
                };
                (AccountId(i as i64 + 1), report)
            })
            .collect()
    }

    fn chunks(plan: Plan) -> Vec<Assignment> {
        match plan {
            Plan::Chunked(chunks) => chunks,
            other => panic!("expected a chunked plan, got {other:?}"),
        }
    }

    /// Check the coverage invariants every chunked plan must hold.
    fn assert_covers(assignments: &[Assignment], size: u64, free: &[Option<u64>]) {
        let mut next = 0;
        for (i, assignment) in assignments.iter().enumerate() {
            assert_eq!(assignment.index as usize, i);
            assert_eq!(assignment.byte_start, next);
            let account_free = free[(assignment.account.0 - 1) as usize].unwrap();
            assert!(assignment.size() <= account_free);
            next = assignment.byte_end + 1;
        }
        assert_eq!(next, size);
    }

    #[test]
    fn test_splits_across_largest_accounts() {
        let free = [Some(5 * MB), Some(3 * MB), None];
        let assignments = chunks(plan(6 * MB, &candidates(&free)).unwrap());
        assert_eq!(
            assignments,
            vec![
                Assignment { index: 0, account: AccountId(1), byte_start: 0, byte_end: 5_242_879 },
                Assignment { index: 1, account: AccountId(2), byte_start: 5_242_880, byte_end: 6_291_455 },
            ]
        );
        assert_covers(&assignments, 6 * MB, &free);
    }

    #[test]
    fn test_exactly_all_available_space() {
        let free = [Some(10 * MB), Some(10 * MB)];
        let assignments = chunks(plan(20 * MB, &candidates(&free)).unwrap());
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].size(), 10 * MB);
        assert_eq!(assignments[1].size(), 10 * MB);
        assert_covers(&assignments, 20 * MB, &free);
    }

    #[rstest]
    #[case(&[Some(10), Some(40), Some(20)], 15, AccountId(2))]
    #[case(&[Some(40), Some(40)], 40, AccountId(1))]
    #[case(&[None, Some(5), Some(5)], 5, AccountId(2))]
    fn test_single_placement_on_largest(
        #[case] free: &[Option<u64>],
        #[case] size: u64,
        #[case] expected: AccountId,
    ) {
        assert_eq!(plan(size, &candidates(free)).unwrap(), Plan::Single { account: expected });
    }

    #[test]
    fn test_ties_keep_connection_order() {
        let free = [Some(3), Some(7), Some(3), Some(3)];
        let assignments = chunks(plan(12, &candidates(&free)).unwrap());
        let accounts: Vec<i64> = assignments.iter().map(|a| a.account.0).collect();
        assert_eq!(accounts, vec![2, 1, 3]);
        assert_covers(&assignments, 12, &free);
    }

    #[test]
    fn test_stops_once_everything_is_assigned() {
        let free = [Some(6), Some(5), Some(4)];
        let assignments = chunks(plan(8, &candidates(&free)).unwrap());
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[1].size(), 2);
    }

    #[rstest]
    #[case(&[], 1, 0)]
    #[case(&[None, None], 1, 0)]
    #[case(&[Some(0), Some(0)], 1, 0)]
    #[case(&[Some(5 * MB), Some(3 * MB), None], 9 * MB, 8 * MB)]
    fn test_infeasible(#[case] free: &[Option<u64>], #[case] size: u64, #[case] expected_available: u64) {
        let err = plan(size, &candidates(free)).unwrap_err();
        assert!(
            matches!(&*err, ErrorKind::NoCapacity { needed, available } if *needed == size && *available == expected_available)
        );
    }

    #[test]
    fn test_errored_accounts_ignored_even_with_space() {
        let mut candidates = candidates(&[Some(2), Some(2)]);
        candidates[0].1.error = true;
        candidates[0].1.free = 100;
        let err = plan(3, &candidates).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NoCapacity { available: 2, .. }));
    }

    #[test]
    fn test_empty_file_rejected() {
        let err = plan(0, &candidates(&[Some(1)])).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidInput(_)));
    }

    #[test]
    fn test_property_coverage() {
        // Deterministic sweep over many free-space vectors and sizes.
        let vectors: &[&[Option<u64>]] = &[
            &[Some(1), Some(1), Some(1)],
            &[Some(7), None, Some(3), Some(11)],
            &[Some(100), Some(1), Some(50), Some(49)],
            &[Some(13), Some(13), Some(13), Some(0), Some(2)],
        ];
        for free in vectors {
            let total: u64 = free.iter().flatten().sum();
            let max = free.iter().flatten().copied().max().unwrap_or(0);
            for size in 1..=total + 1 {
                match plan(size, &candidates(free)) {
                    Ok(Plan::Single { account }) => {
                        assert!(size <= max);
                        assert_eq!(free[(account.0 - 1) as usize], Some(max));
                    },
                    Ok(Plan::Chunked(assignments)) => {
                        assert!(size > max);
                        assert_covers(&assignments, size, free);
                    },
                    Err(_) => assert!(size > total),
                }
            }
        }
    }
}
