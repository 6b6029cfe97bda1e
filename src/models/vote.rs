use serde::Deserialize;

use crate::error::AppError;

/// Body of `POST /posts/{id}/vote` and `POST /comments/{id}/vote`.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub value: i64,
}

/// A requested vote: up, down, or withdraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteValue {
    Up,
    Down,
    Withdraw,
}

impl TryFrom<i64> for VoteValue {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            0 => Ok(VoteValue::Withdraw),
            _ => Err(AppError::BadRequest(
                "Invalid vote value. Must be 1 (upvote), -1 (downvote), or 0 (remove vote)."
                    .to_string(),
            )),
        }
    }
}

impl VoteValue {
    /// The ledger value, `None` for a withdrawal.
    pub fn stored(self) -> Option<i16> {
        match self {
            VoteValue::Up => Some(1),
            VoteValue::Down => Some(-1),
            VoteValue::Withdraw => None,
        }
    }
}

/// What has to happen to the ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerChange {
    Nothing,
    Insert(i16),
    Update(i16),
    Delete,
}

/// A ledger change together with the tally adjustment that keeps the tally
/// equal to the sum of live votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotePlan {
    pub change: LedgerChange,
    pub delta: i32,
}

/// Decides the ledger mutation for the caller's existing vote (if any) and the
/// requested value.
pub fn plan_vote(existing: Option<i16>, requested: VoteValue) -> VotePlan {
    match (existing, requested.stored()) {
        (None, None) => VotePlan { change: LedgerChange::Nothing, delta: 0 },
        (None, Some(new)) => VotePlan { change: LedgerChange::Insert(new), delta: i32::from(new) },
        (Some(old), None) => VotePlan { change: LedgerChange::Delete, delta: -i32::from(old) },
        (Some(old), Some(new)) if old == new => {
            VotePlan { change: LedgerChange::Nothing, delta: 0 }
        }
        (Some(old), Some(new)) => VotePlan {
            change: LedgerChange::Update(new),
            delta: i32::from(new) - i32::from(old),
        },
    }
}

/// Things that carry a vote tally, with the tables backing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTarget {
    Post,
    Comment,
}

impl VoteTarget {
    /// Table holding the tally column `votes`.
    pub fn table(self) -> &'static str {
        match self {
            VoteTarget::Post => "posts",
            VoteTarget::Comment => "comments",
        }
    }

    /// Ledger table holding one row per (user, target).
    pub fn ledger(self) -> &'static str {
        match self {
            VoteTarget::Post => "votes",
            VoteTarget::Comment => "comment_votes",
        }
    }

    /// Ledger column referencing the target.
    pub fn key(self) -> &'static str {
        match self {
            VoteTarget::Post => "post_id",
            VoteTarget::Comment => "comment_id",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VoteTarget::Post => "Post",
            VoteTarget::Comment => "Comment",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Applies a plan to an in-memory ledger row and tally.
    fn apply(row: &mut Option<i16>, tally: &mut i32, requested: VoteValue) {
        let plan = plan_vote(*row, requested);
        match plan.change {
            LedgerChange::Nothing => {}
            LedgerChange::Insert(v) | LedgerChange::Update(v) => *row = Some(v),
            LedgerChange::Delete => *row = None,
        }
        *tally += plan.delta;
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(VoteValue::try_from(2).is_err());
        assert!(VoteValue::try_from(-5).is_err());
        assert_eq!(VoteValue::try_from(-1).unwrap(), VoteValue::Down);
    }

    #[test]
    fn withdraw_without_vote_is_noop() {
        let plan = plan_vote(None, VoteValue::Withdraw);
        assert_eq!(plan, VotePlan { change: LedgerChange::Nothing, delta: 0 });
    }

    #[test]
    fn flipping_moves_tally_by_two() {
        let plan = plan_vote(Some(1), VoteValue::Down);
        assert_eq!(plan, VotePlan { change: LedgerChange::Update(-1), delta: -2 });
    }

    #[test]
    fn repeating_a_vote_is_idempotent() {
        let (mut row, mut tally) = (None, 0);
        apply(&mut row, &mut tally, VoteValue::Up);
        apply(&mut row, &mut tally, VoteValue::Up);
        assert_eq!((row, tally), (Some(1), 1));
    }

    #[test]
    fn tally_tracks_last_nonzero_vote_for_every_sequence() {
        let choices = [VoteValue::Up, VoteValue::Down, VoteValue::Withdraw];
        // every sequence of length 4 over {+1, -1, 0}
        for code in 0..81u32 {
            let mut seq = Vec::new();
            let mut n = code;
            for _ in 0..4 {
                seq.push(choices[(n % 3) as usize]);
                n /= 3;
            }

            let (mut row, mut tally) = (None, 0);
            for value in &seq {
                apply(&mut row, &mut tally, *value);
            }

            let expected = seq.last().and_then(|v| v.stored()).map_or(0, i32::from);
            assert_eq!(tally, expected, "sequence {:?}", seq);
            assert_eq!(row.map_or(0, i32::from), tally);
        }
    }
}
