//! Vote tally with a deterministic tie-break.

use crate::state::Vote;

/// Vote counts and the winner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    /// `(agent, votes)` in order of first vote received
    pub counts: Vec<(String, u32)>,
    pub winner: Option<String>,
}

impl Tally {
    pub fn count_for(&self, agent: &str) -> u32 {
        self.counts
            .iter()
            .find(|(name, _)| name == agent)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

/// Count votes in insertion order.
///
/// The winner changes only on a strictly higher count, so among tied agents
/// the one that reached the top count first wins.
pub fn tally_votes(votes: &[Vote]) -> Tally {
    let mut tally = Tally::default();
    let mut best = 0u32;

    for vote in votes {
        let count = match tally
            .counts
            .iter_mut()
            .find(|(name, _)| *name == vote.voted_for)
        {
            Some((_, n)) => {
                *n += 1;
                *n
            }
            None => {
                tally.counts.push((vote.voted_for.clone(), 1));
                1
            }
        };
        if count > best {
            best = count;
            tally.winner = Some(vote.voted_for.clone());
        }
    }
    tally
}
