//! Choices and Round Resolution
//!
//! The pure rules of the duel: the three-valued choice domain and the
//! resolution of a pair of simultaneous choices. No state, no I/O.

use serde::{Deserialize, Serialize};

/// A player's choice for one round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    /// Rock beats scissors.
    Rock,
    /// Paper beats rock.
    Paper,
    /// Scissors beats paper.
    Scissors,
}

impl Choice {
    /// The full choice domain, in wire order.
    pub const ALL: [Choice; 3] = [Choice::Rock, Choice::Paper, Choice::Scissors];

    /// Check whether this choice beats another.
    ///
    /// Each choice beats exactly one other and loses to exactly one other;
    /// a choice never beats itself.
    #[inline]
    pub fn beats(self, other: Choice) -> bool {
        matches!(
            (self, other),
            (Choice::Rock, Choice::Scissors)
                | (Choice::Paper, Choice::Rock)
                | (Choice::Scissors, Choice::Paper)
        )
    }
}

/// Outcome of resolving a pair of choices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Equal choices.
    Draw,
    /// The first argument wins.
    FirstWins,
    /// The second argument wins.
    SecondWins,
}

/// Resolve a pair of simultaneous choices.
///
/// Total over the choice domain and deterministic. Callers guarantee both
/// sides are revealed before resolving.
pub fn resolve(first: Choice, second: Choice) -> Outcome {
    if first == second {
        Outcome::Draw
    } else if first.beats(second) {
        Outcome::FirstWins
    } else {
        Outcome::SecondWins
    }
}
