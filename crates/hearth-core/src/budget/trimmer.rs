//! Greedy context trimming.

use crate::budget::counter::{total_chars, CHARS_PER_TOKEN};
use crate::chat::Turn;

/// Default context budget in estimated tokens.
pub const DEFAULT_CONTEXT_BUDGET: usize = 4096;

/// The leading instruction turn and the newest user turn.
pub const PROTECTED_TURNS: usize = 2;

/// Result of trimming a turn list against a budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimmedContext {
    /// Surviving turns, still in chronological order
    pub turns: Vec<Turn>,
    /// Estimated token cost of `turns`
    pub estimated_tokens: usize,
    /// Number of turns dropped
    pub turns_removed: usize,
    /// False when even the protected turns exceed the budget
    pub within_budget: bool,
}

/// Drop the oldest unprotected turns until the estimate fits `budget`.
///
/// The first and last turns are never removed. Unprotected turns go two at a time (a
/// user/assistant pair) from the front, or alone when only one is left. If the protected pair on
/// its own is over budget, exactly those two turns are returned with `within_budget == false`.
pub fn trim_to_budget(turns: Vec<Turn>, budget: usize) -> TrimmedContext {
    let mut turns = turns;
    let mut chars = total_chars(&turns);
    let mut turns_removed = 0;

    while chars / CHARS_PER_TOKEN > budget && turns.len() > PROTECTED_TURNS {
        let removable = turns.len() - PROTECTED_TURNS;
        let batch = removable.min(2);
        for turn in turns.drain(1..1 + batch) {
            chars -= turn.char_len();
        }
        turns_removed += batch;
    }

    let estimated_tokens = chars / CHARS_PER_TOKEN;
    if turns_removed > 0 {
        log::debug!(
            "Trimmed {} turns to fit context budget ({} of {} estimated tokens)",
            turns_removed,
            estimated_tokens,
            budget
        );
    }

    TrimmedContext {
        turns,
        estimated_tokens,
        turns_removed,
        within_budget: estimated_tokens <= budget,
    }
}
