//! Token estimation.
//!
//! `estimate(turns) == sum(chars(turn.content)) / 4`, rounded down. The division happens once on
//! the total, so per-turn remainders are not lost.

use crate::chat::Turn;

/// Characters per token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimated token cost of a whole turn list.
pub fn estimate_tokens(turns: &[Turn]) -> usize {
    total_chars(turns) / CHARS_PER_TOKEN
}

pub(crate) fn total_chars(turns: &[Turn]) -> usize {
    turns.iter().map(Turn::char_len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_is_total_chars_divided_by_four() {
        let turns = vec![
            Turn::user("Hello there!"),
            Turn::assistant("Hi! How can I help you?"),
        ];

        let total: usize = turns.iter().map(|t| t.content.chars().count()).sum();
        assert_eq!(estimate_tokens(&turns), total / 4);
        assert_eq!(estimate_tokens(&turns), 8);
    }

    #[test]
    fn remainders_are_summed_before_dividing() {
        // 3 + 3 chars: per-turn division would give 0, the total gives 1
        let turns = vec![Turn::user("abc"), Turn::assistant("def")];
        assert_eq!(estimate_tokens(&turns), 1);
    }

    #[test]
    fn empty_input_costs_nothing() {
        assert_eq!(estimate_tokens(&[]), 0);
    }

    #[test]
    fn estimate_is_deterministic() {
        let turns = vec![Turn::instruction("You are a helpful assistant."), Turn::user("ok")];
        assert_eq!(estimate_tokens(&turns), estimate_tokens(&turns.clone()));
    }
}
