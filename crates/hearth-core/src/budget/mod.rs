//! Context budget management for generation requests.
//!
//! Token cost is a character-count heuristic (chars / 4), not a tokenizer. When a turn list is
//! over budget the oldest unprotected turns are dropped in pairs; the leading instruction turn and
//! the newest user turn always survive.
//!
//! - [`counter`]: the token estimate
//! - [`trimmer`]: greedy drop-oldest trimming

pub mod counter;
pub mod trimmer;

pub use counter::{estimate_tokens, CHARS_PER_TOKEN};
pub use trimmer::{trim_to_budget, TrimmedContext, DEFAULT_CONTEXT_BUDGET, PROTECTED_TURNS};
