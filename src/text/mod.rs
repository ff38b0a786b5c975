//! Pure text normalization for decoded answers.

pub mod casing;
pub mod cleanup;
pub mod stage;

pub use casing::{CaseNormalizer, normalize_case};
pub use cleanup::{CLEANUP_RULES, Cleanup, CleanupRule, cleanup};
pub use stage::{TextChain, TextStage};
