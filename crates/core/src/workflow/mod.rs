pub mod engine;
pub mod outcome;

pub use engine::ApprovalEngine;
pub use outcome::{BatchOutcome, TransitionOutcome};
