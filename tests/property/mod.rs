//! Property-based tests for scoring and budgeted selection

mod checkpoint_budget;
mod decay;
