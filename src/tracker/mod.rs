//! Git working-tree inspection for pre-flight checks.

mod git;

pub use git::{GitTracker, WorkingTreeStatus};
