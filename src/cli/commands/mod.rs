//! Command implementations

pub mod run;
pub mod tree;
pub mod unlock;
