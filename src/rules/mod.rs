// src/rules/mod.rs

//! Rules and the decisions made from them.
//!
//! - [`rule`] holds the immutable `Rule`, the `RuleTable` and the `Batch`
//!   type shared by the scheduler and the resolver.
//! - [`matcher`] turns a changed path into rendered commands.
//! - [`continuation`] computes the follow-up batches implied by `continue`
//!   links, rejecting cycles.

pub mod continuation;
pub mod matcher;
pub mod rule;

pub use continuation::ChainResolver;
pub use matcher::match_path;
pub use rule::{Batch, Rule, RuleTable};
