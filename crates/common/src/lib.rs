//! Shared types used across the order and payment crates.

pub mod paging;
pub mod types;

pub use paging::{Page, PageRequest};
pub use types::AggregateId;
