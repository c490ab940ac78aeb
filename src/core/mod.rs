//! Foundational and often-reused types.

pub(crate) mod bucket;
pub mod compact;
pub(crate) mod id;
pub(crate) mod peer;
