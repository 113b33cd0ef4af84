//! Path addressing.
//!
//! Callers address data with dotted keys such as `"user.profile.name"`.
//! The first segment is the root key of a stored document; the rest is a
//! sub-path navigated through nested mappings inside that document.

pub mod resolver;
mod shaper;

pub use resolver::{clone_deep, get, has, set, split, unset, KeyPath, PATH_SEPARATOR};
pub use shaper::shape_for_store;
