//! Durable keyed object store and label index for the cirrus control plane.
//!
//! Every entity in the control plane is persisted as a single JSON value
//! under a hierarchical key (`/ns/<ns>/resources/vNet/<id>`, ...). The store
//! offers prefix listing and depth filtering over that namespace; the label
//! index layers a selector language on top of it.

pub mod error;
pub mod label;
pub mod store;

pub use error::{KvError, Result};
pub use label::{LabelIndex, Selector};
pub use store::{filter_by_depth, KvPair, KvStore};
