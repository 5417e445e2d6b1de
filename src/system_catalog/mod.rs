// System catalog views over the aggregate registry.

pub mod pg_catalog;
pub mod registry;

pub use registry::{frame_for, lookup_from_str, SystemTable};
