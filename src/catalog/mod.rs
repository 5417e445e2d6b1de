pub mod descriptor;
pub mod registry;
pub mod seed;
pub mod signature;
pub mod sortop;

pub use descriptor::{AggKind, AggregateDescriptor};
pub use registry::{global, init_global, AggRegistry, ExtraSeedEntry, RegistryBuilder};
pub use signature::AggSignature;

use crate::error::AggResult;

/// Check a descriptor's structural rules; see `AggregateDescriptor::validate`.
pub fn validate(desc: &AggregateDescriptor) -> AggResult<()> { desc.validate() }
