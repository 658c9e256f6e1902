//! Filesystem primitives
//!
//! Platform bulk copy and pre-allocation, plus entry path resolution.

mod copy;
#[cfg(target_os = "linux")]
mod kernel;
mod paths;
mod positioned;

pub use copy::*;
#[cfg(target_os = "linux")]
pub use kernel::KernelCopy;
pub use paths::resolve_entry_path;
pub use positioned::{OffsetReader, PositionedCopy, PositionedRead};
