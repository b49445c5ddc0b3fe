//! Convenience re-exports for consumers of this crate.

pub use crate::error::{BootstrapError, BootstrapResult};
pub use crate::kernel::Kernel;
pub use crate::ports::KernelPorts;
pub use crate::registry::{BuiltinCommand, CommandRegistry};
pub use crate::suggest::closest;
