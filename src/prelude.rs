pub use crate::error::TbError;
pub use crate::executor::{JoinHandle, Task};
pub use crate::kernel::KernelOptions;
pub use crate::signal::SimObject;
pub use crate::sim_if::SIM_IF;
pub use crate::trigger::Trigger;
pub use crate::value::Val;
pub use crate::TbResult;
pub use crate::{fail_test, pass_test, simulate};
pub use futures::future::FutureExt;
