//! Container runtime adapters

mod docker;
#[cfg(any(test, feature = "test-utils"))]
mod memory;
mod traits;

pub use command_executor::{LineStream, LogLine, LogSource};
pub use docker::DockerRuntime;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryRuntime;
pub use traits::{
    APP_LABEL, ContainerRuntime, DeploymentRecord, ENVIRONMENT_LABEL, LogOptions, MANAGED_LABEL,
    NetworkHandle, SPEC_HASH_LABEL, UnitSpec, UnitStatus, split_image_ref,
};
