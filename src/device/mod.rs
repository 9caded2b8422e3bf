//! Camera device lifecycle.
//!
//! The platform is reached only through [`MediaDevices`]. A
//! [`DeviceSessionManager`] turns its streams into exclusively owned
//! [`DeviceHandle`]s that stop their tracks exactly once.

mod backend;
mod handle;
mod manager;
mod mock;

pub use backend::{
    DeviceError, FacingMode, MediaConstraints, MediaDevices, MediaStream, ResolutionHint,
    StreamSettings,
};
pub use handle::DeviceHandle;
pub use manager::{DeviceSessionManager, HandleOf};
pub use mock::{DeviceEvent, DeviceLedger, MockDevices, MockStream};
