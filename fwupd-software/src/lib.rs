// Licensed under the Apache-2.0 license

//! The Software object lifecycle and Activation state machine (spec.md 3,
//! 4.2, 4.7) shared by every domain's device manager.

pub mod activation;
pub mod device;
pub mod registry;
pub mod software;

pub use device::Device;
pub use registry::DeviceRegistry;
pub use software::{Software, Version};
