//! Audio subsystem module

pub mod buffer;
pub mod context;
pub mod device;
pub mod output;

pub use buffer::{DecodedBuffer, SharedBuffer};
pub use context::{AudioContext, ContextState, RenderBlock, RenderSource};
pub use device::{
    default_output_device, list_output_devices, output_device_by_name, probe_input, AudioDevice,
    AudioDeviceInfo,
};
pub use output::{OutputStream, RenderFn};
