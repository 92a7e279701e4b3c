// Backend module - thin ownership layer over ash
//
// Creation order: instance, physical device, logical device, surface,
// queues, swap chain, command pool, pipeline objects. Release order is
// always the reverse.

pub mod buffer;
pub mod command;
pub mod device;
pub mod instance;
pub mod model;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::{LogicalDevice, Queue};
pub use instance::Instance;
pub use surface::Surface;
pub use swapchain::Swapchain;
