// Synchronization primitives
//
// Fences bound CPU-GPU ordering, semaphores order GPU-side work between
// queue operations. One fence and one semaphore pair per frame slot.

use ash::vk;
use std::sync::Arc;

use crate::backend::device::LogicalDevice;
use crate::error::RenderResult;

/// CPU-waitable signal marking GPU work completion
pub struct Fence {
    device: Arc<LogicalDevice>,
    pub handle: vk::Fence,
}

impl Fence {
    /// Frame-slot fences start signaled to avoid a first-frame stall
    pub fn new(device: Arc<LogicalDevice>, signaled: bool) -> RenderResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let handle = unsafe { device.device.create_fence(&create_info, None)? };
        Ok(Self { device, handle })
    }

    pub fn wait(&self) -> RenderResult<()> {
        unsafe {
            self.device
                .device
                .wait_for_fences(&[self.handle], true, u64::MAX)?;
        }
        Ok(())
    }

    pub fn reset(&self) -> RenderResult<()> {
        unsafe { self.device.device.reset_fences(&[self.handle])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_fence(self.handle, None);
        }
    }
}

/// Semaphore pair for one frame slot: image acquisition and render
/// completion
pub struct SyncSemaphores {
    device: Arc<LogicalDevice>,
    pub image_acquired: vk::Semaphore,
    pub render_complete: vk::Semaphore,
}

impl SyncSemaphores {
    pub fn new(device: Arc<LogicalDevice>) -> RenderResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        unsafe {
            let image_acquired = device.device.create_semaphore(&create_info, None)?;
            let render_complete = device.device.create_semaphore(&create_info, None)?;
            Ok(Self {
                device,
                image_acquired,
                render_complete,
            })
        }
    }
}

impl Drop for SyncSemaphores {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_semaphore(self.image_acquired, None);
            self.device
                .device
                .destroy_semaphore(self.render_complete, None);
        }
    }
}
