// Command pool and command buffers
//
// One primary command buffer per swap-chain image slot, reset and
// re-recorded each cycle it is selected, never reallocated. One-shot
// buffers are used for load-time transfers only.

use ash::vk;
use std::sync::Arc;

use crate::backend::device::LogicalDevice;
use crate::error::RenderResult;

pub struct CommandPool {
    pub device: Arc<LogicalDevice>,
    pub handle: vk::CommandPool,
}

impl CommandPool {
    pub fn new(device: Arc<LogicalDevice>, queue_family_index: u32) -> RenderResult<Arc<Self>> {
        log::info!("Creating command pool");
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let handle = unsafe { device.device.create_command_pool(&create_info, None)? };
        Ok(Arc::new(Self { device, handle }))
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_command_pool(self.handle, None);
        }
    }
}

pub struct CommandBuffer {
    pool: Arc<CommandPool>,
    pub handle: vk::CommandBuffer,
    one_time_submit: bool,
}

impl CommandBuffer {
    pub fn new(pool: Arc<CommandPool>, one_time_submit: bool) -> RenderResult<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let handle =
            unsafe { pool.device.device.allocate_command_buffers(&alloc_info)?[0] };
        Ok(Self {
            pool,
            handle,
            one_time_submit,
        })
    }

    pub fn begin(&self) -> RenderResult<()> {
        let flags = if self.one_time_submit {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::empty()
        };
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe {
            self.pool
                .device
                .device
                .begin_command_buffer(self.handle, &begin_info)?;
        }
        Ok(())
    }

    pub fn end(&self) -> RenderResult<()> {
        unsafe { self.pool.device.device.end_command_buffer(self.handle)? };
        Ok(())
    }

    pub fn reset(&self) -> RenderResult<()> {
        unsafe {
            self.pool.device.device.reset_command_buffer(
                self.handle,
                vk::CommandBufferResetFlags::RELEASE_RESOURCES,
            )?;
        }
        Ok(())
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        unsafe {
            self.pool
                .device
                .device
                .free_command_buffers(self.pool.handle, &[self.handle]);
        }
    }
}
