// GPU buffers and memory type selection
//
// A buffer owns its backing allocation exclusively; memory must be mapped
// before host access and is freed before the owning device. Allocation
// uses a first-fit scan over the adapter's memory types.

use ash::vk;
use std::sync::Arc;

use crate::backend::device::LogicalDevice;
use crate::error::{RenderError, RenderResult};

/// Buffer handle paired with its backing memory allocation
pub struct DeviceBuffer {
    device: Arc<LogicalDevice>,
    pub handle: vk::Buffer,
    pub memory: vk::DeviceMemory,
    allocation_size: vk::DeviceSize,
    mapped: Option<*mut std::ffi::c_void>,
}

impl DeviceBuffer {
    pub fn new(
        device: Arc<LogicalDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_flags: vk::MemoryPropertyFlags,
    ) -> RenderResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = unsafe { device.device.create_buffer(&buffer_info, None)? };

        let requirements = unsafe { device.device.get_buffer_memory_requirements(handle) };
        let memory_type_index = find_memory_type(
            &device.physical.memory_properties,
            requirements.memory_type_bits,
            memory_flags,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { device.device.allocate_memory(&alloc_info, None)? };
        unsafe { device.device.bind_buffer_memory(handle, memory, 0)? };

        Ok(Self {
            device,
            handle,
            memory,
            allocation_size: requirements.size,
            mapped: None,
        })
    }

    /// Map the full allocation into the host address space.
    /// Repeated calls return the existing mapping.
    pub fn map(&mut self) -> RenderResult<*mut u8> {
        if let Some(ptr) = self.mapped {
            return Ok(ptr as *mut u8);
        }
        let ptr = unsafe {
            self.device.device.map_memory(
                self.memory,
                0,
                self.allocation_size,
                vk::MemoryMapFlags::empty(),
            )?
        };
        self.mapped = Some(ptr);
        Ok(ptr as *mut u8)
    }

    pub fn unmap(&mut self) {
        if self.mapped.take().is_some() {
            unsafe {
                self.device.device.unmap_memory(self.memory);
            }
        }
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        self.unmap();
        unsafe {
            self.device.device.destroy_buffer(self.handle, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

/// First memory type whose bit is set in `type_bits` and whose property
/// flags contain `required`. Fatal when nothing matches.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> RenderResult<u32> {
    for index in 0..memory_properties.memory_type_count {
        let supported = type_bits & (1 << index) != 0;
        let flags = memory_properties.memory_types[index as usize].property_flags;
        if supported && flags.contains(required) {
            return Ok(index);
        }
    }
    Err(RenderError::NoSuitableMemoryType {
        type_bits,
        required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &f) in flags.iter().enumerate() {
            properties.memory_types[i].property_flags = f;
        }
        properties
    }

    #[test]
    fn picks_first_matching_type() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let index = find_memory_type(
            &properties,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn respects_candidate_mask() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        // Type 0 excluded by the mask even though its flags match
        let index =
            find_memory_type(&properties, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn requires_flag_superset() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        let index = find_memory_type(
            &properties,
            0b11,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn lookup_is_idempotent() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);
        let first = find_memory_type(&properties, 0b11, vk::MemoryPropertyFlags::HOST_VISIBLE);
        let second = find_memory_type(&properties, 0b11, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert_eq!(first.unwrap(), second.unwrap());
    }

    #[test]
    fn fails_when_nothing_matches() {
        let properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let result = find_memory_type(&properties, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(matches!(
            result,
            Err(RenderError::NoSuitableMemoryType { .. })
        ));
    }
}
