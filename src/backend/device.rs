// Physical device selection and logical device / queue creation
//
// Adapter requirements: at least one graphics-capable queue family and
// support for VK_KHR_swapchain. A preferred-name match wins outright;
// otherwise the first qualifying adapter in enumeration order is used.

use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

use crate::backend::instance::Instance;
use crate::backend::surface::Surface;
use crate::error::{RenderError, RenderResult};

/// Immutable snapshot of one adapter's capabilities.
/// Read-only after construction.
pub struct PhysicalDevice {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub properties: vk::PhysicalDeviceProperties,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub extension_names: Vec<String>,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl PhysicalDevice {
    fn query(instance: &ash::Instance, handle: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(handle) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(handle) };
        let extension_names = unsafe {
            instance
                .enumerate_device_extension_properties(handle)
                .unwrap_or_default()
                .iter()
                .map(|e| {
                    CStr::from_ptr(e.extension_name.as_ptr())
                        .to_string_lossy()
                        .into_owned()
                })
                .collect()
        };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(handle) };

        Self {
            handle,
            name,
            properties,
            queue_families,
            extension_names,
            memory_properties,
        }
    }

    pub fn has_graphics_queue_family(&self) -> bool {
        self.queue_families
            .iter()
            .any(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
    }

    pub fn has_swapchain_extension(&self) -> bool {
        let swapchain = ash::extensions::khr::Swapchain::name()
            .to_string_lossy()
            .into_owned();
        self.extension_names.iter().any(|e| *e == swapchain)
    }

    fn meets_requirements(&self) -> bool {
        self.has_graphics_queue_family() && self.has_swapchain_extension()
    }
}

/// Enumerate adapters and pick one per the selection policy.
/// Fatal if no adapters exist or none qualify.
pub fn select_physical_device(
    instance: &Instance,
    preferred_name: &str,
) -> RenderResult<PhysicalDevice> {
    log::info!("Selecting physical device");

    let handles = unsafe { instance.instance.enumerate_physical_devices()? };
    if handles.is_empty() {
        return Err(RenderError::NoSuitableDevice);
    }

    let candidates = handles
        .into_iter()
        .map(|h| PhysicalDevice::query(&instance.instance, h))
        .collect();

    let selected = choose_adapter(candidates, preferred_name)?;
    log::info!("Selected device: [{}]", selected.name);
    log::info!(
        "API version: {}.{}.{}",
        vk::api_version_major(selected.properties.api_version),
        vk::api_version_minor(selected.properties.api_version),
        vk::api_version_patch(selected.properties.api_version)
    );
    Ok(selected)
}

/// Selection policy over capability snapshots. Unqualified adapters are
/// dropped as they are seen; a preferred-name match short-circuits.
fn choose_adapter(
    candidates: Vec<PhysicalDevice>,
    preferred_name: &str,
) -> RenderResult<PhysicalDevice> {
    let mut qualifying = Vec::new();
    for device in candidates {
        if device.meets_requirements() {
            log::info!("Device [{}] supports required extensions", device.name);
            if !preferred_name.is_empty() && device.name == preferred_name {
                return Ok(device);
            }
            qualifying.push(device);
        } else {
            log::info!("Device [{}] does not support required extensions", device.name);
        }
    }

    if qualifying.is_empty() {
        return Err(RenderError::NoSuitableDevice);
    }
    Ok(qualifying.remove(0))
}

/// Logical connection to the chosen adapter.
/// Owned by the renderer; outlives every GPU resource created from it.
pub struct LogicalDevice {
    pub physical: PhysicalDevice,
    pub device: ash::Device,
}

impl LogicalDevice {
    pub fn new(instance: &Instance, physical: PhysicalDevice) -> RenderResult<Arc<Self>> {
        log::info!("Creating logical device");

        // One queue per family so graphics and present queues can be
        // retrieved later regardless of which families they land on
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = (0..physical.queue_families.len())
            .map(|index| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(index as u32)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extensions = [ash::extensions::khr::Swapchain::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .instance
                .create_device(physical.handle, &create_info, None)?
        };

        Ok(Arc::new(Self { physical, device }))
    }

    pub fn wait_idle(&self) -> RenderResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        log::info!("Destroying logical device");
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

/// Submission endpoint; serializes command-buffer batches to hardware.
#[derive(Clone, Copy)]
pub struct Queue {
    pub handle: vk::Queue,
    pub family_index: u32,
}

impl Queue {
    /// Queue from the first graphics-capable family
    pub fn graphics(device: &LogicalDevice) -> RenderResult<Self> {
        let family_index = device
            .physical
            .queue_families
            .iter()
            .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .ok_or(RenderError::NoSuitableDevice)? as u32;
        Ok(Self::fetch(device, family_index))
    }

    /// Queue from the first family that can present to the surface
    pub fn present(device: &LogicalDevice, surface: &Surface) -> RenderResult<Self> {
        let mut family_index = None;
        for index in 0..device.physical.queue_families.len() as u32 {
            let supported = unsafe {
                surface.loader.get_physical_device_surface_support(
                    device.physical.handle,
                    index,
                    surface.handle,
                )?
            };
            if supported {
                family_index = Some(index);
                break;
            }
        }
        let family_index = family_index.ok_or(RenderError::NoSuitableDevice)?;
        Ok(Self::fetch(device, family_index))
    }

    fn fetch(device: &LogicalDevice, family_index: u32) -> Self {
        let handle = unsafe { device.device.get_device_queue(family_index, 0) };
        Self {
            handle,
            family_index,
        }
    }

    /// Submit one command buffer with optional wait/signal semaphores and a
    /// completion fence
    pub fn submit(
        &self,
        device: &LogicalDevice,
        command_buffer: vk::CommandBuffer,
        wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
        signal: Option<vk::Semaphore>,
        fence: vk::Fence,
    ) -> RenderResult<()> {
        let command_buffers = [command_buffer];
        let wait_semaphores;
        let wait_stages;
        let signal_semaphores;

        let mut submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
        if let Some((semaphore, stage)) = wait {
            wait_semaphores = [semaphore];
            wait_stages = [stage];
            submit_info = submit_info
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages);
        }
        if let Some(semaphore) = signal {
            signal_semaphores = [semaphore];
            submit_info = submit_info.signal_semaphores(&signal_semaphores);
        }

        unsafe {
            device
                .device
                .queue_submit(self.handle, &[submit_info.build()], fence)?;
        }
        Ok(())
    }

    /// Full drain; only used at shutdown and around swap-chain rebuilds
    pub fn wait_idle(&self, device: &LogicalDevice) -> RenderResult<()> {
        unsafe { device.device.queue_wait_idle(self.handle)? };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(name: &str, graphics: bool, swapchain: bool) -> PhysicalDevice {
        let queue_families = if graphics {
            vec![vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::GRAPHICS,
                queue_count: 1,
                ..Default::default()
            }]
        } else {
            vec![vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::COMPUTE,
                queue_count: 1,
                ..Default::default()
            }]
        };
        let extension_names = if swapchain {
            vec!["VK_KHR_swapchain".to_string()]
        } else {
            vec!["VK_KHR_maintenance1".to_string()]
        };
        PhysicalDevice {
            handle: vk::PhysicalDevice::null(),
            name: name.to_string(),
            properties: Default::default(),
            queue_families,
            extension_names,
            memory_properties: Default::default(),
        }
    }

    #[test]
    fn preferred_name_wins() {
        let candidates = vec![
            snapshot("Integrated", true, true),
            snapshot("Discrete", true, true),
        ];
        let selected = choose_adapter(candidates, "Discrete").unwrap();
        assert_eq!(selected.name, "Discrete");
    }

    #[test]
    fn first_qualifying_without_preference() {
        let candidates = vec![
            snapshot("NoSwapchain", true, false),
            snapshot("First", true, true),
            snapshot("Second", true, true),
        ];
        let selected = choose_adapter(candidates, "").unwrap();
        assert_eq!(selected.name, "First");
    }

    #[test]
    fn unknown_preference_falls_back_to_first() {
        let candidates = vec![
            snapshot("First", true, true),
            snapshot("Second", true, true),
        ];
        let selected = choose_adapter(candidates, "Missing").unwrap();
        assert_eq!(selected.name, "First");
    }

    #[test]
    fn rejects_adapters_missing_requirements() {
        let candidates = vec![
            snapshot("NoGraphics", false, true),
            snapshot("NoSwapchain", true, false),
        ];
        assert!(matches!(
            choose_adapter(candidates, ""),
            Err(RenderError::NoSuitableDevice)
        ));
    }

    #[test]
    fn empty_adapter_list_is_fatal() {
        assert!(matches!(
            choose_adapter(Vec::new(), ""),
            Err(RenderError::NoSuitableDevice)
        ));
    }
}
