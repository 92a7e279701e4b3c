// Swap chain - ring of presentable images
//
// Owns one image view and one semaphore pair per image. The round-robin
// slot counter selects which image-acquired semaphore to signal next; the
// index the platform actually returns becomes the current frame, so
// framebuffer/fence selection never desynchronizes under SUBOPTIMAL or
// out-of-order presents.

use ash::vk;
use std::sync::Arc;

use crate::backend::device::{LogicalDevice, Queue};
use crate::backend::surface::Surface;
use crate::backend::sync::SyncSemaphores;
use crate::error::{RenderError, RenderResult};

/// Sentinel the surface reports when its extent is undefined
const UNDEFINED_EXTENT: u32 = 0xFFFF_FFFF;

pub struct Swapchain {
    device: Arc<LogicalDevice>,
    pub loader: ash::extensions::khr::Swapchain,
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub sync: Vec<SyncSemaphores>,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    current_frame: usize,
}

impl Swapchain {
    pub fn new(
        device: Arc<LogicalDevice>,
        instance: &ash::Instance,
        surface: &Surface,
        window_width: u32,
        window_height: u32,
        requested_images: u32,
        present_mode: vk::PresentModeKHR,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> RenderResult<Self> {
        log::info!("Creating swap chain");

        let capabilities = unsafe {
            surface.loader.get_physical_device_surface_capabilities(
                device.physical.handle,
                surface.handle,
            )?
        };

        let count = image_count(&capabilities, requested_images);
        log::info!(
            "Requested [{}], got [{}] images. Surface min [{}], max [{}]",
            requested_images,
            count,
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        let extent = swap_extent(&capabilities, window_width, window_height);
        let format = select_surface_format(&device, surface)?;

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle)
            .min_image_count(count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain.unwrap_or_else(vk::SwapchainKHR::null));

        let loader =
            ash::extensions::khr::Swapchain::new(instance, &device.device);
        let handle = unsafe { loader.create_swapchain(&create_info, None)? };

        let images = unsafe { loader.get_swapchain_images(handle)? };
        log::info!("Created swap chain with {} images", images.len());

        let image_views = images
            .iter()
            .map(|&image| create_image_view(&device, image, format.format))
            .collect::<RenderResult<Vec<_>>>()?;

        let sync = (0..images.len())
            .map(|_| SyncSemaphores::new(device.clone()))
            .collect::<RenderResult<Vec<_>>>()?;

        Ok(Self {
            device,
            loader,
            handle,
            images,
            image_views,
            sync,
            format,
            extent,
            current_frame: 0,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Slot selected by the last acquire; indexes every per-slot array
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Block until the platform hands back an image, signaling the current
    /// slot's image-acquired semaphore. Returns true when the surface is
    /// out of date and the swap chain must be rebuilt.
    pub fn acquire_next_image(&mut self) -> RenderResult<bool> {
        let semaphore = self.sync[self.current_frame].image_acquired;
        let result = unsafe {
            self.loader
                .acquire_next_image(self.handle, u64::MAX, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::debug!("Swap chain suboptimal during acquire");
                }
                self.current_frame = index as usize;
                Ok(false)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(RenderError::Api(e)),
        }
    }

    /// Queue the current image for presentation, waiting on its
    /// render-complete semaphore. Advances the round-robin slot counter on
    /// every non-fatal path.
    pub fn present(&mut self, queue: &Queue) -> RenderResult<bool> {
        let wait_semaphores = [self.sync[self.current_frame].render_complete];
        let swapchains = [self.handle];
        let image_indices = [self.current_frame as u32];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.loader.queue_present(queue.handle, &present_info) };

        let resize = match result {
            Ok(suboptimal) => {
                if suboptimal {
                    log::debug!("Swap chain suboptimal during present");
                }
                false
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(e) => return Err(RenderError::Api(e)),
        };

        self.current_frame = (self.current_frame + 1) % self.images.len();
        Ok(resize)
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        log::info!("Destroying swap chain");
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

/// clamp(requested, min, max > 0 ? max : unbounded), never below min
fn image_count(capabilities: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let mut count = requested;
    if capabilities.max_image_count > 0 {
        count = count.min(capabilities.max_image_count);
    }
    count.max(capabilities.min_image_count)
}

/// Use the surface's reported extent verbatim unless it is undefined, in
/// which case derive it from the window size clamped to the supported range
fn swap_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_width: u32,
    window_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width == UNDEFINED_EXTENT {
        vk::Extent2D {
            width: window_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    } else {
        capabilities.current_extent
    }
}

/// Prefer B8G8R8A8_SRGB with a non-linear sRGB color space, falling back to
/// the first reported format
fn select_surface_format(
    device: &LogicalDevice,
    surface: &Surface,
) -> RenderResult<vk::SurfaceFormatKHR> {
    let formats = unsafe {
        surface
            .loader
            .get_physical_device_surface_formats(device.physical.handle, surface.handle)?
    };
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
        .ok_or(RenderError::Api(vk::Result::ERROR_FORMAT_NOT_SUPPORTED))
}

fn create_image_view(
    device: &LogicalDevice,
    image: vk::Image,
    format: vk::Format,
) -> RenderResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    let view = unsafe { device.device.create_image_view(&create_info, None)? };
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn image_count_clamps_to_range() {
        let caps = capabilities(2, 4);
        assert_eq!(image_count(&caps, 1), 2);
        assert_eq!(image_count(&caps, 3), 3);
        assert_eq!(image_count(&caps, 8), 4);
    }

    #[test]
    fn image_count_unbounded_when_max_is_zero() {
        let caps = capabilities(2, 0);
        assert_eq!(image_count(&caps, 16), 16);
        assert_eq!(image_count(&caps, 1), 2);
    }

    #[test]
    fn image_count_never_below_min() {
        let caps = capabilities(3, 3);
        assert_eq!(image_count(&caps, 1), 3);
        assert_eq!(image_count(&caps, 9), 3);
    }

    #[test]
    fn extent_from_window_when_undefined() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: UNDEFINED_EXTENT,
                height: UNDEFINED_EXTENT,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };
        let extent = swap_extent(&caps, 800, 600);
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn undefined_extent_clamped_to_capabilities() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: UNDEFINED_EXTENT,
                height: UNDEFINED_EXTENT,
            },
            min_image_extent: vk::Extent2D {
                width: 200,
                height: 200,
            },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 1024,
            },
            ..Default::default()
        };
        let extent = swap_extent(&caps, 4000, 100);
        assert_eq!(extent.width, 1024);
        assert_eq!(extent.height, 200);
    }

    #[test]
    fn defined_extent_used_verbatim() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };
        let extent = swap_extent(&caps, 800, 600);
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 1080);
    }
}
