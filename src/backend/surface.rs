// Presentation surface bound to one window
//
// Owned by the renderer; destroyed before the instance.

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::backend::instance::Instance;
use crate::error::RenderResult;

pub struct Surface {
    pub loader: ash::extensions::khr::Surface,
    pub handle: vk::SurfaceKHR,
}

impl Surface {
    pub fn new(
        instance: &Instance,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> RenderResult<Self> {
        log::info!("Creating Vulkan surface");
        let loader = ash::extensions::khr::Surface::new(&instance.entry, &instance.instance);
        let handle = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                display_handle,
                window_handle,
                None,
            )?
        };
        Ok(Self { loader, handle })
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan surface");
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}
