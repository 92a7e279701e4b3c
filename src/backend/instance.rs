// Vulkan instance with optional validation layers
//
// Validation layer selection falls back through three tiers: the canonical
// Khronos layer, the legacy LunarG meta-layer, then a fixed list of granular
// layers filtered to those the loader actually supports. If validation was
// requested but nothing is supported, the instance is created without
// validation and a warning is logged.

use anyhow::{anyhow, Context};
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{CStr, CString};

use crate::config::Config;
use crate::error::RenderResult;

/// Engine identity reported in `VkApplicationInfo`
const ENGINE_NAME: &str = "Cobalt";
const ENGINE_VERSION: u32 = vk::make_api_version(0, 0, 1, 0);

/// Granular layers tried when neither meta-layer is available
const FALLBACK_LAYERS: [&str; 5] = [
    "VK_LAYER_GOOGLE_threading",
    "VK_LAYER_LUNARG_parameter_validation",
    "VK_LAYER_LUNARG_object_tracker",
    "VK_LAYER_LUNARG_core_validation",
    "VK_LAYER_GOOGLE_unique_objects",
];

/// Process-wide handle to the Vulkan API.
/// Owns the loader entry, the instance, and the debug messenger (if any).
/// Destroyed last, after every object created from it.
pub struct Instance {
    pub entry: Entry,
    pub instance: ash::Instance,
    debug: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    pub fn new(config: &Config, display_handle: RawDisplayHandle) -> anyhow::Result<Self> {
        log::info!("Creating Vulkan instance");

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Resolve validation layers, degrading gracefully when unsupported
        let supported_layers = enumerate_layer_names(&entry)?;
        let mut layers = if config.engine.validation_enabled {
            select_validation_layers(&supported_layers)
        } else {
            Vec::new()
        };
        if config.engine.validation_enabled && layers.is_empty() {
            log::warn!(
                "Requested validation, but no supported validation layers found. \
                 Falling back to no validation."
            );
        }
        let validation = !layers.is_empty();
        for layer in &layers {
            log::info!("Using validation layer [{}]", layer);
        }

        let app_name = CString::new(config.window.title.as_str())?;
        let engine_name = CString::new(ENGINE_NAME)?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(ENGINE_VERSION)
            .api_version(config.engine.api_version());

        // Surface extensions for the windowing system, plus debug utils when
        // validation is active
        let mut extensions =
            ash_window::enumerate_required_extensions(display_handle)?.to_vec();
        if validation {
            extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
        }

        let layer_cstrings: Vec<CString> = layers
            .drain(..)
            .map(CString::new)
            .collect::<Result<_, _>>()?;
        let layer_pointers: Vec<*const std::os::raw::c_char> =
            layer_cstrings.iter().map(|l| l.as_ptr()).collect();

        let mut debug_info = debug_messenger_info();
        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_pointers);
        if validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|e| anyhow!("Error creating Vulkan instance: {}", e))?;

        let debug = if validation {
            let debug_utils = ash::extensions::ext::DebugUtils::new(&entry, &instance);
            let messenger = unsafe {
                debug_utils.create_debug_utils_messenger(&debug_messenger_info(), None)?
            };
            Some((debug_utils, messenger))
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug,
        })
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance");
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn enumerate_layer_names(entry: &Entry) -> RenderResult<Vec<String>> {
    let properties = entry.enumerate_instance_layer_properties()?;
    let names = properties
        .iter()
        .map(|p| {
            unsafe { CStr::from_ptr(p.layer_name.as_ptr()) }
                .to_string_lossy()
                .into_owned()
        })
        .collect::<Vec<_>>();
    log::info!("Vulkan instance supports {} layers", names.len());
    for name in &names {
        log::debug!("Supported layer [{}]", name);
    }
    Ok(names)
}

/// Pick validation layers from the supported set:
/// canonical layer, then the legacy meta-layer, then whatever subset of the
/// granular layers is available.
fn select_validation_layers(supported: &[String]) -> Vec<&'static str> {
    if supported.iter().any(|l| l == "VK_LAYER_KHRONOS_validation") {
        return vec!["VK_LAYER_KHRONOS_validation"];
    }
    if supported
        .iter()
        .any(|l| l == "VK_LAYER_LUNARG_standard_validation")
    {
        return vec!["VK_LAYER_LUNARG_standard_validation"];
    }
    FALLBACK_LAYERS
        .iter()
        .copied()
        .filter(|requested| supported.iter().any(|l| l == requested))
        .collect()
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXTBuilder<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

// Maps Vulkan debug message severities onto log levels
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn prefers_canonical_layer() {
        let supported = names(&[
            "VK_LAYER_LUNARG_core_validation",
            "VK_LAYER_KHRONOS_validation",
            "VK_LAYER_LUNARG_standard_validation",
        ]);
        assert_eq!(
            select_validation_layers(&supported),
            vec!["VK_LAYER_KHRONOS_validation"]
        );
    }

    #[test]
    fn falls_back_to_legacy_layer() {
        let supported = names(&["VK_LAYER_LUNARG_standard_validation"]);
        assert_eq!(
            select_validation_layers(&supported),
            vec!["VK_LAYER_LUNARG_standard_validation"]
        );
    }

    #[test]
    fn filters_granular_layers_to_supported() {
        let supported = names(&[
            "VK_LAYER_LUNARG_core_validation",
            "VK_LAYER_GOOGLE_threading",
            "VK_LAYER_NV_optimus",
        ]);
        assert_eq!(
            select_validation_layers(&supported),
            vec!["VK_LAYER_GOOGLE_threading", "VK_LAYER_LUNARG_core_validation"]
        );
    }

    #[test]
    fn empty_when_nothing_supported() {
        let supported = names(&["VK_LAYER_NV_optimus"]);
        assert!(select_validation_layers(&supported).is_empty());
    }
}
