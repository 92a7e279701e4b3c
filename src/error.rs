// Error taxonomy for the renderer
//
// Fatal conditions (failed API calls, no usable adapter, no usable memory
// type) surface as `RenderError` and unwind to the binary boundary.
// A stale presentation surface is never an error: acquire/present report it
// as a boolean resize flag. Missing validation layers only degrade.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Vulkan call failed: {0}")]
    Api(#[from] vk::Result),

    #[error("no suitable physical device found")]
    NoSuitableDevice,

    #[error("no memory type matches type bits {type_bits:#x} with properties {required:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    #[error("failed to read shader {path:?}")]
    Shader {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
