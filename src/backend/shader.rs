// Shader modules from precompiled SPIR-V
//
// The engine only consumes compiled bytes plus a stage tag; compilation
// happens at build time (see build.rs).

use ash::vk;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::device::LogicalDevice;
use crate::error::{RenderError, RenderResult};

/// Stage tag plus the path of the compiled SPIR-V binary
pub struct ShaderModuleInfo {
    pub stage: vk::ShaderStageFlags,
    pub path: PathBuf,
}

impl ShaderModuleInfo {
    pub fn new(stage: vk::ShaderStageFlags, path: impl AsRef<Path>) -> Self {
        Self {
            stage,
            path: path.as_ref().to_path_buf(),
        }
    }
}

pub struct ShaderModule {
    pub stage: vk::ShaderStageFlags,
    pub handle: vk::ShaderModule,
}

/// The set of shader modules bound into one pipeline
pub struct ShaderProgram {
    device: Arc<LogicalDevice>,
    pub modules: Vec<ShaderModule>,
}

impl ShaderProgram {
    pub fn new(device: Arc<LogicalDevice>, infos: &[ShaderModuleInfo]) -> RenderResult<Self> {
        let mut modules = Vec::with_capacity(infos.len());
        for info in infos {
            let bytes = std::fs::read(&info.path).map_err(|source| RenderError::Shader {
                path: info.path.clone(),
                source,
            })?;
            let code = ash::util::read_spv(&mut Cursor::new(&bytes)).map_err(|source| {
                RenderError::Shader {
                    path: info.path.clone(),
                    source,
                }
            })?;
            let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
            let handle = unsafe { device.device.create_shader_module(&create_info, None)? };
            modules.push(ShaderModule {
                stage: info.stage,
                handle,
            });
        }
        Ok(Self { device, modules })
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        unsafe {
            for module in &self.modules {
                self.device.device.destroy_shader_module(module.handle, None);
            }
        }
    }
}
