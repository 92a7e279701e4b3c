// Renderer - owns the full device/resource lifecycle graph
//
// Field order encodes destruction order: children are declared before the
// parents they borrow from, so Drop tears everything down in reverse
// creation order after the queues and device have drained.

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use winit::window::Window;

use crate::backend::command::CommandPool;
use crate::backend::device::{select_physical_device, LogicalDevice, Queue};
use crate::backend::instance::Instance;
use crate::backend::model::{has_texture_coordinates, upload_models, GpuModel, ModelData};
use crate::backend::pipeline::PipelineCache;
use crate::backend::surface::Surface;
use crate::backend::swapchain::Swapchain;
use crate::config::Config;
use crate::error::RenderResult;
use crate::forward::ForwardPass;

pub struct Renderer {
    models: Vec<GpuModel>,
    forward: ForwardPass,
    pipeline_cache: PipelineCache,
    command_pool: Arc<CommandPool>,
    swapchain: Swapchain,
    surface: Surface,
    graphics_queue: Queue,
    present_queue: Queue,
    device: Arc<LogicalDevice>,
    instance: Instance,

    // Settings carried for swap-chain rebuilds
    requested_images: u32,
    present_mode: ash::vk::PresentModeKHR,

    // Scene vertex format, fixed by the first model load
    textured_geometry: Option<bool>,
}

impl Renderer {
    pub fn new(config: &Config, window: &Window) -> Result<Self> {
        let display_handle = window.display_handle()?.as_raw();
        let window_handle = window.window_handle()?.as_raw();

        let instance = Instance::new(config, display_handle)?;
        let physical = select_physical_device(&instance, &config.engine.device_name)?;
        let device = LogicalDevice::new(&instance, physical)?;
        let surface = Surface::new(&instance, display_handle, window_handle)?;
        let graphics_queue = Queue::graphics(&device)?;

        let size = window.inner_size();
        let requested_images = config.engine.image_count;
        let present_mode = config.engine.present_mode();
        let swapchain = Swapchain::new(
            device.clone(),
            &instance.instance,
            &surface,
            size.width,
            size.height,
            requested_images,
            present_mode,
            None,
        )?;
        let present_queue = Queue::present(&device, &surface)?;

        let command_pool = CommandPool::new(device.clone(), graphics_queue.family_index)?;
        let pipeline_cache = PipelineCache::new(device.clone())?;
        let forward = ForwardPass::new(
            device.clone(),
            &swapchain,
            command_pool.clone(),
            &pipeline_cache,
            false,
        )?;

        Ok(Self {
            models: Vec::new(),
            forward,
            pipeline_cache,
            command_pool,
            swapchain,
            surface,
            graphics_queue,
            present_queue,
            device,
            instance,
            requested_images,
            present_mode,
            textured_geometry: None,
        })
    }

    /// Upload models through the staging path; geometry is static once
    /// loaded. The first load fixes the scene vertex format and rebuilds
    /// the pipeline to match; later loads are normalized to that format.
    pub fn load_models(&mut self, models: &[ModelData]) -> RenderResult<()> {
        log::info!("Loading {} model(s)", models.len());

        let textured = match self.textured_geometry {
            Some(textured) => textured,
            None => {
                let textured = has_texture_coordinates(models);
                self.textured_geometry = Some(textured);
                if textured {
                    self.rebuild_forward_pass()?;
                }
                textured
            }
        };

        let uploaded = upload_models(
            &self.device,
            &self.command_pool,
            &self.graphics_queue,
            models,
            textured,
        )?;
        self.models.extend(uploaded);
        Ok(())
    }

    /// One frame: acquire, record, submit, present. A stale surface at
    /// either end of the cycle triggers a full swap-chain rebuild instead
    /// of a draw.
    pub fn render(&mut self, window: &Window) -> RenderResult<()> {
        if self.swapchain.acquire_next_image()? {
            self.rebuild_swapchain(window)?;
            return Ok(());
        }

        self.forward.record(&self.swapchain, &self.models)?;
        self.forward.submit(&self.graphics_queue, &self.swapchain)?;

        if self.swapchain.present(&self.present_queue)? {
            self.rebuild_swapchain(window)?;
        }
        Ok(())
    }

    /// Rebuild the swap chain and every size-dependent resource. The old
    /// swap chain is passed to the new one's creation so the platform can
    /// retire it cleanly.
    pub fn rebuild_swapchain(&mut self, window: &Window) -> RenderResult<()> {
        let size = window.inner_size();
        log::info!("Rebuilding swap chain: {}x{}", size.width, size.height);

        self.device.wait_idle()?;

        let swapchain = Swapchain::new(
            self.device.clone(),
            &self.instance.instance,
            &self.surface,
            size.width,
            size.height,
            self.requested_images,
            self.present_mode,
            Some(self.swapchain.handle),
        )?;
        self.swapchain = swapchain;

        self.forward = ForwardPass::new(
            self.device.clone(),
            &self.swapchain,
            self.command_pool.clone(),
            &self.pipeline_cache,
            self.textured_geometry.unwrap_or(false),
        )?;
        Ok(())
    }

    /// Rebuild only the forward pass, keeping the current swap chain
    fn rebuild_forward_pass(&mut self) -> RenderResult<()> {
        self.device.wait_idle()?;
        self.forward = ForwardPass::new(
            self.device.clone(),
            &self.swapchain,
            self.command_pool.clone(),
            &self.pipeline_cache,
            self.textured_geometry.unwrap_or(false),
        )?;
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Shutting down renderer");
        let _ = self.present_queue.wait_idle(&self.device);
        let _ = self.graphics_queue.wait_idle(&self.device);
        let _ = self.device.wait_idle();
        // Fields drop in declaration order: models, forward pass, pipeline
        // cache, command pool, swap chain, surface, device, instance.
    }
}
