// Forward render pass - per-frame record/submit machinery
//
// Holds the per-image-slot command buffers and fences alongside the shared
// render pass and pipeline. Slot i runs:
// wait fence -> reset fence -> reset command buffer -> record -> submit
// (wait: image-acquired, signal: render-complete, fence: slot fence).
// Command buffers and fences are allocated once per swap-chain lifetime
// and reused, never reallocated.

use ash::vk;
use std::sync::Arc;

use crate::backend::command::{CommandBuffer, CommandPool};
use crate::backend::device::{LogicalDevice, Queue};
use crate::backend::model::GpuModel;
use crate::backend::pipeline::{
    Framebuffer, Pipeline, PipelineCache, RenderPass, VertexLayout,
};
use crate::backend::shader::{ShaderModuleInfo, ShaderProgram};
use crate::backend::swapchain::Swapchain;
use crate::backend::sync::Fence;
use crate::error::RenderResult;

const VERTEX_SHADER_PATH: &str = "shaders/forward.vert.spv";
const FRAGMENT_SHADER_PATH: &str = "shaders/forward.frag.spv";

const CLEAR_COLOR: [f32; 4] = [0.5, 0.7, 0.9, 1.0];

pub struct ForwardPass {
    device: Arc<LogicalDevice>,
    command_buffers: Vec<CommandBuffer>,
    fences: Vec<Fence>,
    framebuffers: Vec<Framebuffer>,
    pipeline: Pipeline,
    shader_program: ShaderProgram,
    render_pass: RenderPass,
}

impl ForwardPass {
    pub fn new(
        device: Arc<LogicalDevice>,
        swapchain: &Swapchain,
        pool: Arc<CommandPool>,
        cache: &PipelineCache,
        textured: bool,
    ) -> RenderResult<Self> {
        let render_pass = RenderPass::new(device.clone(), swapchain.format.format)?;

        let framebuffers = swapchain
            .image_views
            .iter()
            .map(|&view| Framebuffer::new(device.clone(), &render_pass, view, swapchain.extent))
            .collect::<RenderResult<Vec<_>>>()?;

        let shader_program = ShaderProgram::new(
            device.clone(),
            &[
                ShaderModuleInfo::new(vk::ShaderStageFlags::VERTEX, VERTEX_SHADER_PATH),
                ShaderModuleInfo::new(vk::ShaderStageFlags::FRAGMENT, FRAGMENT_SHADER_PATH),
            ],
        )?;

        let vertex_layout = if textured {
            VertexLayout::position_texture()
        } else {
            VertexLayout::position_only()
        };
        let pipeline = Pipeline::new(
            device.clone(),
            cache,
            &render_pass,
            &shader_program,
            &vertex_layout,
        )?;

        let command_buffers = (0..swapchain.image_count())
            .map(|_| CommandBuffer::new(pool.clone(), false))
            .collect::<RenderResult<Vec<_>>>()?;
        let fences = (0..swapchain.image_count())
            .map(|_| Fence::new(device.clone(), true))
            .collect::<RenderResult<Vec<_>>>()?;

        Ok(Self {
            device,
            command_buffers,
            fences,
            framebuffers,
            pipeline,
            shader_program,
            render_pass,
        })
    }

    /// Record the draw commands for the current frame slot, waiting for and
    /// resetting that slot's fence first
    pub fn record(&self, swapchain: &Swapchain, models: &[GpuModel]) -> RenderResult<()> {
        let index = swapchain.current_frame();
        let extent = swapchain.extent;

        let fence = &self.fences[index];
        let command_buffer = &self.command_buffers[index];
        let framebuffer = &self.framebuffers[index];

        fence.wait()?;
        fence.reset()?;

        command_buffer.reset()?;
        command_buffer.begin()?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: CLEAR_COLOR,
            },
        }];

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass.handle)
            .framebuffer(framebuffer.handle)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        let device = &self.device.device;
        let cmd = command_buffer.handle;
        unsafe {
            device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle);

            // Flipped viewport so +Y points up in clip space
            let viewport = vk::Viewport {
                x: 0.0,
                y: extent.height as f32,
                width: extent.width as f32,
                height: -(extent.height as f32),
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(cmd, 0, &[viewport]);

            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            device.cmd_set_scissor(cmd, 0, &[scissor]);

            for model in models {
                for mesh in &model.meshes {
                    device.cmd_bind_vertex_buffers(cmd, 0, &[mesh.vertex_buffer.handle], &[0]);
                    device.cmd_bind_index_buffer(
                        cmd,
                        mesh.index_buffer.handle,
                        0,
                        vk::IndexType::UINT32,
                    );
                    device.cmd_draw_indexed(cmd, mesh.index_count, 1, 0, 0, 0);
                }
            }

            device.cmd_end_render_pass(cmd);
        }
        command_buffer.end()?;

        Ok(())
    }

    /// Submit the current slot's command buffer with the slot's semaphores
    /// and fence
    pub fn submit(&self, queue: &Queue, swapchain: &Swapchain) -> RenderResult<()> {
        let index = swapchain.current_frame();
        let sync = &swapchain.sync[index];
        queue.submit(
            &self.device,
            self.command_buffers[index].handle,
            Some((
                sync.image_acquired,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            )),
            Some(sync.render_complete),
            self.fences[index].handle,
        )
    }
}
