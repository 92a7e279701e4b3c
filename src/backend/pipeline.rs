// Static GPU-side configuration of the draw pass
//
// Render pass and pipeline are created once per swap-chain lifetime and
// shared across all frame slots; framebuffers are one per image but
// reference the single shared render pass. Viewport and scissor are
// dynamic so a resize does not force a pipeline rebuild.

use ash::vk;
use std::sync::Arc;

use crate::backend::device::LogicalDevice;
use crate::backend::shader::ShaderProgram;
use crate::error::{RenderError, RenderResult};

pub struct PipelineCache {
    device: Arc<LogicalDevice>,
    pub handle: vk::PipelineCache,
}

impl PipelineCache {
    pub fn new(device: Arc<LogicalDevice>) -> RenderResult<Self> {
        log::info!("Creating pipeline cache");
        let create_info = vk::PipelineCacheCreateInfo::builder();
        let handle = unsafe { device.device.create_pipeline_cache(&create_info, None)? };
        Ok(Self { device, handle })
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        log::info!("Destroying pipeline cache");
        unsafe {
            self.device.device.destroy_pipeline_cache(self.handle, None);
        }
    }
}

/// Single forward color pass over a swap-chain image, no depth attachment
pub struct RenderPass {
    device: Arc<LogicalDevice>,
    pub handle: vk::RenderPass,
}

impl RenderPass {
    pub fn new(device: Arc<LogicalDevice>, format: vk::Format) -> RenderResult<Self> {
        let attachments = [vk::AttachmentDescription::builder()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build()];

        let color_references = [vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build()];

        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_references)
            .build()];

        let dependencies = [vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .build()];

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let handle = unsafe { device.device.create_render_pass(&create_info, None)? };
        Ok(Self { device, handle })
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_render_pass(self.handle, None);
        }
    }
}

/// One framebuffer per swap-chain image, wrapping that image's view
pub struct Framebuffer {
    device: Arc<LogicalDevice>,
    pub handle: vk::Framebuffer,
}

impl Framebuffer {
    pub fn new(
        device: Arc<LogicalDevice>,
        render_pass: &RenderPass,
        image_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> RenderResult<Self> {
        let attachments = [image_view];
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass.handle)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let handle = unsafe { device.device.create_framebuffer(&create_info, None)? };
        Ok(Self { device, handle })
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_framebuffer(self.handle, None);
        }
    }
}

/// Vertex input description: interleaved position, optionally followed by
/// texture coordinates
pub struct VertexLayout {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexLayout {
    const POSITION_COMPONENTS: u32 = 3;
    const TEXTURE_COMPONENTS: u32 = 2;
    const FLOAT_SIZE: u32 = std::mem::size_of::<f32>() as u32;

    pub fn position_only() -> Self {
        let bindings = vec![vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(Self::POSITION_COMPONENTS * Self::FLOAT_SIZE)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()];
        let attributes = vec![vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(0)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(0)
            .build()];
        Self {
            bindings,
            attributes,
        }
    }

    pub fn position_texture() -> Self {
        let stride = (Self::POSITION_COMPONENTS + Self::TEXTURE_COMPONENTS) * Self::FLOAT_SIZE;
        let bindings = vec![vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(stride)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()];
        let attributes = vec![
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(0)
                .build(),
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(Self::POSITION_COMPONENTS * Self::FLOAT_SIZE)
                .build(),
        ];
        Self {
            bindings,
            attributes,
        }
    }
}

/// Graphics pipeline for the forward pass: fixed triangle-list topology,
/// no culling, dynamic viewport/scissor, opaque color writes, no
/// descriptor sets.
pub struct Pipeline {
    device: Arc<LogicalDevice>,
    pub handle: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl Pipeline {
    pub fn new(
        device: Arc<LogicalDevice>,
        cache: &PipelineCache,
        render_pass: &RenderPass,
        shader_program: &ShaderProgram,
        vertex_layout: &VertexLayout,
    ) -> RenderResult<Self> {
        log::info!("Creating pipeline");

        let entry_point = std::ffi::CString::new("main").unwrap();
        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = shader_program
            .modules
            .iter()
            .map(|module| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(module.stage)
                    .module(module.handle)
                    .name(&entry_point)
                    .build()
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&vertex_layout.bindings)
            .vertex_attribute_descriptions(&vertex_layout.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        // Counts only; actual viewport/scissor are dynamic state
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe { device.device.create_pipeline_layout(&layout_info, None)? };

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass.handle)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device
                .device
                .create_graphics_pipelines(cache.handle, &[create_info], None)
                .map_err(|(_, e)| RenderError::Api(e))?
        };

        Ok(Self {
            device,
            handle: pipelines[0],
            layout,
        })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        log::info!("Destroying pipeline");
        unsafe {
            self.device.device.destroy_pipeline(self.handle, None);
            self.device.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_layout_is_tightly_packed() {
        let layout = VertexLayout::position_only();
        assert_eq!(layout.bindings[0].stride, 12);
        assert_eq!(layout.attributes.len(), 1);
        assert_eq!(layout.attributes[0].offset, 0);
        assert_eq!(layout.attributes[0].format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn textured_layout_places_coordinates_after_position() {
        let layout = VertexLayout::position_texture();
        assert_eq!(layout.bindings[0].stride, 20);
        assert_eq!(layout.attributes.len(), 2);
        assert_eq!(layout.attributes[1].location, 1);
        assert_eq!(layout.attributes[1].offset, 12);
        assert_eq!(layout.attributes[1].format, vk::Format::R32G32_SFLOAT);
    }
}
