use std::{convert::identity, ffi::CStr};

use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::foundation::device::GfxDevice;

/// 使用 dynamic rendering 的 graphics pipeline 配置
///
/// 顶点数据通过 buffer device address 在 shader 中读取，因此默认没有 vertex input。
/// 只有一个 color attachment，blend 状态通过 `blend_*` 系列方法设置
pub struct GfxGraphicsPipelineCreateInfo {
    /// dynamic render 需要的 framebuffer 信息
    color_attach_format: vk::Format,
    /// dynamic render 需要的 framebuffer 信息
    depth_attach_format: vk::Format,

    shader_stages: Vec<(vk::ShaderStageFlags, vk::ShaderModule, &'static CStr)>,

    primitive_topology: vk::PrimitiveTopology,

    rasterize_state_info: vk::PipelineRasterizationStateCreateInfo<'static>,

    color_attach_blend_state: vk::PipelineColorBlendAttachmentState,

    depth_stencil_info: vk::PipelineDepthStencilStateCreateInfo<'static>,

    dynamic_states: Vec<vk::DynamicState>,
}
impl Default for GfxGraphicsPipelineCreateInfo {
    fn default() -> Self {
        Self {
            // format = undefined 表示不使用这个 attachment
            color_attach_format: vk::Format::UNDEFINED,
            depth_attach_format: vk::Format::UNDEFINED,

            shader_stages: vec![],

            primitive_topology: vk::PrimitiveTopology::TRIANGLE_LIST,

            rasterize_state_info: vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(vk::PolygonMode::FILL)
                .line_width(1.0)
                .cull_mode(vk::CullModeFlags::NONE)
                .front_face(vk::FrontFace::CLOCKWISE)
                .depth_bias_enable(false),

            color_attach_blend_state: vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false),

            depth_stencil_info: vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(false)
                .depth_write_enable(false)
                .depth_compare_op(vk::CompareOp::NEVER)
                .depth_bounds_test_enable(false)
                .stencil_test_enable(false)
                .min_depth_bounds(0.0)
                .max_depth_bounds(1.0),
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }
}
// builder
impl GfxGraphicsPipelineCreateInfo {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// builder
    #[inline]
    pub fn attach_info(&mut self, color_attach_format: vk::Format, depth_format: Option<vk::Format>) -> &mut Self {
        self.color_attach_format = color_attach_format;
        self.depth_attach_format = depth_format.unwrap_or(vk::Format::UNDEFINED);
        self
    }

    /// builder
    #[inline]
    pub fn vertex_shader_stage(&mut self, module: vk::ShaderModule, entry_point: &'static CStr) -> &mut Self {
        self.shader_stages.push((vk::ShaderStageFlags::VERTEX, module, entry_point));
        self
    }

    /// builder
    #[inline]
    pub fn fragment_shader_stage(&mut self, module: vk::ShaderModule, entry_point: &'static CStr) -> &mut Self {
        self.shader_stages.push((vk::ShaderStageFlags::FRAGMENT, module, entry_point));
        self
    }

    #[inline]
    pub fn topology(&mut self, topology: vk::PrimitiveTopology) -> &mut Self {
        self.primitive_topology = topology;
        self
    }

    #[inline]
    pub fn cull_mode(&mut self, mode: vk::CullModeFlags, front_face: vk::FrontFace) -> &mut Self {
        self.rasterize_state_info.cull_mode = mode;
        self.rasterize_state_info.front_face = front_face;
        self
    }

    /// depth_test_op 为 None 时关闭深度测试
    #[inline]
    pub fn depth_test(&mut self, depth_test_op: Option<vk::CompareOp>, depth_write: bool) -> &mut Self {
        self.depth_stencil_info.depth_test_enable = depth_test_op.map_or(vk::FALSE, |_| vk::TRUE);
        self.depth_stencil_info.depth_compare_op = depth_test_op.map_or(vk::CompareOp::NEVER, identity);
        self.depth_stencil_info.depth_write_enable = if depth_write { vk::TRUE } else { vk::FALSE };
        self
    }

    #[inline]
    pub fn blend_none(&mut self) -> &mut Self {
        self.color_attach_blend_state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false);
        self
    }

    /// out = src.rgb * src.a + dst.rgb
    #[inline]
    pub fn blend_additive(&mut self) -> &mut Self {
        self.blend_with_dst_factor(vk::BlendFactor::ONE)
    }

    /// out = src.rgb * src.a + dst.rgb * (1 - src.a)
    #[inline]
    pub fn blend_alpha(&mut self) -> &mut Self {
        self.blend_with_dst_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
    }

    fn blend_with_dst_factor(&mut self, dst_factor: vk::BlendFactor) -> &mut Self {
        self.color_attach_blend_state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(dst_factor)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD);
        self
    }
}
// build
impl GfxGraphicsPipelineCreateInfo {
    pub fn build(
        &self,
        device: &GfxDevice,
        pipeline_layout: vk::PipelineLayout,
        debug_name: &str,
    ) -> anyhow::Result<vk::Pipeline> {
        // dynamic rendering 需要的 framebuffer 信息
        let color_formats = [self.color_attach_format];
        let mut attach_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(self.depth_attach_format);

        let shader_stages_info = self
            .shader_stages
            .iter()
            .map(|&(stage, module, entry_point)| {
                vk::PipelineShaderStageCreateInfo::default().stage(stage).module(module).name(entry_point)
            })
            .collect_vec();

        let vertex_input_state_info = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.primitive_topology)
            .primitive_restart_enable(false);

        // viewport 和 scissor 具体值由 dynamic 决定，但是数量由该 create info 决定
        let viewport_info = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };

        let msaa_info = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(std::slice::from_ref(&self.color_attach_blend_state));

        let dynamic_state_info = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&self.dynamic_states);

        // =======================================
        // === 创建 pipeline

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages_info)
            .vertex_input_state(&vertex_input_state_info)
            .input_assembly_state(&input_assembly_info)
            .viewport_state(&viewport_info)
            .rasterization_state(&self.rasterize_state_info)
            .multisample_state(&msaa_info)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&self.depth_stencil_info)
            .layout(pipeline_layout)
            .dynamic_state(&dynamic_state_info)
            .push_next(&mut attach_info);

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
                .map_err(|(_, e)| e)
                .with_context(|| format!("failed to create graphics pipeline {debug_name}"))?
        };
        let pipeline = pipelines.into_iter().next().context("driver returned no graphics pipeline")?;
        device.set_object_debug_name(pipeline, format!("GfxGraphicsPipeline::{debug_name}"));
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_additive_blend_keeps_dst() {
        let mut info = GfxGraphicsPipelineCreateInfo::new();
        info.blend_additive();
        let state = info.color_attach_blend_state;
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(state.dst_color_blend_factor, vk::BlendFactor::ONE);

        info.blend_alpha();
        assert_eq!(info.color_attach_blend_state.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);

        info.blend_none();
        assert_eq!(info.color_attach_blend_state.blend_enable, vk::FALSE);
    }

    #[test]
    fn test_depth_test_toggle() {
        let mut info = GfxGraphicsPipelineCreateInfo::new();
        info.depth_test(Some(vk::CompareOp::GREATER_OR_EQUAL), false);
        assert_eq!(info.depth_stencil_info.depth_test_enable, vk::TRUE);
        assert_eq!(info.depth_stencil_info.depth_write_enable, vk::FALSE);
        assert_eq!(info.depth_stencil_info.depth_compare_op, vk::CompareOp::GREATER_OR_EQUAL);

        info.depth_test(None, false);
        assert_eq!(info.depth_stencil_info.depth_test_enable, vk::FALSE);
        assert_eq!(info.depth_stencil_info.depth_compare_op, vk::CompareOp::NEVER);
    }
}
