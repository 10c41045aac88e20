use std::ffi::CStr;

use ash::vk;
use ember_gfx::{
    deletion_queue::{DeletionQueue, GfxDeletion},
    gfx::Gfx,
    pipelines::{compute_pipeline::create_compute_pipeline, pipeline_layout::create_pipeline_layout, shader::GfxShaderModule},
};
use glam::Vec4;

use crate::settings::EngineConfig;

/// background compute shader 的 push constant，4 个 vec4，由各个 effect 自行解释
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ComputePushConstants {
    pub data1: Vec4,
    pub data2: Vec4,
    pub data3: Vec4,
    pub data4: Vec4,
}

/// 一个写入 draw image 的 compute pipeline，以及它的参数
///
/// pipeline 与 layout 属于引擎的 main deletion queue
#[derive(Clone, Debug)]
pub struct ComputeEffect {
    pub name: &'static str,

    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,

    pub data: ComputePushConstants,
}

impl ComputeEffect {
    const ENTRY_POINT: &'static CStr = c"main";

    /// 创建 gradient 与 sky 两个 effect，共享同一个 pipeline layout
    ///
    /// `draw_image_layout` 只包含 binding 0 的 storage image
    pub fn build_background_effects(
        gfx: &Gfx,
        config: &EngineConfig,
        draw_image_layout: vk::DescriptorSetLayout,
        deletion_queue: &mut DeletionQueue<GfxDeletion>,
    ) -> anyhow::Result<Vec<ComputeEffect>> {
        let _span = tracy_client::span!("ComputeEffect::build_background_effects");
        let device = gfx.device();

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(size_of::<ComputePushConstants>() as u32);
        let layout =
            create_pipeline_layout(device, &[draw_image_layout], std::slice::from_ref(&push_range), "background")?;
        deletion_queue.push(GfxDeletion::PipelineLayout(layout));

        let effects = [
            (
                "gradient",
                "gradient_color.comp",
                ComputePushConstants {
                    data1: Vec4::new(1.0, 0.0, 0.0, 1.0),
                    data2: Vec4::new(0.0, 0.0, 1.0, 1.0),
                    ..Default::default()
                },
            ),
            (
                "sky",
                "sky.comp",
                ComputePushConstants {
                    data1: Vec4::new(0.1, 0.2, 0.4, 0.97),
                    ..Default::default()
                },
            ),
        ];

        let mut result = Vec::with_capacity(effects.len());
        for (name, shader, data) in effects {
            let module = GfxShaderModule::new(device, &config.shader_path(shader))?;
            let pipeline = create_compute_pipeline(device, layout, module.handle(), Self::ENTRY_POINT, name);
            module.destroy(device);

            let pipeline = pipeline?;
            deletion_queue.push(GfxDeletion::Pipeline(pipeline));
            result.push(ComputeEffect {
                name,
                pipeline,
                layout,
                data,
            });
        }
        Ok(result)
    }

    /// 覆盖 extent 所需的 work group 数量
    #[inline]
    pub fn group_count(extent: vk::Extent2D) -> glam::UVec3 {
        let group_size = crate::settings::DefaultRendererSettings::COMPUTE_GROUP_SIZE;
        glam::UVec3::new(extent.width.div_ceil(group_size), extent.height.div_ceil(group_size), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constant_size() {
        assert_eq!(size_of::<ComputePushConstants>(), 64);
    }

    #[test]
    fn test_group_count_rounds_up() {
        let groups = ComputeEffect::group_count(vk::Extent2D { width: 1700, height: 900 });
        assert_eq!(groups, glam::UVec3::new(107, 57, 1));

        let groups = ComputeEffect::group_count(vk::Extent2D { width: 32, height: 16 });
        assert_eq!(groups, glam::UVec3::new(2, 1, 1));
    }
}
