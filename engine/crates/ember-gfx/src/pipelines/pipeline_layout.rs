use anyhow::Context;
use ash::vk;

use crate::foundation::device::GfxDevice;

/// 多个 pipeline 可以共享同一个 layout，因此只返回 handle，由调用方决定何时销毁
pub fn create_pipeline_layout(
    device: &GfxDevice,
    descriptor_set_layouts: &[vk::DescriptorSetLayout],
    push_constant_ranges: &[vk::PushConstantRange],
    debug_name: &str,
) -> anyhow::Result<vk::PipelineLayout> {
    let pipeline_layout_create_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(descriptor_set_layouts)
        .push_constant_ranges(push_constant_ranges);
    let layout = unsafe {
        device
            .create_pipeline_layout(&pipeline_layout_create_info, None)
            .with_context(|| format!("failed to create pipeline layout {debug_name}"))?
    };
    device.set_object_debug_name(layout, format!("GfxPipelineLayout::{debug_name}"));
    Ok(layout)
}
