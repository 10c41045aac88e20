use std::ffi::CStr;

use anyhow::Context;
use ash::vk;

use crate::foundation::device::GfxDevice;

pub fn create_compute_pipeline(
    device: &GfxDevice,
    layout: vk::PipelineLayout,
    shader_module: vk::ShaderModule,
    entry_point: &CStr,
    debug_name: &str,
) -> anyhow::Result<vk::Pipeline> {
    let stage_info = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(shader_module)
        .name(entry_point);
    let pipeline_info = vk::ComputePipelineCreateInfo::default().layout(layout).stage(stage_info);

    let pipelines = unsafe {
        device
            .create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
            .map_err(|(_, e)| e)
            .with_context(|| format!("failed to create compute pipeline {debug_name}"))?
    };
    let pipeline = pipelines.into_iter().next().context("driver returned no compute pipeline")?;
    device.set_object_debug_name(pipeline, format!("GfxComputePipeline::{debug_name}"));
    Ok(pipeline)
}
