use anyhow::Context;
use ash::vk;

use crate::foundation::device::GfxDevice;

/// descriptor set layout 的构建器，所有 binding 的 descriptor count 都是 1
#[derive(Default)]
pub struct GfxDescriptorLayoutBuilder {
    bindings: Vec<(u32, vk::DescriptorType)>,
}

impl GfxDescriptorLayoutBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// builder
    #[inline]
    pub fn add_binding(mut self, binding: u32, ty: vk::DescriptorType) -> Self {
        self.bindings.push((binding, ty));
        self
    }

    /// 所有 binding 共享同一组 shader stage
    pub fn vk_bindings(&self, stages: vk::ShaderStageFlags) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        self.bindings
            .iter()
            .map(|&(binding, ty)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(ty)
                    .descriptor_count(1)
                    .stage_flags(stages)
            })
            .collect()
    }

    pub fn build(
        &self,
        device: &GfxDevice,
        stages: vk::ShaderStageFlags,
        debug_name: &str,
    ) -> anyhow::Result<vk::DescriptorSetLayout> {
        let bindings = self.vk_bindings(stages);
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe {
            device
                .create_descriptor_set_layout(&create_info, None)
                .with_context(|| format!("failed to create descriptor set layout {debug_name}"))?
        };
        device.set_object_debug_name(layout, format!("GfxDescriptorSetLayout::{debug_name}"));
        Ok(layout)
    }
}
