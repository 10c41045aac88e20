use anyhow::Context;
use ash::vk;

use crate::foundation::device::GfxDevice;

/// 采样器的描述，只保留引擎需要区分的几个字段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxSamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode: vk::SamplerAddressMode,
}

impl Default for GfxSamplerDesc {
    /// 默认配置：linear，repeat
    fn default() -> Self {
        Self::linear()
    }
}

impl GfxSamplerDesc {
    #[inline]
    pub fn linear() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
        }
    }

    #[inline]
    pub fn nearest() -> Self {
        Self {
            mag_filter: vk::Filter::NEAREST,
            min_filter: vk::Filter::NEAREST,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            address_mode: vk::SamplerAddressMode::REPEAT,
        }
    }

    pub fn create_info(&self) -> vk::SamplerCreateInfo<'static> {
        vk::SamplerCreateInfo::default()
            .mag_filter(self.mag_filter)
            .min_filter(self.min_filter)
            .mipmap_mode(self.mipmap_mode)
            .address_mode_u(self.address_mode)
            .address_mode_v(self.address_mode)
            .address_mode_w(self.address_mode)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            // 允许采样到 mip chain 的最后一级
            .max_lod(vk::LOD_CLAMP_NONE)
    }

    /// 返回裸 handle，所有权交给调用方（通常是 deletion queue）
    pub fn create(&self, device: &GfxDevice, debug_name: &str) -> anyhow::Result<vk::Sampler> {
        let sampler = unsafe {
            device
                .create_sampler(&self.create_info(), None)
                .with_context(|| format!("failed to create sampler {debug_name}"))?
        };
        device.set_object_debug_name(sampler, format!("GfxSampler::{debug_name}"));
        Ok(sampler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_desc() {
        let info = GfxSamplerDesc::nearest().create_info();
        assert_eq!(info.mag_filter, vk::Filter::NEAREST);
        assert_eq!(info.min_filter, vk::Filter::NEAREST);
        assert_eq!(info.mipmap_mode, vk::SamplerMipmapMode::NEAREST);
        assert_eq!(info.max_lod, vk::LOD_CLAMP_NONE);
    }

    #[test]
    fn test_default_is_linear_repeat() {
        let desc = GfxSamplerDesc::default();
        assert_eq!(desc, GfxSamplerDesc::linear());
        assert_eq!(desc.create_info().address_mode_w, vk::SamplerAddressMode::REPEAT);
    }
}
