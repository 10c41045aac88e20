use std::rc::Rc;

use ash::vk;
use ember_gfx::{
    deletion_queue::{DeletionQueue, GfxDeletion},
    descriptors::allocator::GfxGrowableDescriptorAllocator,
    gfx::Gfx,
    resources::{buffer::GfxBuffer, image::GfxImageHandle, sampler::GfxSamplerDesc},
};
use ember_scene::material::{GltfMaterial, MaterialInstance, MaterialPass};
use glam::Vec4;

use crate::{
    material_binder::{GltfMetallicRoughness, MaterialConstants, MaterialResources},
    upload,
};

/// 引擎启动时创建的默认纹理、sampler 与材质
///
/// 全部 GPU 对象都属于 main deletion queue
pub struct DefaultResources {
    pub white_image: GfxImageHandle,
    pub grey_image: GfxImageHandle,
    pub black_image: GfxImageHandle,
    /// 纹理缺失时使用的品红黑棋盘格
    pub error_checkerboard_image: GfxImageHandle,

    pub sampler_linear: vk::Sampler,
    pub sampler_nearest: vk::Sampler,

    /// 绑定白色纹理的默认材质，用于没有材质的 surface
    pub default_material: Rc<GltfMaterial>,
}

// new & init
impl DefaultResources {
    const CHECKERBOARD_SIZE: u32 = 16;

    pub fn new(
        gfx: &Gfx,
        metal_rough_material: &mut GltfMetallicRoughness,
        descriptor_allocator: &mut GfxGrowableDescriptorAllocator,
        deletion_queue: &mut DeletionQueue<GfxDeletion>,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("DefaultResources::new");

        let mut solid_image = |color: Vec4, name: &str| {
            let pixel = pack_unorm4x8(color);
            upload::create_image(
                gfx,
                bytemuck::bytes_of(&pixel),
                vk::Extent2D { width: 1, height: 1 },
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::SAMPLED,
                false,
                name,
                deletion_queue,
            )
        };
        let white_image = solid_image(Vec4::ONE, "default-white")?;
        let grey_image = solid_image(Vec4::new(0.66, 0.66, 0.66, 1.0), "default-grey")?;
        let black_image = solid_image(Vec4::ZERO, "default-black")?;

        let checkerboard = checkerboard_pixels(Self::CHECKERBOARD_SIZE);
        let error_checkerboard_image = upload::create_image(
            gfx,
            bytemuck::cast_slice(&checkerboard),
            vk::Extent2D {
                width: Self::CHECKERBOARD_SIZE,
                height: Self::CHECKERBOARD_SIZE,
            },
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
            false,
            "default-error-checkerboard",
            deletion_queue,
        )?;

        let sampler_nearest = GfxSamplerDesc::nearest().create(gfx.device(), "default-nearest")?;
        deletion_queue.push(GfxDeletion::Sampler(sampler_nearest));
        let sampler_linear = GfxSamplerDesc::linear().create(gfx.device(), "default-linear")?;
        deletion_queue.push(GfxDeletion::Sampler(sampler_linear));

        let constants_buffer = GfxBuffer::new(
            gfx,
            size_of::<MaterialConstants>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            true,
            "default-material-constants",
        )?;
        let constants_handle = constants_buffer.vk_buffer();
        let written = constants_buffer.write_by_mmap(gfx, 0, &[MaterialConstants::default()]);
        deletion_queue.push(GfxDeletion::Buffer(constants_buffer));
        written?;

        let resources = MaterialResources {
            color_image: white_image,
            color_sampler: sampler_linear,
            metal_rough_image: white_image,
            metal_rough_sampler: sampler_linear,
            data_buffer: constants_handle,
            data_buffer_offset: 0,
        };
        let default_material: MaterialInstance = metal_rough_material.write_material(
            gfx.device(),
            MaterialPass::Opaque,
            &resources,
            descriptor_allocator,
        )?;

        Ok(Self {
            white_image,
            grey_image,
            black_image,
            error_checkerboard_image,
            sampler_linear,
            sampler_nearest,
            default_material: Rc::new(GltfMaterial {
                name: "default".to_string(),
                data: default_material,
            }),
        })
    }
}

/// 与 glsl 的 packUnorm4x8 一致：x 在最低字节
pub fn pack_unorm4x8(color: Vec4) -> u32 {
    let to_byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u32;
    to_byte(color.x) | (to_byte(color.y) << 8) | (to_byte(color.z) << 16) | (to_byte(color.w) << 24)
}

/// size x size 的品红与黑色交错棋盘格
pub fn checkerboard_pixels(size: u32) -> Vec<u32> {
    let magenta = pack_unorm4x8(Vec4::new(1.0, 0.0, 1.0, 1.0));
    let black = pack_unorm4x8(Vec4::ZERO);
    (0..size)
        .flat_map(|y| (0..size).map(move |x| if (x % 2) ^ (y % 2) == 1 { magenta } else { black }))
        .collect()
}
