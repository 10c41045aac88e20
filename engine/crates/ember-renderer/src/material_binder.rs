use std::ffi::CStr;

use ash::vk;
use ember_gfx::{
    deletion_queue::{DeletionQueue, GfxDeletion},
    descriptors::{
        allocator::GfxGrowableDescriptorAllocator, backend::DescriptorBackend, layout::GfxDescriptorLayoutBuilder,
        writer::GfxDescriptorWriter,
    },
    gfx::Gfx,
    pipelines::{
        graphics_pipeline::GfxGraphicsPipelineCreateInfo, pipeline_layout::create_pipeline_layout,
        shader::GfxShaderModule,
    },
    resources::image::GfxImageHandle,
};
use ember_scene::material::{MaterialInstance, MaterialPass, MaterialPipeline};
use glam::Vec4;

use crate::{
    gpu_data::GpuDrawPushConstants,
    settings::{DefaultRendererSettings, EngineConfig},
};

/// 一个材质的常量数据，补齐到 256 字节
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialConstants {
    pub color_factors: Vec4,
    /// x: metallic, y: roughness
    pub metal_rough_factors: Vec4,
    extra: [Vec4; 14],
}

impl MaterialConstants {
    #[inline]
    pub fn new(color_factors: Vec4, metal_rough_factors: Vec4) -> Self {
        Self {
            color_factors,
            metal_rough_factors,
            extra: [Vec4::ZERO; 14],
        }
    }
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self::new(Vec4::ONE, Vec4::new(1.0, 0.5, 0.0, 0.0))
    }
}

/// 写入材质 descriptor set 需要的资源，全部是 handle
#[derive(Clone, Copy, Debug, Default)]
pub struct MaterialResources {
    pub color_image: GfxImageHandle,
    pub color_sampler: vk::Sampler,
    pub metal_rough_image: GfxImageHandle,
    pub metal_rough_sampler: vk::Sampler,

    /// 存放 `MaterialConstants` 的 uniform buffer
    pub data_buffer: vk::Buffer,
    pub data_buffer_offset: vk::DeviceSize,
}

/// 每个材质常量在 buffer 中的步长：256 字节向上对齐到设备的 minUniformBufferOffsetAlignment
#[inline]
pub fn material_stride(min_ubo_offset_align: vk::DeviceSize) -> vk::DeviceSize {
    DefaultRendererSettings::MATERIAL_CONSTANTS_SIZE.next_multiple_of(min_ubo_offset_align.max(1))
}

/// glTF metallic-roughness 材质
///
/// 不透明与透明两条 pipeline 共享 shader 与 pipeline layout，只有混合与深度写入不同。
/// descriptor set 布局：
/// - binding 0: `MaterialConstants` uniform buffer
/// - binding 1: base color 纹理
/// - binding 2: metallic roughness 纹理
pub struct GltfMetallicRoughness {
    opaque_pipeline: MaterialPipeline,
    transparent_pipeline: MaterialPipeline,

    material_layout: vk::DescriptorSetLayout,

    writer: GfxDescriptorWriter,
}

// new & init
impl GltfMetallicRoughness {
    const ENTRY_POINT: &'static CStr = c"main";

    /// 所有创建的对象都注册到 deletion_queue
    pub fn build_pipelines(
        gfx: &Gfx,
        config: &EngineConfig,
        scene_data_layout: vk::DescriptorSetLayout,
        deletion_queue: &mut DeletionQueue<GfxDeletion>,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("GltfMetallicRoughness::build_pipelines");
        let device = gfx.device();

        let material_layout = GfxDescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .add_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .add_binding(2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .build(device, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT, "gltf-material")?;
        deletion_queue.push(GfxDeletion::DescriptorSetLayout(material_layout));

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(size_of::<GpuDrawPushConstants>() as u32);
        let layout = create_pipeline_layout(
            device,
            &[scene_data_layout, material_layout],
            std::slice::from_ref(&push_range),
            "gltf-material",
        )?;
        deletion_queue.push(GfxDeletion::PipelineLayout(layout));

        let vertex_shader = GfxShaderModule::new(device, &config.shader_path("mesh.vert"))?;
        let fragment_shader = match GfxShaderModule::new(device, &config.shader_path("mesh.frag")) {
            Ok(module) => module,
            Err(e) => {
                vertex_shader.destroy(device);
                return Err(e);
            }
        };

        let mut pipeline_ci = GfxGraphicsPipelineCreateInfo::new();
        pipeline_ci
            .vertex_shader_stage(vertex_shader.handle(), Self::ENTRY_POINT)
            .fragment_shader_stage(fragment_shader.handle(), Self::ENTRY_POINT)
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE)
            .attach_info(DefaultRendererSettings::DRAW_IMAGE_FORMAT, Some(DefaultRendererSettings::DEPTH_FORMAT))
            // reversed-Z
            .depth_test(Some(vk::CompareOp::GREATER_OR_EQUAL), true)
            .blend_none();
        let opaque = pipeline_ci.build(device, layout, "gltf-opaque");

        pipeline_ci.depth_test(Some(vk::CompareOp::GREATER_OR_EQUAL), false).blend_additive();
        let transparent = pipeline_ci.build(device, layout, "gltf-transparent");

        vertex_shader.destroy(device);
        fragment_shader.destroy(device);

        // 其中一条失败时，另一条也需要被释放
        for &pipeline in [&opaque, &transparent].into_iter().flatten() {
            deletion_queue.push(GfxDeletion::Pipeline(pipeline));
        }
        let (opaque, transparent) = (opaque?, transparent?);

        Ok(Self::from_parts(
            MaterialPipeline {
                pipeline: opaque,
                layout,
            },
            MaterialPipeline {
                pipeline: transparent,
                layout,
            },
            material_layout,
        ))
    }

    /// 使用已经存在的 pipeline 与 layout，不拥有它们
    pub fn from_parts(
        opaque_pipeline: MaterialPipeline,
        transparent_pipeline: MaterialPipeline,
        material_layout: vk::DescriptorSetLayout,
    ) -> Self {
        Self {
            opaque_pipeline,
            transparent_pipeline,
            material_layout,
            writer: GfxDescriptorWriter::default(),
        }
    }
}
// getters
impl GltfMetallicRoughness {
    #[inline]
    pub fn material_layout(&self) -> vk::DescriptorSetLayout {
        self.material_layout
    }

    #[inline]
    pub fn pipeline(&self, pass: MaterialPass) -> MaterialPipeline {
        match pass {
            MaterialPass::Opaque => self.opaque_pipeline,
            MaterialPass::Transparent => self.transparent_pipeline,
        }
    }
}
// tools
impl GltfMetallicRoughness {
    /// 从 allocator 分配一个 set，写入 resources，并根据 pass 选择 pipeline
    pub fn write_material<B: DescriptorBackend + ?Sized>(
        &mut self,
        backend: &B,
        pass: MaterialPass,
        resources: &MaterialResources,
        allocator: &mut GfxGrowableDescriptorAllocator,
    ) -> anyhow::Result<MaterialInstance> {
        let material_set = allocator.allocate(backend, self.material_layout)?;

        self.writer.clear();
        self.writer
            .write_buffer(
                0,
                resources.data_buffer,
                size_of::<MaterialConstants>() as vk::DeviceSize,
                resources.data_buffer_offset,
                vk::DescriptorType::UNIFORM_BUFFER,
            )
            .write_image(
                1,
                resources.color_image.view,
                resources.color_sampler,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            )
            .write_image(
                2,
                resources.metal_rough_image.view,
                resources.metal_rough_sampler,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            );
        backend.write_set(material_set, &self.writer);

        Ok(MaterialInstance {
            pipeline: self.pipeline(pass),
            material_set,
            pass_type: pass,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use ash::{prelude::VkResult, vk::Handle};
    use ember_gfx::descriptors::{allocator::PoolSizeRatio, writer::GfxDescriptorInfo};

    use super::*;

    #[derive(Default)]
    struct MockBackend {
        next_handle: Cell<u64>,
        written: RefCell<Vec<(vk::DescriptorSet, Vec<u32>, vk::DeviceSize)>>,
    }
    impl MockBackend {
        fn next(&self) -> u64 {
            self.next_handle.set(self.next_handle.get() + 1);
            self.next_handle.get()
        }
    }
    impl DescriptorBackend for MockBackend {
        fn create_pool(&self, _max_sets: u32, _sizes: &[vk::DescriptorPoolSize]) -> VkResult<vk::DescriptorPool> {
            Ok(vk::DescriptorPool::from_raw(self.next()))
        }

        fn destroy_pool(&self, _pool: vk::DescriptorPool) {}

        fn reset_pool(&self, _pool: vk::DescriptorPool) -> VkResult<()> {
            Ok(())
        }

        fn allocate_set(&self, _pool: vk::DescriptorPool, _layout: vk::DescriptorSetLayout) -> VkResult<vk::DescriptorSet> {
            Ok(vk::DescriptorSet::from_raw(self.next()))
        }

        fn write_set(&self, set: vk::DescriptorSet, writer: &GfxDescriptorWriter) {
            let bindings = writer.writes().iter().map(|w| w.binding).collect();
            let offset = writer
                .writes()
                .iter()
                .find_map(|w| match w.info {
                    GfxDescriptorInfo::Buffer(info) => Some(info.offset),
                    GfxDescriptorInfo::Image(_) => None,
                })
                .unwrap_or(u64::MAX);
            self.written.borrow_mut().push((set, bindings, offset));
        }
    }

    fn material() -> GltfMetallicRoughness {
        GltfMetallicRoughness::from_parts(
            MaterialPipeline {
                pipeline: vk::Pipeline::from_raw(100),
                layout: vk::PipelineLayout::from_raw(10),
            },
            MaterialPipeline {
                pipeline: vk::Pipeline::from_raw(200),
                layout: vk::PipelineLayout::from_raw(10),
            },
            vk::DescriptorSetLayout::from_raw(7),
        )
    }

    #[test]
    fn test_material_constants_size() {
        assert_eq!(size_of::<MaterialConstants>(), 256);
    }

    #[test]
    fn test_material_stride_follows_device_limit() {
        assert_eq!(material_stride(64), 256);
        assert_eq!(material_stride(256), 256);
        assert_eq!(material_stride(512), 512);
        assert_eq!(material_stride(0), 256);
    }

    #[test]
    fn test_write_material_selects_pipeline_by_pass() {
        let backend = MockBackend::default();
        let mut allocator = GfxGrowableDescriptorAllocator::new(
            &backend,
            4,
            &[PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0)],
            "test",
        )
        .unwrap();
        let mut binder = material();
        let resources = MaterialResources {
            data_buffer: vk::Buffer::from_raw(55),
            data_buffer_offset: 512,
            ..Default::default()
        };

        let opaque = binder.write_material(&backend, MaterialPass::Opaque, &resources, &mut allocator).unwrap();
        let transparent =
            binder.write_material(&backend, MaterialPass::Transparent, &resources, &mut allocator).unwrap();

        assert_eq!(opaque.pipeline.pipeline, vk::Pipeline::from_raw(100));
        assert_eq!(opaque.pass_type, MaterialPass::Opaque);
        assert_eq!(transparent.pipeline.pipeline, vk::Pipeline::from_raw(200));
        assert_eq!(transparent.pass_type, MaterialPass::Transparent);
        assert_ne!(opaque.material_set, transparent.material_set);
        assert!(!opaque.material_set.is_null());

        let written = backend.written.borrow();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].0, opaque.material_set);
        assert_eq!(written[0].1, vec![0, 1, 2]);
        assert_eq!(written[0].2, 512);

        allocator.destroy_pools(&backend);
    }
}
