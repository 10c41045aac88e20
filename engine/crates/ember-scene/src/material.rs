use ash::vk;

/// 决定使用哪一条 pipeline：不透明物体写深度且不混合，透明物体混合且不写深度
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum MaterialPass {
    #[default]
    Opaque,
    Transparent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct MaterialPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

/// 绘制时需要的全部材质信息，只包含 handle
///
/// 其中的 pipeline 与 descriptor set 属于创建它的场景容器或者引擎
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct MaterialInstance {
    pub pipeline: MaterialPipeline,
    pub material_set: vk::DescriptorSet,
    pub pass_type: MaterialPass,
}

/// 场景中的一个材质
#[derive(Debug)]
pub struct GltfMaterial {
    pub name: String,
    pub data: MaterialInstance,
}
