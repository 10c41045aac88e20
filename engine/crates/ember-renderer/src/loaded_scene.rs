use std::rc::Rc;

use ash::vk;
use ember_gfx::{
    deletion_queue::{DeletionQueue, GfxDeletion},
    descriptors::allocator::GfxGrowableDescriptorAllocator,
    gfx::Gfx,
    resources::image::GfxImageHandle,
};
use ember_scene::{
    draw_context::DrawContext,
    material::GltfMaterial,
    mesh::MeshAsset,
    scene_graph::{NodeHandle, SceneGraph},
};
use glam::Mat4;
use indexmap::IndexMap;

/// 一个 glTF 文件加载后的全部资源
///
/// 场景拥有自己的 descriptor 分配器、材质常量 buffer 以及 deletion queue；
/// 各个 map 的 key 为资源名称，重名时追加序号。
pub struct LoadedGltf {
    pub name: String,

    pub meshes: IndexMap<String, Rc<MeshAsset>>,
    pub nodes: IndexMap<String, NodeHandle>,
    pub images: IndexMap<String, GfxImageHandle>,
    pub materials: IndexMap<String, Rc<GltfMaterial>>,
    pub samplers: Vec<vk::Sampler>,

    pub scene_graph: SceneGraph,

    pub(crate) descriptor_pool: Option<GfxGrowableDescriptorAllocator>,
    pub(crate) material_data_buffer: vk::Buffer,
    pub(crate) deletion_queue: DeletionQueue<GfxDeletion>,
}

// new & init
impl LoadedGltf {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            meshes: IndexMap::new(),
            nodes: IndexMap::new(),
            images: IndexMap::new(),
            materials: IndexMap::new(),
            samplers: vec![],
            scene_graph: SceneGraph::default(),
            descriptor_pool: None,
            material_data_buffer: vk::Buffer::null(),
            deletion_queue: DeletionQueue::default(),
        }
    }
}
// getters
impl LoadedGltf {
    #[inline]
    pub fn top_nodes(&self) -> &[NodeHandle] {
        self.scene_graph.top_nodes()
    }

    #[inline]
    pub fn material_data_buffer(&self) -> vk::Buffer {
        self.material_data_buffer
    }
}
// tools
impl LoadedGltf {
    /// 依次绘制每个 top node
    pub fn draw(&self, top_matrix: Mat4, ctx: &mut DrawContext) {
        self.scene_graph.draw_all(top_matrix, ctx);
    }
}
// destroy
impl LoadedGltf {
    /// 调用前需要保证 GPU 不再使用该场景的资源
    ///
    /// 先销毁 descriptor pool，再按照创建的逆序释放 mesh、image、sampler 与材质 buffer
    pub fn clear_all(mut self, gfx: &Gfx) {
        let _span = tracy_client::span!("LoadedGltf::clear_all");
        log::info!("clear scene {}", self.name);

        if let Some(mut pool) = self.descriptor_pool.take() {
            pool.destroy_pools(gfx.device());
        }
        self.deletion_queue.flush(gfx);

        // 节点持有 mesh 与材质的引用，最后一起释放
        self.scene_graph = SceneGraph::default();
        self.meshes.clear();
        self.materials.clear();
    }
}
