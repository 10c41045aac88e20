use std::rc::Rc;

use glam::Mat4;
use slotmap::SlotMap;

use crate::{
    draw_context::{DrawContext, RenderObject},
    material::MaterialPass,
    mesh::MeshAsset,
    visibility::is_visible,
};

slotmap::new_key_type! {
    pub struct NodeHandle;
}

/// 节点能提供的绘制内容
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// 只有变换，没有几何
    Group,
    Mesh(Rc<MeshAsset>),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    /// 父节点只是索引，不持有所有权
    pub parent: Option<NodeHandle>,
    pub children: Vec<NodeHandle>,

    pub local_transform: Mat4,
    /// 由 `refresh_transform` 自顶向下计算
    pub world_transform: Mat4,

    pub kind: NodeKind,
}

/// 所有节点存放在 arena 中，通过 `NodeHandle` 访问
///
/// 节点之间只通过索引相互引用，整个树随 arena 一起释放
#[derive(Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeHandle, Node>,
    /// 没有父节点的节点，按照加入的顺序
    top_nodes: Vec<NodeHandle>,
}

// new & init
impl SceneGraph {
    pub fn add_node(&mut self, name: impl Into<String>, local_transform: Mat4, kind: NodeKind) -> NodeHandle {
        self.nodes.insert(Node {
            name: name.into(),
            parent: None,
            children: vec![],
            local_transform,
            world_transform: local_transform,
            kind,
        })
    }

    /// 父子关系只能建立一次，并且不能成环
    pub fn attach_child(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<(), SceneGraphError> {
        if parent == child || self.is_ancestor(child, parent) {
            return Err(SceneGraphError::Cycle);
        }
        let child_node = self.nodes.get_mut(child).ok_or(SceneGraphError::InvalidHandle)?;
        if child_node.parent.is_some() {
            return Err(SceneGraphError::AlreadyParented);
        }
        child_node.parent = Some(parent);
        self.nodes.get_mut(parent).ok_or(SceneGraphError::InvalidHandle)?.children.push(child);
        Ok(())
    }

    /// 收集所有没有父节点的节点，并刷新整棵树的世界变换
    ///
    /// 在所有节点与父子关系建立完之后调用
    pub fn finalize(&mut self, top_order: impl IntoIterator<Item = NodeHandle>) {
        let mut top_nodes: Vec<NodeHandle> = vec![];
        for handle in top_order {
            if self.nodes.get(handle).is_some_and(|n| n.parent.is_none()) && !top_nodes.contains(&handle) {
                top_nodes.push(handle);
            }
        }
        self.top_nodes = top_nodes;

        for idx in 0..self.top_nodes.len() {
            self.refresh_transform(self.top_nodes[idx], Mat4::IDENTITY);
        }
    }
}
// getters
impl SceneGraph {
    #[inline]
    pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    #[inline]
    pub fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle)
    }

    #[inline]
    pub fn top_nodes(&self) -> &[NodeHandle] {
        &self.top_nodes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeHandle> {
        self.nodes.iter().find(|(_, node)| node.name == name).map(|(handle, _)| handle)
    }

    fn is_ancestor(&self, ancestor: NodeHandle, node: NodeHandle) -> bool {
        let mut current = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(handle) = current {
            if handle == ancestor {
                return true;
            }
            current = self.nodes.get(handle).and_then(|n| n.parent);
        }
        false
    }
}
// tools
impl SceneGraph {
    /// world = parent_world * local，先父后子，深度优先
    pub fn refresh_transform(&mut self, handle: NodeHandle, parent_world: Mat4) {
        let mut stack = vec![(handle, parent_world)];
        while let Some((handle, parent_world)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(handle) else {
                continue;
            };
            node.world_transform = parent_world * node.local_transform;
            let world = node.world_transform;
            // 逆序压栈，保证按 children 的顺序处理
            stack.extend(node.children.iter().rev().map(|&child| (child, world)));
        }
    }

    /// 从 handle 开始深度优先遍历，把可见的 surface 加入 ctx
    ///
    /// 每个节点的矩阵为 top_matrix * local，子节点以此作为自己的 top_matrix；
    /// 从 top node 以单位矩阵开始时，它与 world_transform 一致
    pub fn draw(&self, handle: NodeHandle, top_matrix: Mat4, ctx: &mut DrawContext) {
        let mut stack = vec![(handle, top_matrix)];
        while let Some((handle, top_matrix)) = stack.pop() {
            let Some(node) = self.nodes.get(handle) else {
                continue;
            };
            let node_matrix = top_matrix * node.local_transform;

            match &node.kind {
                NodeKind::Group => {}
                NodeKind::Mesh(mesh) => Self::draw_mesh(mesh, node_matrix, ctx),
            }

            stack.extend(node.children.iter().rev().map(|&child| (child, node_matrix)));
        }
    }

    /// 按顺序绘制所有 top node
    pub fn draw_all(&self, top_matrix: Mat4, ctx: &mut DrawContext) {
        for &handle in &self.top_nodes {
            self.draw(handle, top_matrix, ctx);
        }
    }

    fn draw_mesh(mesh: &MeshAsset, node_matrix: Mat4, ctx: &mut DrawContext) {
        for surface in &mesh.surfaces {
            if !is_visible(node_matrix, &surface.bounds, ctx.viewproj) {
                continue;
            }

            let render_object = RenderObject {
                index_count: surface.count,
                first_index: surface.start_index,
                index_buffer: mesh.mesh_buffers.index_buffer,
                material: surface.material.data,
                bounds: surface.bounds,
                transform: node_matrix,
                vertex_buffer_address: mesh.mesh_buffers.vertex_buffer_address,
            };
            match surface.material.data.pass_type {
                MaterialPass::Opaque => ctx.opaque_surfaces.push(render_object),
                MaterialPass::Transparent => ctx.transparent_surfaces.push(render_object),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneGraphError {
    InvalidHandle,
    AlreadyParented,
    Cycle,
}
impl std::fmt::Display for SceneGraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneGraphError::InvalidHandle => write!(f, "node handle does not exist"),
            SceneGraphError::AlreadyParented => write!(f, "node already has a parent"),
            SceneGraphError::Cycle => write!(f, "attaching the node would create a cycle"),
        }
    }
}
impl std::error::Error for SceneGraphError {}

#[cfg(test)]
mod tests {
    use ash::vk;
    use ash::vk::Handle;
    use glam::Vec3;

    use super::*;
    use crate::{
        bounds::Bounds,
        camera::Camera,
        material::{GltfMaterial, MaterialInstance},
        mesh::{GeoSurface, GpuMeshBuffers},
    };

    fn material(pass_type: MaterialPass, set: u64) -> Rc<GltfMaterial> {
        Rc::new(GltfMaterial {
            name: format!("mat-{set}"),
            data: MaterialInstance {
                material_set: vk::DescriptorSet::from_raw(set),
                pass_type,
                ..Default::default()
            },
        })
    }

    fn cube_mesh(name: &str, materials: &[Rc<GltfMaterial>]) -> Rc<MeshAsset> {
        let surfaces = materials
            .iter()
            .enumerate()
            .map(|(idx, material)| GeoSurface {
                start_index: idx as u32 * 36,
                count: 36,
                bounds: Bounds::from_min_max(Vec3::splat(-0.5), Vec3::splat(0.5)),
                material: material.clone(),
            })
            .collect();
        Rc::new(MeshAsset {
            name: name.to_string(),
            surfaces,
            mesh_buffers: GpuMeshBuffers {
                index_buffer: vk::Buffer::from_raw(11),
                vertex_buffer: vk::Buffer::from_raw(12),
                vertex_buffer_address: 0xABC0,
            },
        })
    }

    fn frame_ctx() -> DrawContext {
        let mut ctx = DrawContext::default();
        ctx.begin_frame(Camera::default().view_proj(16.0 / 9.0));
        ctx
    }

    #[test]
    fn test_refresh_transform_composes_parent_first() {
        let mut graph = SceneGraph::default();
        let root = graph.add_node("root", Mat4::from_translation(Vec3::X), NodeKind::Group);
        let child = graph.add_node("child", Mat4::from_scale(Vec3::splat(2.0)), NodeKind::Group);
        let grandchild = graph.add_node("grandchild", Mat4::from_translation(Vec3::Y), NodeKind::Group);
        graph.attach_child(root, child).unwrap();
        graph.attach_child(child, grandchild).unwrap();
        graph.finalize([root, child, grandchild]);

        assert_eq!(graph.top_nodes(), &[root]);
        let world = graph.node(grandchild).unwrap().world_transform;
        assert!(world.transform_point3(Vec3::ZERO).abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-6));
    }

    #[test]
    fn test_attach_rejects_cycles_and_second_parent() {
        let mut graph = SceneGraph::default();
        let a = graph.add_node("a", Mat4::IDENTITY, NodeKind::Group);
        let b = graph.add_node("b", Mat4::IDENTITY, NodeKind::Group);
        let c = graph.add_node("c", Mat4::IDENTITY, NodeKind::Group);
        graph.attach_child(a, b).unwrap();
        assert_eq!(graph.attach_child(b, a), Err(SceneGraphError::Cycle));
        assert_eq!(graph.attach_child(a, a), Err(SceneGraphError::Cycle));
        assert_eq!(graph.attach_child(c, b), Err(SceneGraphError::AlreadyParented));
    }

    #[test]
    fn test_draw_splits_passes_and_bakes_transform() {
        let mut graph = SceneGraph::default();
        let mesh = cube_mesh("cube", &[material(MaterialPass::Opaque, 1), material(MaterialPass::Transparent, 2)]);
        let group = graph.add_node("group", Mat4::from_translation(Vec3::new(0.0, 0.0, -4.0)), NodeKind::Group);
        let node = graph.add_node("cube", Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0)), NodeKind::Mesh(mesh));
        graph.attach_child(group, node).unwrap();
        graph.finalize([group, node]);

        let mut ctx = frame_ctx();
        graph.draw_all(Mat4::IDENTITY, &mut ctx);

        assert_eq!(ctx.opaque_surfaces.len(), 1);
        assert_eq!(ctx.transparent_surfaces.len(), 1);
        assert_eq!(ctx.transparent_surfaces[0].first_index, 36);
        assert_eq!(ctx.opaque_surfaces[0].vertex_buffer_address, 0xABC0);
        // 与 refresh_transform 的结果一致
        assert_eq!(ctx.opaque_surfaces[0].transform, graph.node(node).unwrap().world_transform);
    }

    #[test]
    fn test_traversal_is_deterministic() {
        let mut graph = SceneGraph::default();
        let opaque = material(MaterialPass::Opaque, 1);
        let root = graph.add_node("root", Mat4::IDENTITY, NodeKind::Group);
        let mut children = vec![];
        for i in 0..5 {
            let mesh = cube_mesh(&format!("cube{i}"), std::slice::from_ref(&opaque));
            let pos = Vec3::new(i as f32 - 2.0, 0.0, -6.0);
            let child = graph.add_node(format!("n{i}"), Mat4::from_translation(pos), NodeKind::Mesh(mesh));
            graph.attach_child(root, child).unwrap();
            children.push(child);
        }
        graph.finalize(std::iter::once(root).chain(children));

        let mut first = frame_ctx();
        graph.draw_all(Mat4::IDENTITY, &mut first);
        let mut second = frame_ctx();
        graph.draw_all(Mat4::IDENTITY, &mut second);

        let xs = |ctx: &DrawContext| ctx.opaque_surfaces.iter().map(|r| r.transform.w_axis.x).collect::<Vec<_>>();
        assert_eq!(xs(&first), vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_eq!(xs(&first), xs(&second));
    }

    #[test]
    fn test_only_node_in_front_of_camera_is_drawn() {
        let mut graph = SceneGraph::default();
        let mesh = cube_mesh("cube", &[material(MaterialPass::Opaque, 1)]);
        let a = graph.add_node("A", Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)), NodeKind::Mesh(mesh.clone()));
        let b = graph.add_node("B", Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)), NodeKind::Mesh(mesh));
        graph.finalize([a, b]);

        let mut ctx = frame_ctx();
        graph.draw_all(Mat4::IDENTITY, &mut ctx);

        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.opaque_surfaces[0].transform, Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)));
        assert_eq!(ctx.triangle_count(), 12);
    }
}
