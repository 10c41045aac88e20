use std::rc::Rc;

use ash::vk;

use crate::{bounds::Bounds, material::GltfMaterial};

/// 顶点数据，shader 通过 buffer device address 读取
///
/// uv 拆开放在 position 与 normal 之后，使每个 vec3 后面都没有空洞
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: glam::Vec3,
    pub uv_x: f32,
    pub normal: glam::Vec3,
    pub uv_y: f32,
    pub color: glam::Vec4,
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: glam::Vec3::ZERO,
            uv_x: 0.0,
            normal: glam::Vec3::X,
            uv_y: 0.0,
            color: glam::Vec4::ONE,
        }
    }
}

/// mesh 的 GPU buffer handle，所有 surface 共享
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpuMeshBuffers {
    pub index_buffer: vk::Buffer,
    pub vertex_buffer: vk::Buffer,
    pub vertex_buffer_address: vk::DeviceAddress,
}

/// mesh 中使用同一材质的一段 index
#[derive(Clone, Debug)]
pub struct GeoSurface {
    pub start_index: u32,
    pub count: u32,
    pub bounds: Bounds,
    pub material: Rc<GltfMaterial>,
}

#[derive(Debug)]
pub struct MeshAsset {
    pub name: String,
    pub surfaces: Vec<GeoSurface>,
    pub mesh_buffers: GpuMeshBuffers,
}

impl MeshAsset {
    #[inline]
    pub fn index_count(&self) -> u32 {
        self.surfaces.iter().map(|s| s.count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 48);
        assert_eq!(std::mem::offset_of!(Vertex, uv_x), 12);
        assert_eq!(std::mem::offset_of!(Vertex, normal), 16);
        assert_eq!(std::mem::offset_of!(Vertex, color), 32);
    }
}
