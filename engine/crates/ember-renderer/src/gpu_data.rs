use ash::vk;
use glam::{Mat4, Vec4};

/// 每帧写入 uniform buffer 的场景数据，布局与 shader 中的 std140 block 一致
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSceneData {
    pub view: Mat4,
    pub proj: Mat4,
    pub viewproj: Mat4,
    pub ambient_color: Vec4,
    /// w 为太阳光强度
    pub sunlight_direction: Vec4,
    pub sunlight_color: Vec4,
}

impl Default for GpuSceneData {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            viewproj: Mat4::IDENTITY,
            ambient_color: Vec4::splat(0.1),
            sunlight_direction: Vec4::new(0.0, 1.0, 0.5, 1.0),
            sunlight_color: Vec4::ONE,
        }
    }
}

/// 每个 draw 的 push constant：世界变换与顶点 buffer 的地址
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuDrawPushConstants {
    pub world_matrix: Mat4,
    pub vertex_buffer: vk::DeviceAddress,
    _padding: u64,
}

impl GpuDrawPushConstants {
    #[inline]
    pub fn new(world_matrix: Mat4, vertex_buffer: vk::DeviceAddress) -> Self {
        Self {
            world_matrix,
            vertex_buffer,
            _padding: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts() {
        assert_eq!(std::mem::size_of::<GpuSceneData>(), 3 * 64 + 3 * 16);
        assert_eq!(std::mem::offset_of!(GpuSceneData, ambient_color), 192);

        assert_eq!(std::mem::size_of::<GpuDrawPushConstants>(), 80);
        assert_eq!(std::mem::offset_of!(GpuDrawPushConstants, vertex_buffer), 64);
    }
}
