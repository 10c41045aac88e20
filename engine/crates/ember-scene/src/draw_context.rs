use ash::vk;
use ash::vk::Handle;
use glam::Mat4;
use itertools::Itertools;

use crate::{bounds::Bounds, material::MaterialInstance};

/// 展开后的一次绘制，transform 已经是世界变换
#[derive(Clone, Copy, Debug)]
pub struct RenderObject {
    pub index_count: u32,
    pub first_index: u32,
    pub index_buffer: vk::Buffer,

    pub material: MaterialInstance,
    pub bounds: Bounds,

    pub transform: Mat4,
    pub vertex_buffer_address: vk::DeviceAddress,
}

/// 每帧重新构建的绘制列表
///
/// 按照 pass 分为不透明与透明两组，组内保持场景图的遍历顺序
#[derive(Default)]
pub struct DrawContext {
    pub opaque_surfaces: Vec<RenderObject>,
    pub transparent_surfaces: Vec<RenderObject>,

    /// 可见性测试使用的 view projection
    pub viewproj: Mat4,
}

impl DrawContext {
    /// 清空上一帧的内容，并设置本帧的 view projection
    pub fn begin_frame(&mut self, viewproj: Mat4) {
        self.opaque_surfaces.clear();
        self.transparent_surfaces.clear();
        self.viewproj = viewproj;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.opaque_surfaces.len() + self.transparent_surfaces.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn triangle_count(&self) -> usize {
        self.opaque_surfaces.iter().chain(self.transparent_surfaces.iter()).map(|r| r.index_count as usize / 3).sum()
    }

    /// 不透明物体的录制顺序：按 (材质, index buffer) 排序以减少状态切换
    pub fn opaque_draw_order(&self) -> Vec<usize> {
        (0..self.opaque_surfaces.len())
            .sorted_by_key(|&idx| {
                let obj = &self.opaque_surfaces[idx];
                (obj.material.material_set.as_raw(), obj.index_buffer.as_raw())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialPass;

    fn object(material_set: u64, index_buffer: u64, index_count: u32) -> RenderObject {
        RenderObject {
            index_count,
            first_index: 0,
            index_buffer: vk::Buffer::from_raw(index_buffer),
            material: MaterialInstance {
                material_set: vk::DescriptorSet::from_raw(material_set),
                pass_type: MaterialPass::Opaque,
                ..Default::default()
            },
            bounds: Bounds::default(),
            transform: Mat4::IDENTITY,
            vertex_buffer_address: 0,
        }
    }

    #[test]
    fn test_opaque_order_groups_material_then_buffer() {
        let mut ctx = DrawContext::default();
        ctx.opaque_surfaces = vec![object(2, 1, 3), object(1, 5, 3), object(2, 0, 3), object(1, 4, 3)];
        assert_eq!(ctx.opaque_draw_order(), vec![3, 1, 2, 0]);
    }

    #[test]
    fn test_begin_frame_clears_lists() {
        let mut ctx = DrawContext::default();
        ctx.opaque_surfaces.push(object(1, 1, 6));
        ctx.transparent_surfaces.push(object(1, 1, 9));
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.triangle_count(), 5);

        ctx.begin_frame(Mat4::from_scale(glam::Vec3::splat(2.0)));
        assert!(ctx.is_empty());
        assert_eq!(ctx.viewproj, Mat4::from_scale(glam::Vec3::splat(2.0)));
    }
}
