use ash::vk;

use crate::{
    descriptors::allocator::GfxGrowableDescriptorAllocator,
    gfx::Gfx,
    resources::{buffer::GfxBuffer, image::GfxImage},
};

/// 可以被 deletion queue 释放的对象
pub trait Release<Ctx: ?Sized> {
    fn release(self, ctx: &Ctx);
}

/// 延迟释放队列
///
/// `flush` 按照与注册相反的顺序释放所有对象，之后队列为空。
/// 只要资源在创建之后立即注册，依赖者总是先于被依赖者释放。
///
/// ```ignore
/// let mut queue = DeletionQueue::default();
/// queue.push(GfxDeletion::Buffer(buffer));
/// queue.push(GfxDeletion::Sampler(sampler));
/// queue.flush(&gfx); // 先释放 sampler，再释放 buffer
/// ```
pub struct DeletionQueue<T> {
    items: Vec<T>,
}
impl<T> Default for DeletionQueue<T> {
    fn default() -> Self {
        Self { items: vec![] }
    }
}
impl<T> DeletionQueue<T> {
    #[inline]
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 把 other 中的对象按原顺序接到队尾，other 变为空
    #[inline]
    pub fn append(&mut self, other: &mut Self) {
        self.items.append(&mut other.items);
    }

    /// 后注册的先释放
    pub fn flush<Ctx: ?Sized>(&mut self, ctx: &Ctx)
    where
        T: Release<Ctx>,
    {
        while let Some(item) = self.items.pop() {
            item.release(ctx);
        }
    }
}
impl<T> Drop for DeletionQueue<T> {
    fn drop(&mut self) {
        debug_assert!(self.items.is_empty(), "DeletionQueue dropped with {} pending items", self.items.len());
    }
}

/// 引擎中需要延迟释放的 GPU 对象
pub enum GfxDeletion {
    Buffer(GfxBuffer),
    Image(GfxImage),
    Sampler(vk::Sampler),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    DescriptorAllocator(GfxGrowableDescriptorAllocator),
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
}
impl Release<Gfx> for GfxDeletion {
    fn release(self, gfx: &Gfx) {
        let device = gfx.device();
        match self {
            GfxDeletion::Buffer(buffer) => buffer.destroy(gfx),
            GfxDeletion::Image(image) => image.destroy(gfx),
            GfxDeletion::Sampler(sampler) => unsafe { device.destroy_sampler(sampler, None) },
            GfxDeletion::DescriptorSetLayout(layout) => unsafe { device.destroy_descriptor_set_layout(layout, None) },
            GfxDeletion::DescriptorAllocator(mut allocator) => allocator.destroy_pools(device),
            GfxDeletion::Pipeline(pipeline) => unsafe { device.destroy_pipeline(pipeline, None) },
            GfxDeletion::PipelineLayout(layout) => unsafe { device.destroy_pipeline_layout(layout, None) },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct Recorded(u32);
    impl Release<RefCell<Vec<u32>>> for Recorded {
        fn release(self, log: &RefCell<Vec<u32>>) {
            log.borrow_mut().push(self.0);
        }
    }

    #[test]
    fn test_flush_is_lifo() {
        let log = RefCell::new(vec![]);
        let mut queue = DeletionQueue::default();
        for i in 1..=4 {
            queue.push(Recorded(i));
        }
        assert_eq!(queue.len(), 4);

        queue.flush(&log);
        assert_eq!(*log.borrow(), vec![4, 3, 2, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_second_flush_releases_nothing() {
        let log = RefCell::new(vec![]);
        let mut queue = DeletionQueue::default();
        queue.push(Recorded(7));
        queue.flush(&log);
        queue.flush(&log);
        assert_eq!(*log.borrow(), vec![7]);
    }

    #[test]
    fn test_push_after_flush() {
        let log = RefCell::new(vec![]);
        let mut queue = DeletionQueue::default();
        queue.push(Recorded(1));
        queue.flush(&log);
        queue.push(Recorded(2));
        queue.push(Recorded(3));
        queue.flush(&log);
        assert_eq!(*log.borrow(), vec![1, 3, 2]);
    }

    #[test]
    fn test_append_keeps_order() {
        let log = RefCell::new(vec![]);
        let mut main = DeletionQueue::default();
        let mut staged = DeletionQueue::default();
        main.push(Recorded(1));
        staged.push(Recorded(2));
        staged.push(Recorded(3));

        main.append(&mut staged);
        assert!(staged.is_empty());
        main.flush(&log);
        assert_eq!(*log.borrow(), vec![3, 2, 1]);
    }
}
