use ash::vk;
use ember_gfx::{
    commands::{
        command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, fence::GfxFence, semaphore::GfxSemaphore,
    },
    deletion_queue::{DeletionQueue, GfxDeletion},
    descriptors::allocator::{GfxGrowableDescriptorAllocator, PoolSizeRatio},
    gfx::Gfx,
};

use crate::settings::DefaultRendererSettings;

/// 累加的帧序号，决定当前使用哪一个帧槽位
#[derive(Debug, Default)]
pub struct FrameCounter {
    frame_number: u64,
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_number = self.frame_number.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// slot = frame_number mod FRAME_OVERLAP
    #[inline]
    pub fn slot(&self) -> usize {
        (self.frame_number % DefaultRendererSettings::FRAME_OVERLAP as u64) as usize
    }

    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}-{}]", self.frame_number, self.slot())
    }
}

/// 一个帧槽位独占的资源
///
/// 只有在槽位的 fence signal 之后，CPU 才能重新使用这里的对象；
/// 这一帧临时创建的 GPU 对象注册到 `deletion_queue`，descriptor set 从 `frame_descriptors` 分配，
/// 两者都在槽位下一次被使用时回收。
pub struct FrameData {
    command_pool: GfxCommandPool,
    command_buffer: GfxCommandBuffer,

    /// acquire swapchain image 完成后 signal，渲染命令等待它
    pub swapchain_semaphore: GfxSemaphore,
    /// 渲染命令完成后 signal，present 等待它
    pub render_semaphore: GfxSemaphore,
    /// 渲染命令完成后 signal，CPU 等待它
    pub render_fence: GfxFence,

    pub deletion_queue: DeletionQueue<GfxDeletion>,
    pub frame_descriptors: GfxGrowableDescriptorAllocator,

    slot: usize,
}

// new & init
impl FrameData {
    const INITIAL_DESCRIPTOR_SETS: u32 = 1000;
    const DESCRIPTOR_RATIOS: [PoolSizeRatio; 4] = [
        PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 3.0),
        PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 3.0),
        PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 3.0),
        PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
    ];

    pub fn new(gfx: &Gfx, slot: usize) -> anyhow::Result<Self> {
        let device = gfx.device();
        let command_pool = GfxCommandPool::new(
            device,
            gfx.physical_device().gfx_queue_family().clone(),
            vk::CommandPoolCreateFlags::TRANSIENT,
            &format!("frame-{slot}"),
        )?;
        let command_buffer = GfxCommandBuffer::new(gfx.device_rc(), &command_pool, &format!("frame-{slot}-main"))?;

        // fence 初始为 signaled，第一次使用槽位时不会阻塞
        let render_fence = GfxFence::new(device, true, &format!("frame-{slot}-render"))?;
        let swapchain_semaphore = GfxSemaphore::new(device, &format!("frame-{slot}-swapchain"))?;
        let render_semaphore = GfxSemaphore::new(device, &format!("frame-{slot}-render"))?;

        let frame_descriptors = GfxGrowableDescriptorAllocator::new(
            device,
            Self::INITIAL_DESCRIPTOR_SETS,
            &Self::DESCRIPTOR_RATIOS,
            format!("frame-{slot}"),
        )?;

        Ok(Self {
            command_pool,
            command_buffer,
            swapchain_semaphore,
            render_semaphore,
            render_fence,
            deletion_queue: DeletionQueue::default(),
            frame_descriptors,
            slot,
        })
    }

    /// resize 之后 semaphore 可能处于 signal 但无人等待的状态，需要重新创建
    ///
    /// 调用前需要保证 device idle
    pub fn recreate_semaphores(&mut self, gfx: &Gfx) -> anyhow::Result<()> {
        let device = gfx.device();
        let swapchain_semaphore = GfxSemaphore::new(device, &format!("frame-{}-swapchain", self.slot))?;
        let render_semaphore = GfxSemaphore::new(device, &format!("frame-{}-render", self.slot))?;
        std::mem::replace(&mut self.swapchain_semaphore, swapchain_semaphore).destroy(device);
        std::mem::replace(&mut self.render_semaphore, render_semaphore).destroy(device);
        Ok(())
    }
}
// getters
impl FrameData {
    #[inline]
    pub fn command_buffer(&self) -> &GfxCommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }
}
// update
impl FrameData {
    /// 槽位的 fence signal 之后调用：释放上一次使用该槽位时注册的对象，归还 descriptor set，重置命令池
    pub fn recycle(&mut self, gfx: &Gfx) -> anyhow::Result<()> {
        let _span = tracy_client::span!("FrameData::recycle");
        self.deletion_queue.flush(gfx);
        self.frame_descriptors.reset_pools(gfx.device())?;
        self.command_pool.reset(gfx.device())
    }
}
// destroy
impl FrameData {
    /// 调用前需要保证 device idle
    pub fn destroy(mut self, gfx: &Gfx) {
        let device = gfx.device();
        self.deletion_queue.flush(gfx);
        self.frame_descriptors.destroy_pools(device);

        self.render_fence.destroy(device);
        self.swapchain_semaphore.destroy(device);
        self.render_semaphore.destroy(device);
        // command buffer 随 pool 一起释放
        self.command_pool.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_cycles_with_frame_overlap() {
        let mut counter = FrameCounter::default();
        for n in 0..10u64 {
            assert_eq!(counter.frame_number(), n);
            assert_eq!(counter.slot(), (n % 2) as usize);
            counter.next_frame();
        }
    }

    #[test]
    fn test_same_slot_two_frames_apart() {
        let mut counter = FrameCounter::default();
        let first = counter.slot();
        counter.next_frame();
        assert_ne!(counter.slot(), first);
        counter.next_frame();
        assert_eq!(counter.slot(), first);
        assert_eq!(counter.frame_name(), "[F2-0]");
    }

    #[test]
    fn test_descriptor_ratios_cover_frame_bindings() {
        let sizes = GfxGrowableDescriptorAllocator::pool_sizes(
            &FrameData::DESCRIPTOR_RATIOS,
            FrameData::INITIAL_DESCRIPTOR_SETS,
        );
        let uniform = sizes.iter().find(|s| s.ty == vk::DescriptorType::UNIFORM_BUFFER).unwrap();
        assert_eq!(uniform.descriptor_count, 3000);
    }
}
