use std::rc::Rc;

use ash::vk;

use crate::{
    commands::{
        command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, command_queue::GfxCommandQueue,
        command_queue::GfxQueueFamily, fence::GfxFence, submit_info::GfxSubmitInfo,
    },
    foundation::device::GfxDevice,
};

/// 帧循环之外的一次性 GPU 工作：录制、提交、阻塞等待完成
///
/// 用于上传 mesh 与纹理数据，调用方不能假设它和其他 GPU 工作存在重叠
pub struct GfxImmediateSubmit {
    device: Rc<GfxDevice>,
    command_pool: GfxCommandPool,
    command_buffer: GfxCommandBuffer,
    fence: GfxFence,
}

// new & init
impl GfxImmediateSubmit {
    /// 上传大块纹理时可能较慢，给一个比帧 fence 宽松得多的超时
    pub const TIMEOUT_NS: u64 = 10_000_000_000;

    pub fn new(device: Rc<GfxDevice>, queue_family: &GfxQueueFamily) -> anyhow::Result<Self> {
        let command_pool = GfxCommandPool::new(
            &device,
            queue_family.clone(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "immediate-submit",
        )?;
        let command_buffer = GfxCommandBuffer::new(device.clone(), &command_pool, "immediate-submit")?;
        let fence = GfxFence::new(&device, true, "immediate-submit")?;

        Ok(Self {
            device,
            command_pool,
            command_buffer,
            fence,
        })
    }
}
// tools
impl GfxImmediateSubmit {
    /// 闭包拿到的 command buffer 已经处于录制状态；函数返回时 GPU 已执行完毕
    pub fn submit<F, R>(&self, queue: &GfxCommandQueue, name: &str, func: F) -> anyhow::Result<R>
    where
        F: FnOnce(&GfxCommandBuffer) -> R,
    {
        let _span = tracy_client::span!("GfxImmediateSubmit::submit");

        self.fence.reset(&self.device)?;
        self.command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, name)?;
        let result = func(&self.command_buffer);
        self.command_buffer.end()?;

        queue.submit(&[GfxSubmitInfo::new(&[&self.command_buffer])], Some(&self.fence))?;
        self.fence.wait_timeout(&self.device, Self::TIMEOUT_NS)?;
        self.command_pool.reset(&self.device)?;

        Ok(result)
    }
}
// destroy
impl GfxImmediateSubmit {
    pub fn destroy(self) {
        self.fence.destroy(&self.device);
        // command buffer 随 pool 一起释放
        self.command_pool.destroy(&self.device);
    }
}
