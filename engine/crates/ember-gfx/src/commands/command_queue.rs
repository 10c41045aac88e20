use std::rc::Rc;

use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{fence::GfxFence, submit_info::GfxSubmitInfo},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
};

#[derive(Clone, Debug)]
pub struct GfxQueueFamily {
    pub name: String,
    pub queue_family_index: u32,
    pub queue_flags: vk::QueueFlags,
    pub queue_count: u32,
}

pub struct GfxCommandQueue {
    vk_queue: vk::Queue,
    queue_family: GfxQueueFamily,
    device: Rc<GfxDevice>,
}

// new & init
impl GfxCommandQueue {
    pub fn new(device: Rc<GfxDevice>, queue_family: GfxQueueFamily, queue_index: u32) -> Self {
        let vk_queue = unsafe { device.get_device_queue(queue_family.queue_family_index, queue_index) };
        Self {
            vk_queue,
            queue_family,
            device,
        }
    }
}
// getters
impl GfxCommandQueue {
    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.vk_queue
    }

    #[inline]
    pub fn queue_family(&self) -> &GfxQueueFamily {
        &self.queue_family
    }
}
// tools
impl GfxCommandQueue {
    /// 使用 synchronization2 提交；fence 会在所有 batch 执行完成后 signal
    pub fn submit(&self, batches: &[GfxSubmitInfo], fence: Option<&GfxFence>) -> anyhow::Result<()> {
        let _span = tracy_client::span!("GfxCommandQueue::submit");
        let submit_infos = batches.iter().map(GfxSubmitInfo::submit_info).collect_vec();
        unsafe {
            self.device
                .queue_submit2(self.vk_queue, &submit_infos, fence.map_or(vk::Fence::null(), GfxFence::handle))
                .context("queue_submit2 failed")
        }
    }

    pub fn wait_idle(&self) -> anyhow::Result<()> {
        unsafe { self.device.queue_wait_idle(self.vk_queue).context("queue_wait_idle failed") }
    }
}

impl DebugType for GfxCommandQueue {
    fn debug_type_name() -> &'static str {
        "GfxCommandQueue"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_queue
    }
}
