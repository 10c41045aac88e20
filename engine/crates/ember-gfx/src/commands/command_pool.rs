use anyhow::Context;
use ash::vk;

use crate::{commands::command_queue::GfxQueueFamily, foundation::debug_messenger::DebugType, foundation::device::GfxDevice};

/// # Destroy
/// 需要手动调用 `destroy`
pub struct GfxCommandPool {
    handle: vk::CommandPool,
    queue_family: GfxQueueFamily,
}

// new & init
impl GfxCommandPool {
    pub fn new(
        device: &GfxDevice,
        queue_family: GfxQueueFamily,
        flags: vk::CommandPoolCreateFlags,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let pool_ci = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family.queue_family_index)
            .flags(flags);
        let handle = unsafe { device.create_command_pool(&pool_ci, None).context("failed to create command pool")? };

        let pool = Self { handle, queue_family };
        device.set_debug_name(&pool, debug_name);
        Ok(pool)
    }
}
// getters
impl GfxCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    #[inline]
    pub fn queue_family(&self) -> &GfxQueueFamily {
        &self.queue_family
    }
}
// tools
impl GfxCommandPool {
    /// 回收 pool 中所有 command buffer 的内存，command buffer 回到 initial 状态
    #[inline]
    pub fn reset(&self, device: &GfxDevice) -> anyhow::Result<()> {
        unsafe {
            device
                .reset_command_pool(self.handle, vk::CommandPoolResetFlags::RELEASE_RESOURCES)
                .context("failed to reset command pool")
        }
    }
}
// destroy
impl GfxCommandPool {
    #[inline]
    pub fn destroy(self, device: &GfxDevice) {
        unsafe {
            device.destroy_command_pool(self.handle, None);
        }
    }
}

impl DebugType for GfxCommandPool {
    fn debug_type_name() -> &'static str {
        "GfxCommandPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
