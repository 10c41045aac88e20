use anyhow::Context;
use ash::vk;

use crate::foundation::{debug_messenger::DebugType, device::GfxDevice};

/// # Destroy
/// 可以 Clone，因此不实现 Drop，需要手动 destroy
#[derive(Clone)]
pub struct GfxFence {
    fence: vk::Fence,
}

impl DebugType for GfxFence {
    fn debug_type_name() -> &'static str {
        "GfxFence"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.fence
    }
}

// new & init
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(device: &GfxDevice, signaled: bool, debug_name: &str) -> anyhow::Result<Self> {
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe {
            device
                .create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None)
                .context("failed to create fence")?
        };

        let fence = Self { fence };
        device.set_debug_name(&fence, debug_name);
        Ok(fence)
    }
}
// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}
// tools
impl GfxFence {
    /// 阻塞等待 fence，超时视为设备丢失或者卡死，返回错误交给调用者处理
    ///
    /// timeout: nano seconds
    pub fn wait_timeout(&self, device: &GfxDevice, timeout_ns: u64) -> anyhow::Result<()> {
        let result = unsafe { device.wait_for_fences(std::slice::from_ref(&self.fence), true, timeout_ns) };
        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => {
                anyhow::bail!("fence wait timed out after {} ms, device is lost or hung", timeout_ns / 1_000_000)
            }
            Err(e) => Err(e).context("wait_for_fences failed"),
        }
    }

    #[inline]
    pub fn reset(&self, device: &GfxDevice) -> anyhow::Result<()> {
        unsafe { device.reset_fences(std::slice::from_ref(&self.fence)).context("failed to reset fence") }
    }
}
// destroy
impl GfxFence {
    #[inline]
    pub fn destroy(self, device: &GfxDevice) {
        unsafe {
            device.destroy_fence(self.fence, None);
        }
    }
}
