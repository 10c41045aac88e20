use std::ptr;

use anyhow::Context;
use ash::vk;
use ash::vk::Handle;
use vk_mem::Alloc;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// 由 vma 分配的 buffer
///
/// # Destroy
/// 需要手动调用 `destroy`，通常是把它交给 deletion queue
pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    size: vk::DeviceSize,

    /// 在初始化阶段写死
    map_ptr: Option<*mut u8>,
    /// 只有在 buffer usage 包含 SHADER_DEVICE_ADDRESS 时才有值
    device_addr: Option<vk::DeviceAddress>,

    debug_name: String,
}
impl DebugType for GfxBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
// new & init
impl GfxBuffer {
    /// - mem_map: 是否需要 CPU 写入；为 true 时会持久 map，并由 vma 挑选 host visible 的内存
    pub fn new(
        gfx: &Gfx,
        buffer_size: vk::DeviceSize,
        buffer_usage: vk::BufferUsageFlags,
        mem_map: bool,
        name: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let buffer_ci = vk::BufferCreateInfo::default().size(buffer_size).usage(buffer_usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if mem_map {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };

        let allocator = gfx.allocator();
        let (buffer, mut alloc) = unsafe {
            allocator
                .create_buffer(&buffer_ci, &alloc_ci)
                .with_context(|| format!("failed to create buffer {}", name.as_ref()))?
        };

        let mut map_ptr = None;
        if mem_map {
            match unsafe { allocator.map_memory(&mut alloc) } {
                Ok(ptr) => map_ptr = Some(ptr),
                Err(e) => {
                    unsafe { allocator.destroy_buffer(buffer, &mut alloc) };
                    return Err(e).with_context(|| format!("failed to map buffer {}", name.as_ref()));
                }
            }
        }

        let device_addr = buffer_usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS).then(|| unsafe {
            gfx.device().get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(buffer))
        });

        let buffer = Self {
            handle: buffer,
            allocation: alloc,
            size: buffer_size,
            map_ptr,
            device_addr,
            debug_name: name.as_ref().to_string(),
        };
        gfx.device().set_debug_name(&buffer, name);
        Ok(buffer)
    }

    #[inline]
    pub fn new_stage_buffer(gfx: &Gfx, size: vk::DeviceSize, debug_name: impl AsRef<str>) -> anyhow::Result<Self> {
        Self::new(gfx, size, vk::BufferUsageFlags::TRANSFER_SRC, true, debug_name)
    }
}
// getters
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn device_address(&self) -> Option<vk::DeviceAddress> {
        self.device_addr
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.debug_name
    }
}
// tools
impl GfxBuffer {
    /// 通过 mem map 的方式将 data 写入 buffer 的 offset 处
    pub fn write_by_mmap<T: bytemuck::Pod>(&self, gfx: &Gfx, offset: vk::DeviceSize, data: &[T]) -> anyhow::Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let map_ptr = self.map_ptr.with_context(|| format!("buffer {} is not host mapped", self.debug_name))?;
        anyhow::ensure!(
            offset + bytes.len() as vk::DeviceSize <= self.size,
            "write of {} bytes at {} overflows buffer {} ({} bytes)",
            bytes.len(),
            offset,
            self.debug_name,
            self.size
        );

        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), map_ptr.add(offset as usize), bytes.len());
        }
        gfx.allocator().flush_allocation(&self.allocation, offset, bytes.len() as vk::DeviceSize)?;
        Ok(())
    }

    /// 创建一个临时的 stage buffer，先将数据放入 stage buffer，再 transfer 到 self
    ///
    /// 同步等待 GPU 完成，stage buffer 在返回前释放
    pub fn transfer_data_sync<T: bytemuck::Pod>(&self, gfx: &Gfx, data: &[T]) -> anyhow::Result<()> {
        let byte_size = size_of_val(data) as vk::DeviceSize;
        let stage_buffer = Self::new_stage_buffer(gfx, byte_size, format!("{}-stage", self.debug_name))?;

        let result = stage_buffer.write_by_mmap(gfx, 0, data).and_then(|_| {
            gfx.immediate_submit(&format!("{}-transfer", self.debug_name), |cmd| {
                cmd.cmd_copy_buffer(
                    stage_buffer.vk_buffer(),
                    self.handle,
                    &[vk::BufferCopy {
                        size: byte_size,
                        ..Default::default()
                    }],
                );
            })
        });
        stage_buffer.destroy(gfx);
        result
    }
}
// destroy
impl GfxBuffer {
    pub fn destroy(mut self, gfx: &Gfx) {
        log::debug!("destroying buffer: {}", self.debug_name);
        let allocator = gfx.allocator();
        unsafe {
            if self.map_ptr.take().is_some() {
                allocator.unmap_memory(&mut self.allocation);
            }
            allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
        self.handle = vk::Buffer::null();
    }
}
impl Drop for GfxBuffer {
    fn drop(&mut self) {
        debug_assert!(self.handle.is_null(), "GfxBuffer {} must be destroyed before drop", self.debug_name);
    }
}
