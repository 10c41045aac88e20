use ash::{prelude::VkResult, vk};

use crate::{descriptors::writer::GfxDescriptorWriter, foundation::device::GfxDevice};

/// descriptor pool 与 descriptor set 相关的设备操作
///
/// growable allocator 与材质写入只依赖这几个操作，测试中可以用假的 handle 替换真实设备
pub trait DescriptorBackend {
    fn create_pool(&self, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> VkResult<vk::DescriptorPool>;

    fn destroy_pool(&self, pool: vk::DescriptorPool);

    /// 将 pool 中分配出去的所有 set 归还给 pool
    fn reset_pool(&self, pool: vk::DescriptorPool) -> VkResult<()>;

    fn allocate_set(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout) -> VkResult<vk::DescriptorSet>;

    fn write_set(&self, set: vk::DescriptorSet, writer: &GfxDescriptorWriter);
}

impl DescriptorBackend for GfxDevice {
    fn create_pool(&self, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> VkResult<vk::DescriptorPool> {
        let pool_ci = vk::DescriptorPoolCreateInfo::default().max_sets(max_sets).pool_sizes(pool_sizes);
        unsafe { self.device.create_descriptor_pool(&pool_ci, None) }
    }

    fn destroy_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn reset_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        unsafe { self.device.reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty()) }
    }

    fn allocate_set(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout) -> VkResult<vk::DescriptorSet> {
        let alloc_info =
            vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(std::slice::from_ref(&layout));
        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info)? };
        sets.into_iter().next().ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn write_set(&self, set: vk::DescriptorSet, writer: &GfxDescriptorWriter) {
        let writes = writer.vk_writes(set);
        unsafe { self.device.update_descriptor_sets(&writes, &[]) }
    }
}
