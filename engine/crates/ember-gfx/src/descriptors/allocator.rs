use anyhow::Context;
use ash::vk;

use crate::descriptors::backend::DescriptorBackend;

/// 每个 set 需要某种 descriptor 的数量
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoolSizeRatio {
    pub ty: vk::DescriptorType,
    pub ratio: f32,
}

impl PoolSizeRatio {
    #[inline]
    pub const fn new(ty: vk::DescriptorType, ratio: f32) -> Self {
        Self { ty, ratio }
    }
}

/// 可以自动扩容的 descriptor set 分配器
///
/// 分配失败时会把当前 pool 标记为满，并创建一个容量更大的 pool 重试一次。
/// `reset_pools` 只归还 set，不会销毁 pool；pool 只在 `destroy_pools` 时释放。
///
/// # Destroy
/// 需要手动调用 `destroy_pools`
pub struct GfxGrowableDescriptorAllocator {
    ratios: Vec<PoolSizeRatio>,
    /// 已经分配失败过的 pool，reset 之后才能再次使用
    full_pools: Vec<vk::DescriptorPool>,
    /// 还可以继续分配的 pool，末尾的那个是当前正在使用的
    ready_pools: Vec<vk::DescriptorPool>,
    /// 下一个新建 pool 的 max sets
    sets_per_pool: u32,

    name: String,
}

// new & init
impl GfxGrowableDescriptorAllocator {
    pub const GROWTH_FACTOR: f32 = 1.5;
    pub const MAX_SETS_PER_POOL: u32 = 4092;

    pub fn new<B: DescriptorBackend + ?Sized>(
        backend: &B,
        initial_sets: u32,
        ratios: &[PoolSizeRatio],
        name: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let mut allocator = Self {
            ratios: ratios.to_vec(),
            full_pools: vec![],
            ready_pools: vec![],
            sets_per_pool: initial_sets.max(1),
            name: name.as_ref().to_string(),
        };
        let first_pool = allocator.create_pool(backend)?;
        allocator.ready_pools.push(first_pool);
        Ok(allocator)
    }

    /// 每种 descriptor 的数量 = ratio * set 数量
    pub fn pool_sizes(ratios: &[PoolSizeRatio], set_count: u32) -> Vec<vk::DescriptorPoolSize> {
        ratios
            .iter()
            .map(|ratio| vk::DescriptorPoolSize {
                ty: ratio.ty,
                descriptor_count: ((ratio.ratio * set_count as f32) as u32).max(1),
            })
            .collect()
    }

    #[inline]
    pub fn next_pool_size(current: u32) -> u32 {
        ((current as f32 * Self::GROWTH_FACTOR) as u32).min(Self::MAX_SETS_PER_POOL)
    }
}
// getters
impl GfxGrowableDescriptorAllocator {
    #[inline]
    pub fn pool_count(&self) -> usize {
        self.full_pools.len() + self.ready_pools.len()
    }

    #[inline]
    pub fn sets_per_pool(&self) -> u32 {
        self.sets_per_pool
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
// tools
impl GfxGrowableDescriptorAllocator {
    pub fn allocate<B: DescriptorBackend + ?Sized>(
        &mut self,
        backend: &B,
        layout: vk::DescriptorSetLayout,
    ) -> anyhow::Result<vk::DescriptorSet> {
        let pool = self.get_pool(backend)?;
        match backend.allocate_set(pool, layout) {
            Ok(set) => {
                self.ready_pools.push(pool);
                Ok(set)
            }
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                self.full_pools.push(pool);
                log::warn!("descriptor allocator {}: pool exhausted, growing", self.name);

                let pool = self.get_pool(backend)?;
                let result = backend.allocate_set(pool, layout);
                // 无论成败 pool 都需要留在列表里，保证之后能被销毁
                match result {
                    Ok(set) => {
                        self.ready_pools.push(pool);
                        Ok(set)
                    }
                    Err(e) => {
                        self.full_pools.push(pool);
                        Err(e).with_context(|| {
                            format!("descriptor allocator {}: descriptor allocation failed after pool growth", self.name)
                        })
                    }
                }
            }
            Err(e) => {
                self.ready_pools.push(pool);
                Err(e).with_context(|| format!("descriptor allocator {}: failed to allocate descriptor set", self.name))
            }
        }
    }

    /// 归还所有 set，所有 pool 重新变为可用
    pub fn reset_pools<B: DescriptorBackend + ?Sized>(&mut self, backend: &B) -> anyhow::Result<()> {
        for &pool in self.ready_pools.iter().chain(self.full_pools.iter()) {
            backend
                .reset_pool(pool)
                .with_context(|| format!("descriptor allocator {}: failed to reset pool", self.name))?;
        }
        self.ready_pools.append(&mut self.full_pools);
        Ok(())
    }

    /// 取出一个可用的 pool，没有的话就新建一个
    fn get_pool<B: DescriptorBackend + ?Sized>(&mut self, backend: &B) -> anyhow::Result<vk::DescriptorPool> {
        match self.ready_pools.pop() {
            Some(pool) => Ok(pool),
            None => self.create_pool(backend),
        }
    }

    /// 按照当前的 sets_per_pool 创建 pool，之后容量增长
    fn create_pool<B: DescriptorBackend + ?Sized>(&mut self, backend: &B) -> anyhow::Result<vk::DescriptorPool> {
        let set_count = self.sets_per_pool;
        let pool_sizes = Self::pool_sizes(&self.ratios, set_count);
        let pool = backend
            .create_pool(set_count, &pool_sizes)
            .with_context(|| format!("descriptor allocator {}: failed to create pool of {set_count} sets", self.name))?;
        self.sets_per_pool = Self::next_pool_size(set_count);
        Ok(pool)
    }
}
// destroy
impl GfxGrowableDescriptorAllocator {
    pub fn destroy_pools<B: DescriptorBackend + ?Sized>(&mut self, backend: &B) {
        log::debug!("destroying descriptor allocator: {}", self.name);
        self.ready_pools.drain(..).chain(self.full_pools.drain(..)).for_each(|pool| backend.destroy_pool(pool));
    }
}
impl Drop for GfxGrowableDescriptorAllocator {
    fn drop(&mut self) {
        debug_assert!(self.pool_count() == 0, "descriptor allocator {} must destroy its pools before drop", self.name);
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::HashMap};

    use ash::{prelude::VkResult, vk::Handle};

    use super::*;
    use crate::descriptors::writer::GfxDescriptorWriter;

    /// 每个 pool 记录容量与已分配数量
    #[derive(Default)]
    struct MockBackend {
        pools: RefCell<HashMap<u64, (u32, u32)>>,
        next_handle: RefCell<u64>,
        created: RefCell<Vec<u32>>,
        destroyed: RefCell<usize>,
    }
    impl MockBackend {
        fn next(&self) -> u64 {
            let mut next = self.next_handle.borrow_mut();
            *next += 1;
            *next
        }
    }
    impl DescriptorBackend for MockBackend {
        fn create_pool(&self, max_sets: u32, _pool_sizes: &[vk::DescriptorPoolSize]) -> VkResult<vk::DescriptorPool> {
            let raw = self.next();
            self.pools.borrow_mut().insert(raw, (max_sets, 0));
            self.created.borrow_mut().push(max_sets);
            Ok(vk::DescriptorPool::from_raw(raw))
        }

        fn destroy_pool(&self, pool: vk::DescriptorPool) {
            self.pools.borrow_mut().remove(&pool.as_raw());
            *self.destroyed.borrow_mut() += 1;
        }

        fn reset_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
            let mut pools = self.pools.borrow_mut();
            let entry = pools.get_mut(&pool.as_raw()).ok_or(vk::Result::ERROR_UNKNOWN)?;
            entry.1 = 0;
            Ok(())
        }

        fn allocate_set(&self, pool: vk::DescriptorPool, _layout: vk::DescriptorSetLayout) -> VkResult<vk::DescriptorSet> {
            {
                let mut pools = self.pools.borrow_mut();
                let entry = pools.get_mut(&pool.as_raw()).ok_or(vk::Result::ERROR_UNKNOWN)?;
                if entry.1 >= entry.0 {
                    return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
                }
                entry.1 += 1;
            }
            Ok(vk::DescriptorSet::from_raw(1000 + self.next()))
        }

        fn write_set(&self, _set: vk::DescriptorSet, _writer: &GfxDescriptorWriter) {}
    }

    /// 创建 pool 总是成功，但分配总是失败
    struct ExhaustedBackend;
    impl DescriptorBackend for ExhaustedBackend {
        fn create_pool(&self, _: u32, _: &[vk::DescriptorPoolSize]) -> VkResult<vk::DescriptorPool> {
            Ok(vk::DescriptorPool::from_raw(1))
        }
        fn destroy_pool(&self, _: vk::DescriptorPool) {}
        fn reset_pool(&self, _: vk::DescriptorPool) -> VkResult<()> {
            Ok(())
        }
        fn allocate_set(&self, _: vk::DescriptorPool, _: vk::DescriptorSetLayout) -> VkResult<vk::DescriptorSet> {
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
        }
        fn write_set(&self, _: vk::DescriptorSet, _: &GfxDescriptorWriter) {}
    }

    const RATIOS: [PoolSizeRatio; 2] = [
        PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0),
        PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2.0),
    ];

    #[test]
    fn test_grows_once_when_exhausted() {
        let backend = MockBackend::default();
        let layout = vk::DescriptorSetLayout::from_raw(9);
        let mut allocator = GfxGrowableDescriptorAllocator::new(&backend, 4, &RATIOS, "test").unwrap();
        assert_eq!(allocator.pool_count(), 1);

        for _ in 0..4 {
            allocator.allocate(&backend, layout).unwrap();
        }
        assert_eq!(allocator.pool_count(), 1);

        // 第 5 次分配触发扩容
        allocator.allocate(&backend, layout).unwrap();
        assert_eq!(allocator.pool_count(), 2);
        assert_eq!(*backend.created.borrow(), vec![4, 6]);

        allocator.destroy_pools(&backend);
        assert_eq!(*backend.destroyed.borrow(), 2);
    }

    #[test]
    fn test_reset_reuses_pools() {
        let backend = MockBackend::default();
        let layout = vk::DescriptorSetLayout::from_raw(9);
        let mut allocator = GfxGrowableDescriptorAllocator::new(&backend, 2, &RATIOS, "test").unwrap();
        for _ in 0..5 {
            allocator.allocate(&backend, layout).unwrap();
        }
        let pools_before = allocator.pool_count();
        let created_before = backend.created.borrow().len();

        allocator.reset_pools(&backend).unwrap();
        for _ in 0..5 {
            allocator.allocate(&backend, layout).unwrap();
        }
        assert_eq!(allocator.pool_count(), pools_before);
        assert_eq!(backend.created.borrow().len(), created_before);

        allocator.destroy_pools(&backend);
        assert!(backend.pools.borrow().is_empty());
    }

    #[test]
    fn test_second_failure_is_error() {
        let mut allocator = GfxGrowableDescriptorAllocator::new(&ExhaustedBackend, 1, &RATIOS, "test").unwrap();
        let err = allocator.allocate(&ExhaustedBackend, vk::DescriptorSetLayout::null()).unwrap_err();
        assert!(format!("{err:#}").contains("after pool growth"));
        allocator.destroy_pools(&ExhaustedBackend);
    }

    #[test]
    fn test_pool_growth_is_capped() {
        assert_eq!(GfxGrowableDescriptorAllocator::next_pool_size(10), 15);
        assert_eq!(GfxGrowableDescriptorAllocator::next_pool_size(4000), GfxGrowableDescriptorAllocator::MAX_SETS_PER_POOL);
    }

    #[test]
    fn test_pool_sizes_follow_ratio() {
        let sizes = GfxGrowableDescriptorAllocator::pool_sizes(&RATIOS, 10);
        assert_eq!(sizes[0].descriptor_count, 10);
        assert_eq!(sizes[1].descriptor_count, 20);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    }
}
