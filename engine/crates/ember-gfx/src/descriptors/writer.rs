use ash::vk;

/// 单个 binding 的写入内容
#[derive(Clone, Copy, Debug)]
pub enum GfxDescriptorInfo {
    Image(vk::DescriptorImageInfo),
    Buffer(vk::DescriptorBufferInfo),
}

#[derive(Clone, Copy, Debug)]
pub struct GfxDescriptorWrite {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub info: GfxDescriptorInfo,
}

/// 先收集写入项，再一次性更新到某个 descriptor set
///
/// ```ignore
/// let mut writer = GfxDescriptorWriter::default();
/// writer.write_buffer(0, scene_buffer, size, 0, vk::DescriptorType::UNIFORM_BUFFER);
/// writer.write_image(1, view, sampler, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
/// device.write_set(set, &writer);
/// ```
#[derive(Default, Debug)]
pub struct GfxDescriptorWriter {
    writes: Vec<GfxDescriptorWrite>,
}

impl GfxDescriptorWriter {
    pub fn write_image(
        &mut self,
        binding: u32,
        image_view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
        ty: vk::DescriptorType,
    ) -> &mut Self {
        self.writes.push(GfxDescriptorWrite {
            binding,
            ty,
            info: GfxDescriptorInfo::Image(
                vk::DescriptorImageInfo::default().image_view(image_view).sampler(sampler).image_layout(layout),
            ),
        });
        self
    }

    pub fn write_buffer(
        &mut self,
        binding: u32,
        buffer: vk::Buffer,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
        ty: vk::DescriptorType,
    ) -> &mut Self {
        self.writes.push(GfxDescriptorWrite {
            binding,
            ty,
            info: GfxDescriptorInfo::Buffer(
                vk::DescriptorBufferInfo::default().buffer(buffer).offset(offset).range(size),
            ),
        });
        self
    }

    #[inline]
    pub fn clear(&mut self) {
        self.writes.clear();
    }

    #[inline]
    pub fn writes(&self) -> &[GfxDescriptorWrite] {
        &self.writes
    }

    /// 生成的 WriteDescriptorSet 借用 writer 内部的 info
    pub fn vk_writes(&self, set: vk::DescriptorSet) -> Vec<vk::WriteDescriptorSet<'_>> {
        self.writes
            .iter()
            .map(|write| {
                let vk_write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .descriptor_type(write.ty);
                match &write.info {
                    GfxDescriptorInfo::Image(info) => vk_write.image_info(std::slice::from_ref(info)),
                    GfxDescriptorInfo::Buffer(info) => vk_write.buffer_info(std::slice::from_ref(info)),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_vk_writes_keep_order_and_count() {
        let mut writer = GfxDescriptorWriter::default();
        writer
            .write_buffer(0, vk::Buffer::from_raw(7), 256, 512, vk::DescriptorType::UNIFORM_BUFFER)
            .write_image(
                1,
                vk::ImageView::from_raw(3),
                vk::Sampler::from_raw(4),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            );

        let set = vk::DescriptorSet::from_raw(42);
        let writes = writer.vk_writes(set);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].dst_binding, 0);
        assert_eq!(writes[0].descriptor_count, 1);
        assert_eq!(writes[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(writes[1].dst_set, set);
        assert_eq!(writes[1].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);

        match writer.writes()[0].info {
            GfxDescriptorInfo::Buffer(info) => {
                assert_eq!(info.offset, 512);
                assert_eq!(info.range, 256);
            }
            GfxDescriptorInfo::Image(_) => panic!("binding 0 should be a buffer"),
        }

        writer.clear();
        assert!(writer.writes().is_empty());
    }
}
