use ash::vk;
use ember_gfx::commands::command_buffer::GfxCommandBuffer;

/// blit 到 swapchain 之后录制的额外 pass，例如调试 UI
///
/// 调用时 swapchain image 处于 `COLOR_ATTACHMENT_OPTIMAL`，实现者负责自己的 begin/end rendering，
/// 返回后 image 需要保持该 layout。
pub trait OverlayPass {
    fn record(&mut self, cmd: &GfxCommandBuffer, target_view: vk::ImageView, extent: vk::Extent2D);
}

/// 对 target 的指定区域录制一次 color attachment 的 rendering
///
/// 使用 `LOAD` 保留 blit 的结果
pub fn overlay_rendering_info<'a>(attachment: &'a vk::RenderingAttachmentInfo<'a>, extent: vk::Extent2D) -> vk::RenderingInfo<'a> {
    vk::RenderingInfo::default()
        .render_area(vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        })
        .layer_count(1)
        .color_attachments(std::slice::from_ref(attachment))
}

pub fn overlay_color_attachment(target_view: vk::ImageView) -> vk::RenderingAttachmentInfo<'static> {
    vk::RenderingAttachmentInfo::default()
        .image_view(target_view)
        .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .load_op(vk::AttachmentLoadOp::LOAD)
        .store_op(vk::AttachmentStoreOp::STORE)
}
