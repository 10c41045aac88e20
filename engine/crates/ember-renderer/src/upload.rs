use anyhow::Context;
use ash::vk;
use ember_gfx::{
    deletion_queue::{DeletionQueue, GfxDeletion},
    gfx::Gfx,
    resources::{
        buffer::GfxBuffer,
        image::{GfxImage, GfxImageCreateInfo, GfxImageHandle},
    },
};
use ember_scene::mesh::{GpuMeshBuffers, Vertex};

/// 将顶点与索引上传到 device local 的 buffer
///
/// 两个 buffer 创建后立即注册到 deletion_queue，返回的只是 handle。
/// 数据各自经过 stage buffer 同步拷贝。
pub fn upload_mesh(
    gfx: &Gfx,
    indices: &[u32],
    vertices: &[Vertex],
    name: &str,
    deletion_queue: &mut DeletionQueue<GfxDeletion>,
) -> anyhow::Result<GpuMeshBuffers> {
    let _span = tracy_client::span!("upload_mesh");
    anyhow::ensure!(!indices.is_empty() && !vertices.is_empty(), "mesh {name} has no geometry");

    let (vertex_buffer, vertex_address) = create_device_buffer(
        gfx,
        vertices,
        vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        format!("{name}-vertex"),
        deletion_queue,
    )?;
    let (index_buffer, _) = create_device_buffer(
        gfx,
        indices,
        vk::BufferUsageFlags::INDEX_BUFFER,
        format!("{name}-index"),
        deletion_queue,
    )?;

    Ok(GpuMeshBuffers {
        index_buffer,
        vertex_buffer,
        vertex_buffer_address: vertex_address
            .with_context(|| format!("vertex buffer of {name} has no device address"))?,
    })
}

/// 创建 device local 的 buffer 并写入 data；上传失败时 buffer 同样交给 deletion_queue
fn create_device_buffer<T: bytemuck::Pod>(
    gfx: &Gfx,
    data: &[T],
    usage: vk::BufferUsageFlags,
    name: String,
    deletion_queue: &mut DeletionQueue<GfxDeletion>,
) -> anyhow::Result<(vk::Buffer, Option<vk::DeviceAddress>)> {
    let buffer = GfxBuffer::new(
        gfx,
        size_of_val(data) as vk::DeviceSize,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        false,
        name,
    )?;
    let uploaded = buffer.transfer_data_sync(gfx, data);
    let handles = (buffer.vk_buffer(), buffer.device_address());
    deletion_queue.push(GfxDeletion::Buffer(buffer));
    uploaded?;

    Ok(handles)
}

/// 根据 RGBA8 等像素数据创建采样用的 image，上传完成后处于 SHADER_READ_ONLY_OPTIMAL
#[allow(clippy::too_many_arguments)]
pub fn create_image(
    gfx: &Gfx,
    data: &[u8],
    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    mipmapped: bool,
    name: &str,
    deletion_queue: &mut DeletionQueue<GfxDeletion>,
) -> anyhow::Result<GfxImageHandle> {
    let image = GfxImage::from_pixels(gfx, data, extent, format, usage, mipmapped, name)?;
    let handle = image.handle_view();
    deletion_queue.push(GfxDeletion::Image(image));
    Ok(handle)
}

/// 不需要初始数据的 image，例如 draw image 与 depth image
pub fn create_attachment_image(
    gfx: &Gfx,
    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    name: &str,
    deletion_queue: &mut DeletionQueue<GfxDeletion>,
) -> anyhow::Result<GfxImageHandle> {
    let image = GfxImage::new(gfx, &GfxImageCreateInfo::new_image_2d_info(extent, format, usage), name)?;
    let handle = image.handle_view();
    deletion_queue.push(GfxDeletion::Image(image));
    Ok(handle)
}

/// 每帧重新写入的 host visible buffer，注册到帧槽位的 deletion queue
pub fn create_frame_uniform<T: bytemuck::Pod>(
    gfx: &Gfx,
    data: &T,
    name: &str,
    deletion_queue: &mut DeletionQueue<GfxDeletion>,
) -> anyhow::Result<vk::Buffer> {
    let buffer = GfxBuffer::new(
        gfx,
        size_of::<T>() as vk::DeviceSize,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        true,
        name,
    )?;
    let handle = buffer.vk_buffer();
    let result = buffer.write_by_mmap(gfx, 0, std::slice::from_ref(data));
    deletion_queue.push(GfxDeletion::Buffer(buffer));
    result?;
    Ok(handle)
}
