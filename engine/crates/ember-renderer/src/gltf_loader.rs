//! glTF 加载
//!
//! 分为两个阶段：
//! 1. `parse_gltf`：纯 CPU，解析文档、读取 buffer、解码纹理，得到 `GltfSceneData`
//! 2. `load_gltf`：把 `GltfSceneData` 上传到 GPU，构建 `LoadedGltf`
//!
//! 第二阶段创建的所有 GPU 对象都先注册到场景私有的 deletion queue，加载失败时整体释放。

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    rc::Rc,
};

use anyhow::Context;
use ash::vk;
use base64::Engine as _;
use ember_gfx::{
    deletion_queue::{DeletionQueue, GfxDeletion},
    descriptors::allocator::{GfxGrowableDescriptorAllocator, PoolSizeRatio},
    gfx::Gfx,
    resources::{buffer::GfxBuffer, image::GfxImageHandle, sampler::GfxSamplerDesc},
};
use ember_scene::{
    bounds::Bounds,
    material::{GltfMaterial, MaterialPass},
    mesh::{GeoSurface, GpuMeshBuffers, MeshAsset, Vertex},
    scene_graph::{NodeHandle, NodeKind, SceneGraph},
};
use glam::{Mat4, Vec3, Vec4};
use gltf::{
    material::AlphaMode,
    texture::{MagFilter, MinFilter},
};
use indexmap::IndexMap;
use itertools::Itertools;

use crate::{
    default_resources::DefaultResources,
    loaded_scene::LoadedGltf,
    material_binder::{GltfMetallicRoughness, MaterialConstants, MaterialResources, material_stride},
    upload,
};

/// 纹理引用：image 与 sampler 在文档中的索引
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GltfTextureRef {
    pub image: usize,
    /// 没有 sampler 时使用默认的 linear sampler
    pub sampler: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct GltfMaterialData {
    pub name: String,
    pub pass: MaterialPass,
    pub constants: MaterialConstants,
    pub color_texture: Option<GltfTextureRef>,
    pub metal_rough_texture: Option<GltfTextureRef>,
}

#[derive(Clone, Debug)]
pub struct GltfSurfaceData {
    pub start_index: u32,
    pub count: u32,
    pub bounds: Bounds,
    /// None 表示使用默认材质
    pub material: Option<usize>,
}

/// 一个 mesh 的所有 primitive 合并到同一组顶点与索引中
#[derive(Clone, Debug)]
pub struct GltfMeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub surfaces: Vec<GltfSurfaceData>,
}

#[derive(Clone, Debug)]
pub struct GltfNodeData {
    pub name: String,
    pub local_transform: Mat4,
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
}

/// 解码后的 RGBA8 像素
#[derive(Clone, Debug)]
pub struct GltfImageData {
    pub name: String,
    pub extent: vk::Extent2D,
    pub pixels: Vec<u8>,
}

/// 一个 glTF 文件解析后的全部 CPU 数据，各个数组的下标与文档中的索引一致
#[derive(Clone, Debug, Default)]
pub struct GltfSceneData {
    pub samplers: Vec<GfxSamplerDesc>,
    pub images: Vec<GltfImageData>,
    pub materials: Vec<GltfMaterialData>,
    pub meshes: Vec<GltfMeshData>,
    pub nodes: Vec<GltfNodeData>,
}

/// 加载 glTF 时需要的引擎资源
pub struct GltfLoadContext<'a> {
    pub gfx: &'a Gfx,
    pub metal_rough_material: &'a mut GltfMetallicRoughness,
    pub default_resources: &'a DefaultResources,
}

// ============================================================================
// 解析
// ============================================================================

pub fn extract_mag_filter(filter: MagFilter) -> vk::Filter {
    match filter {
        MagFilter::Nearest => vk::Filter::NEAREST,
        MagFilter::Linear => vk::Filter::LINEAR,
    }
}

/// nearest* 为 NEAREST，linear* 为 LINEAR
pub fn extract_filter(filter: MinFilter) -> vk::Filter {
    match filter {
        MinFilter::Nearest | MinFilter::NearestMipmapNearest | MinFilter::NearestMipmapLinear => vk::Filter::NEAREST,
        MinFilter::Linear | MinFilter::LinearMipmapNearest | MinFilter::LinearMipmapLinear => vk::Filter::LINEAR,
    }
}

/// *_mipmap_nearest 为 NEAREST，其余为 LINEAR
pub fn extract_mipmap_mode(filter: MinFilter) -> vk::SamplerMipmapMode {
    match filter {
        MinFilter::NearestMipmapNearest | MinFilter::LinearMipmapNearest => vk::SamplerMipmapMode::NEAREST,
        _ => vk::SamplerMipmapMode::LINEAR,
    }
}

pub fn parse_gltf_file(path: &Path) -> anyhow::Result<GltfSceneData> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_gltf(&bytes, path.parent())
}

/// base_dir 用于解析相对路径的外部 buffer 与图片；纯内嵌的文件可以传 None
pub fn parse_gltf(bytes: &[u8], base_dir: Option<&Path>) -> anyhow::Result<GltfSceneData> {
    let _span = tracy_client::span!("parse_gltf");

    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(bytes).context("failed to parse gltf document")?;
    let version = &document.as_json().asset.version;
    anyhow::ensure!(version.starts_with("2."), "unsupported gltf version {version}");

    let buffers = gltf::import_buffers(&document, base_dir, blob).context("failed to load gltf buffers")?;

    let samplers = document.samplers().map(|sampler| parse_sampler(&sampler)).collect();
    let images = document
        .images()
        .map(|image| decode_image(&image, &buffers, base_dir))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let materials = document.materials().enumerate().map(|(idx, material)| parse_material(&material, idx)).collect();
    let meshes = document.meshes().map(|mesh| parse_mesh(&mesh, &buffers)).collect::<anyhow::Result<Vec<_>>>()?;
    let nodes = document
        .nodes()
        .map(|node| GltfNodeData {
            name: node.name().map(str::to_string).unwrap_or_else(|| format!("node-{}", node.index())),
            local_transform: Mat4::from_cols_array_2d(&node.transform().matrix()),
            mesh: node.mesh().map(|mesh| mesh.index()),
            children: node.children().map(|child| child.index()).collect_vec(),
        })
        .collect();

    Ok(GltfSceneData {
        samplers,
        images,
        materials,
        meshes,
        nodes,
    })
}

fn parse_sampler(sampler: &gltf::texture::Sampler<'_>) -> GfxSamplerDesc {
    GfxSamplerDesc {
        mag_filter: sampler.mag_filter().map_or(vk::Filter::NEAREST, extract_mag_filter),
        min_filter: sampler.min_filter().map_or(vk::Filter::NEAREST, extract_filter),
        mipmap_mode: sampler.min_filter().map_or(vk::SamplerMipmapMode::LINEAR, extract_mipmap_mode),
        address_mode: vk::SamplerAddressMode::REPEAT,
    }
}

fn parse_material(material: &gltf::Material<'_>, idx: usize) -> GltfMaterialData {
    let pbr = material.pbr_metallic_roughness();
    let texture_ref = |info: Option<gltf::texture::Info<'_>>| {
        info.map(|info| GltfTextureRef {
            image: info.texture().source().index(),
            sampler: info.texture().sampler().index(),
        })
    };

    GltfMaterialData {
        name: material.name().map(str::to_string).unwrap_or_else(|| format!("material-{idx}")),
        pass: match material.alpha_mode() {
            AlphaMode::Blend => MaterialPass::Transparent,
            AlphaMode::Opaque | AlphaMode::Mask => MaterialPass::Opaque,
        },
        constants: MaterialConstants::new(
            Vec4::from_array(pbr.base_color_factor()),
            Vec4::new(pbr.metallic_factor(), pbr.roughness_factor(), 0.0, 0.0),
        ),
        color_texture: texture_ref(pbr.base_color_texture()),
        metal_rough_texture: texture_ref(pbr.metallic_roughness_texture()),
    }
}

fn parse_mesh(mesh: &gltf::Mesh<'_>, buffers: &[gltf::buffer::Data]) -> anyhow::Result<GltfMeshData> {
    let name = mesh.name().map(str::to_string).unwrap_or_else(|| format!("mesh-{}", mesh.index()));
    let mut vertices: Vec<Vertex> = vec![];
    let mut indices: Vec<u32> = vec![];
    let mut surfaces = vec![];

    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::warn!("mesh {name}: skip primitive {} with mode {:?}", primitive.index(), primitive.mode());
            continue;
        }

        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
        let positions = reader
            .read_positions()
            .with_context(|| format!("mesh {name}: primitive {} has no POSITION", primitive.index()))?;

        let base_vertex = vertices.len();
        let start_index = indices.len() as u32;
        vertices.extend(positions.map(|p| Vertex {
            position: Vec3::from_array(p),
            ..Default::default()
        }));
        let primitive_vertices = &mut vertices[base_vertex..];

        match reader.read_indices() {
            Some(read) => indices.extend(read.into_u32().map(|idx| idx + base_vertex as u32)),
            None => indices.extend((0..primitive_vertices.len() as u32).map(|idx| idx + base_vertex as u32)),
        }

        if let Some(normals) = reader.read_normals() {
            for (vertex, normal) in primitive_vertices.iter_mut().zip(normals) {
                vertex.normal = Vec3::from_array(normal);
            }
        }
        if let Some(uvs) = reader.read_tex_coords(0) {
            for (vertex, uv) in primitive_vertices.iter_mut().zip(uvs.into_f32()) {
                vertex.uv_x = uv[0];
                vertex.uv_y = uv[1];
            }
        }
        if let Some(colors) = reader.read_colors(0) {
            for (vertex, color) in primitive_vertices.iter_mut().zip(colors.into_rgba_f32()) {
                vertex.color = Vec4::from_array(color);
            }
        }

        surfaces.push(GltfSurfaceData {
            start_index,
            count: indices.len() as u32 - start_index,
            bounds: Bounds::from_points(primitive_vertices.iter().map(|v| v.position)).unwrap_or_default(),
            material: primitive.material().index(),
        });
    }

    Ok(GltfMeshData {
        name,
        vertices,
        indices,
        surfaces,
    })
}

fn decode_image(
    image: &gltf::Image<'_>,
    buffers: &[gltf::buffer::Data],
    base_dir: Option<&Path>,
) -> anyhow::Result<GltfImageData> {
    let name = image.name().map(str::to_string).unwrap_or_else(|| format!("image-{}", image.index()));
    let bytes: Cow<'_, [u8]> = match image.source() {
        gltf::image::Source::View { view, .. } => {
            let buffer = buffers
                .get(view.buffer().index())
                .with_context(|| format!("image {name}: buffer {} does not exist", view.buffer().index()))?;
            let range = view.offset()..view.offset() + view.length();
            Cow::Borrowed(buffer.0.get(range).with_context(|| format!("image {name}: buffer view out of range"))?)
        }
        gltf::image::Source::Uri { uri, .. } => Cow::Owned(read_uri(uri, base_dir)?),
    };

    let rgba = image::load_from_memory(&bytes).with_context(|| format!("failed to decode image {name}"))?.to_rgba8();
    Ok(GltfImageData {
        name,
        extent: vk::Extent2D {
            width: rgba.width(),
            height: rgba.height(),
        },
        pixels: rgba.into_raw(),
    })
}

/// 支持 base64 data uri 与相对于 base_dir 的文件
fn read_uri(uri: &str, base_dir: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    if let Some(data) = uri.strip_prefix("data:") {
        let (_, payload) = data.split_once(";base64,").context("only base64 data uri is supported")?;
        return base64::engine::general_purpose::STANDARD.decode(payload).context("invalid base64 data uri");
    }

    let path: PathBuf = base_dir.context("relative uri requires a base directory")?.join(uri);
    std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
}

// ============================================================================
// 构建 CPU 端的场景对象
// ============================================================================

/// meshes 与 mesh_buffers 一一对应，没有上传的 mesh 对应 None；surface 的材质索引无效时使用默认材质
pub fn build_mesh_assets(
    meshes: &[GltfMeshData],
    mesh_buffers: &[Option<GpuMeshBuffers>],
    materials: &[Rc<GltfMaterial>],
    default_material: &Rc<GltfMaterial>,
) -> Vec<Option<Rc<MeshAsset>>> {
    meshes
        .iter()
        .zip(mesh_buffers)
        .map(|(mesh, buffers)| {
            let buffers = (*buffers)?;
            let surfaces = mesh
                .surfaces
                .iter()
                .map(|surface| GeoSurface {
                    start_index: surface.start_index,
                    count: surface.count,
                    bounds: surface.bounds,
                    material: surface
                        .material
                        .and_then(|idx| materials.get(idx))
                        .unwrap_or(default_material)
                        .clone(),
                })
                .collect();
            Some(Rc::new(MeshAsset {
                name: mesh.name.clone(),
                surfaces,
                mesh_buffers: buffers,
            }))
        })
        .collect()
}

/// 按文档顺序创建节点并建立父子关系，返回的 handle 与 nodes 一一对应
///
/// 引用了被跳过的 mesh 的节点退化为 Group，子节点照常挂接
pub fn build_scene_graph(
    nodes: &[GltfNodeData],
    meshes: &[Option<Rc<MeshAsset>>],
) -> anyhow::Result<(SceneGraph, Vec<NodeHandle>)> {
    let mut graph = SceneGraph::default();
    let handles = nodes
        .iter()
        .map(|node| {
            let kind = match node.mesh {
                Some(idx) => {
                    match meshes.get(idx).with_context(|| format!("node {}: mesh {idx} does not exist", node.name))? {
                        Some(mesh) => NodeKind::Mesh(mesh.clone()),
                        None => NodeKind::Group,
                    }
                }
                None => NodeKind::Group,
            };
            Ok(graph.add_node(node.name.clone(), node.local_transform, kind))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    for (node, &parent) in nodes.iter().zip(&handles) {
        for &child in &node.children {
            let child = *handles.get(child).with_context(|| format!("node {}: child {child} does not exist", node.name))?;
            graph.attach_child(parent, child).with_context(|| format!("invalid hierarchy at node {}", node.name))?;
        }
    }
    graph.finalize(handles.iter().copied());

    Ok((graph, handles))
}

/// 重名时追加序号，保证 key 唯一
pub fn unique_key<V>(map: &IndexMap<String, V>, name: &str) -> String {
    if !map.contains_key(name) {
        return name.to_string();
    }
    (1..).map(|idx| format!("{name}.{idx}")).find(|key| !map.contains_key(key)).unwrap_or_default()
}

// ============================================================================
// GPU 上传
// ============================================================================

/// 加载完整的场景；失败时记录错误，已经创建的 GPU 对象全部释放
pub fn load_gltf(ctx: &mut GltfLoadContext<'_>, name: &str, path: &Path) -> Option<LoadedGltf> {
    let _span = tracy_client::span!("load_gltf");
    log::info!("loading gltf {}", path.display());

    let data = match parse_gltf_file(path) {
        Ok(data) => data,
        Err(e) => {
            log::error!("failed to load gltf {}: {e:#}", path.display());
            return None;
        }
    };

    let mut scene = LoadedGltf::new(name);
    match upload_scene(ctx, &mut scene, &data) {
        Ok(()) => {
            log::info!(
                "loaded gltf {}: {} meshes, {} materials, {} images, {} nodes",
                path.display(),
                scene.meshes.len(),
                scene.materials.len(),
                scene.images.len(),
                scene.nodes.len()
            );
            Some(scene)
        }
        Err(e) => {
            log::error!("failed to upload gltf {}: {e:#}", path.display());
            scene.clear_all(ctx.gfx);
            None
        }
    }
}

/// 只加载 mesh，所有 surface 使用默认材质
///
/// 成功时 GPU buffer 转交给 deletion_queue
pub fn load_gltf_meshes(
    ctx: &GltfLoadContext<'_>,
    path: &Path,
    deletion_queue: &mut DeletionQueue<GfxDeletion>,
) -> Option<Vec<Rc<MeshAsset>>> {
    let _span = tracy_client::span!("load_gltf_meshes");

    let mut staged = DeletionQueue::default();
    let result = parse_gltf_file(path).and_then(|data| {
        let mesh_buffers = upload_meshes(ctx.gfx, &data.meshes, &mut staged)?;
        Ok(build_mesh_assets(&data.meshes, &mesh_buffers, &[], &ctx.default_resources.default_material)
            .into_iter()
            .flatten()
            .collect())
    });

    match result {
        Ok(meshes) => {
            deletion_queue.append(&mut staged);
            Some(meshes)
        }
        Err(e) => {
            log::error!("failed to load meshes from {}: {e:#}", path.display());
            staged.flush(ctx.gfx);
            None
        }
    }
}

/// 逐个上传 mesh；没有可绘制 surface 的 mesh（例如只含点或线图元）跳过并返回 None
fn upload_meshes(
    gfx: &Gfx,
    meshes: &[GltfMeshData],
    deletion_queue: &mut DeletionQueue<GfxDeletion>,
) -> anyhow::Result<Vec<Option<GpuMeshBuffers>>> {
    meshes
        .iter()
        .map(|mesh| {
            if mesh.surfaces.is_empty() {
                log::warn!("mesh {} has no triangle primitives, skipped", mesh.name);
                return Ok(None);
            }
            upload::upload_mesh(gfx, &mesh.indices, &mesh.vertices, &mesh.name, deletion_queue).map(Some)
        })
        .collect()
}

/// 上传一张解码后的图片，生成完整的 mip chain
pub fn load_image(
    gfx: &Gfx,
    image: &GltfImageData,
    deletion_queue: &mut DeletionQueue<GfxDeletion>,
) -> Option<GfxImageHandle> {
    upload_image(gfx, image, deletion_queue)
        .inspect_err(|e| log::error!("failed to load image {}: {e:#}", image.name))
        .ok()
}

fn upload_image(
    gfx: &Gfx,
    image: &GltfImageData,
    deletion_queue: &mut DeletionQueue<GfxDeletion>,
) -> anyhow::Result<GfxImageHandle> {
    upload::create_image(
        gfx,
        &image.pixels,
        image.extent,
        vk::Format::R8G8B8A8_UNORM,
        vk::ImageUsageFlags::SAMPLED,
        true,
        &image.name,
        deletion_queue,
    )
}

/// 材质缺少纹理时使用白色纹理，纹理索引无效时使用错误棋盘格
fn resolve_texture(
    texture: Option<GltfTextureRef>,
    images: &[GfxImageHandle],
    samplers: &[vk::Sampler],
    defaults: &DefaultResources,
) -> (GfxImageHandle, vk::Sampler) {
    match texture {
        Some(texture) => (
            images.get(texture.image).copied().unwrap_or(defaults.error_checkerboard_image),
            texture.sampler.and_then(|idx| samplers.get(idx).copied()).unwrap_or(defaults.sampler_linear),
        ),
        None => (defaults.white_image, defaults.sampler_linear),
    }
}

/// 创建顺序：descriptor pool，材质常量 buffer，sampler，image，材质，mesh，节点
fn upload_scene(ctx: &mut GltfLoadContext<'_>, scene: &mut LoadedGltf, data: &GltfSceneData) -> anyhow::Result<()> {
    const SCENE_DESCRIPTOR_RATIOS: [PoolSizeRatio; 3] = [
        PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 3.0),
        PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 3.0),
        PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 1.0),
    ];

    let gfx = ctx.gfx;
    let defaults = ctx.default_resources;
    let material_count = data.materials.len().max(1);

    let descriptor_pool = scene.descriptor_pool.insert(GfxGrowableDescriptorAllocator::new(
        gfx.device(),
        material_count as u32,
        &SCENE_DESCRIPTOR_RATIOS,
        format!("gltf-{}", scene.name),
    )?);

    // 每个材质占用一个对齐后的槽位
    let stride = material_stride(gfx.min_ubo_offset_align());
    let material_buffer = GfxBuffer::new(
        gfx,
        stride * material_count as vk::DeviceSize,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        true,
        format!("{}-material-constants", scene.name),
    )?;
    scene.material_data_buffer = material_buffer.vk_buffer();
    let written = data.materials.iter().enumerate().try_for_each(|(idx, material)| {
        material_buffer.write_by_mmap(gfx, idx as vk::DeviceSize * stride, std::slice::from_ref(&material.constants))
    });
    scene.deletion_queue.push(GfxDeletion::Buffer(material_buffer));
    written?;

    for (idx, desc) in data.samplers.iter().enumerate() {
        let sampler = desc.create(gfx.device(), &format!("{}-sampler-{idx}", scene.name))?;
        scene.deletion_queue.push(GfxDeletion::Sampler(sampler));
        scene.samplers.push(sampler);
    }

    let mut images = Vec::with_capacity(data.images.len());
    for image in &data.images {
        let handle = upload_image(gfx, image, &mut scene.deletion_queue)?;
        images.push(handle);
        scene.images.insert(unique_key(&scene.images, &image.name), handle);
    }

    let mut materials = Vec::with_capacity(data.materials.len());
    for (idx, material) in data.materials.iter().enumerate() {
        let (color_image, color_sampler) =
            resolve_texture(material.color_texture, &images, &scene.samplers, defaults);
        let (metal_rough_image, metal_rough_sampler) =
            resolve_texture(material.metal_rough_texture, &images, &scene.samplers, defaults);
        let resources = MaterialResources {
            color_image,
            color_sampler,
            metal_rough_image,
            metal_rough_sampler,
            data_buffer: scene.material_data_buffer,
            data_buffer_offset: idx as vk::DeviceSize * stride,
        };

        let instance =
            ctx.metal_rough_material.write_material(gfx.device(), material.pass, &resources, descriptor_pool)?;
        let material = Rc::new(GltfMaterial {
            name: material.name.clone(),
            data: instance,
        });
        scene.materials.insert(unique_key(&scene.materials, &material.name), material.clone());
        materials.push(material);
    }

    let mesh_buffers = upload_meshes(gfx, &data.meshes, &mut scene.deletion_queue)?;
    let mesh_assets = build_mesh_assets(&data.meshes, &mesh_buffers, &materials, &defaults.default_material);
    for mesh in mesh_assets.iter().flatten() {
        scene.meshes.insert(unique_key(&scene.meshes, &mesh.name), mesh.clone());
    }

    let (scene_graph, handles) = build_scene_graph(&data.nodes, &mesh_assets)?;
    for (node, handle) in data.nodes.iter().zip(handles) {
        scene.nodes.insert(unique_key(&scene.nodes, &node.name), handle);
    }
    scene.scene_graph = scene_graph;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_filter() {
        assert_eq!(extract_filter(MinFilter::Nearest), vk::Filter::NEAREST);
        assert_eq!(extract_filter(MinFilter::NearestMipmapLinear), vk::Filter::NEAREST);
        assert_eq!(extract_filter(MinFilter::LinearMipmapNearest), vk::Filter::LINEAR);
        assert_eq!(extract_mag_filter(MagFilter::Linear), vk::Filter::LINEAR);
    }

    #[test]
    fn test_extract_mipmap_mode() {
        assert_eq!(extract_mipmap_mode(MinFilter::NearestMipmapNearest), vk::SamplerMipmapMode::NEAREST);
        assert_eq!(extract_mipmap_mode(MinFilter::LinearMipmapNearest), vk::SamplerMipmapMode::NEAREST);
        assert_eq!(extract_mipmap_mode(MinFilter::LinearMipmapLinear), vk::SamplerMipmapMode::LINEAR);
        assert_eq!(extract_mipmap_mode(MinFilter::Linear), vk::SamplerMipmapMode::LINEAR);
    }

    #[test]
    fn test_unique_key() {
        let mut map = IndexMap::new();
        map.insert("cube".to_string(), 0);
        assert_eq!(unique_key(&map, "sphere"), "sphere");
        assert_eq!(unique_key(&map, "cube"), "cube.1");
        map.insert("cube.1".to_string(), 1);
        assert_eq!(unique_key(&map, "cube"), "cube.2");
    }

    #[test]
    fn test_read_data_uri() {
        // "hello"
        assert_eq!(read_uri("data:application/octet-stream;base64,aGVsbG8=", None).unwrap(), b"hello");
        assert!(read_uri("data:text/plain,hello", None).is_err());
        assert!(read_uri("texture.png", None).is_err());
    }

    #[test]
    fn test_scene_graph_rejects_bad_child() {
        let nodes = vec![GltfNodeData {
            name: "root".to_string(),
            local_transform: Mat4::IDENTITY,
            mesh: None,
            children: vec![3],
        }];
        assert!(build_scene_graph(&nodes, &[]).is_err());
    }

    #[test]
    fn test_scene_graph_skipped_mesh_becomes_group() {
        let nodes = vec![
            GltfNodeData {
                name: "lines".to_string(),
                local_transform: Mat4::IDENTITY,
                mesh: Some(0),
                children: vec![1],
            },
            GltfNodeData {
                name: "child".to_string(),
                local_transform: Mat4::IDENTITY,
                mesh: None,
                children: vec![],
            },
        ];
        let (graph, handles) = build_scene_graph(&nodes, &[None]).unwrap();
        assert!(matches!(graph.node(handles[0]).unwrap().kind, NodeKind::Group));
        assert_eq!(graph.node(handles[1]).unwrap().parent, Some(handles[0]));

        // 越界的 mesh 索引仍然是错误
        assert!(build_scene_graph(&nodes, &[]).is_err());
    }

    #[test]
    fn test_scene_graph_keeps_hierarchy() {
        let nodes = vec![
            GltfNodeData {
                name: "child".to_string(),
                local_transform: Mat4::from_translation(Vec3::X),
                mesh: None,
                children: vec![],
            },
            GltfNodeData {
                name: "root".to_string(),
                local_transform: Mat4::from_translation(Vec3::Y),
                mesh: None,
                children: vec![0],
            },
        ];
        let (graph, handles) = build_scene_graph(&nodes, &[]).unwrap();
        assert_eq!(graph.top_nodes(), &[handles[1]]);
        let child = graph.node(handles[0]).unwrap();
        assert_eq!(child.parent, Some(handles[1]));
        assert_eq!(child.world_transform, Mat4::from_translation(Vec3::new(1.0, 1.0, 0.0)));
    }
}
