//! 不需要 GPU 的场景测试：解析内嵌的 glTF，使用假的 GPU handle 构建场景图并遍历

use std::rc::Rc;

use ash::vk::{self, Handle};
use base64::Engine as _;
use ember_renderer::{
    gltf_loader::{self, GltfSceneData},
    stats::EngineStats,
};
use ember_scene::{
    camera::Camera,
    draw_context::DrawContext,
    material::{GltfMaterial, MaterialInstance, MaterialPass, MaterialPipeline},
    mesh::{GpuMeshBuffers, MeshAsset},
    scene_graph::SceneGraph,
};
use glam::{Mat4, Vec3, Vec4};

const QUAD_GLTF: &str = r#"{
  "asset": { "version": "2.0" },
  "scene": 0,
  "scenes": [{ "nodes": @ROOTS@ }],
  "nodes": @NODES@,
  "meshes": [{
    "name": "quad",
    "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }]
  }],
  "materials": [{
    "name": "quad-material",
    "alphaMode": "@ALPHA@",
    "pbrMetallicRoughness": {
      "baseColorFactor": [1.0, 0.5, 0.25, 1.0],
      "metallicFactor": 0.0,
      "roughnessFactor": 0.75
    }
  }],
  "buffers": [{ "byteLength": 60, "uri": "@URI@" }],
  "bufferViews": [
    { "buffer": 0, "byteOffset": 0, "byteLength": 48, "target": 34962 },
    { "buffer": 0, "byteOffset": 48, "byteLength": 12, "target": 34963 }
  ],
  "accessors": [
    {
      "bufferView": 0, "componentType": 5126, "count": 4, "type": "VEC3",
      "min": [-1.0, -1.0, @Z@], "max": [1.0, 1.0, @Z@]
    },
    { "bufferView": 1, "componentType": 5123, "count": 6, "type": "SCALAR" }
  ]
}"#;

/// 4 个顶点位于 z 平面上的正方形，6 个 u16 索引
fn quad_buffer_uri(z: f32) -> String {
    let positions: [[f32; 3]; 4] = [[-1.0, -1.0, z], [1.0, -1.0, z], [1.0, 1.0, z], [-1.0, 1.0, z]];
    let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];

    let mut bytes = bytemuck::cast_slice::<_, u8>(&positions).to_vec();
    bytes.extend_from_slice(bytemuck::cast_slice(&indices));
    assert_eq!(bytes.len(), 60);

    format!("data:application/octet-stream;base64,{}", base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn quad_gltf(z: f32, alpha_mode: &str, nodes: &str, roots: &str) -> String {
    QUAD_GLTF
        .replace("@URI@", &quad_buffer_uri(z))
        .replace("@Z@", &format!("{z:.1}"))
        .replace("@ALPHA@", alpha_mode)
        .replace("@NODES@", nodes)
        .replace("@ROOTS@", roots)
}

fn single_quad_gltf(alpha_mode: &str) -> String {
    quad_gltf(-5.0, alpha_mode, r#"[{ "name": "quad-node", "mesh": 0 }]"#, "[0]")
}

/// 用假的 handle 代替 GPU 上传的结果
///
/// 与真实上传一致，没有 surface 的 mesh 不分配 buffer
fn build_scene(data: &GltfSceneData) -> (SceneGraph, Vec<Option<Rc<MeshAsset>>>) {
    let mesh_buffers: Vec<Option<GpuMeshBuffers>> = data
        .meshes
        .iter()
        .zip(0u64..)
        .map(|(mesh, idx)| {
            (!mesh.surfaces.is_empty()).then(|| GpuMeshBuffers {
                index_buffer: vk::Buffer::from_raw(100 + idx),
                vertex_buffer: vk::Buffer::from_raw(200 + idx),
                vertex_buffer_address: 0x1000 * (idx + 1),
            })
        })
        .collect();
    let materials: Vec<Rc<GltfMaterial>> = data
        .materials
        .iter()
        .enumerate()
        .map(|(idx, material)| {
            Rc::new(GltfMaterial {
                name: material.name.clone(),
                data: MaterialInstance {
                    pipeline: MaterialPipeline {
                        pipeline: vk::Pipeline::from_raw(10 + material.pass as u64),
                        layout: vk::PipelineLayout::from_raw(20),
                    },
                    material_set: vk::DescriptorSet::from_raw(30 + idx as u64),
                    pass_type: material.pass,
                },
            })
        })
        .collect();
    let default_material = Rc::new(GltfMaterial {
        name: "default".to_string(),
        data: MaterialInstance {
            material_set: vk::DescriptorSet::from_raw(99),
            ..Default::default()
        },
    });

    let meshes = gltf_loader::build_mesh_assets(&data.meshes, &mesh_buffers, &materials, &default_material);
    let (graph, _) = gltf_loader::build_scene_graph(&data.nodes, &meshes).unwrap();
    (graph, meshes)
}

fn draw_with_default_camera(graph: &SceneGraph) -> DrawContext {
    let mut ctx = DrawContext::default();
    ctx.begin_frame(Camera::default().view_proj(16.0 / 9.0));
    graph.draw_all(Mat4::IDENTITY, &mut ctx);
    ctx
}

#[test]
fn test_parse_single_quad() {
    let data = gltf_loader::parse_gltf(single_quad_gltf("OPAQUE").as_bytes(), None).unwrap();

    assert_eq!(data.meshes.len(), 1);
    assert_eq!(data.materials.len(), 1);
    assert_eq!(data.nodes.len(), 1);
    assert!(data.images.is_empty());
    assert!(data.samplers.is_empty());

    let material = &data.materials[0];
    assert_eq!(material.name, "quad-material");
    assert_eq!(material.pass, MaterialPass::Opaque);
    assert_eq!(material.constants.color_factors, Vec4::new(1.0, 0.5, 0.25, 1.0));
    assert_eq!(material.constants.metal_rough_factors, Vec4::new(0.0, 0.75, 0.0, 0.0));
    assert!(material.color_texture.is_none());

    let mesh = &data.meshes[0];
    assert_eq!(mesh.name, "quad");
    assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    assert_eq!(mesh.vertices.len(), 4);
    // 没有 NORMAL 与 COLOR_0 时使用默认值
    assert_eq!(mesh.vertices[0].normal, Vec3::X);
    assert_eq!(mesh.vertices[0].color, Vec4::ONE);

    let surface = &mesh.surfaces[0];
    assert_eq!((surface.start_index, surface.count), (0, 6));
    assert_eq!(surface.material, Some(0));
    assert_eq!(surface.bounds.origin, Vec3::new(0.0, 0.0, -5.0));
    assert_eq!(surface.bounds.extents, Vec3::new(1.0, 1.0, 0.0));
}

#[test]
fn test_single_opaque_scene_draws_once() {
    let data = gltf_loader::parse_gltf(single_quad_gltf("OPAQUE").as_bytes(), None).unwrap();
    let (graph, _meshes) = build_scene(&data);

    assert_eq!(graph.top_nodes().len(), 1);

    let ctx = draw_with_default_camera(&graph);
    assert_eq!(ctx.opaque_surfaces.len(), 1);
    assert!(ctx.transparent_surfaces.is_empty());

    let object = &ctx.opaque_surfaces[0];
    assert_eq!(object.index_count, 6);
    assert_eq!(object.first_index, 0);
    assert_eq!(object.index_buffer, vk::Buffer::from_raw(100));
    assert_eq!(object.vertex_buffer_address, 0x1000);
    assert_eq!(object.material.material_set, vk::DescriptorSet::from_raw(30));
}

#[test]
fn test_blend_material_goes_to_transparent_list() {
    let data = gltf_loader::parse_gltf(single_quad_gltf("BLEND").as_bytes(), None).unwrap();
    assert_eq!(data.materials[0].pass, MaterialPass::Transparent);

    let (graph, _meshes) = build_scene(&data);
    let ctx = draw_with_default_camera(&graph);
    assert!(ctx.opaque_surfaces.is_empty());
    assert_eq!(ctx.transparent_surfaces.len(), 1);
}

#[test]
fn test_node_behind_camera_is_culled() {
    let nodes = r#"[
      { "name": "front", "mesh": 0, "translation": [0.0, 0.0, -5.0] },
      { "name": "behind", "mesh": 0, "translation": [0.0, 0.0, 5.0] }
    ]"#;
    let data = gltf_loader::parse_gltf(quad_gltf(0.0, "OPAQUE", nodes, "[0, 1]").as_bytes(), None).unwrap();
    let (graph, _meshes) = build_scene(&data);
    assert_eq!(graph.top_nodes().len(), 2);

    let ctx = draw_with_default_camera(&graph);
    assert_eq!(ctx.len(), 1);
    assert_eq!(ctx.opaque_surfaces[0].transform, Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)));
    assert_eq!(ctx.triangle_count(), 6 / 3);

    // 统计只计入通过剔除的物体
    let mut stats = EngineStats::default();
    stats.reset_draw_counters();
    for idx in ctx.opaque_draw_order() {
        stats.record_draw(ctx.opaque_surfaces[idx].index_count);
    }
    for object in &ctx.transparent_surfaces {
        stats.record_draw(object.index_count);
    }
    assert_eq!(stats.triangle_count, 6 / 3);
    assert_eq!(stats.drawcall_count, 1);
}

#[test]
fn test_point_primitive_mesh_is_skipped() {
    let json = single_quad_gltf("OPAQUE")
        .replace(r#""indices": 1, "material": 0 }"#, r#""indices": 1, "material": 0, "mode": 0 }"#);
    let data = gltf_loader::parse_gltf(json.as_bytes(), None).unwrap();
    assert_eq!(data.meshes.len(), 1);
    assert!(data.meshes[0].surfaces.is_empty());
    assert!(data.meshes[0].indices.is_empty());

    let (graph, meshes) = build_scene(&data);
    assert!(meshes[0].is_none());
    // 节点保留为空的 Group
    assert_eq!(graph.top_nodes().len(), 1);

    let ctx = draw_with_default_camera(&graph);
    assert!(ctx.is_empty());
    assert_eq!(ctx.triangle_count(), 0);
}

#[test]
fn test_child_transform_is_composed() {
    let nodes = r#"[
      { "name": "root", "translation": [0.0, 0.0, -5.0], "children": [1] },
      { "name": "child", "mesh": 0, "translation": [1.0, 0.0, 0.0] }
    ]"#;
    let data = gltf_loader::parse_gltf(quad_gltf(0.0, "OPAQUE", nodes, "[0]").as_bytes(), None).unwrap();
    let (graph, _meshes) = build_scene(&data);

    assert_eq!(graph.top_nodes().len(), 1);
    let ctx = draw_with_default_camera(&graph);
    assert_eq!(ctx.opaque_surfaces.len(), 1);
    assert_eq!(ctx.opaque_surfaces[0].transform, Mat4::from_translation(Vec3::new(1.0, 0.0, -5.0)));
}

#[test]
fn test_traversal_is_deterministic() {
    let nodes = r#"[
      { "name": "a", "mesh": 0, "translation": [-2.0, 0.0, -8.0] },
      { "name": "b", "mesh": 0, "translation": [2.0, 0.0, -8.0] },
      { "name": "c", "mesh": 0, "translation": [0.0, 2.0, -8.0] }
    ]"#;
    let data = gltf_loader::parse_gltf(quad_gltf(0.0, "OPAQUE", nodes, "[0, 1, 2]").as_bytes(), None).unwrap();
    let (graph, _meshes) = build_scene(&data);

    let transforms = |ctx: &DrawContext| ctx.opaque_surfaces.iter().map(|obj| obj.transform).collect::<Vec<_>>();
    let first = draw_with_default_camera(&graph);
    let second = draw_with_default_camera(&graph);
    assert_eq!(first.len(), 3);
    assert_eq!(transforms(&first), transforms(&second));
    assert_eq!(first.opaque_surfaces[0].transform, Mat4::from_translation(Vec3::new(-2.0, 0.0, -8.0)));
}

#[test]
fn test_missing_material_uses_default() {
    let mut data = gltf_loader::parse_gltf(single_quad_gltf("OPAQUE").as_bytes(), None).unwrap();
    data.meshes[0].surfaces[0].material = Some(7);

    let (graph, _meshes) = build_scene(&data);
    let ctx = draw_with_default_camera(&graph);
    assert_eq!(ctx.opaque_surfaces[0].material.material_set, vk::DescriptorSet::from_raw(99));
}

#[test]
fn test_unsupported_version_is_rejected() {
    let json = single_quad_gltf("OPAQUE").replace(r#""version": "2.0""#, r#""version": "1.0""#);
    assert!(gltf_loader::parse_gltf(json.as_bytes(), None).is_err());
}

#[test]
fn test_malformed_file_is_rejected() {
    assert!(gltf_loader::parse_gltf(b"{ \"asset\": ", None).is_err());
    assert!(gltf_loader::parse_gltf_file(std::path::Path::new("does/not/exist.glb")).is_err());
}
