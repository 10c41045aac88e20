use std::{ffi::CStr, path::Path, rc::Rc, time::Instant};

use anyhow::Context;
use ash::vk;
use ember_crate_tools::resource::EmberPath;
use ember_gfx::{
    commands::{command_buffer::GfxCommandBuffer, submit_info::GfxSubmitInfo},
    deletion_queue::{DeletionQueue, GfxDeletion},
    descriptors::{
        allocator::{GfxGrowableDescriptorAllocator, PoolSizeRatio},
        backend::DescriptorBackend,
        layout::GfxDescriptorLayoutBuilder,
        writer::GfxDescriptorWriter,
    },
    gfx::Gfx,
    resources::image::GfxImageHandle,
    swapchain::{render_swapchain::GfxRenderSwapchain, surface::GfxSurface},
};
use ember_scene::{
    camera::Camera,
    draw_context::{DrawContext, RenderObject},
    mesh::MeshAsset,
};
use glam::{Mat4, Vec4};
use indexmap::IndexMap;

use crate::{
    compute_effect::ComputeEffect,
    default_resources::DefaultResources,
    frame_data::{FrameCounter, FrameData},
    gltf_loader::{self, GltfLoadContext},
    gpu_data::{GpuDrawPushConstants, GpuSceneData},
    loaded_scene::LoadedGltf,
    material_binder::GltfMetallicRoughness,
    overlay::OverlayPass,
    settings::{DefaultRendererSettings, EngineConfig},
    stats::{EngineStats, Timer, measure_ms},
    upload,
};

/// 初始化过程中已经创建的对象，初始化失败时统一释放
#[derive(Default)]
struct PendingInit {
    surface: Option<GfxSurface>,
    swapchain: Option<GfxRenderSwapchain>,
    frames: Vec<FrameData>,
    deletion_queue: DeletionQueue<GfxDeletion>,
}
impl PendingInit {
    fn release(mut self, gfx: &Gfx) {
        if let Err(e) = gfx.wait_idle() {
            log::error!("failed to wait device idle: {e:#}");
        }
        for frame in self.frames.drain(..) {
            frame.destroy(gfx);
        }
        self.deletion_queue.flush(gfx);
        if let Some(swapchain) = self.swapchain.take() {
            swapchain.destroy(gfx);
        }
        if let Some(surface) = self.surface.take() {
            surface.destroy();
        }
    }
}

/// 属于 main deletion queue 的渲染资源
struct RenderResources {
    draw_image: GfxImageHandle,
    depth_image: GfxImageHandle,
    draw_image_descriptors: vk::DescriptorSet,
    scene_data_layout: vk::DescriptorSetLayout,
    background_effects: Vec<ComputeEffect>,
    metal_rough_material: GltfMetallicRoughness,
    default_resources: DefaultResources,
}

/// 渲染引擎
///
/// 持有 GFX 上下文、帧环以及所有长期存在的 GPU 资源。
/// 单线程使用：`draw` 在窗口的事件循环中每帧调用一次，`cleanup` 在退出时调用。
pub struct Engine {
    gfx: Gfx,
    surface: Option<GfxSurface>,
    swapchain: Option<GfxRenderSwapchain>,
    present_mode: vk::PresentModeKHR,

    frames: Vec<FrameData>,
    frame_counter: FrameCounter,

    /// 引擎生命周期内的资源，只在 cleanup 时 flush
    main_deletion_queue: DeletionQueue<GfxDeletion>,

    draw_image: GfxImageHandle,
    depth_image: GfxImageHandle,
    draw_extent: vk::Extent2D,
    render_scale: f32,

    draw_image_descriptors: vk::DescriptorSet,
    scene_data_layout: vk::DescriptorSetLayout,

    background_effects: Vec<ComputeEffect>,
    current_background_effect: usize,

    metal_rough_material: GltfMetallicRoughness,
    default_resources: DefaultResources,

    main_draw_context: DrawContext,
    scene_data: GpuSceneData,
    pub camera: Camera,

    loaded_scenes: IndexMap<String, LoadedGltf>,

    stats: EngineStats,
    timer: Timer,

    /// 窗口最小化时为 true，此时不提交任何 GPU 命令
    pub stop_rendering: bool,
    resize_requested: bool,

    overlay: Option<Box<dyn OverlayPass>>,
}

// new & init
impl Engine {
    const GLOBAL_DESCRIPTOR_SETS: u32 = 10;
    const GLOBAL_DESCRIPTOR_RATIOS: [PoolSizeRatio; 3] = [
        PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0),
        PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0),
        PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2.0),
    ];

    /// 任何一步失败都会释放已经创建的对象并返回错误
    pub fn init(
        config: &EngineConfig,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
        window_extent: vk::Extent2D,
        instance_extra_exts: &[&'static CStr],
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("Engine::init");
        log::info!("init engine, window extent: {}x{}", window_extent.width, window_extent.height);

        let gfx = Gfx::new(&config.title, instance_extra_exts, config.enable_validation)?;

        let mut pending = PendingInit::default();
        let resources =
            match Self::init_resources(&gfx, config, raw_display_handle, raw_window_handle, window_extent, &mut pending)
            {
                Ok(resources) => resources,
                Err(e) => {
                    pending.release(&gfx);
                    gfx.destroy();
                    return Err(e.context("failed to init engine"));
                }
            };

        let PendingInit {
            surface,
            swapchain,
            frames,
            deletion_queue,
        } = pending;
        let RenderResources {
            draw_image,
            depth_image,
            draw_image_descriptors,
            scene_data_layout,
            background_effects,
            metal_rough_material,
            default_resources,
        } = resources;

        let current_background_effect = config.background_effect.min(background_effects.len().saturating_sub(1));

        let mut engine = Self {
            gfx,
            surface,
            swapchain,
            present_mode: config.present_mode.vk_present_mode(),
            frames,
            frame_counter: FrameCounter::default(),
            main_deletion_queue: deletion_queue,
            draw_image,
            depth_image,
            draw_extent: draw_image.extent_2d(),
            render_scale: config.render_scale(),
            draw_image_descriptors,
            scene_data_layout,
            background_effects,
            current_background_effect,
            metal_rough_material,
            default_resources,
            main_draw_context: DrawContext::default(),
            scene_data: GpuSceneData::default(),
            camera: Camera::new(config.camera_position()),
            loaded_scenes: IndexMap::new(),
            stats: EngineStats::default(),
            timer: Timer::default(),
            stop_rendering: false,
            resize_requested: false,
            overlay: None,
        };

        for scene in &config.scenes {
            let path = EmberPath::resolve(&scene.path);
            match engine.load_scene(&scene.name, &path) {
                Ok(true) => {}
                Ok(false) => log::warn!("scene {} is skipped", scene.name),
                Err(e) => {
                    engine.cleanup();
                    return Err(e.context("failed to load startup scenes"));
                }
            }
        }

        log::info!("engine initialized");
        Ok(engine)
    }

    fn init_resources(
        gfx: &Gfx,
        config: &EngineConfig,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
        window_extent: vk::Extent2D,
        pending: &mut PendingInit,
    ) -> anyhow::Result<RenderResources> {
        let surface = pending.surface.insert(GfxSurface::new(gfx, raw_display_handle, raw_window_handle)?);
        pending.swapchain =
            Some(GfxRenderSwapchain::new(gfx, surface, config.present_mode.vk_present_mode(), window_extent)?);
        for slot in 0..DefaultRendererSettings::FRAME_OVERLAP {
            pending.frames.push(FrameData::new(gfx, slot)?);
        }

        let deletion_queue = &mut pending.deletion_queue;
        let draw_image = upload::create_attachment_image(
            gfx,
            window_extent,
            DefaultRendererSettings::DRAW_IMAGE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            "draw-image",
            deletion_queue,
        )?;
        let depth_supported = gfx.find_supported_format(
            &[DefaultRendererSettings::DEPTH_FORMAT],
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        anyhow::ensure!(
            !depth_supported.is_empty(),
            "depth format {:?} is not supported as depth attachment",
            DefaultRendererSettings::DEPTH_FORMAT
        );
        let depth_image = upload::create_attachment_image(
            gfx,
            window_extent,
            DefaultRendererSettings::DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            "depth-image",
            deletion_queue,
        )?;

        // global allocator 只在初始化时分配，最后注册，释放时先于它引用的资源
        let mut global_descriptors = GfxGrowableDescriptorAllocator::new(
            gfx.device(),
            Self::GLOBAL_DESCRIPTOR_SETS,
            &Self::GLOBAL_DESCRIPTOR_RATIOS,
            "global",
        )?;
        let resources =
            Self::init_pipelines(gfx, config, draw_image, depth_image, &mut global_descriptors, deletion_queue);
        deletion_queue.push(GfxDeletion::DescriptorAllocator(global_descriptors));
        resources
    }

    fn init_pipelines(
        gfx: &Gfx,
        config: &EngineConfig,
        draw_image: GfxImageHandle,
        depth_image: GfxImageHandle,
        global_descriptors: &mut GfxGrowableDescriptorAllocator,
        deletion_queue: &mut DeletionQueue<GfxDeletion>,
    ) -> anyhow::Result<RenderResources> {
        let device = gfx.device();

        let draw_image_layout = GfxDescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .build(device, vk::ShaderStageFlags::COMPUTE, "draw-image")?;
        deletion_queue.push(GfxDeletion::DescriptorSetLayout(draw_image_layout));

        let draw_image_descriptors = global_descriptors.allocate(device, draw_image_layout)?;
        let mut writer = GfxDescriptorWriter::default();
        writer.write_image(
            0,
            draw_image.view,
            vk::Sampler::null(),
            vk::ImageLayout::GENERAL,
            vk::DescriptorType::STORAGE_IMAGE,
        );
        device.write_set(draw_image_descriptors, &writer);

        let scene_data_layout = GfxDescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .build(device, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT, "scene-data")?;
        deletion_queue.push(GfxDeletion::DescriptorSetLayout(scene_data_layout));

        let background_effects =
            ComputeEffect::build_background_effects(gfx, config, draw_image_layout, deletion_queue)?;
        let mut metal_rough_material =
            GltfMetallicRoughness::build_pipelines(gfx, config, scene_data_layout, deletion_queue)?;
        let default_resources =
            DefaultResources::new(gfx, &mut metal_rough_material, global_descriptors, deletion_queue)?;

        Ok(RenderResources {
            draw_image,
            depth_image,
            draw_image_descriptors,
            scene_data_layout,
            background_effects,
            metal_rough_material,
            default_resources,
        })
    }
}
// getters
impl Engine {
    #[inline]
    pub fn gfx(&self) -> &Gfx {
        &self.gfx
    }

    #[inline]
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    #[inline]
    pub fn frame_counter(&self) -> &FrameCounter {
        &self.frame_counter
    }

    #[inline]
    pub fn draw_extent(&self) -> vk::Extent2D {
        self.draw_extent
    }

    #[inline]
    pub fn resize_requested(&self) -> bool {
        self.resize_requested
    }

    #[inline]
    pub fn background_effects(&self) -> &[ComputeEffect] {
        &self.background_effects
    }

    #[inline]
    pub fn current_background_effect(&self) -> usize {
        self.current_background_effect
    }

    #[inline]
    pub fn default_resources(&self) -> &DefaultResources {
        &self.default_resources
    }

    #[inline]
    pub fn loaded_scenes(&self) -> &IndexMap<String, LoadedGltf> {
        &self.loaded_scenes
    }

    #[inline]
    pub fn main_draw_context(&self) -> &DrawContext {
        &self.main_draw_context
    }
}
// setters
impl Engine {
    /// 超出范围时忽略
    pub fn set_background_effect(&mut self, idx: usize) {
        if idx < self.background_effects.len() {
            self.current_background_effect = idx;
        }
    }

    pub fn background_effect_data_mut(&mut self) -> Option<&mut ComputeEffect> {
        self.background_effects.get_mut(self.current_background_effect)
    }

    pub fn set_render_scale(&mut self, render_scale: f32) {
        self.render_scale =
            render_scale.clamp(DefaultRendererSettings::MIN_RENDER_SCALE, DefaultRendererSettings::MAX_RENDER_SCALE);
    }

    pub fn set_overlay(&mut self, overlay: Option<Box<dyn OverlayPass>>) {
        self.overlay = overlay;
    }
}
// scene
impl Engine {
    /// 加载失败时返回 false，引擎状态不变；同名场景会被替换
    pub fn load_scene(&mut self, name: &str, path: &Path) -> anyhow::Result<bool> {
        let mut ctx = GltfLoadContext {
            gfx: &self.gfx,
            metal_rough_material: &mut self.metal_rough_material,
            default_resources: &self.default_resources,
        };
        let Some(scene) = gltf_loader::load_gltf(&mut ctx, name, path) else {
            return Ok(false);
        };

        if let Some(old) = self.loaded_scenes.insert(name.to_string(), scene) {
            // 旧场景可能仍被 in-flight 的帧使用
            release_after_wait_idle(|| self.gfx.wait_idle(), || old.clear_all(&self.gfx))?;
        }
        Ok(true)
    }

    /// 返回是否存在该场景
    pub fn unload_scene(&mut self, name: &str) -> anyhow::Result<bool> {
        let Some(scene) = self.loaded_scenes.shift_remove(name) else {
            return Ok(false);
        };
        release_after_wait_idle(|| self.gfx.wait_idle(), || scene.clear_all(&self.gfx))?;
        Ok(true)
    }

    /// 只加载 mesh，GPU buffer 属于引擎，直到 cleanup 才释放
    pub fn load_meshes(&mut self, path: &Path) -> Option<Vec<Rc<MeshAsset>>> {
        let ctx = GltfLoadContext {
            gfx: &self.gfx,
            metal_rough_material: &mut self.metal_rough_material,
            default_resources: &self.default_resources,
        };
        gltf_loader::load_gltf_meshes(&ctx, path, &mut self.main_deletion_queue)
    }
}

/// 等待失败时仍然释放，场景对象不能带着 GPU 资源被 drop
fn release_after_wait_idle(
    wait_idle: impl FnOnce() -> anyhow::Result<()>,
    release: impl FnOnce(),
) -> anyhow::Result<()> {
    let waited = wait_idle().inspect_err(|e| log::error!("failed to wait device idle before releasing scene: {e:#}"));
    release();
    waited
}
// update
impl Engine {
    /// 遍历所有场景，重建 draw context，并准备本帧的场景 uniform
    pub fn update_scene(&mut self) {
        let _span = tracy_client::span!("Engine::update_scene");

        let aspect_ratio = self.draw_extent.width as f32 / self.draw_extent.height.max(1) as f32;
        let view = self.camera.view_matrix();
        let proj = self.camera.projection_matrix(aspect_ratio);
        let viewproj = proj * view;

        self.main_draw_context.begin_frame(viewproj);
        for scene in self.loaded_scenes.values() {
            scene.draw(Mat4::IDENTITY, &mut self.main_draw_context);
        }

        self.scene_data = GpuSceneData {
            view,
            proj,
            viewproj,
            ..GpuSceneData::default()
        };
    }

    /// 调用前需要确认窗口尺寸不为 0
    pub fn resize_swapchain(&mut self, window_extent: vk::Extent2D) -> anyhow::Result<()> {
        let _span = tracy_client::span!("Engine::resize_swapchain");
        log::info!("resize swapchain to {}x{}", window_extent.width, window_extent.height);

        self.gfx.wait_idle()?;
        if let Some(swapchain) = self.swapchain.take() {
            swapchain.destroy(&self.gfx);
        }
        let surface = self.surface.as_ref().context("surface is destroyed")?;
        self.swapchain = Some(GfxRenderSwapchain::new(&self.gfx, surface, self.present_mode, window_extent)?);
        for frame in &mut self.frames {
            frame.recreate_semaphores(&self.gfx)?;
        }

        self.resize_requested = false;
        Ok(())
    }

    /// 渲染一帧
    ///
    /// swapchain 过期时只设置 `resize_requested`，由调用者在下一帧之前 resize
    pub fn draw(&mut self) -> anyhow::Result<()> {
        let _span = tracy_client::span!("Engine::draw");
        self.timer.tick();
        self.stats.frame_time_ms = self.timer.delta_time_ms();

        if self.stop_rendering || self.resize_requested {
            return Ok(());
        }

        let ((), scene_update_ms) = measure_ms(|| self.update_scene());
        self.stats.scene_update_time_ms = scene_update_ms;

        let slot = self.frame_counter.slot();
        let frame_name = self.frame_counter.frame_name();
        {
            let frame = &mut self.frames[slot];
            if let Err(e) =
                frame.render_fence.wait_timeout(self.gfx.device(), DefaultRendererSettings::FRAME_FENCE_TIMEOUT_NS)
            {
                log::error!("{frame_name} failed to wait render fence: {e:#}");
                panic!("{frame_name} render fence timeout, device lost or hung");
            }
            frame.recycle(&self.gfx)?;
        }

        let swapchain = self.swapchain.as_mut().context("swapchain is destroyed")?;
        let need_recreate = swapchain.acquire_next_image(
            &self.gfx,
            &self.frames[slot].swapchain_semaphore,
            DefaultRendererSettings::ACQUIRE_IMAGE_TIMEOUT_NS,
        )?;
        if need_recreate {
            self.resize_requested = true;
            return Ok(());
        }

        let swapchain_extent = swapchain.extent();
        let swapchain_image = swapchain.current_image();
        let swapchain_view = swapchain.current_image_view();
        let draw_image_extent = self.draw_image.extent_2d();
        self.draw_extent = vk::Extent2D {
            width: ((swapchain_extent.width.min(draw_image_extent.width) as f32 * self.render_scale) as u32).max(1),
            height: ((swapchain_extent.height.min(draw_image_extent.height) as f32 * self.render_scale) as u32)
                .max(1),
        };

        self.frames[slot].render_fence.reset(self.gfx.device())?;

        let cmd = self.frames[slot].command_buffer();
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, &frame_name)?;

        cmd.transition_image(self.draw_image.image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL);
        self.draw_background(slot);

        let cmd = self.frames[slot].command_buffer();
        cmd.transition_image(
            self.draw_image.image,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        cmd.transition_image(
            self.depth_image.image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );
        self.draw_geometry(slot)?;

        let cmd = self.frames[slot].command_buffer();
        cmd.transition_image(
            self.draw_image.image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        cmd.transition_image(swapchain_image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        cmd.blit_whole_image(self.draw_image.image, swapchain_image, self.draw_extent, swapchain_extent);

        match self.overlay.as_mut() {
            Some(overlay) => {
                cmd.transition_image(
                    swapchain_image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                );
                overlay.record(cmd, swapchain_view, swapchain_extent);
                cmd.transition_image(
                    swapchain_image,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    vk::ImageLayout::PRESENT_SRC_KHR,
                );
            }
            None => {
                cmd.transition_image(
                    swapchain_image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::PRESENT_SRC_KHR,
                );
            }
        }
        cmd.end()?;

        let frame = &self.frames[slot];
        let submit_info = GfxSubmitInfo::new(&[frame.command_buffer()])
            .wait(&frame.swapchain_semaphore, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .signal(&frame.render_semaphore, vk::PipelineStageFlags2::ALL_GRAPHICS);
        self.gfx.gfx_queue().submit(&[submit_info], Some(&frame.render_fence))?;

        let swapchain = self.swapchain.as_ref().context("swapchain is destroyed")?;
        if swapchain.present_image(&self.gfx, self.gfx.gfx_queue(), &[&frame.render_semaphore])? {
            self.resize_requested = true;
        }

        self.frame_counter.next_frame();
        tracy_client::frame_mark();
        Ok(())
    }

    fn draw_background(&self, slot: usize) {
        let cmd = self.frames[slot].command_buffer();
        let Some(effect) = self.background_effects.get(self.current_background_effect) else {
            cmd.cmd_clear_color_image(self.draw_image.image, vk::ImageLayout::GENERAL, [0.0, 0.0, 0.0, 1.0]);
            return;
        };

        cmd.begin_label(effect.name, Vec4::new(0.4, 0.6, 1.0, 1.0));
        cmd.cmd_bind_pipeline(vk::PipelineBindPoint::COMPUTE, effect.pipeline);
        cmd.cmd_bind_descriptor_sets(
            vk::PipelineBindPoint::COMPUTE,
            effect.layout,
            0,
            &[self.draw_image_descriptors],
        );
        cmd.cmd_push_constants(effect.layout, vk::ShaderStageFlags::COMPUTE, 0, bytemuck::bytes_of(&effect.data));
        cmd.cmd_dispatch(ComputeEffect::group_count(self.draw_extent));
        cmd.end_label();
    }

    /// 不透明物体按 (材质, index buffer) 排序，透明物体保持遍历顺序；状态不变时跳过重复绑定
    fn draw_geometry(&mut self, slot: usize) -> anyhow::Result<()> {
        let _span = tracy_client::span!("Engine::draw_geometry");
        let start = Instant::now();
        self.stats.reset_draw_counters();

        // 场景 uniform 与 global set 只在这一帧有效，随槽位回收
        let frame = &mut self.frames[slot];
        let scene_buffer =
            upload::create_frame_uniform(&self.gfx, &self.scene_data, "scene-data", &mut frame.deletion_queue)?;
        let global_set = frame.frame_descriptors.allocate(self.gfx.device(), self.scene_data_layout)?;
        let mut writer = GfxDescriptorWriter::default();
        writer.write_buffer(
            0,
            scene_buffer,
            size_of::<GpuSceneData>() as vk::DeviceSize,
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
        );
        self.gfx.device().write_set(global_set, &writer);

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.draw_image.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE);
        // reversed-Z，深度清除为 0
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.depth_image.view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 0.0, stencil: 0 },
            });
        let render_area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: self.draw_extent,
        };
        let rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment))
            .depth_attachment(&depth_attachment);

        let cmd = self.frames[slot].command_buffer();
        cmd.begin_label("geometry", Vec4::new(0.4, 1.0, 0.6, 1.0));
        cmd.cmd_begin_rendering(&rendering_info);

        let mut recorder = DrawRecorder::new(cmd, global_set, self.draw_extent);
        let ctx = &self.main_draw_context;
        for idx in ctx.opaque_draw_order() {
            recorder.record(&ctx.opaque_surfaces[idx], &mut self.stats);
        }
        for object in &ctx.transparent_surfaces {
            recorder.record(object, &mut self.stats);
        }

        cmd.cmd_end_rendering();
        cmd.end_label();

        self.stats.mesh_draw_time_ms = start.elapsed().as_secs_f32() * 1000.0;
        Ok(())
    }
}
// destroy
impl Engine {
    /// 等待 GPU 空闲后，依次释放场景、帧槽位、main deletion queue、swapchain 与 GFX 上下文
    pub fn cleanup(mut self) {
        let _span = tracy_client::span!("Engine::cleanup");
        log::info!("engine cleanup");

        if let Err(e) = self.gfx.wait_idle() {
            log::error!("failed to wait device idle before cleanup: {e:#}");
        }

        self.overlay = None;
        self.main_draw_context = DrawContext::default();
        for (_, scene) in self.loaded_scenes.drain(..) {
            scene.clear_all(&self.gfx);
        }
        for frame in self.frames.drain(..) {
            frame.destroy(&self.gfx);
        }
        self.main_deletion_queue.flush(&self.gfx);

        if let Some(swapchain) = self.swapchain.take() {
            swapchain.destroy(&self.gfx);
        }
        if let Some(surface) = self.surface.take() {
            surface.destroy();
        }
        self.gfx.destroy();
    }
}

/// 录制几何 pass 时记录上一次绑定的状态
struct DrawRecorder<'a> {
    cmd: &'a GfxCommandBuffer,
    global_set: vk::DescriptorSet,
    extent: vk::Extent2D,

    last_pipeline: vk::Pipeline,
    last_material_set: vk::DescriptorSet,
    last_index_buffer: vk::Buffer,
}
impl<'a> DrawRecorder<'a> {
    fn new(cmd: &'a GfxCommandBuffer, global_set: vk::DescriptorSet, extent: vk::Extent2D) -> Self {
        Self {
            cmd,
            global_set,
            extent,
            last_pipeline: vk::Pipeline::null(),
            last_material_set: vk::DescriptorSet::null(),
            last_index_buffer: vk::Buffer::null(),
        }
    }

    fn record(&mut self, object: &RenderObject, stats: &mut EngineStats) {
        let cmd = self.cmd;
        let material = &object.material;
        let layout = material.pipeline.layout;

        if material.material_set != self.last_material_set {
            self.last_material_set = material.material_set;

            if material.pipeline.pipeline != self.last_pipeline {
                self.last_pipeline = material.pipeline.pipeline;
                cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, material.pipeline.pipeline);
                cmd.cmd_bind_descriptor_sets(vk::PipelineBindPoint::GRAPHICS, layout, 0, &[self.global_set]);

                cmd.cmd_set_viewport(
                    0,
                    &[vk::Viewport {
                        x: 0.0,
                        y: 0.0,
                        width: self.extent.width as f32,
                        height: self.extent.height as f32,
                        min_depth: 0.0,
                        max_depth: 1.0,
                    }],
                );
                cmd.cmd_set_scissor(
                    0,
                    &[vk::Rect2D {
                        offset: vk::Offset2D::default(),
                        extent: self.extent,
                    }],
                );
            }

            cmd.cmd_bind_descriptor_sets(vk::PipelineBindPoint::GRAPHICS, layout, 1, &[material.material_set]);
        }

        if object.index_buffer != self.last_index_buffer {
            self.last_index_buffer = object.index_buffer;
            cmd.cmd_bind_index_buffer(object.index_buffer, 0, vk::IndexType::UINT32);
        }

        let push_constants = GpuDrawPushConstants::new(object.transform, object.vertex_buffer_address);
        cmd.cmd_push_constants(layout, vk::ShaderStageFlags::VERTEX, 0, bytemuck::bytes_of(&push_constants));
        cmd.cmd_draw_indexed(object.index_count, object.first_index, 1, 0);
        stats.record_draw(object.index_count);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn test_release_runs_even_if_wait_fails() {
        let released = Cell::new(0);
        let result = release_after_wait_idle(|| anyhow::bail!("device lost"), || released.set(released.get() + 1));
        assert!(result.is_err());
        assert_eq!(released.get(), 1);

        assert!(release_after_wait_idle(|| Ok(()), || released.set(released.get() + 1)).is_ok());
        assert_eq!(released.get(), 2);
    }
}
