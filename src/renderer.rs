use std::num::NonZeroU32;
use std::sync::mpsc;

use anyhow::{anyhow, bail, Context, Result};
use bytemuck::{Pod, Zeroable};
use log::{debug, info, warn};

use crate::frame::{RenderFrame, RowOrder};
use crate::mask::MaskTexture;
use crate::pattern::{render_pattern_software, FrameInputs};
use crate::schema::EffectParameters;

const PATTERN_WGSL: &str = include_str!("../shaders/wgsl/pattern.wgsl");

// ---------------------------------------------------------------------------
// Uniforms
// ---------------------------------------------------------------------------

/// Matches `FrameGlobals` in pattern.wgsl. 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameGlobals {
    pub resolution: [f32; 2],
    pub time: f32,
    pub frame_index: u32,
    pub mouse: [f32; 2],
    pub logical_size: [f32; 2],
}

impl FrameGlobals {
    pub fn new(frame: &RenderFrame, inputs: &FrameInputs) -> Self {
        Self {
            resolution: [frame.width() as f32, frame.height() as f32],
            time: inputs.time,
            frame_index: inputs.frame_index,
            mouse: inputs.mouse,
            logical_size: [frame.logical_width(), frame.logical_height()],
        }
    }
}

/// Flattened [`EffectParameters`]. Matches `PatternParams` in pattern.wgsl;
/// booleans and enums travel as `u32`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PatternParams {
    pub cell_size: f32,
    pub cell_spacing: f32,
    pub style: u32,
    pub color_mode: u32,

    pub invert: u32,
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,

    pub blur_amount: f32,
    pub min_size: f32,
    pub max_size: f32,
    pub density_mode: u32,

    pub cell_density: f32,
    pub density_start: f32,
    pub density_end: f32,
    pub gradient_direction: u32,

    pub gradient_midpoint: f32,
    pub random_seed: u32,
    pub mask_scale: f32,
    pub mask_offset_x: f32,

    pub mask_offset_y: f32,
    pub mask_loaded: u32,
    pub flip_y: u32,
    pub bg_enabled: u32,

    pub bg_r: f32,
    pub bg_g: f32,
    pub bg_b: f32,
    pub bg_tolerance: f32,

    pub bg_brightness: f32,
    pub bg_contrast: f32,
    pub bg_saturation: f32,
    pub scanline_intensity: f32,

    pub scanline_count: f32,
    pub jitter_intensity: f32,
    pub jitter_speed: f32,
    pub mouse_glow_enabled: u32,

    pub mouse_glow_radius: f32,
    pub mouse_glow_intensity: f32,
    pub vignette_intensity: f32,
    pub vignette_radius: f32,

    pub color_palette: u32,
    pub curvature: f32,
    pub aberration_strength: f32,
    pub noise_intensity: f32,

    pub noise_scale: f32,
    pub noise_speed: f32,
    pub wave_amplitude: f32,
    pub wave_frequency: f32,

    pub wave_speed: f32,
    pub glitch_intensity: f32,
    pub glitch_frequency: f32,
    pub make_black_transparent: u32,
}

impl PatternParams {
    pub fn new(params: &EffectParameters, mask_loaded: bool, row_order: RowOrder) -> Self {
        let density = &params.density;
        let background = &params.background;
        let post = &params.post;
        let [bg_r, bg_g, bg_b] = background.color.0;
        Self {
            cell_size: params.cell_size,
            cell_spacing: params.cell_spacing,
            style: params.style.id(),
            color_mode: u32::from(params.color_mode),
            invert: u32::from(params.invert),
            brightness: params.brightness,
            contrast: params.contrast,
            saturation: params.saturation,
            blur_amount: params.dots.blur_amount,
            min_size: params.dots.min_size,
            max_size: params.dots.max_size,
            density_mode: density.mode.id(),
            cell_density: density.cell_density,
            density_start: density.density_start,
            density_end: density.density_end,
            gradient_direction: density.gradient_direction.id(),
            gradient_midpoint: density.gradient_midpoint,
            random_seed: density.random_seed,
            mask_scale: density.mask_scale,
            mask_offset_x: density.mask_offset_x,
            mask_offset_y: density.mask_offset_y,
            mask_loaded: u32::from(mask_loaded),
            flip_y: u32::from(row_order == RowOrder::BottomUp),
            bg_enabled: u32::from(background.enabled),
            bg_r,
            bg_g,
            bg_b,
            bg_tolerance: background.tolerance,
            bg_brightness: background.brightness,
            bg_contrast: background.contrast,
            bg_saturation: background.saturation,
            scanline_intensity: post.scanline_intensity,
            scanline_count: post.scanline_count,
            jitter_intensity: post.jitter_intensity,
            jitter_speed: post.jitter_speed,
            mouse_glow_enabled: u32::from(post.mouse_glow_enabled),
            mouse_glow_radius: post.mouse_glow_radius,
            mouse_glow_intensity: post.mouse_glow_intensity,
            vignette_intensity: post.vignette_intensity,
            vignette_radius: post.vignette_radius,
            color_palette: post.color_palette.id(),
            curvature: post.curvature,
            aberration_strength: post.aberration_strength,
            noise_intensity: post.noise_intensity,
            noise_scale: post.noise_scale,
            noise_speed: post.noise_speed,
            wave_amplitude: post.wave_amplitude,
            wave_frequency: post.wave_frequency,
            wave_speed: post.wave_speed,
            glitch_intensity: post.glitch_intensity,
            glitch_frequency: post.glitch_frequency,
            make_black_transparent: u32::from(post.make_black_transparent),
        }
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Runs the pixel-pattern engine over a captured frame and returns tight
/// top-down RGBA8 rows, on the GPU when one is available.
pub struct PatternRenderer {
    backend: Backend,
}

enum Backend {
    Gpu(Box<GpuPattern>),
    Software,
}

impl PatternRenderer {
    pub async fn new(width: u32, height: u32) -> Result<Self> {
        let gpu = GpuPattern::new(width, height).await?;
        info!("pattern renderer: GPU backend ({width}x{height})");
        Ok(Self {
            backend: Backend::Gpu(Box::new(gpu)),
        })
    }

    pub fn new_software() -> Self {
        info!("pattern renderer: software backend");
        Self {
            backend: Backend::Software,
        }
    }

    pub fn is_gpu_backend(&self) -> bool {
        matches!(self.backend, Backend::Gpu(_))
    }

    pub fn render_frame_rgba(
        &mut self,
        frame: &RenderFrame,
        mask: Option<&MaskTexture>,
        params: &EffectParameters,
        inputs: &FrameInputs,
    ) -> Result<Vec<u8>> {
        match &mut self.backend {
            Backend::Gpu(gpu) => {
                gpu.render(frame, mask, params, inputs)?;
                gpu.read_buffer()
            }
            Backend::Software => Ok(render_pattern_software(frame, mask, params, *inputs)),
        }
    }
}

struct FrameTargets {
    width: u32,
    height: u32,
    source_texture: wgpu::Texture,
    source_view: wgpu::TextureView,
    output_texture: wgpu::Texture,
    output_view: wgpu::TextureView,
    readback_buffer: wgpu::Buffer,
    unpadded_bytes_per_row: u32,
    padded_bytes_per_row: u32,
}

struct MaskSlot {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    /// Id of the mask this slot was built for, uploaded or rejected.
    source_id: Option<u64>,
    active: bool,
}

struct GpuPattern {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    globals_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    targets: FrameTargets,
    mask: MaskSlot,
    bind_group: Option<wgpu::BindGroup>,
    last_globals: Option<FrameGlobals>,
    last_params: Option<PatternParams>,
}

impl GpuPattern {
    async fn new(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| anyhow!("no suitable GPU adapter found"))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("glyphgrid-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to request wgpu device")?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glyphgrid-pattern-bind-group-layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                uniform_entry::<FrameGlobals>(2),
                uniform_entry::<PatternParams>(3),
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("glyphgrid-pattern-shader"),
            source: wgpu::ShaderSource::Wgsl(PATTERN_WGSL.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("glyphgrid-pattern-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("glyphgrid-pattern-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
        });

        let globals_buffer = uniform_buffer::<FrameGlobals>(&device, "glyphgrid-frame-globals");
        let params_buffer = uniform_buffer::<PatternParams>(&device, "glyphgrid-pattern-params");
        let targets = FrameTargets::new(&device, width, height)?;
        let mask = MaskSlot::empty(&device, &queue);

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            globals_buffer,
            params_buffer,
            targets,
            mask,
            bind_group: None,
            last_globals: None,
            last_params: None,
        })
    }

    fn render(
        &mut self,
        frame: &RenderFrame,
        mask: Option<&MaskTexture>,
        params: &EffectParameters,
        inputs: &FrameInputs,
    ) -> Result<()> {
        if frame.width() != self.targets.width || frame.height() != self.targets.height {
            debug!(
                "resizing pattern targets {}x{} -> {}x{}",
                self.targets.width,
                self.targets.height,
                frame.width(),
                frame.height()
            );
            self.targets = FrameTargets::new(&self.device, frame.width(), frame.height())?;
            self.bind_group = None;
        }
        if mask.map(MaskTexture::id) != self.mask.source_id {
            self.mask = match mask {
                Some(mask) => match MaskSlot::upload(&self.device, &self.queue, mask) {
                    Ok(slot) => slot,
                    Err(error) => {
                        warn!("density mask disabled on GPU, rendering at full density: {error:#}");
                        MaskSlot::rejected(&self.device, &self.queue, mask.id())
                    }
                },
                None => MaskSlot::empty(&self.device, &self.queue),
            };
            self.bind_group = None;
        }

        self.targets.upload_source(&self.queue, frame)?;

        let globals = FrameGlobals::new(frame, inputs);
        if self.last_globals != Some(globals) {
            self.queue
                .write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));
            self.last_globals = Some(globals);
        }
        let uniform = PatternParams::new(params, self.mask.active, frame.row_order());
        if self.last_params != Some(uniform) {
            self.queue
                .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&uniform));
            self.last_params = Some(uniform);
        }

        let bind_group = match self.bind_group.take() {
            Some(bind_group) => bind_group,
            None => self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("glyphgrid-pattern-bind-group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&self.targets.source_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&self.mask.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.globals_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: self.params_buffer.as_entire_binding(),
                    },
                ],
            }),
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("glyphgrid-pattern-encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("glyphgrid-pattern-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.output_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        self.bind_group = Some(bind_group);

        let padded_bytes_per_row = NonZeroU32::new(self.targets.padded_bytes_per_row)
            .ok_or_else(|| {
                anyhow!("invalid padded row size {}", self.targets.padded_bytes_per_row)
            })?;
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.targets.output_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.targets.readback_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row.get()),
                    rows_per_image: Some(self.targets.height),
                },
            },
            self.targets.extent(),
        );

        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn read_buffer(&mut self) -> Result<Vec<u8>> {
        let targets = &self.targets;
        let buffer_slice = targets.readback_buffer.slice(..);
        let (sender, receiver) = mpsc::channel();

        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|_| anyhow!("failed receiving GPU map callback"))?
            .context("GPU buffer mapping failed")?;

        let row_bytes = targets.unpadded_bytes_per_row as usize;
        let mapped = buffer_slice.get_mapped_range();
        let mut frame = vec![0_u8; row_bytes * targets.height as usize];
        for (dst, chunk) in frame
            .chunks_exact_mut(row_bytes)
            .zip(mapped.chunks(targets.padded_bytes_per_row as usize))
        {
            dst.copy_from_slice(&chunk[..row_bytes]);
        }

        drop(mapped);
        targets.readback_buffer.unmap();
        Ok(frame)
    }
}

impl FrameTargets {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("render target must be non-empty, got {width}x{height}");
        }
        check_texture_fits(
            "render target",
            width,
            height,
            device.limits().max_texture_dimension_2d,
        )?;
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let source_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glyphgrid-source-frame"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let source_view = source_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let output_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glyphgrid-pattern-target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let output_view = output_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let unpadded_bytes_per_row = width
            .checked_mul(4)
            .ok_or_else(|| anyhow!("frame width overflow when computing row bytes"))?;
        let padded_bytes_per_row =
            align_to(unpadded_bytes_per_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("glyphgrid-readback-buffer"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Ok(Self {
            width,
            height,
            source_texture,
            source_view,
            output_texture,
            output_view,
            readback_buffer,
            unpadded_bytes_per_row,
            padded_bytes_per_row,
        })
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }

    fn upload_source(&self, queue: &wgpu::Queue, frame: &RenderFrame) -> Result<()> {
        let expected = self.unpadded_bytes_per_row as usize * self.height as usize;
        if frame.as_raw().len() != expected {
            bail!(
                "frame byte length {} does not match {}x{} target",
                frame.as_raw().len(),
                self.width,
                self.height
            );
        }
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.source_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            frame.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.unpadded_bytes_per_row),
                rows_per_image: Some(self.height),
            },
            self.extent(),
        );
        Ok(())
    }
}

impl MaskSlot {
    /// 1x1 placeholder bound while no mask is loaded; never sampled.
    fn empty(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let (texture, view) = mask_texture(device, queue, 1, 1, &[0]);
        Self {
            _texture: texture,
            view,
            source_id: None,
            active: false,
        }
    }

    /// Placeholder remembered for a mask the device cannot hold, so it is not retried.
    fn rejected(device: &wgpu::Device, queue: &wgpu::Queue, mask_id: u64) -> Self {
        Self {
            source_id: Some(mask_id),
            ..Self::empty(device, queue)
        }
    }

    fn upload(device: &wgpu::Device, queue: &wgpu::Queue, mask: &MaskTexture) -> Result<Self> {
        check_texture_fits(
            "mask",
            mask.width(),
            mask.height(),
            device.limits().max_texture_dimension_2d,
        )?;
        debug!("uploading density mask {}x{}", mask.width(), mask.height());
        let (texture, view) = mask_texture(device, queue, mask.width(), mask.height(), mask.alpha());
        Ok(Self {
            _texture: texture,
            view,
            source_id: Some(mask.id()),
            active: true,
        })
    }
}

fn check_texture_fits(label: &str, width: u32, height: u32, limit: u32) -> Result<()> {
    if width > limit || height > limit {
        bail!("{label} {width}x{height} exceeds the GPU texture limit of {limit}");
    }
    Ok(())
}

fn mask_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    width: u32,
    height: u32,
    alpha: &[u8],
) -> (wgpu::Texture, wgpu::TextureView) {
    let extent = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("glyphgrid-density-mask"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        alpha,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(width),
            rows_per_image: Some(height),
        },
        extent,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn uniform_entry<T>(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<T>() as u64),
        },
        count: None,
    }
}

fn uniform_buffer<T>(device: &wgpu::Device, label: &str) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: std::mem::size_of::<T>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}
