use std::collections::HashMap;

use wgpu::TextureFormat;

use crate::gpu::bindings::BindingScope;
use crate::gpu::context::GpuContext;
use crate::gpu::format;
use crate::gpu::fullscreen::{self, FullscreenTrigger, Geometry, TriggerMode};
use crate::gpu::size::Size3;
use crate::gpu::texture::{Texture, TextureShape};

const THUMBNAIL_SRC: &str = r#"
@group(0) @binding(0) var tex: texture_2d<f32>;
@group(0) @binding(1) var tex_sampler: sampler;

@fragment
fn fs_main(in: FullscreenOut) -> @location(0) vec4<f32> {
    return textureSample(tex, tex_sampler, in.texcoord);
}
"#;

/// Output extent for a thumbnail of `source` bounded by `max_size`.
///
/// The longer axis becomes `max_size`, the other keeps the aspect ratio
/// (truncated, at least 1).
pub fn thumbnail_size(source: Size3, max_size: u32) -> (u32, u32) {
    let (width, height) = (source.width as u64, source.height as u64);
    let max = max_size as u64;
    let (w, h) = if width > height {
        (max, height * max / width)
    } else {
        (width * max / height, max)
    };
    let (w, h) = (w.max(1) as u32, h.max(1) as u32);
    debug_assert!(w <= max_size && h <= max_size);
    (w, h)
}

/// Most detailed mip level whose width is still at least `target_width`.
pub fn select_mip_level(source_width: u32, target_width: u32) -> u32 {
    assert!(target_width > 0, "thumbnail width must be positive");
    let mut level: u32 = 0;
    let mut width = source_width;
    while width >= target_width {
        level += 1;
        width /= 2;
    }
    level.saturating_sub(1)
}

/// Best-fit mip downsampling into small previews.
pub struct ThumbnailPass {
    trigger: FullscreenTrigger,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    pipelines: HashMap<TextureFormat, wgpu::RenderPipeline>,
}

impl ThumbnailPass {
    pub fn new(ctx: &GpuContext) -> Self {
        let device = &ctx.device;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("thumbnail_inputs"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        // Linear minification, point magnification; the bound view has a single level.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("thumbnail_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            trigger: FullscreenTrigger::new(device),
            layout,
            sampler,
            pipelines: HashMap::new(),
        }
    }

    fn pipeline(&mut self, device: &wgpu::Device, format: TextureFormat) -> wgpu::RenderPipeline {
        let Self {
            trigger,
            layout,
            pipelines,
            ..
        } = self;
        pipelines
            .entry(format)
            .or_insert_with(|| {
                fullscreen::create_program(
                    device,
                    trigger,
                    "thumbnail",
                    THUMBNAIL_SRC,
                    layout,
                    Geometry::Quad,
                    format,
                )
            })
            .clone()
    }

    /// Renders `layer` of `source` into a new single-layer, single-mip texture
    /// whose width and height are at most `max_size`.
    ///
    /// Samples from the best-fit mip level. When the source lacks that level,
    /// a temporary copy with a long enough chain is built and dropped again.
    pub fn create_thumbnail(
        &mut self,
        ctx: &GpuContext,
        max_size: u32,
        source: &Texture,
        format: TextureFormat,
        layer: u32,
    ) -> Texture {
        assert!(max_size > 0, "thumbnail size must be positive");
        assert_eq!(
            source.shape(),
            TextureShape::Array2D,
            "thumbnails need a 2D source"
        );
        assert!(
            format::is_supported(source.format()),
            "unsupported source format {:?}",
            source.format()
        );
        assert!(format::is_supported(format), "unsupported format {format:?}");
        assert!(
            ctx.is_format_usable(source.format()),
            "{:?} cannot be filtered on this device",
            source.format()
        );

        let (width, height) = thumbnail_size(source.size(), max_size);
        let level = select_mip_level(source.size().width, width);
        let temporary = if source.mips() < level + 1 {
            tracing::debug!(
                have = source.mips(),
                need = level + 1,
                "extending mip chain for thumbnail"
            );
            Some(source.generate_mipmap_levels(ctx, level + 1))
        } else {
            None
        };
        let sampled = temporary.as_ref().unwrap_or(source);

        let dst = Texture::create(
            ctx,
            TextureShape::Array2D,
            1,
            1,
            Size3::flat(width, height),
            format,
        );
        let pipeline = self.pipeline(&ctx.device, format);
        let view = sampled.shader_view(layer, level);
        let inputs = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("thumbnail_inputs"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("thumbnail_encoder"),
            });
        {
            let mut scope = BindingScope::acquire(ctx);
            scope.bind_trigger(&self.trigger, TriggerMode::Flat);
            scope.bind_program("thumbnail", pipeline, Geometry::Quad);
            scope.bind_inputs("thumbnail_source", inputs, Some("thumbnail_sampler"));
            scope.set_render_target("thumbnail_target", dst.render_target_view(0, 0));
            scope.draw(&mut encoder, None, width, height, None);
        }
        ctx.queue.submit([encoder.finish()]);
        drop(temporary);

        tracing::debug!(width, height, level, layer, "created thumbnail");
        dst
    }
}
