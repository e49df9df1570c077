use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use wgpu::TextureFormat;

use crate::gpu::bindings::BindingScope;
use crate::gpu::context::GpuContext;
use crate::gpu::fullscreen::{self, FullscreenTrigger, Geometry, TriggerMode};
use crate::gpu::texture::{Texture, TextureShape};

const MIP_2D_SRC: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;

@fragment
fn fs_main(in: FullscreenOut) -> @location(0) vec4<f32> {
    let hi = vec2<i32>(textureDimensions(src)) - vec2<i32>(1, 1);
    let base = vec2<i32>(in.position.xy) * 2;
    let a = textureLoad(src, min(base, hi), 0);
    let b = textureLoad(src, min(base + vec2<i32>(1, 0), hi), 0);
    let c = textureLoad(src, min(base + vec2<i32>(0, 1), hi), 0);
    let d = textureLoad(src, min(base + vec2<i32>(1, 1), hi), 0);
    return (a + b + c + d) * 0.25;
}
"#;

const MIP_3D_SRC: &str = r#"
@group(0) @binding(0) var src: texture_3d<f32>;

fn tap(base: vec3<i32>, hi: vec3<i32>, d: vec3<i32>) -> vec4<f32> {
    return textureLoad(src, min(base + d, hi), 0);
}

@fragment
fn fs_main(in: FullscreenOut) -> @location(0) vec4<f32> {
    let hi = vec3<i32>(textureDimensions(src)) - vec3<i32>(1, 1, 1);
    let base = vec3<i32>(vec2<i32>(in.position.xy), i32(in.slice)) * 2;
    var acc = tap(base, hi, vec3<i32>(0, 0, 0));
    acc += tap(base, hi, vec3<i32>(1, 0, 0));
    acc += tap(base, hi, vec3<i32>(0, 1, 0));
    acc += tap(base, hi, vec3<i32>(1, 1, 0));
    acc += tap(base, hi, vec3<i32>(0, 0, 1));
    acc += tap(base, hi, vec3<i32>(1, 0, 1));
    acc += tap(base, hi, vec3<i32>(0, 1, 1));
    acc += tap(base, hi, vec3<i32>(1, 1, 1));
    return acc * 0.125;
}
"#;

/// Box-filter downsampler filling mip levels 1.. from level 0.
///
/// Each texel of level `n` averages its 2×2 (or 2×2×2) footprint in level
/// `n - 1`, clamping at odd edges. Output is written in the texture's own
/// format, so results are deterministic for a given device.
pub struct MipGenerator {
    layout_2d: wgpu::BindGroupLayout,
    layout_3d: wgpu::BindGroupLayout,
    pipelines: Mutex<HashMap<(TextureShape, TextureFormat), wgpu::RenderPipeline>>,
}

fn source_layout(
    device: &wgpu::Device,
    label: &str,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension,
                multisampled: false,
            },
            count: None,
        }],
    })
}

impl MipGenerator {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            layout_2d: source_layout(device, "mip_source_2d", wgpu::TextureViewDimension::D2),
            layout_3d: source_layout(device, "mip_source_3d", wgpu::TextureViewDimension::D3),
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    fn layout(&self, shape: TextureShape) -> &wgpu::BindGroupLayout {
        match shape {
            TextureShape::Array2D => &self.layout_2d,
            TextureShape::Volume3D => &self.layout_3d,
        }
    }

    fn pipeline(
        &self,
        device: &wgpu::Device,
        trigger: &FullscreenTrigger,
        shape: TextureShape,
        format: TextureFormat,
    ) -> wgpu::RenderPipeline {
        let mut cache = self.pipelines.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .entry((shape, format))
            .or_insert_with(|| {
                let src = match shape {
                    TextureShape::Array2D => MIP_2D_SRC,
                    TextureShape::Volume3D => MIP_3D_SRC,
                };
                fullscreen::create_program(
                    device,
                    trigger,
                    "mip_downsample",
                    src,
                    self.layout(shape),
                    Geometry::Triangle,
                    format,
                )
            })
            .clone()
    }

    /// Recomputes every level above 0 of every layer of `texture`.
    pub fn regenerate(&self, ctx: &GpuContext, texture: &Texture) {
        if texture.mips() <= 1 {
            return;
        }
        let shape = texture.shape();
        let pipeline = self.pipeline(&ctx.device, &ctx.trigger, shape, texture.format());
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mip_encoder"),
            });

        {
            let mut scope = BindingScope::acquire(ctx);
            let mode = match shape {
                TextureShape::Array2D => TriggerMode::Flat,
                TextureShape::Volume3D => TriggerMode::Volumetric,
            };
            scope.bind_trigger(&ctx.trigger, mode);
            scope.bind_program("mip_downsample", pipeline, Geometry::Triangle);

            for level in 1..texture.mips() {
                let dim = texture.size_at(level);
                for layer in 0..texture.layers() {
                    let source = texture.shader_view(layer, level - 1);
                    let group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("mip_source"),
                        layout: self.layout(shape),
                        entries: &[wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&source),
                        }],
                    });
                    scope.bind_inputs("mip_source", group, None);
                    scope.set_render_target("mip_target", texture.render_target_view(layer, level));
                    match shape {
                        TextureShape::Array2D => {
                            scope.draw(&mut encoder, None, dim.width, dim.height, None);
                        }
                        TextureShape::Volume3D => {
                            for z in 0..dim.depth {
                                scope.draw(&mut encoder, None, dim.width, dim.height, Some(z));
                            }
                        }
                    }
                }
            }
        }

        ctx.queue.submit([encoder.finish()]);
        tracing::trace!(
            mips = texture.mips(),
            layers = texture.layers(),
            format = ?texture.format(),
            "regenerated mip levels"
        );
    }

    /// Returns a copy of `texture` with `mips` levels, all derived from its level 0.
    pub fn extend(&self, ctx: &GpuContext, texture: &Texture, mips: u32) -> Texture {
        let out = texture.create_like(ctx, texture.layers(), mips, texture.size(), texture.format());
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mip_extend_encoder"),
            });
        texture.copy_top_level_to(&mut encoder, &out);
        ctx.queue.submit([encoder.finish()]);
        self.regenerate(ctx, &out);
        out
    }
}

#[cfg(test)]
mod tests {
    use wgpu::TextureFormat;

    use crate::gpu::context;
    use crate::gpu::size::Size3;
    use crate::gpu::texture::{Texture, TextureShape};

    #[test]
    fn box_filter_averages_two_by_two_blocks() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let tex = Texture::create(
            ctx,
            TextureShape::Array2D,
            2,
            2,
            Size3::flat(2, 2),
            TextureFormat::R32Float,
        );
        let layer0: Vec<f32> = vec![1.0, 2.0, 3.0, 6.0];
        let layer1: Vec<f32> = vec![8.0, 8.0, 0.0, 0.0];
        tex.write_level(ctx, 0, 0, bytemuck::cast_slice(&layer0));
        tex.write_level(ctx, 1, 0, bytemuck::cast_slice(&layer1));
        tex.regenerate_mipmap_levels(ctx);

        let top0 = tex.read_texels(ctx, 0, 1).expect("readback should succeed");
        let top1 = tex.read_texels(ctx, 1, 1).expect("readback should succeed");
        assert_eq!(bytemuck::pod_collect_to_vec::<u8, f32>(&top0), vec![3.0]);
        assert_eq!(bytemuck::pod_collect_to_vec::<u8, f32>(&top1), vec![4.0]);
    }

    #[test]
    fn odd_edges_clamp_instead_of_wrapping() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let tex = Texture::create(
            ctx,
            TextureShape::Array2D,
            1,
            2,
            Size3::flat(3, 1),
            TextureFormat::R32Float,
        );
        let row: Vec<f32> = vec![2.0, 4.0, 10.0];
        tex.write_level(ctx, 0, 0, bytemuck::cast_slice(&row));
        tex.regenerate_mipmap_levels(ctx);
        let level1 = tex.read_texels(ctx, 0, 1).expect("readback should succeed");
        // Level 1 is 1x1 and only sees texels 0 and 1.
        assert_eq!(bytemuck::pod_collect_to_vec::<u8, f32>(&level1), vec![3.0]);
    }

    #[test]
    fn volume_mips_average_eight_texels() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let tex = Texture::create(
            ctx,
            TextureShape::Volume3D,
            1,
            2,
            Size3::new(2, 2, 2),
            TextureFormat::R32Float,
        );
        let data: Vec<f32> = (0..8).map(|v| v as f32).collect();
        tex.write_level(ctx, 0, 0, bytemuck::cast_slice(&data));
        tex.regenerate_mipmap_levels(ctx);
        let level1 = tex.read_texels(ctx, 0, 1).expect("readback should succeed");
        assert_eq!(bytemuck::pod_collect_to_vec::<u8, f32>(&level1), vec![3.5]);
    }

    #[test]
    fn extend_keeps_top_level_and_adds_chain() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let tex = Texture::create(
            ctx,
            TextureShape::Array2D,
            1,
            1,
            Size3::flat(4, 4),
            TextureFormat::Rgba8Unorm,
        );
        let data = vec![200_u8; 4 * 4 * 4];
        tex.write_level(ctx, 0, 0, &data);
        let extended = tex.generate_mipmap_levels(ctx, 3);
        assert_eq!(extended.mips(), 3);
        assert_eq!(
            extended.read_texels(ctx, 0, 0).expect("readback should succeed"),
            data
        );
        assert_eq!(
            extended.read_texels(ctx, 0, 2).expect("readback should succeed"),
            vec![200_u8; 4]
        );
        assert!(ctx.binding_slots().is_clear());
    }
}
