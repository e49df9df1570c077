use std::collections::HashMap;

use wgpu::TextureFormat;

use crate::error::{Error, Result};
use crate::gpu::bindings::BindingScope;
use crate::gpu::context::GpuContext;
use crate::gpu::format;
use crate::gpu::fullscreen::{self, FullscreenTrigger, Geometry, TriggerMode};
use crate::gpu::size::{Axis, Size3};
use crate::gpu::texture::{Texture, TextureShape};
use crate::gpu::upload::{self, LayerLevelOffset, UploadBuffer};

const CONVERT_PREAMBLE: &str = r#"
struct LayerLevelOffset {
    layer: u32,
    level: u32,
    xoffset: u32,
    yoffset: u32,
    multiplier: f32,
};

@group(0) @binding(1) var<uniform> info: LayerLevelOffset;
"#;

const CONVERT_2D_SRC: &str = r#"
@group(0) @binding(0) var in_tex: texture_2d_array<f32>;

@fragment
fn fs_main(in: FullscreenOut) -> @location(0) vec4<f32> {
    let texel = vec2<u32>(info.xoffset, info.yoffset) + vec2<u32>(in.position.xy);
    return info.multiplier * textureLoad(in_tex, texel, info.layer + in.slice, info.level);
}
"#;

const CONVERT_3D_SRC: &str = r#"
@group(0) @binding(0) var in_tex: texture_3d<f32>;

@fragment
fn fs_main(in: FullscreenOut) -> @location(0) vec4<f32> {
    let xy = vec2<u32>(info.xoffset, info.yoffset) + vec2<u32>(in.position.xy);
    let texel = vec3<u32>(xy, info.layer + in.slice);
    return info.multiplier * textureLoad(in_tex, texel, info.level);
}
"#;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// Picks either every mip/layer of a source or exactly one.
pub enum Selection {
    #[default]
    All,
    Index(u32),
}

impl Selection {
    /// Maps the `-1` ("all") sentinel; any other negative value clamps to
    /// index 0.
    pub fn from_signed(value: i64) -> Self {
        if value == -1 {
            return Selection::All;
        }
        Selection::Index(u32::try_from(value.max(0)).unwrap_or(u32::MAX))
    }

    /// Returns `(first, count)` for a resource with `available` entries.
    pub fn resolve(self, available: u32) -> (u32, u32) {
        match self {
            Selection::All => (0, available),
            Selection::Index(index) => {
                assert!(
                    index < available,
                    "index {index} out of range ({available})"
                );
                (index, 1)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Source sub-rectangle: `offset` into the source and extent of the output.
pub struct Crop {
    pub offset: Size3,
    pub size: Size3,
}

#[derive(Clone, Copy, Debug, PartialEq)]
/// Parameters of [`ConvertFormatPass::convert`].
pub struct ConvertRequest {
    pub format: TextureFormat,
    pub mip: Selection,
    pub layer: Selection,
    /// Applied to all four channels.
    pub multiplier: f32,
    pub crop: Option<Crop>,
    /// Per-axis divisibility requirement on the output; 0 means none.
    pub align: Size3,
}

impl ConvertRequest {
    /// Every mip and layer, unscaled, uncropped and unaligned.
    pub fn new(format: TextureFormat) -> Self {
        Self {
            format,
            mip: Selection::All,
            layer: Selection::All,
            multiplier: 1.0,
            crop: None,
            align: Size3::ZERO,
        }
    }

    pub fn with_mip(mut self, mip: Selection) -> Self {
        self.mip = mip;
        self
    }

    pub fn with_layer(mut self, layer: Selection) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f32) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_crop(mut self, offset: Size3, size: Size3) -> Self {
        self.crop = Some(Crop { offset, size });
        self
    }

    pub fn with_align(mut self, align: Size3) -> Self {
        self.align = align;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Source region actually copied, after alignment.
pub struct Region {
    pub offset: Size3,
    pub size: Size3,
    pub cropped: bool,
}

/// Shrinks `region` on every axis with a nonzero `align` to the nearest
/// multiple, moving the offset by half the remainder (rounded down).
///
/// Any adjustment turns cropping on. Fails when an axis is smaller than its
/// required alignment.
pub fn align_region(mut region: Region, align: Size3) -> Result<Region> {
    for axis in Axis::ALL {
        let required = align[axis];
        if required == 0 {
            continue;
        }
        let remainder = region.size[axis] % required;
        if remainder == 0 {
            continue;
        }
        if region.size[axis] < required {
            return Err(Error::Alignment {
                axis,
                required,
                available: region.size[axis],
            });
        }
        region.cropped = true;
        region.offset[axis] += remainder / 2;
        region.size[axis] -= remainder;
    }
    Ok(region)
}

/// A multi-mip export of a cropped region gets a fresh full chain for the new
/// size. Returns the mip count and whether levels above 0 must be regenerated.
pub fn recompute_mip_count(mip_count: u32, cropped: bool, size: Size3) -> (u32, bool) {
    if mip_count > 1 && cropped {
        let mips = size.max_mip_levels();
        (mips, mips > 1)
    } else {
        (mip_count, false)
    }
}

/// Format conversion with optional crop, alignment and scaling.
pub struct ConvertFormatPass {
    trigger: FullscreenTrigger,
    layout_2d: wgpu::BindGroupLayout,
    layout_3d: wgpu::BindGroupLayout,
    pipelines: HashMap<(TextureShape, TextureFormat, Geometry), wgpu::RenderPipeline>,
    upload: UploadBuffer,
}

fn source_layout(
    device: &wgpu::Device,
    label: &str,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension,
                    multisampled: false,
                },
                count: None,
            },
            upload::layout_entry(1),
        ],
    })
}

impl ConvertFormatPass {
    pub fn new(ctx: &GpuContext) -> Self {
        let device = &ctx.device;
        Self {
            trigger: FullscreenTrigger::new(device),
            layout_2d: source_layout(device, "convert_source_2d", wgpu::TextureViewDimension::D2Array),
            layout_3d: source_layout(device, "convert_source_3d", wgpu::TextureViewDimension::D3),
            pipelines: HashMap::new(),
            upload: UploadBuffer::new(device, "convert_layer_level_offset", 16),
        }
    }

    fn layout(&self, shape: TextureShape) -> &wgpu::BindGroupLayout {
        match shape {
            TextureShape::Array2D => &self.layout_2d,
            TextureShape::Volume3D => &self.layout_3d,
        }
    }

    fn pipeline(
        &mut self,
        device: &wgpu::Device,
        shape: TextureShape,
        format: TextureFormat,
        geometry: Geometry,
    ) -> wgpu::RenderPipeline {
        if let Some(pipeline) = self.pipelines.get(&(shape, format, geometry)) {
            return pipeline.clone();
        }
        let (label, body) = match shape {
            TextureShape::Array2D => ("convert_2d", CONVERT_2D_SRC),
            TextureShape::Volume3D => ("convert_3d", CONVERT_3D_SRC),
        };
        tracing::debug!(label, ?format, ?geometry, "compiling conversion program");
        let pipeline = fullscreen::create_program(
            device,
            &self.trigger,
            label,
            &format!("{CONVERT_PREAMBLE}{body}"),
            self.layout(shape),
            geometry,
            format,
        );
        self.pipelines
            .insert((shape, format, geometry), pipeline.clone());
        pipeline
    }

    fn bind_group(&self, device: &wgpu::Device, shape: TextureShape, view: &wgpu::TextureView) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("convert_inputs"),
            layout: self.layout(shape),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.upload.binding(),
                },
            ],
        })
    }

    /// Converts the selected mips and layers of `source` into a new texture.
    ///
    /// The result has the same shape as the source. Texel (x, y, z) of output
    /// mip `m` in layer `l` is source texel `(x + offset.x, y + offset.y)` of
    /// layer `l + first_layer + offset.z` (volumes: slice `z + offset.z`) at
    /// mip `m + first_mip`, times the multiplier. Reads outside the source
    /// are not checked.
    pub fn convert(
        &mut self,
        ctx: &GpuContext,
        source: &Texture,
        request: &ConvertRequest,
    ) -> Result<Texture> {
        assert!(
            format::is_supported(source.format()),
            "unsupported source format {:?}",
            source.format()
        );
        assert!(
            format::is_supported(request.format),
            "unsupported destination format {:?}",
            request.format
        );

        let (first_mip, mip_count) = request.mip.resolve(source.mips());
        let (first_layer, layer_count) = request.layer.resolve(source.layers());
        let region = match request.crop {
            Some(crop) => Region {
                offset: crop.offset,
                size: crop.size,
                cropped: true,
            },
            None => Region {
                offset: Size3::ZERO,
                size: source.size_at(first_mip),
                cropped: false,
            },
        };
        let region = align_region(region, request.align)?;
        let (mip_count, recompute_mips) = recompute_mip_count(mip_count, region.cropped, region.size);
        let written_mips = if recompute_mips { 1 } else { mip_count };

        tracing::debug!(
            shape = ?source.shape(),
            from = ?source.format(),
            to = ?request.format,
            size = %region.size,
            offset = %region.offset,
            layers = layer_count,
            mips = mip_count,
            recompute_mips,
            "converting texture"
        );

        let dst = source.create_like(ctx, layer_count, mip_count, region.size, request.format);
        let shape = source.shape();
        self.upload.reserve(&ctx.device, layer_count * written_mips);
        let pipeline = self.pipeline(&ctx.device, shape, request.format, Geometry::Triangle);
        let inputs = self.bind_group(&ctx.device, shape, &source.full_view());
        let mode = match shape {
            TextureShape::Array2D => TriggerMode::Flat,
            TextureShape::Volume3D => TriggerMode::Volumetric,
        };

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("convert_encoder"),
            });
        {
            let mut scope = BindingScope::acquire(ctx);
            scope.bind_trigger(&self.trigger, mode);
            scope.bind_program("convert", pipeline, Geometry::Triangle);
            scope.bind_inputs("convert_source", inputs, None);

            let mut slot = 0;
            for layer in 0..layer_count {
                for mip in 0..written_mips {
                    let record = LayerLevelOffset::new(
                        layer + first_layer + region.offset.depth,
                        mip + first_mip,
                        region.offset.width,
                        region.offset.height,
                        request.multiplier,
                    );
                    let offset = self.upload.write(&ctx.queue, slot, record);
                    slot += 1;

                    let dim = dst.size_at(mip);
                    scope.set_render_target("convert_target", dst.render_target_view(layer, mip));
                    match shape {
                        TextureShape::Array2D => {
                            scope.draw(&mut encoder, Some(offset), dim.width, dim.height, None);
                        }
                        TextureShape::Volume3D => {
                            for z in 0..dim.depth {
                                scope.draw(&mut encoder, Some(offset), dim.width, dim.height, Some(z));
                            }
                        }
                    }
                }
            }
        }
        ctx.queue.submit([encoder.finish()]);

        if recompute_mips {
            dst.regenerate_mipmap_levels(ctx);
        }
        Ok(dst)
    }

    /// Copies a `texture_2d_array` view of `size` into a new single-layer,
    /// single-mip texture of `format`, drawn with the quad geometry.
    pub fn convert_from_view(
        &mut self,
        ctx: &GpuContext,
        view: &wgpu::TextureView,
        size: Size3,
        format: TextureFormat,
    ) -> Texture {
        assert!(format::is_supported(format), "unsupported format {format:?}");
        let dst = Texture::create(ctx, TextureShape::Array2D, 1, 1, size, format);
        let pipeline = self.pipeline(&ctx.device, TextureShape::Array2D, format, Geometry::Quad);
        let inputs = self.bind_group(&ctx.device, TextureShape::Array2D, view);
        let offset = self
            .upload
            .write(&ctx.queue, 0, LayerLevelOffset::new(0, 0, 0, 0, 1.0));

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("convert_view_encoder"),
            });
        {
            let mut scope = BindingScope::acquire(ctx);
            scope.bind_trigger(&self.trigger, TriggerMode::Flat);
            scope.bind_program("convert", pipeline, Geometry::Quad);
            scope.bind_inputs("convert_source", inputs, None);
            scope.set_render_target("convert_target", dst.render_target_view(0, 0));
            scope.draw(&mut encoder, Some(offset), size.width, size.height, None);
        }
        ctx.queue.submit([encoder.finish()]);
        dst
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use wgpu::TextureFormat;

    use super::{ConvertFormatPass, ConvertRequest, Region, Selection, align_region, recompute_mip_count};
    use crate::error::Error;
    use crate::gpu::context::{self, GpuContext};
    use crate::gpu::size::{Axis, Size3};
    use crate::gpu::texture::{Texture, TextureShape};

    fn uncropped(size: Size3) -> Region {
        Region {
            offset: Size3::ZERO,
            size,
            cropped: false,
        }
    }

    fn read_f32(ctx: &GpuContext, tex: &Texture, layer: u32, mip: u32) -> Vec<f32> {
        let bytes = tex.read_texels(ctx, layer, mip).expect("readback should succeed");
        bytemuck::pod_collect_to_vec(&bytes)
    }

    fn ramp(count: u32, scale: f32) -> Vec<f32> {
        (0..count).map(|i| i as f32 * scale).collect()
    }

    /// 2x2 box filter of a square `width` x `width` level.
    fn box_average(level: &[f32], width: usize) -> Vec<f32> {
        let half = width / 2;
        (0..half)
            .flat_map(|y| (0..half).map(move |x| (x, y)))
            .map(|(x, y)| {
                let at = |dx: usize, dy: usize| level[(2 * y + dy) * width + 2 * x + dx];
                (at(0, 0) + at(1, 0) + at(0, 1) + at(1, 1)) * 0.25
            })
            .collect()
    }

    fn assert_close(got: &[f32], want: &[f32]) {
        assert_eq!(got.len(), want.len());
        for (g, w) in got.iter().zip(want) {
            assert!((g - w).abs() < 1e-4, "{got:?} vs {want:?}");
        }
    }

    #[test]
    fn only_minus_one_selects_everything() {
        assert_eq!(Selection::from_signed(-1), Selection::All);
        assert_eq!(Selection::from_signed(-2), Selection::Index(0));
        assert_eq!(Selection::from_signed(i64::MIN), Selection::Index(0));
        assert_eq!(Selection::from_signed(2), Selection::Index(2));
        assert_eq!(Selection::All.resolve(5), (0, 5));
        assert_eq!(Selection::Index(3).resolve(5), (3, 1));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn selection_index_past_end_panics() {
        Selection::Index(4).resolve(4);
    }

    #[test]
    fn alignment_centers_the_remainder() {
        let region = align_region(uncropped(Size3::flat(7, 8)), Size3::flat(4, 4))
            .expect("7x8 aligns to 4");
        assert_eq!(region.size, Size3::flat(4, 8));
        assert_eq!(region.offset, Size3::new(1, 0, 0));
        assert!(region.cropped);
    }

    #[test]
    fn already_aligned_size_stays_uncropped() {
        let region = align_region(uncropped(Size3::flat(8, 8)), Size3::flat(4, 2))
            .expect("8x8 is aligned");
        assert_eq!(region, uncropped(Size3::flat(8, 8)));
    }

    #[test]
    fn alignment_larger_than_axis_fails() {
        let err = align_region(uncropped(Size3::flat(16, 3)), Size3::flat(0, 4))
            .expect_err("height 3 cannot align to 4");
        assert!(matches!(
            err,
            Error::Alignment {
                axis: Axis::Y,
                required: 4,
                available: 3
            }
        ));
    }

    #[test]
    fn mip_count_recomputed_only_for_cropped_chains() {
        assert_eq!(recompute_mip_count(3, false, Size3::flat(4, 4)), (3, false));
        assert_eq!(recompute_mip_count(1, true, Size3::flat(4, 4)), (1, false));
        assert_eq!(recompute_mip_count(3, true, Size3::flat(16, 4)), (5, true));
        assert_eq!(recompute_mip_count(3, true, Size3::flat(1, 1)), (1, false));
    }

    proptest! {
        #[test]
        fn aligned_region_stays_inside_and_divisible(
            w in 1u32..512,
            h in 1u32..512,
            ax in 0u32..16,
            ay in 0u32..16,
        ) {
            let input = uncropped(Size3::flat(w, h));
            match align_region(input, Size3::flat(ax, ay)) {
                Ok(region) => {
                    for axis in [Axis::X, Axis::Y] {
                        let align = Size3::flat(ax, ay)[axis];
                        if align != 0 {
                            prop_assert_eq!(region.size[axis] % align, 0);
                            prop_assert!(region.size[axis] >= align);
                        }
                        prop_assert!(region.offset[axis] + region.size[axis] <= input.size[axis]);
                        let removed = input.size[axis] - region.size[axis];
                        prop_assert_eq!(region.offset[axis], removed / 2);
                    }
                }
                Err(Error::Alignment { axis, required, available }) => {
                    prop_assert!(available < required);
                    prop_assert_eq!(input.size[axis], available);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }
    }

    #[test]
    fn identity_conversion_is_byte_identical() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let size = Size3::flat(9, 6);
        let src = Texture::create(ctx, TextureShape::Array2D, 2, 3, size, TextureFormat::Rgba8Unorm);
        for layer in 0..2_u32 {
            for mip in 0..3_u32 {
                let count = src.size_at(mip).product() as usize * 4;
                let data: Vec<u8> = (0..count)
                    .map(|i| (i * 7 + layer as usize * 31 + mip as usize * 3) as u8)
                    .collect();
                src.write_level(ctx, layer, mip, &data);
            }
        }

        let mut pass = ConvertFormatPass::new(ctx);
        let dst = pass
            .convert(ctx, &src, &ConvertRequest::new(TextureFormat::Rgba8Unorm))
            .expect("conversion should succeed");
        assert_eq!((dst.layers(), dst.mips(), dst.size()), (2, 3, size));
        for layer in 0..2 {
            for mip in 0..3 {
                assert_eq!(
                    dst.read_texels(ctx, layer, mip).expect("readback should succeed"),
                    src.read_texels(ctx, layer, mip).expect("readback should succeed"),
                    "layer {layer} mip {mip}"
                );
            }
        }
        assert!(ctx.binding_slots().is_clear());
    }

    #[test]
    fn multiplier_scales_every_channel() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let src = Texture::create(ctx, TextureShape::Array2D, 1, 1, Size3::flat(4, 2), TextureFormat::R32Float);
        let data = ramp(8, 1.5);
        src.write_level(ctx, 0, 0, bytemuck::cast_slice(&data));

        let mut pass = ConvertFormatPass::new(ctx);
        let request = ConvertRequest::new(TextureFormat::R32Float).with_multiplier(2.0);
        let dst = pass.convert(ctx, &src, &request).expect("conversion should succeed");
        assert_eq!(read_f32(ctx, &dst, 0, 0), ramp(8, 3.0));
    }

    #[test]
    fn unorm_to_float_normalizes() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let src = Texture::create(ctx, TextureShape::Array2D, 1, 1, Size3::flat(1, 1), TextureFormat::Rgba8Unorm);
        src.write_level(ctx, 0, 0, &[0, 51, 255, 255]);
        let mut pass = ConvertFormatPass::new(ctx);
        let dst = pass
            .convert(ctx, &src, &ConvertRequest::new(TextureFormat::Rgba32Float))
            .expect("conversion should succeed");
        let texel = read_f32(ctx, &dst, 0, 0);
        for (got, want) in texel.iter().zip([0.0, 0.2, 1.0, 1.0]) {
            assert!((got - want).abs() < 1e-6, "{got} vs {want}");
        }
    }

    #[test]
    fn crop_reads_from_offset() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let src = Texture::create(ctx, TextureShape::Array2D, 1, 1, Size3::flat(4, 4), TextureFormat::R32Float);
        src.write_level(ctx, 0, 0, bytemuck::cast_slice(&ramp(16, 1.0)));
        let mut pass = ConvertFormatPass::new(ctx);
        let request = ConvertRequest::new(TextureFormat::R32Float)
            .with_crop(Size3::new(1, 2, 0), Size3::flat(2, 2));
        let dst = pass.convert(ctx, &src, &request).expect("conversion should succeed");
        assert_eq!(dst.size(), Size3::flat(2, 2));
        assert_eq!(read_f32(ctx, &dst, 0, 0), vec![9.0, 10.0, 13.0, 14.0]);
    }

    #[test]
    fn alignment_crops_centered_region() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let src = Texture::create(ctx, TextureShape::Array2D, 1, 1, Size3::flat(7, 1), TextureFormat::R32Float);
        src.write_level(ctx, 0, 0, bytemuck::cast_slice(&ramp(7, 1.0)));
        let mut pass = ConvertFormatPass::new(ctx);
        let request = ConvertRequest::new(TextureFormat::R32Float).with_align(Size3::flat(4, 0));
        let dst = pass.convert(ctx, &src, &request).expect("conversion should succeed");
        assert_eq!(read_f32(ctx, &dst, 0, 0), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn cropped_chain_is_regenerated_from_top_level() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let src = Texture::create(ctx, TextureShape::Array2D, 1, 3, Size3::flat(6, 6), TextureFormat::R32Float);
        src.write_level(ctx, 0, 0, bytemuck::cast_slice(&ramp(36, 1.0)));
        // Upper levels deliberately disagree with level 0.
        src.write_level(ctx, 0, 1, bytemuck::cast_slice(&vec![-9.0_f32; 9]));
        src.write_level(ctx, 0, 2, bytemuck::cast_slice(&[-9.0_f32]));

        let mut pass = ConvertFormatPass::new(ctx);
        let request = ConvertRequest::new(TextureFormat::R32Float).with_align(Size3::flat(4, 4));
        let dst = pass.convert(ctx, &src, &request).expect("conversion should succeed");
        assert_eq!((dst.size(), dst.mips()), (Size3::flat(4, 4), 3));

        // 6x6 aligned to 4 keeps the centered block starting at (1, 1).
        let top = read_f32(ctx, &dst, 0, 0);
        let expected: Vec<f32> = (1..5)
            .flat_map(|y| (1..5).map(move |x| (y * 6 + x) as f32))
            .collect();
        assert_eq!(top, expected);

        let level1 = box_average(&top, 4);
        assert_close(&read_f32(ctx, &dst, 0, 1), &level1);
        assert_close(&read_f32(ctx, &dst, 0, 2), &box_average(&level1, 2));
        assert!(ctx.binding_slots().is_clear());
    }

    #[test]
    fn single_mip_and_layer_selection() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let src = Texture::create(ctx, TextureShape::Array2D, 3, 2, Size3::flat(4, 4), TextureFormat::R32Float);
        for layer in 0..3 {
            src.write_level(ctx, layer, 0, bytemuck::cast_slice(&ramp(16, 0.0)));
            src.write_level(ctx, layer, 1, bytemuck::cast_slice(&ramp(4, layer as f32)));
        }
        let mut pass = ConvertFormatPass::new(ctx);
        let request = ConvertRequest::new(TextureFormat::R32Float)
            .with_mip(Selection::Index(1))
            .with_layer(Selection::Index(2));
        let dst = pass.convert(ctx, &src, &request).expect("conversion should succeed");
        assert_eq!((dst.layers(), dst.mips(), dst.size()), (1, 1, Size3::flat(2, 2)));
        assert_eq!(read_f32(ctx, &dst, 0, 0), ramp(4, 2.0));
    }

    #[test]
    fn volume_conversion_visits_every_slice() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let size = Size3::new(2, 2, 3);
        let src = Texture::create(ctx, TextureShape::Volume3D, 1, 1, size, TextureFormat::R32Float);
        src.write_level(ctx, 0, 0, bytemuck::cast_slice(&ramp(12, 1.0)));
        let mut pass = ConvertFormatPass::new(ctx);
        let request = ConvertRequest::new(TextureFormat::R32Float).with_multiplier(0.5);
        let dst = pass.convert(ctx, &src, &request).expect("conversion should succeed");
        assert!(dst.is_volume());
        assert_eq!(read_f32(ctx, &dst, 0, 0), ramp(12, 0.5));
    }

    #[test]
    fn volume_crop_offsets_every_axis() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let src = Texture::create(ctx, TextureShape::Volume3D, 1, 1, Size3::new(2, 2, 4), TextureFormat::R32Float);
        src.write_level(ctx, 0, 0, bytemuck::cast_slice(&ramp(16, 1.0)));
        let mut pass = ConvertFormatPass::new(ctx);
        let request = ConvertRequest::new(TextureFormat::R32Float)
            .with_crop(Size3::new(1, 0, 1), Size3::new(1, 2, 2));
        let dst = pass.convert(ctx, &src, &request).expect("conversion should succeed");
        assert_eq!(dst.size(), Size3::new(1, 2, 2));
        // Column x = 1 of slices 1 and 2.
        assert_eq!(read_f32(ctx, &dst, 0, 0), vec![5.0, 7.0, 9.0, 11.0]);
    }

    #[test]
    fn volume_chain_converts_every_level() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let src = Texture::create(ctx, TextureShape::Volume3D, 1, 2, Size3::new(4, 4, 4), TextureFormat::R32Float);
        src.write_level(ctx, 0, 0, bytemuck::cast_slice(&ramp(64, 1.0)));
        // Not the box average of level 0, so a regenerated level would differ.
        src.write_level(ctx, 0, 1, bytemuck::cast_slice(&ramp(8, 10.0)));
        let mut pass = ConvertFormatPass::new(ctx);
        let request = ConvertRequest::new(TextureFormat::R32Float).with_multiplier(2.0);
        let dst = pass.convert(ctx, &src, &request).expect("conversion should succeed");
        assert_eq!((dst.size(), dst.mips()), (Size3::new(4, 4, 4), 2));
        assert_eq!(read_f32(ctx, &dst, 0, 0), ramp(64, 2.0));
        assert_eq!(read_f32(ctx, &dst, 0, 1), ramp(8, 20.0));
    }

    #[test]
    fn failed_alignment_leaves_context_clean() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let src = Texture::create(ctx, TextureShape::Array2D, 1, 1, Size3::flat(3, 3), TextureFormat::Rgba8Unorm);
        let mut pass = ConvertFormatPass::new(ctx);
        let request = ConvertRequest::new(TextureFormat::Rgba8Unorm).with_align(Size3::flat(4, 0));
        let Err(err) = pass.convert(ctx, &src, &request) else {
            panic!("3 cannot align to 4");
        };
        assert_eq!(
            err.to_string(),
            "image needs to be aligned to 4 but the width is only 3"
        );
        assert!(ctx.binding_slots().is_clear());
    }

    #[test]
    fn view_conversion_copies_whole_view() {
        let Some(ctx) = context::shared() else {
            return;
        };
        let src = Texture::create(ctx, TextureShape::Array2D, 1, 1, Size3::flat(3, 2), TextureFormat::R32Float);
        src.write_level(ctx, 0, 0, bytemuck::cast_slice(&ramp(6, 1.0)));
        let mut pass = ConvertFormatPass::new(ctx);
        let dst = pass.convert_from_view(ctx, &src.full_view(), src.size(), TextureFormat::Rgba32Float);
        let texels = read_f32(ctx, &dst, 0, 0);
        let reds: Vec<f32> = texels.chunks_exact(4).map(|t| t[0]).collect();
        assert_eq!(reds, ramp(6, 1.0));
    }
}
