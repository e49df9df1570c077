use std::sync::mpsc;

use image::{DynamicImage, Rgba32FImage, RgbaImage};
use wgpu::TextureFormat;

use crate::error::{Error, Result};
use crate::gpu::context::GpuContext;
use crate::gpu::format;
use crate::gpu::size::Size3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// Dimensionality of a [`Texture`].
pub enum TextureShape {
    /// Array of 2D layers, each with its own mip chain.
    Array2D,
    /// Single volumetric image; mips shrink depth as well.
    Volume3D,
}

/// GPU image addressable by (layer, mip level).
pub struct Texture {
    texture: wgpu::Texture,
    shape: TextureShape,
    size: Size3,
    layers: u32,
    mips: u32,
    format: TextureFormat,
}

impl Texture {
    /// Allocates an uninitialized texture. Every texture can be sampled,
    /// rendered into and copied in both directions.
    pub fn create(
        ctx: &GpuContext,
        shape: TextureShape,
        layers: u32,
        mips: u32,
        size: Size3,
        format: TextureFormat,
    ) -> Self {
        assert!(format::is_supported(format), "unsupported format {format:?}");
        assert!(
            ctx.is_format_renderable(format),
            "{format:?} cannot be sampled and rendered on this device"
        );
        assert!(layers >= 1, "texture needs at least one layer");
        assert!(
            (1..=size.max_mip_levels()).contains(&mips),
            "{mips} mip levels requested for {size}"
        );
        let (extent, dimension) = match shape {
            TextureShape::Array2D => {
                assert_eq!(size.depth, 1, "2D array textures have a depth of 1");
                (
                    wgpu::Extent3d {
                        width: size.width,
                        height: size.height,
                        depth_or_array_layers: layers,
                    },
                    wgpu::TextureDimension::D2,
                )
            }
            TextureShape::Volume3D => {
                assert_eq!(layers, 1, "volumetric textures have a single layer");
                (size.to_extent(), wgpu::TextureDimension::D3)
            }
        };

        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("texconv_texture"),
            size: extent,
            mip_level_count: mips,
            sample_count: 1,
            dimension,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        Self {
            texture,
            shape,
            size,
            layers,
            mips,
            format,
        }
    }

    /// Allocates a texture with the same shape as `self`.
    pub fn create_like(
        &self,
        ctx: &GpuContext,
        layers: u32,
        mips: u32,
        size: Size3,
        format: TextureFormat,
    ) -> Texture {
        Texture::create(ctx, self.shape, layers, mips, size, format)
    }

    /// Uploads `img` as a single-layer 2D texture in `format`.
    ///
    /// With `auto_mip` the full mip chain is allocated and generated from the
    /// uploaded level.
    pub fn from_image(
        ctx: &GpuContext,
        img: &DynamicImage,
        format: TextureFormat,
        auto_mip: bool,
    ) -> Result<Self> {
        let max = ctx.device.limits().max_texture_dimension_2d;
        if img.width() > max || img.height() > max {
            return Err(Error::TooLarge {
                width: img.width(),
                height: img.height(),
                max,
            });
        }
        let size = Size3::flat(img.width().max(1), img.height().max(1));
        let bytes = image_bytes(img, format)?;
        let mips = if auto_mip { size.max_mip_levels() } else { 1 };
        let texture = Texture::create(ctx, TextureShape::Array2D, 1, mips, size, format);
        texture.write_level(ctx, 0, 0, &bytes);
        texture.regenerate_mipmap_levels(ctx);
        Ok(texture)
    }

    pub fn shape(&self) -> TextureShape {
        self.shape
    }

    pub fn is_volume(&self) -> bool {
        self.shape == TextureShape::Volume3D
    }

    pub fn size(&self) -> Size3 {
        self.size
    }

    pub fn size_at(&self, level: u32) -> Size3 {
        self.size.mip(level)
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }

    pub fn mips(&self) -> u32 {
        self.mips
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    fn check_subresource(&self, layer: u32, level: u32) {
        assert!(layer < self.layers, "layer {layer} out of range ({})", self.layers);
        assert!(level < self.mips, "mip {level} out of range ({})", self.mips);
    }

    /// View covering every layer and mip, as `texture_2d_array` or `texture_3d`.
    pub fn full_view(&self) -> wgpu::TextureView {
        let dimension = match self.shape {
            TextureShape::Array2D => wgpu::TextureViewDimension::D2Array,
            TextureShape::Volume3D => wgpu::TextureViewDimension::D3,
        };
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("texconv_full_view"),
            dimension: Some(dimension),
            ..Default::default()
        })
    }

    /// Single (layer, level) view for sampling: `texture_2d` or `texture_3d`.
    pub fn shader_view(&self, layer: u32, level: u32) -> wgpu::TextureView {
        self.subresource_view("texconv_shader_view", layer, level)
    }

    /// Single (layer, level) view to render into. Volumetric targets are
    /// addressed per slice through the render pass `depth_slice`.
    pub fn render_target_view(&self, layer: u32, level: u32) -> wgpu::TextureView {
        self.subresource_view("texconv_target_view", layer, level)
    }

    fn subresource_view(&self, label: &str, layer: u32, level: u32) -> wgpu::TextureView {
        self.check_subresource(layer, level);
        let (dimension, base_array_layer) = match self.shape {
            TextureShape::Array2D => (wgpu::TextureViewDimension::D2, layer),
            TextureShape::Volume3D => (wgpu::TextureViewDimension::D3, 0),
        };
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(dimension),
            base_mip_level: level,
            mip_level_count: Some(1),
            base_array_layer,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }

    /// Rebuilds mip levels 1.. of every layer from level 0.
    pub fn regenerate_mipmap_levels(&self, ctx: &GpuContext) {
        ctx.mips.regenerate(ctx, self);
    }

    /// Returns a copy of this texture with `mips` levels generated from level 0.
    pub fn generate_mipmap_levels(&self, ctx: &GpuContext, mips: u32) -> Texture {
        ctx.mips.extend(ctx, self, mips)
    }

    /// Writes tightly packed texels into one (layer, level); all slices for volumes.
    pub fn write_level(&self, ctx: &GpuContext, layer: u32, level: u32, bytes: &[u8]) {
        self.check_subresource(layer, level);
        let dim = self.size_at(level);
        let bpt = format::bytes_per_texel(self.format);
        assert_eq!(
            bytes.len() as u64,
            dim.product() * bpt as u64,
            "texel data does not match {dim} of {:?}",
            self.format
        );
        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: level,
                origin: self.origin(layer),
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(dim.width * bpt),
                rows_per_image: Some(dim.height),
            },
            dim.to_extent(),
        );
    }

    fn origin(&self, layer: u32) -> wgpu::Origin3d {
        match self.shape {
            TextureShape::Array2D => wgpu::Origin3d { x: 0, y: 0, z: layer },
            TextureShape::Volume3D => wgpu::Origin3d::ZERO,
        }
    }

    /// Records a copy of level 0 of every layer into `dst`, which must have
    /// the same shape, size, layer count and format.
    pub fn copy_top_level_to(&self, encoder: &mut wgpu::CommandEncoder, dst: &Texture) {
        assert_eq!(self.shape, dst.shape);
        assert_eq!(self.size, dst.size);
        assert_eq!(self.layers, dst.layers);
        assert_eq!(self.format, dst.format);
        let extent = match self.shape {
            TextureShape::Array2D => wgpu::Extent3d {
                width: self.size.width,
                height: self.size.height,
                depth_or_array_layers: self.layers,
            },
            TextureShape::Volume3D => self.size.to_extent(),
        };
        encoder.copy_texture_to_texture(
            self.texture.as_image_copy(),
            dst.texture.as_image_copy(),
            extent,
        );
    }

    /// Reads one (layer, level) back as tightly packed texels.
    pub fn read_texels(&self, ctx: &GpuContext, layer: u32, level: u32) -> Result<Vec<u8>> {
        self.check_subresource(layer, level);
        let dim = self.size_at(level);
        let bpt = format::bytes_per_texel(self.format);
        let unpadded_bytes_per_row = dim.width * bpt;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let rows = dim.height as u64 * dim.depth as u64;
        let readback = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texconv_readback"),
            size: padded_bytes_per_row as u64 * rows,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texconv_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: level,
                origin: self.origin(layer),
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(dim.height),
                },
            },
            dim.to_extent(),
        );
        ctx.queue.submit([encoder.finish()]);

        let slice = readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.device.poll(wgpu::PollType::Wait)?;
        rx.recv().map_err(|_| Error::ReadbackInterrupted)??;

        let mapped = slice.get_mapped_range();
        let unpadded = unpadded_bytes_per_row as usize;
        let padded = padded_bytes_per_row as usize;
        let mut out = vec![0_u8; unpadded * rows as usize];
        for row in 0..rows as usize {
            let src_offset = row * padded;
            let dst_offset = row * unpadded;
            out[dst_offset..dst_offset + unpadded]
                .copy_from_slice(&mapped[src_offset..src_offset + unpadded]);
        }
        drop(mapped);
        readback.unmap();
        Ok(out)
    }

    /// Reads one (layer, level) back as an image. Volumes yield their first slice.
    pub fn to_image(&self, ctx: &GpuContext, layer: u32, level: u32) -> Result<DynamicImage> {
        let dim = self.size_at(level);
        let mut bytes = self.read_texels(ctx, layer, level)?;
        let slice_len = (dim.width * dim.height * format::bytes_per_texel(self.format)) as usize;
        bytes.truncate(slice_len);

        let image = match self.format {
            TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => {
                RgbaImage::from_raw(dim.width, dim.height, bytes).map(DynamicImage::ImageRgba8)
            }
            TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => {
                for px in bytes.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
                RgbaImage::from_raw(dim.width, dim.height, bytes).map(DynamicImage::ImageRgba8)
            }
            other => {
                let texels: Vec<f32> = format::decode_texels(other, &bytes)
                    .into_iter()
                    .flatten()
                    .collect();
                Rgba32FImage::from_raw(dim.width, dim.height, texels)
                    .map(DynamicImage::ImageRgba32F)
            }
        };
        image.ok_or_else(|| Error::UnsupportedImage("readback size mismatch".to_string()))
    }
}

/// Packs `img` into the texel layout of `format`.
pub fn image_bytes(img: &DynamicImage, format: TextureFormat) -> Result<Vec<u8>> {
    let bytes = match format {
        TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => img.to_rgba8().into_raw(),
        TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => {
            let mut raw = img.to_rgba8().into_raw();
            for px in raw.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
            raw
        }
        TextureFormat::R8Unorm => img.to_luma8().into_raw(),
        TextureFormat::Rgba32Float => bytemuck::cast_slice(img.to_rgba32f().as_raw()).to_vec(),
        TextureFormat::R32Float => bytemuck::cast_slice(img.to_luma32f().as_raw()).to_vec(),
        TextureFormat::Rgba16Float => img
            .to_rgba32f()
            .as_raw()
            .iter()
            .flat_map(|v| half::f16::from_f32(*v).to_le_bytes())
            .collect(),
        other => {
            return Err(Error::UnsupportedImage(format!(
                "no upload path from decoded images to {}",
                format::name(other)
            )));
        }
    };
    Ok(bytes)
}
