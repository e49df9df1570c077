use half::f16;
use wgpu::TextureFormat;

/// Formats both passes accept as source and destination.
///
/// All of them are color-renderable and filterable in core WebGPU, except the
/// 32-bit float formats which need `FLOAT32_FILTERABLE` for the thumbnail
/// sampler (see [`needs_float32_filterable`]).
pub const SUPPORTED_FORMATS: &[TextureFormat] = &[
    TextureFormat::R8Unorm,
    TextureFormat::Rg8Unorm,
    TextureFormat::Rgba8Unorm,
    TextureFormat::Rgba8UnormSrgb,
    TextureFormat::Bgra8Unorm,
    TextureFormat::Bgra8UnormSrgb,
    TextureFormat::Rgb10a2Unorm,
    TextureFormat::R16Float,
    TextureFormat::Rg16Float,
    TextureFormat::Rgba16Float,
    TextureFormat::R32Float,
    TextureFormat::Rg32Float,
    TextureFormat::Rgba32Float,
];

const FORMAT_NAMES: &[(&str, TextureFormat)] = &[
    ("r8unorm", TextureFormat::R8Unorm),
    ("rg8unorm", TextureFormat::Rg8Unorm),
    ("rgba8unorm", TextureFormat::Rgba8Unorm),
    ("rgba8unorm-srgb", TextureFormat::Rgba8UnormSrgb),
    ("bgra8unorm", TextureFormat::Bgra8Unorm),
    ("bgra8unorm-srgb", TextureFormat::Bgra8UnormSrgb),
    ("rgb10a2unorm", TextureFormat::Rgb10a2Unorm),
    ("r16float", TextureFormat::R16Float),
    ("rg16float", TextureFormat::Rg16Float),
    ("rgba16float", TextureFormat::Rgba16Float),
    ("r32float", TextureFormat::R32Float),
    ("rg32float", TextureFormat::Rg32Float),
    ("rgba32float", TextureFormat::Rgba32Float),
];

/// Returns `true` if `format` belongs to the supported-format set.
pub fn is_supported(format: TextureFormat) -> bool {
    SUPPORTED_FORMATS.contains(&format)
}

pub fn needs_float32_filterable(format: TextureFormat) -> bool {
    matches!(
        format,
        TextureFormat::R32Float | TextureFormat::Rg32Float | TextureFormat::Rgba32Float
    )
}

/// Parses a lowercase WebGPU-style format name such as `rgba16float`.
pub fn parse(name: &str) -> Option<TextureFormat> {
    let strip = |s: &str| s.replace(['_', '-'], "");
    let norm = strip(&name.trim().to_ascii_lowercase());
    FORMAT_NAMES
        .iter()
        .find(|(known, _)| strip(known) == norm)
        .map(|(_, format)| *format)
}

pub fn name(format: TextureFormat) -> &'static str {
    FORMAT_NAMES
        .iter()
        .find(|(_, known)| *known == format)
        .map(|(name, _)| *name)
        .unwrap_or("unsupported")
}

/// Size of one texel in bytes. Panics for formats outside the supported set.
pub fn bytes_per_texel(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::R8Unorm => 1,
        TextureFormat::Rg8Unorm | TextureFormat::R16Float => 2,
        TextureFormat::Rgba8Unorm
        | TextureFormat::Rgba8UnormSrgb
        | TextureFormat::Bgra8Unorm
        | TextureFormat::Bgra8UnormSrgb
        | TextureFormat::Rgb10a2Unorm
        | TextureFormat::Rg16Float
        | TextureFormat::R32Float => 4,
        TextureFormat::Rgba16Float | TextureFormat::Rg32Float => 8,
        TextureFormat::Rgba32Float => 16,
        other => panic!("unsupported texture format {other:?}"),
    }
}

/// Decodes tightly packed texels into RGBA floats as stored.
///
/// sRGB formats are not linearized; missing channels read as 0 (alpha as 1).
pub fn decode_texels(format: TextureFormat, bytes: &[u8]) -> Vec<[f32; 4]> {
    let stride = bytes_per_texel(format) as usize;
    bytes
        .chunks_exact(stride)
        .map(|t| decode_texel(format, t))
        .collect()
}

fn unorm8(v: u8) -> f32 {
    v as f32 / 255.0
}

fn f16_at(t: &[u8], i: usize) -> f32 {
    f16::from_le_bytes([t[i * 2], t[i * 2 + 1]]).to_f32()
}

fn f32_at(t: &[u8], i: usize) -> f32 {
    f32::from_le_bytes([t[i * 4], t[i * 4 + 1], t[i * 4 + 2], t[i * 4 + 3]])
}

fn decode_texel(format: TextureFormat, t: &[u8]) -> [f32; 4] {
    match format {
        TextureFormat::R8Unorm => [unorm8(t[0]), 0.0, 0.0, 1.0],
        TextureFormat::Rg8Unorm => [unorm8(t[0]), unorm8(t[1]), 0.0, 1.0],
        TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => {
            [unorm8(t[0]), unorm8(t[1]), unorm8(t[2]), unorm8(t[3])]
        }
        TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => {
            [unorm8(t[2]), unorm8(t[1]), unorm8(t[0]), unorm8(t[3])]
        }
        TextureFormat::Rgb10a2Unorm => {
            let packed = u32::from_le_bytes([t[0], t[1], t[2], t[3]]);
            [
                (packed & 0x3ff) as f32 / 1023.0,
                ((packed >> 10) & 0x3ff) as f32 / 1023.0,
                ((packed >> 20) & 0x3ff) as f32 / 1023.0,
                (packed >> 30) as f32 / 3.0,
            ]
        }
        TextureFormat::R16Float => [f16_at(t, 0), 0.0, 0.0, 1.0],
        TextureFormat::Rg16Float => [f16_at(t, 0), f16_at(t, 1), 0.0, 1.0],
        TextureFormat::Rgba16Float => [f16_at(t, 0), f16_at(t, 1), f16_at(t, 2), f16_at(t, 3)],
        TextureFormat::R32Float => [f32_at(t, 0), 0.0, 0.0, 1.0],
        TextureFormat::Rg32Float => [f32_at(t, 0), f32_at(t, 1), 0.0, 1.0],
        TextureFormat::Rgba32Float => [f32_at(t, 0), f32_at(t, 1), f32_at(t, 2), f32_at(t, 3)],
        other => panic!("unsupported texture format {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use wgpu::TextureFormat;

    use super::{bytes_per_texel, decode_texels, is_supported, name, parse, SUPPORTED_FORMATS};

    #[test]
    fn depth_and_compressed_formats_are_rejected() {
        assert!(!is_supported(TextureFormat::Depth32Float));
        assert!(!is_supported(TextureFormat::Bc1RgbaUnorm));
        assert!(!is_supported(TextureFormat::Rgba8Snorm));
        assert!(is_supported(TextureFormat::Rgba16Float));
    }

    #[test]
    fn every_supported_format_has_a_name_and_texel_size() {
        for &format in SUPPORTED_FORMATS {
            assert_eq!(parse(name(format)), Some(format));
            assert!(bytes_per_texel(format) > 0);
        }
    }

    #[test]
    fn parse_accepts_loose_spellings() {
        assert_eq!(parse("RGBA8_UNORM_SRGB"), Some(TextureFormat::Rgba8UnormSrgb));
        assert_eq!(parse(" rgba32float "), Some(TextureFormat::Rgba32Float));
        assert_eq!(parse("rgba8unormsrgb"), Some(TextureFormat::Rgba8UnormSrgb));
        assert_eq!(parse("bc7"), None);
    }

    #[test]
    fn bgra_decodes_into_rgba_order() {
        let texels = decode_texels(TextureFormat::Bgra8Unorm, &[0, 51, 255, 255]);
        assert_eq!(texels, vec![[1.0, 0.2, 0.0, 1.0]]);
    }

    #[test]
    fn half_float_decodes() {
        let one = half::f16::from_f32(1.0).to_le_bytes();
        let half = half::f16::from_f32(0.5).to_le_bytes();
        let texels = decode_texels(TextureFormat::Rg16Float, &[one[0], one[1], half[0], half[1]]);
        assert_eq!(texels, vec![[1.0, 0.5, 0.0, 1.0]]);
    }
}
