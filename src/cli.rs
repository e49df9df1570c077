use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use texconv::gpu::format;
use wgpu::TextureFormat;

#[derive(Parser, Debug)]
#[command(
    name = "texconv",
    author,
    version,
    about = "GPU texture format conversion and thumbnails"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert an image into another texture format, optionally cropped and aligned.
    Convert(ConvertArgs),
    /// Render a single thumbnail.
    Thumbnail(ThumbnailArgs),
    /// Fill the thumbnail cache for every image in a directory.
    Thumbnails(BatchArgs),
    /// Print the selected GPU adapter.
    Info {
        /// Emit the status as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show the config file location and effective settings.
    Config {
        /// Write the current settings to the config file.
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Destination format (e.g. `rgba8unorm`, `rgba16float`).
    #[arg(long, value_name = "FORMAT", value_parser = parse_format)]
    pub format: Option<TextureFormat>,

    /// Mip level to export, -1 for the whole chain.
    #[arg(long, value_name = "LEVEL", default_value_t = -1, allow_negative_numbers = true)]
    pub mip: i64,

    /// Layer to export, -1 for all layers.
    #[arg(long, value_name = "LAYER", default_value_t = -1, allow_negative_numbers = true)]
    pub layer: i64,

    /// Factor applied to every channel.
    #[arg(long, value_name = "FACTOR", default_value_t = 1.0)]
    pub multiplier: f32,

    /// Source region as `X,Y,WIDTH,HEIGHT`.
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_crop)]
    pub crop: Option<[u32; 4]>,

    /// Round the output size down to multiples of `WIDTH,HEIGHT` (0 = free).
    #[arg(long, value_name = "W,H", value_parser = parse_align)]
    pub align: Option<[u32; 2]>,
}

#[derive(Args, Debug)]
pub struct ThumbnailArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Longest edge of the thumbnail in pixels.
    #[arg(long, value_name = "PIXELS")]
    pub size: Option<u32>,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Longest edge of each thumbnail in pixels.
    #[arg(long, value_name = "PIXELS")]
    pub size: Option<u32>,

    /// Where thumbnails are written; defaults to the configured cache dir.
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

pub fn parse_format(value: &str) -> Result<TextureFormat, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("format must not be empty".to_string());
    }
    format::parse(trimmed).ok_or_else(|| {
        let known: Vec<&str> = format::SUPPORTED_FORMATS
            .iter()
            .map(|f| format::name(*f))
            .collect();
        format!("unknown format '{trimmed}'; expected one of {}", known.join(", "))
    })
}

fn parse_list<const N: usize>(value: &str, what: &str) -> Result<[u32; N], String> {
    let parts: Vec<&str> = value.split([',', 'x']).map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("{what} expects {N} comma-separated values, got '{value}'"));
    }
    let mut out = [0_u32; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("invalid {what} component '{part}'"))?;
    }
    Ok(out)
}

pub fn parse_crop(value: &str) -> Result<[u32; 4], String> {
    let crop = parse_list::<4>(value, "crop")?;
    if crop[2] == 0 || crop[3] == 0 {
        return Err("crop width and height must be positive".to_string());
    }
    Ok(crop)
}

pub fn parse_align(value: &str) -> Result<[u32; 2], String> {
    parse_list::<2>(value, "align")
}
