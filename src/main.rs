mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use rayon::prelude::*;
use texconv::config::ToolConfig;
use texconv::gpu::{ConvertFormatPass, ConvertRequest, GpuContext, RuntimeStatus, Selection, Size3, Texture, ThumbnailPass, format};
use texconv::image_io;
use wgpu::TextureFormat;

use cli::{BatchArgs, Cli, Command, ConvertArgs, ThumbnailArgs};

fn report_adapter(status: &RuntimeStatus) {
    let adapter_desc = match (
        status.adapter_name.as_deref(),
        status.adapter_backend.as_deref(),
    ) {
        (Some(name), Some(api)) => format!("{} ({})", name, api),
        (Some(name), None) => name.to_string(),
        _ => "n/a".to_string(),
    };
    eprintln!("texconv: gpu = {}", adapter_desc);
}

fn print_status(status: &RuntimeStatus, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }
    println!("available: {}", status.available);
    println!("adapter: {}", status.adapter_name.as_deref().unwrap_or("n/a"));
    println!("backend: {}", status.adapter_backend.as_deref().unwrap_or("n/a"));
    println!("driver: {}", status.adapter_driver.as_deref().unwrap_or("n/a"));
    println!("device type: {}", status.adapter_device_type.as_deref().unwrap_or("n/a"));
    println!("float32 filterable: {}", status.float32_filterable);
    println!("formats: {}", status.formats.join(", "));
    Ok(())
}

fn show_config(config: &ToolConfig, init: bool) {
    let path = ToolConfig::config_path();
    match path.as_deref() {
        Some(path) => println!("config: {}", path.display()),
        None => println!("config: n/a"),
    }
    println!("thumbnail size: {}", config.thumbnail_size());
    println!("thumbnail cache: {}", config.thumbnail_cache_dir().display());
    println!("default format: {}", format::name(config.default_format()));
    let options = config.context_options();
    println!("power preference: {:?}", options.power_preference);
    println!("allow software adapter: {}", options.allow_software_adapter);
    if init {
        config.save();
        eprintln!("texconv: saved settings");
    }
}

/// Rejects crop rectangles that reach outside the decoded image.
fn check_crop(crop: [u32; 4], width: u32, height: u32) -> Result<()> {
    let [x, y, w, h] = crop;
    if x.checked_add(w).is_none_or(|right| right > width)
        || y.checked_add(h).is_none_or(|bottom| bottom > height)
    {
        bail!("crop {x},{y},{w},{h} exceeds the {width}x{height} image");
    }
    Ok(())
}

fn output_format(args: &ConvertArgs, config: &ToolConfig) -> TextureFormat {
    args.format.unwrap_or_else(|| {
        if image_io::is_float_image(&args.output) {
            TextureFormat::Rgba32Float
        } else {
            config.default_format()
        }
    })
}

fn run_convert(ctx: &GpuContext, config: &ToolConfig, args: ConvertArgs) -> Result<()> {
    let img = image_io::open_image(&args.input)
        .with_context(|| format!("failed to decode {}", args.input.display()))?;
    let size = Size3::flat(img.width(), img.height());

    let mip = Selection::from_signed(args.mip);
    if let Selection::Index(level) = mip
        && level >= size.max_mip_levels()
    {
        bail!("mip {level} does not exist; {size} has {} levels", size.max_mip_levels());
    }
    let layer = Selection::from_signed(args.layer);
    if let Selection::Index(index) = layer
        && index > 0
    {
        bail!("layer {index} does not exist; decoded images have a single layer");
    }

    let format = output_format(&args, config);
    let mut request = ConvertRequest::new(format)
        .with_mip(mip)
        .with_layer(layer)
        .with_multiplier(args.multiplier);
    if let Some(crop) = args.crop {
        let source_size = match mip {
            Selection::Index(level) => size.mip(level),
            Selection::All => size,
        };
        check_crop(crop, source_size.width, source_size.height)?;
        let [x, y, w, h] = crop;
        request = request.with_crop(Size3::new(x, y, 0), Size3::flat(w, h));
    }
    if let Some([w, h]) = args.align {
        request = request.with_align(Size3::new(w, h, 0));
    }

    let auto_mip = matches!(mip, Selection::Index(level) if level > 0);
    let source = Texture::from_image(ctx, &img, image_io::upload_format(&img), auto_mip)?;
    let mut pass = ConvertFormatPass::new(ctx);
    let converted = pass
        .convert(ctx, &source, &request)
        .context("conversion failed")?;

    let out = converted.to_image(ctx, 0, 0)?;
    image_io::save(&out, &args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    eprintln!(
        "texconv: wrote {} ({}, {})",
        args.output.display(),
        format::name(format),
        converted.size()
    );
    Ok(())
}

fn run_thumbnail(ctx: &GpuContext, config: &ToolConfig, args: ThumbnailArgs) -> Result<()> {
    let size = args.size.unwrap_or_else(|| config.thumbnail_size());
    let img = image_io::open_image(&args.input)
        .with_context(|| format!("failed to decode {}", args.input.display()))?;
    let mut pass = ThumbnailPass::new(ctx);
    image_io::generate(ctx, &mut pass, &img, &args.output, size)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    eprintln!("texconv: wrote {}", args.output.display());
    Ok(())
}

fn missing_thumbnails(dir: &Path, cache_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read_dir failed for {}", dir.display()))?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && image_io::is_supported_image(p))
        .filter(|p| !image_io::cache_path(p, cache_dir).exists())
        .collect();
    files.sort();
    Ok(files)
}

fn run_batch(ctx: &GpuContext, config: &ToolConfig, args: BatchArgs) -> Result<()> {
    let size = args.size.unwrap_or_else(|| config.thumbnail_size());
    let cache_dir = args
        .cache_dir
        .unwrap_or_else(|| config.thumbnail_cache_dir());
    let files = missing_thumbnails(&args.dir, &cache_dir)?;
    tracing::debug!(count = files.len(), cache = %cache_dir.display(), "generating thumbnails");

    // Decode in parallel, render on the GPU sequentially.
    let mut pass = ThumbnailPass::new(ctx);
    let (mut written, mut failed) = (0_usize, 0_usize);
    let chunk = rayon::current_num_threads().max(1) * 2;
    for batch in files.chunks(chunk) {
        let decoded: Vec<_> = batch
            .par_iter()
            .map(|path| (path, image_io::open_image(path)))
            .collect();
        for (path, img) in decoded {
            let dest = image_io::cache_path(path, &cache_dir);
            let result = img.and_then(|img| image_io::generate(ctx, &mut pass, &img, &dest, size));
            match result {
                Ok(()) => written += 1,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "thumbnail failed");
                    failed += 1;
                }
            }
        }
    }

    eprintln!(
        "texconv: {} thumbnails written to {}, {} failed",
        written,
        cache_dir.display(),
        failed
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = ToolConfig::load();
    if let Command::Config { init } = cli.command {
        show_config(&config, init);
        return ExitCode::SUCCESS;
    }

    let ctx = match GpuContext::new(&config.context_options()) {
        Ok(ctx) => ctx,
        Err(err) => {
            if let Command::Info { json } = cli.command {
                let _ = print_status(&RuntimeStatus::default(), json);
            }
            eprintln!("texconv: no compatible GPU adapter: {err}");
            return ExitCode::from(2);
        }
    };
    let status = ctx.status();
    report_adapter(&status);

    let result = match cli.command {
        Command::Convert(args) => run_convert(&ctx, &config, args),
        Command::Thumbnail(args) => run_thumbnail(&ctx, &config, args),
        Command::Thumbnails(args) => run_batch(&ctx, &config, args),
        Command::Info { json } => print_status(&status, json),
        Command::Config { .. } => Ok(()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("texconv: {err:#}");
            ExitCode::FAILURE
        }
    }
}
