use std::sync::{Mutex, OnceLock};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::gpu::bindings::BindingSlots;
use crate::gpu::format;
use crate::gpu::fullscreen::FullscreenTrigger;
use crate::gpu::mipmap::MipGenerator;

pub const POWER_PREFERENCE_ENV: &str = "TEXCONV_POWER_PREFERENCE";
pub const ALLOW_SOFTWARE_ENV: &str = "TEXCONV_ALLOW_SOFTWARE";

/// Usages every texture created by the passes carries besides copies.
const PASS_USAGES: wgpu::TextureUsages =
    wgpu::TextureUsages::TEXTURE_BINDING.union(wgpu::TextureUsages::RENDER_ATTACHMENT);

#[derive(Clone, Debug)]
/// Adapter selection knobs for [`GpuContext::new`].
pub struct ContextOptions {
    pub power_preference: wgpu::PowerPreference,
    pub allow_software_adapter: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            allow_software_adapter: true,
        }
    }
}

impl ContextOptions {
    /// Defaults overridden by `TEXCONV_POWER_PREFERENCE` and `TEXCONV_ALLOW_SOFTWARE`.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Self {
        let mut options = self;
        if let Some(pref) = std::env::var(POWER_PREFERENCE_ENV)
            .ok()
            .and_then(|raw| parse_power_preference(&raw))
        {
            options.power_preference = pref;
        }
        if let Ok(raw) = std::env::var(ALLOW_SOFTWARE_ENV) {
            options.allow_software_adapter = env_truthy(&raw);
        }
        options
    }
}

pub fn parse_power_preference(raw: &str) -> Option<wgpu::PowerPreference> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "high" | "high_performance" | "discrete" => Some(wgpu::PowerPreference::HighPerformance),
        "low" | "low_power" | "integrated" => Some(wgpu::PowerPreference::LowPower),
        "none" | "any" => Some(wgpu::PowerPreference::None),
        _ => None,
    }
}

pub fn env_truthy(raw: &str) -> bool {
    let norm = raw.trim().to_ascii_lowercase();
    norm == "1" || norm == "true" || norm == "yes" || norm == "on"
}

/// Device, queue and shared state every pass runs against.
///
/// All passes on one context execute on the calling thread and record into a
/// single queue; [`crate::gpu::bindings::BindingScope`] serializes them.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub trigger: FullscreenTrigger,
    pub(crate) mips: MipGenerator,
    pub(crate) bindings: Mutex<BindingSlots>,
    float32_filterable: bool,
    renderable: Vec<wgpu::TextureFormat>,
    adapter_name: String,
    adapter_backend: String,
    adapter_driver: String,
    adapter_device_type: String,
    adapter_vendor_id: u32,
}

#[derive(Clone, Debug, Default, Serialize)]
/// Snapshot of GPU runtime availability and adapter details.
pub struct RuntimeStatus {
    pub available: bool,
    pub adapter_vendor_id: Option<u32>,
    pub adapter_name: Option<String>,
    pub adapter_backend: Option<String>,
    pub adapter_driver: Option<String>,
    pub adapter_device_type: Option<String>,
    pub float32_filterable: bool,
    /// Supported formats the adapter can sample and render into.
    pub formats: Vec<String>,
}

static GPU_CONTEXT: OnceLock<Option<GpuContext>> = OnceLock::new();

/// Process-wide context created from [`ContextOptions::from_env`], if an adapter exists.
pub fn shared() -> Option<&'static GpuContext> {
    GPU_CONTEXT
        .get_or_init(|| match GpuContext::new(&ContextOptions::from_env()) {
            Ok(ctx) => Some(ctx),
            Err(err) => {
                tracing::warn!(%err, "GPU context unavailable");
                None
            }
        })
        .as_ref()
}

/// Refuses adapters the passes cannot run on.
///
/// Downlevel adapters (GL, old D3D) lack array-layer views and render targets
/// for several supported formats, so only WebGPU-compliant ones are accepted.
pub fn check_adapter(
    name: &str,
    device_type: wgpu::DeviceType,
    downlevel: &wgpu::DownlevelCapabilities,
    options: &ContextOptions,
) -> Result<()> {
    let reason = if device_type == wgpu::DeviceType::Cpu && !options.allow_software_adapter {
        "software adapters are disabled; set TEXCONV_ALLOW_SOFTWARE=1 to allow them"
    } else if !downlevel.is_webgpu_compliant() {
        "adapter is not WebGPU compliant"
    } else {
        return Ok(());
    };
    tracing::warn!(name, reason, "GPU adapter rejected");
    Err(Error::AdapterRejected {
        name: name.to_string(),
        reason,
    })
}

impl GpuContext {
    pub fn new(options: &ContextOptions) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: options.power_preference,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))?;
        let adapter_info = adapter.get_info();
        check_adapter(
            &adapter_info.name,
            adapter_info.device_type,
            &adapter.get_downlevel_capabilities(),
            options,
        )?;
        let renderable: Vec<wgpu::TextureFormat> = format::SUPPORTED_FORMATS
            .iter()
            .copied()
            .filter(|f| {
                adapter
                    .get_texture_format_features(*f)
                    .allowed_usages
                    .contains(PASS_USAGES)
            })
            .collect();

        let float32_filterable = adapter
            .features()
            .contains(wgpu::Features::FLOAT32_FILTERABLE);
        let mut required_features = wgpu::Features::empty();
        if float32_filterable {
            required_features |= wgpu::Features::FLOAT32_FILTERABLE;
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("texconv_device"),
            required_features,
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))?;

        tracing::debug!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            float32_filterable,
            "selected GPU adapter"
        );

        let trigger = FullscreenTrigger::new(&device);
        let mips = MipGenerator::new(&device);
        let adapter_driver = if adapter_info.driver.trim().is_empty() {
            "unknown".to_string()
        } else {
            adapter_info.driver
        };

        Ok(Self {
            device,
            queue,
            trigger,
            mips,
            bindings: Mutex::new(BindingSlots::default()),
            float32_filterable,
            renderable,
            adapter_name: adapter_info.name,
            adapter_backend: adapter_info.backend.to_string(),
            adapter_driver,
            adapter_device_type: format!("{:?}", adapter_info.device_type),
            adapter_vendor_id: adapter_info.vendor,
        })
    }

    /// Whether `format` is supported and can be both sampled and rendered
    /// into on this device.
    pub fn is_format_renderable(&self, format: wgpu::TextureFormat) -> bool {
        self.renderable.contains(&format)
    }

    /// Whether `format` is renderable and can also be sampled with filtering.
    pub fn is_format_usable(&self, format: wgpu::TextureFormat) -> bool {
        self.is_format_renderable(format)
            && (!format::needs_float32_filterable(format) || self.float32_filterable)
    }

    /// Copy of the currently held binding slots.
    ///
    /// Blocks while a pass holds a [`crate::gpu::bindings::BindingScope`].
    #[cfg(test)]
    pub(crate) fn binding_slots(&self) -> BindingSlots {
        self.bindings
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            available: true,
            adapter_vendor_id: Some(self.adapter_vendor_id),
            adapter_name: Some(self.adapter_name.clone()),
            adapter_backend: Some(self.adapter_backend.clone()),
            adapter_driver: Some(self.adapter_driver.clone()),
            adapter_device_type: Some(self.adapter_device_type.clone()),
            float32_filterable: self.float32_filterable,
            formats: self
                .renderable
                .iter()
                .map(|f| format::name(*f).to_string())
                .collect(),
        }
    }
}
