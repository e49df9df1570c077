//! wgpu-backed texture resources and the full-screen passes that convert and
//! downsample them.

pub mod bindings;
pub mod context;
pub mod convert;
pub mod format;
pub mod fullscreen;
pub mod mipmap;
pub mod size;
pub mod texture;
pub mod thumbnail;
pub mod upload;

pub use context::{ContextOptions, GpuContext, RuntimeStatus};
pub use convert::{ConvertFormatPass, ConvertRequest, Crop, Selection};
pub use size::{Axis, Size3};
pub use texture::{Texture, TextureShape};
pub use thumbnail::ThumbnailPass;
