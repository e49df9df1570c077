use crate::gpu::size::Axis;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested alignment is larger than the (cropped) extent of an axis.
    #[error("image needs to be aligned to {required} but the {axis} is only {available}")]
    Alignment {
        axis: Axis,
        required: u32,
        available: u32,
    },
    #[error("no compatible GPU adapter found")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    #[error("GPU adapter {name} rejected: {reason}")]
    AdapterRejected { name: String, reason: &'static str },
    #[error("failed to open GPU device")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    /// Image larger than the device allows for a 2D texture.
    #[error("{width}x{height} image exceeds the device texture limit of {max}")]
    TooLarge { width: u32, height: u32, max: u32 },
    #[error("texture readback failed")]
    Readback(#[from] wgpu::BufferAsyncError),
    #[error("waiting for the GPU failed")]
    Poll(#[from] wgpu::PollError),
    #[error("texture readback was interrupted")]
    ReadbackInterrupted,
    #[error("{0}")]
    UnsupportedImage(String),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
