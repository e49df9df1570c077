pub mod config;
pub mod error;
pub mod gpu;
pub mod image_io;

pub use error::{Error, Result};
