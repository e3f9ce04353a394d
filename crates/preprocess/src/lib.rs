pub mod config;
pub mod cpu;

use ndarray::{Array, IxDyn};

pub use config::{DEFAULT_INPUT_SIZE, LETTERBOX_COLOR};
pub use cpu::CpuPreProcessor;

/// Result of preprocessing including the parameters needed to map
/// model-space coordinates back onto the source image.
#[derive(Debug)]
pub struct PreprocessResult {
    /// NCHW tensor, RGB, scaled to `[0, 1]`
    pub tensor: Array<f32, IxDyn>,
    /// Scale factor applied during letterboxing
    pub scale: f32,
    /// X offset from letterboxing (in pixels)
    pub offset_x: f32,
    /// Y offset from letterboxing (in pixels)
    pub offset_y: f32,
}
