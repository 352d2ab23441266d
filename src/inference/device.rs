use candle_core::Device;
use tracing::{debug, warn};

#[cfg(any(feature = "metal", feature = "cuda"))]
use tracing::info;

use super::error::InferenceError;

/// Picks the first accelerator that opens, in `metal`, `cuda` order, else the CPU.
///
/// GPU backends are only attempted when compiled in through the matching feature.
pub fn select_device() -> Result<Device, InferenceError> {
    #[allow(unused_mut)]
    let mut failures: Vec<String> = Vec::new();

    #[cfg(feature = "metal")]
    match Device::new_metal(0) {
        Ok(device) => {
            info!("Running inference on Metal");
            return Ok(device);
        }
        Err(e) => failures.push(format!("metal: {e}")),
    }

    #[cfg(feature = "cuda")]
    match Device::new_cuda(0) {
        Ok(device) => {
            info!("Running inference on CUDA");
            return Ok(device);
        }
        Err(e) => failures.push(format!("cuda: {e}")),
    }

    if failures.is_empty() {
        debug!("No GPU backend compiled, using CPU");
    } else {
        warn!(reason = %failures.join("; "), "Accelerator unavailable, using CPU");
    }

    Ok(Device::Cpu)
}
