//! Preloads libtorch's CUDA kernels so `Device::cuda_if_available` can see them.
//!
//! The tch crate links only `libtorch_cpu`; without the CUDA libraries being
//! opened with `RTLD_GLOBAL` first, inference silently stays on the CPU.

use std::sync::OnceLock;

use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_NOW};
use tracing::{debug, info};

const TORCH_CUDA_LIBRARIES: [&str; 3] = [
    "libtorch_cuda.so",
    "libtorch_cuda_cu.so",
    "libtorch_cuda_cpp.so",
];

static LOADED: OnceLock<Vec<Library>> = OnceLock::new();

/// Open whichever CUDA libraries are present and keep them for the process
/// lifetime. Returns how many were loaded.
pub fn load_torch_cuda_runtime() -> usize {
    LOADED
        .get_or_init(|| {
            let mut handles = Vec::new();
            for lib in TORCH_CUDA_LIBRARIES {
                // SAFETY: these are libtorch's own shared objects; their
                // initialisers only register CUDA kernels with the dispatcher.
                match unsafe { Library::open(Some(lib), RTLD_NOW | RTLD_GLOBAL) } {
                    Ok(handle) => {
                        debug!("loaded {lib}");
                        handles.push(handle);
                    }
                    Err(err) => debug!("could not load {lib}: {err}"),
                }
            }
            if handles.is_empty() {
                info!("libtorch CUDA runtime not found; hand tracking will run on the CPU");
            }
            handles
        })
        .len()
}
