//! Backend abstraction
//!
//! The compute backend is chosen at compile time through Cargo features:
//! `cuda` and `wgpu` select an accelerator, otherwise the NdArray CPU
//! backend is used. Inference never runs on an `Autodiff` backend, so no
//! gradient graph is recorded and dropout layers are the identity.

// --------------------------------------------------------------------------------
// BACKEND SELECTION: CUDA > WGPU > CPU
// --------------------------------------------------------------------------------

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn::backend::Cuda;

#[cfg(all(feature = "wgpu", not(feature = "cuda")))]
pub type DefaultBackend = burn::backend::Wgpu;

#[cfg(not(any(feature = "cuda", feature = "wgpu")))]
pub type DefaultBackend = burn::backend::NdArray;

/// Device type of the default backend
pub type DefaultDevice = <DefaultBackend as burn::tensor::backend::Backend>::Device;

/// Get the best available device for the compiled backend
///
/// For `wgpu` this is the default adapter picked by the driver (discrete GPU
/// first), for `cuda` the first GPU.
pub fn default_device() -> DefaultDevice {
    DefaultDevice::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }
    #[cfg(all(feature = "wgpu", not(feature = "cuda")))]
    {
        "WGPU (GPU)"
    }
    #[cfg(not(any(feature = "cuda", feature = "wgpu")))]
    {
        "NdArray (CPU)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name_not_empty() {
        assert!(!backend_name().is_empty());
    }
}
