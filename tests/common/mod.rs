//! Shared helpers for GPU integration tests

use verlet_gpu::GpuContext;

/// Acquire a GPU context, or `None` when the host exposes no usable
/// adapter, in which case the calling test should return early.
pub fn test_context() -> Option<GpuContext> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    match GpuContext::new() {
        Ok(context) => Some(context),
        Err(err) => {
            eprintln!("skipping gpu test: {err}");
            None
        }
    }
}
