//! GPU device acquisition and sharing

use std::sync::Arc;

use crate::error::{VerletError, VerletResult};

/// Handle to a GPU device and its queue.
///
/// Cloning is cheap; clones share the underlying device. A context can be
/// created standalone with [`GpuContext::new`] or wrapped around a device
/// owned by a host renderer with [`GpuContext::from_shared`], which lets the
/// host sample simulated positions without a round trip through the CPU.
#[derive(Clone)]
pub struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    /// Acquire a compute-capable adapter and create a device on it.
    ///
    /// Blocks on the underlying async request. Returns
    /// [`VerletError::NoAdapter`] when the host exposes no usable GPU, so
    /// callers can skip GPU work instead of panicking.
    pub fn new() -> VerletResult<Self> {
        pollster::block_on(Self::new_async())
    }

    /// Async variant of [`GpuContext::new`] for callers already on an
    /// async runtime
    pub async fn new_async() -> VerletResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(VerletError::NoAdapter)?;

        tracing::debug!(adapter = %adapter.get_info().name, "acquired gpu adapter");

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Verlet Simulation Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None, // trace path
            )
            .await?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Wrap an existing device and queue, typically the ones a renderer
    /// already created
    pub fn from_shared(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext").finish_non_exhaustive()
    }
}
