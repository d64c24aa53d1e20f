//! GPU buffer allocation and readback
//!
//! All simulation state lives in these buffers once baked; the CPU only
//! rewrites uniforms and reads snapshots back through the shared staging
//! buffer. Zero-length data still gets a small placeholder buffer because
//! bindings may not be empty.

use wgpu::util::DeviceExt;

use crate::error::{VerletError, VerletResult};
use crate::types::{GpuSpring, InfluenceRange, SimUniforms};

pub(crate) struct SimBuffers {
    pub positions: wgpu::Buffer,
    pub springs: wgpu::Buffer,
    pub rest_length_factors: wgpu::Buffer,
    pub forces: wgpu::Buffer,
    pub spring_forces: wgpu::Buffer,
    pub influence_ranges: wgpu::Buffer,
    pub influence_entries: wgpu::Buffer,
    pub uniforms: wgpu::Buffer,
    staging: wgpu::Buffer,
}

pub(crate) fn storage_layout_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn uniform_layout_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_buffer(
    device: &wgpu::Device,
    label: &str,
    contents: &[u8],
    usage: wgpu::BufferUsages,
) -> wgpu::Buffer {
    if contents.is_empty() {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: 16,
            usage,
            mapped_at_creation: false,
        })
    } else {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage,
        })
    }
}

impl SimBuffers {
    pub(crate) fn new(
        device: &wgpu::Device,
        positions: &[[f32; 4]],
        springs: &[GpuSpring],
        rest_length_factors: &[f32],
        influence_ranges: &[InfluenceRange],
        influence_entries: &[i32],
        uniforms: &SimUniforms,
    ) -> Self {
        let position_buffer = storage_buffer(
            device,
            "Position Buffer",
            bytemuck::cast_slice(positions),
            // VERTEX lets a host renderer draw straight from simulated state
            wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::VERTEX,
        );

        let spring_buffer = storage_buffer(
            device,
            "Spring Buffer",
            bytemuck::cast_slice(springs),
            wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        );

        let factor_buffer = storage_buffer(
            device,
            "Rest Length Factor Buffer",
            bytemuck::cast_slice(rest_length_factors),
            wgpu::BufferUsages::STORAGE,
        );

        // The persistent force buffer starts at rest; it doubles as velocity.
        let zero_forces = vec![[0.0f32; 4]; positions.len()];
        let force_buffer = storage_buffer(
            device,
            "Force Buffer",
            bytemuck::cast_slice(&zero_forces),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        );

        let zero_spring_forces = vec![[0.0f32; 4]; springs.len()];
        let spring_force_buffer = storage_buffer(
            device,
            "Spring Force Buffer",
            bytemuck::cast_slice(&zero_spring_forces),
            wgpu::BufferUsages::STORAGE,
        );

        let range_buffer = storage_buffer(
            device,
            "Influence Range Buffer",
            bytemuck::cast_slice(influence_ranges),
            wgpu::BufferUsages::STORAGE,
        );

        let entry_buffer = storage_buffer(
            device,
            "Influence Entry Buffer",
            bytemuck::cast_slice(influence_entries),
            wgpu::BufferUsages::STORAGE,
        );

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Simulation Uniform Buffer"),
            contents: bytemuck::bytes_of(uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        // One staging buffer sized for the largest snapshot we ever copy out.
        let staging_size = position_buffer
            .size()
            .max(spring_buffer.size())
            .max(force_buffer.size());
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Simulation Staging Buffer"),
            size: staging_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            positions: position_buffer,
            springs: spring_buffer,
            rest_length_factors: factor_buffer,
            forces: force_buffer,
            spring_forces: spring_force_buffer,
            influence_ranges: range_buffer,
            influence_entries: entry_buffer,
            uniforms: uniform_buffer,
            staging,
        }
    }

    pub(crate) fn write_uniforms(&self, queue: &wgpu::Queue, uniforms: &SimUniforms) {
        queue.write_buffer(&self.uniforms, 0, bytemuck::bytes_of(uniforms));
    }

    /// Copy `count` elements of `source` through the staging buffer and
    /// block until they are mapped
    pub(crate) fn read_vec<T: bytemuck::Pod>(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        source: &wgpu::Buffer,
        count: usize,
    ) -> VerletResult<Vec<T>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let size = (count * std::mem::size_of::<T>()) as u64;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(source, 0, &self.staging, 0, size);
        queue.submit(Some(encoder.finish()));

        let slice = self.staging.slice(..size);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = device.poll(wgpu::Maintain::Wait);
        rx.recv().map_err(|_| VerletError::ReadbackChannel)??;

        let data = slice.get_mapped_range();
        let out = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        self.staging.unmap();

        Ok(out)
    }
}
