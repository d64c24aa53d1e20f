//! Kinematic bridge between procedural surfaces and the shared buffer
//!
//! Instances register a transform and a phase; anchored vertices register
//! surface parameters against an instance. At bake the queue is sorted
//! fixed-first and grouped by instance, parallel queue arrays are uploaded,
//! and one kernel places every anchor. After bake only the fixed prefix is
//! re-placed each substep (non-fixed entries are handed off to the spring
//! simulation once their initial position is written), optionally narrowed
//! to dirty instances' sub-ranges.

use wgpu::util::DeviceExt;

use crate::buffers::{storage_layout_entry, uniform_layout_entry};
use crate::error::{VerletError, VerletResult};
use crate::shaders::{self, SurfaceFunction};
use crate::topology::VertexId;
use crate::types::{AnchorUniforms, GpuInstance, InfluenceRange, WORKGROUP_SIZE};

/// Handle to a registered instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub(crate) u32);

impl InstanceId {
    /// Dense index of this instance
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One queued `register_vertex` call, applied at bake
#[derive(Debug, Clone)]
struct AnchorSeed {
    vertex: u32,
    instance: u32,
    param_a: f32,
    param_b: f32,
    secondary_surface: bool,
    offset: [f32; 3],
    directional_offset: f32,
    fixed: bool,
}

/// GPU state created at bake
struct BakedBridge {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    instance_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    queue_len: u32,
    fixed_len: u32,
    /// Fixed sub-range of the sorted queue per instance, for dirty updates
    instance_ranges: Vec<InfluenceRange>,
}

/// Drives anchored vertices from a procedural surface, batched across all
/// instances in one dispatch.
///
/// The bridge owns no positions of its own; it writes straight into the
/// simulation's position buffer, which is why baking happens through the
/// simulation rather than standalone.
pub struct KinematicBridge {
    surface: Option<SurfaceFunction>,
    instances: Vec<GpuInstance>,
    queue: Vec<AnchorSeed>,
    dirty: Vec<bool>,
    dirty_tracking: bool,
    is_baked: bool,
    first_update_done: bool,
    gpu: Option<BakedBridge>,
}

impl KinematicBridge {
    pub(crate) fn new() -> Self {
        Self {
            surface: None,
            instances: Vec::new(),
            queue: Vec::new(),
            dirty: Vec::new(),
            dirty_tracking: false,
            is_baked: false,
            first_update_done: false,
            gpu: None,
        }
    }

    /// Supply the surface function anchors are evaluated against. Required
    /// before bake when any vertex is registered.
    pub fn set_surface(&mut self, surface: SurfaceFunction) -> VerletResult<()> {
        self.sealed_check("set_surface")?;
        self.surface = Some(surface);
        Ok(())
    }

    /// Register an independently transformed instance. The transform is
    /// column-major.
    pub fn register_instance(
        &mut self,
        transform: [[f32; 4]; 4],
        phase: f32,
    ) -> VerletResult<InstanceId> {
        self.sealed_check("register_instance")?;
        let id = InstanceId(self.instances.len() as u32);
        self.instances.push(GpuInstance::new(transform, phase));
        self.dirty.push(false);
        Ok(id)
    }

    /// Queue a vertex to be placed on `instance`'s surface at
    /// `(param_a, param_b)`.
    ///
    /// A nonzero `directional_offset` displaces the anchor along the
    /// estimated surface normal instead of by `offset`. Fixed entries are
    /// re-placed every substep; non-fixed entries are placed once and then
    /// handed off to the spring simulation.
    #[allow(clippy::too_many_arguments)]
    pub fn register_vertex(
        &mut self,
        instance: InstanceId,
        vertex: VertexId,
        param_a: f32,
        param_b: f32,
        secondary_surface: bool,
        offset: [f32; 3],
        directional_offset: f32,
        fixed: bool,
    ) -> VerletResult<()> {
        self.sealed_check("register_vertex")?;
        if instance.index() >= self.instances.len() {
            return Err(VerletError::UnknownInstance(instance.0));
        }
        self.queue.push(AnchorSeed {
            vertex: vertex.index(),
            instance: instance.0,
            param_a,
            param_b,
            secondary_surface,
            offset,
            directional_offset,
            fixed,
        });
        Ok(())
    }

    /// Replace an instance's transform. Allowed before and after bake;
    /// after bake the instance is marked dirty.
    pub fn set_instance_transform(
        &mut self,
        id: InstanceId,
        transform: [[f32; 4]; 4],
    ) -> VerletResult<()> {
        let instance = self
            .instances
            .get_mut(id.index())
            .ok_or(VerletError::UnknownInstance(id.0))?;
        instance.transform = transform;
        if self.is_baked {
            self.dirty[id.index()] = true;
        }
        Ok(())
    }

    /// Replace an instance's phase. Allowed before and after bake; after
    /// bake the instance is marked dirty.
    pub fn set_instance_phase(&mut self, id: InstanceId, phase: f32) -> VerletResult<()> {
        let instance = self
            .instances
            .get_mut(id.index())
            .ok_or(VerletError::UnknownInstance(id.0))?;
        instance.phase = phase;
        if self.is_baked {
            self.dirty[id.index()] = true;
        }
        Ok(())
    }

    /// Force an instance's fixed anchors to be re-placed on the next
    /// substep even with dirty tracking enabled
    pub fn mark_instance_dirty(&mut self, id: InstanceId) -> VerletResult<()> {
        if id.index() >= self.instances.len() {
            return Err(VerletError::UnknownInstance(id.0));
        }
        self.dirty[id.index()] = true;
        Ok(())
    }

    /// When enabled, per-substep anchor passes cover only instances whose
    /// transform or phase changed since the last pass. Off by default:
    /// every fixed anchor is re-placed every substep.
    pub fn set_dirty_tracking(&mut self, enabled: bool) {
        self.dirty_tracking = enabled;
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn anchor_count(&self) -> usize {
        self.queue.len()
    }

    pub fn is_baked(&self) -> bool {
        self.is_baked
    }

    fn sealed_check(&self, operation: &'static str) -> VerletResult<()> {
        if self.is_baked {
            tracing::error!(operation, "kinematic bridge mutated after bake");
            return Err(VerletError::Sealed(operation));
        }
        Ok(())
    }

    /// CPU-side validation run before any GPU allocation
    fn validate_for_bake(&self, vertex_count: u32) -> VerletResult<()> {
        if !self.queue.is_empty() && self.surface.is_none() {
            return Err(VerletError::MissingSurface);
        }
        for seed in &self.queue {
            if seed.vertex >= vertex_count {
                return Err(VerletError::UnknownVertex(seed.vertex));
            }
        }
        Ok(())
    }

    /// Sort the queue fixed-first, grouped by instance, and record each
    /// instance's fixed sub-range. Stable, so registration order survives
    /// within a group.
    fn order_queue(
        queue: &mut [AnchorSeed],
        instance_count: usize,
    ) -> (u32, Vec<InfluenceRange>) {
        queue.sort_by_key(|seed| (!seed.fixed, seed.instance));
        let fixed_len = queue.iter().take_while(|seed| seed.fixed).count() as u32;

        let mut ranges = vec![InfluenceRange { start: 0, count: 0 }; instance_count];
        for (position, seed) in queue.iter().take(fixed_len as usize).enumerate() {
            let range = &mut ranges[seed.instance as usize];
            if range.count == 0 {
                range.start = position as u32;
            }
            range.count += 1;
        }
        (fixed_len, ranges)
    }

    /// Finalize queue arrays, compile the anchor kernel against the
    /// simulation's position buffer and place every queued anchor once.
    pub(crate) fn bake(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        positions: &wgpu::Buffer,
        vertex_count: u32,
    ) -> VerletResult<()> {
        self.validate_for_bake(vertex_count)?;

        if self.queue.is_empty() {
            tracing::debug!("kinematic bridge baked with no anchors");
            self.is_baked = true;
            return Ok(());
        }

        let (fixed_len, instance_ranges) =
            Self::order_queue(&mut self.queue, self.instances.len());
        let queue_len = self.queue.len() as u32;
        tracing::debug!(
            anchors = queue_len,
            fixed = fixed_len,
            instances = self.instances.len(),
            "baking kinematic bridge"
        );

        let vertices: Vec<u32> = self.queue.iter().map(|s| s.vertex).collect();
        let instance_ids: Vec<u32> = self.queue.iter().map(|s| s.instance).collect();
        let params: Vec<[f32; 2]> = self.queue.iter().map(|s| [s.param_a, s.param_b]).collect();
        let surfaces: Vec<u32> = self
            .queue
            .iter()
            .map(|s| u32::from(s.secondary_surface))
            .collect();
        let offsets: Vec<[f32; 4]> = self
            .queue
            .iter()
            .map(|s| [s.offset[0], s.offset[1], s.offset[2], s.directional_offset])
            .collect();

        let read_only = wgpu::BufferUsages::STORAGE;
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Anchor Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: read_only,
        });
        let instance_id_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Anchor Instance Id Buffer"),
            contents: bytemuck::cast_slice(&instance_ids),
            usage: read_only,
        });
        let param_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Anchor Param Buffer"),
            contents: bytemuck::cast_slice(&params),
            usage: read_only,
        });
        let surface_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Anchor Surface Flag Buffer"),
            contents: bytemuck::cast_slice(&surfaces),
            usage: read_only,
        });
        let offset_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Anchor Offset Buffer"),
            contents: bytemuck::cast_slice(&offsets),
            usage: read_only,
        });
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Instance Buffer"),
            contents: bytemuck::cast_slice(&self.instances),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        let uniforms = AnchorUniforms::window(0, queue_len);
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Anchor Uniform Buffer"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        // Bindings 1-6 are never written by the kernel.
        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Anchor Bind Group Layout"),
                entries: &[
                    storage_layout_entry(0, false),
                    storage_layout_entry(1, true),
                    storage_layout_entry(2, true),
                    storage_layout_entry(3, true),
                    storage_layout_entry(4, true),
                    storage_layout_entry(5, true),
                    storage_layout_entry(6, true),
                    uniform_layout_entry(7),
                ],
            });

        let surface = self.surface.as_ref().ok_or(VerletError::MissingSurface)?;
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Anchor Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::anchor_shader(surface).into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Anchor Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Anchor Pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("place_anchors"),
            compilation_options: Default::default(),
            cache: None,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Anchor Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: positions.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: vertex_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: instance_id_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: param_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: surface_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: offset_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: instance_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let baked = BakedBridge {
            pipeline,
            bind_group,
            instance_buffer,
            uniform_buffer,
            queue_len,
            fixed_len,
            instance_ranges,
        };

        // Initial full-queue placement, so every anchor is valid pre-render.
        Self::dispatch_window(device, queue, &baked, 0, queue_len);

        self.gpu = Some(baked);
        self.is_baked = true;
        Ok(())
    }

    fn dispatch_window(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        baked: &BakedBridge,
        base: u32,
        count: u32,
    ) {
        if count == 0 {
            return;
        }
        let window = AnchorUniforms::window(base, count);
        queue.write_buffer(&baked.uniform_buffer, 0, bytemuck::bytes_of(&window));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Anchor Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Anchor Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&baked.pipeline);
            pass.set_bind_group(0, &baked.bind_group, &[]);
            pass.dispatch_workgroups(count.div_ceil(WORKGROUP_SIZE).max(1), 1, 1);
        }
        queue.submit(Some(encoder.finish()));
    }

    /// Re-place anchors for the coming substep. The first post-bake pass
    /// covers the whole queue; later passes cover the fixed prefix, or just
    /// dirty instances' fixed sub-ranges when tracking is enabled.
    pub(crate) fn run_update_pass(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let Some(baked) = &self.gpu else {
            self.first_update_done = true;
            return;
        };

        queue.write_buffer(
            &baked.instance_buffer,
            0,
            bytemuck::cast_slice(&self.instances),
        );

        if !self.first_update_done {
            Self::dispatch_window(device, queue, baked, 0, baked.queue_len);
        } else if self.dirty_tracking {
            for (index, flagged) in self.dirty.iter().enumerate() {
                if *flagged {
                    let range = baked.instance_ranges[index];
                    Self::dispatch_window(device, queue, baked, range.start, range.count);
                }
            }
        } else {
            Self::dispatch_window(device, queue, baked, 0, baked.fixed_len);
        }

        self.dirty.fill(false);
        self.first_update_done = true;
    }
}

impl Default for KinematicBridge {
    fn default() -> Self {
        Self::new()
    }
}
