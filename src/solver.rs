//! GPU-accelerated Verlet solver
//!
//! This module owns the whole pipeline: topology accumulation, the one-shot
//! bake that freezes buffers and compiles kernels, and the fixed-timestep
//! loop that runs the three physics kernels every substep.

use crate::bridge::KinematicBridge;
use crate::buffers::{SimBuffers, storage_layout_entry, uniform_layout_entry};
use crate::context::GpuContext;
use crate::error::{VerletError, VerletResult};
use crate::object::{BakeContext, PhysicsObject, StepContext};
use crate::shaders::SimShaders;
use crate::timestep::FixedTimestep;
use crate::topology::{SpringId, Topology, VertexId};
use crate::types::{GpuSpring, MIN_SPRING_LENGTH, SimUniforms, SolverConfig, WORKGROUP_SIZE};

/// GPU state frozen at bake
struct SimGpu {
    buffers: SimBuffers,

    spring_force_pipeline: wgpu::ComputePipeline,
    vertex_force_pipeline: wgpu::ComputePipeline,
    integrate_pipeline: wgpu::ComputePipeline,

    bind_group: wgpu::BindGroup,
}

/// A batched mass-spring simulation.
///
/// Topology accumulates on the CPU until [`bake`](Self::bake) freezes it
/// into GPU buffers and compiles the kernels; afterwards
/// [`update`](Self::update) advances the simulation at a fixed substep rate
/// regardless of the caller's frame cadence. Positions stay on the GPU
/// between substeps; hosts either sample [`position_buffer`](Self::position_buffer)
/// directly or read a snapshot back with [`read_positions`](Self::read_positions).
pub struct VerletPhysics {
    context: GpuContext,
    config: SolverConfig,

    topology: Topology,
    objects: Vec<Box<dyn PhysicsObject>>,
    bridge: KinematicBridge,
    timestep: FixedTimestep,

    gpu: Option<SimGpu>,
    is_baked: bool,
}

impl VerletPhysics {
    pub fn new(context: GpuContext) -> Self {
        Self::with_config(context, SolverConfig::default())
    }

    pub fn with_config(context: GpuContext, config: SolverConfig) -> Self {
        let timestep = FixedTimestep::new(config.substep_dt, config.max_frame_delta);
        Self {
            context,
            config,
            topology: Topology::new(),
            objects: Vec::new(),
            bridge: KinematicBridge::new(),
            timestep,
            gpu: None,
            is_baked: false,
        }
    }

    /// Add a vertex at `position`. Fixed vertices are excluded from
    /// integration but remain valid spring endpoints.
    pub fn add_vertex(&mut self, position: [f32; 3], fixed: bool) -> VerletResult<VertexId> {
        self.sealed_check("add_vertex")?;
        Ok(self.topology.add_vertex(position, fixed))
    }

    /// Connect two vertices with a spring. The rest length is derived at
    /// bake as `rest_length_factor` times the declared distance, so topology
    /// may be declared at an arbitrary rest pose.
    pub fn add_spring(
        &mut self,
        a: VertexId,
        b: VertexId,
        stiffness: f32,
        rest_length_factor: f32,
    ) -> VerletResult<SpringId> {
        self.sealed_check("add_spring")?;
        self.topology.add_spring(a, b, stiffness, rest_length_factor)
    }

    /// Register an object. Its `bake` runs during [`bake`](Self::bake) and
    /// its `update` runs every substep, both in registration order.
    pub fn add_object(&mut self, object: impl PhysicsObject + 'static) -> VerletResult<()> {
        self.sealed_check("add_object")?;
        self.objects.push(Box::new(object));
        Ok(())
    }

    pub fn bridge(&self) -> &KinematicBridge {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut KinematicBridge {
        &mut self.bridge
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Adjust damping. Takes effect on the next substep.
    pub fn set_damping(&mut self, damping: f32) {
        self.config.damping = damping;
    }

    /// Adjust the external acceleration. Takes effect on the next substep.
    pub fn set_gravity(&mut self, gravity: [f32; 3]) {
        self.config.gravity = gravity;
    }

    pub fn vertex_count(&self) -> u32 {
        self.topology.vertex_count()
    }

    pub fn spring_count(&self) -> u32 {
        self.topology.spring_count()
    }

    /// Simulation clock in seconds, advanced only by completed substeps
    pub fn sim_time(&self) -> f64 {
        self.timestep.sim_time()
    }

    pub fn is_baked(&self) -> bool {
        self.is_baked
    }

    /// The live position buffer (vec4: xyz + free mask), for hosts that
    /// render straight from GPU state. `None` before bake.
    pub fn position_buffer(&self) -> Option<&wgpu::Buffer> {
        self.gpu.as_ref().map(|gpu| &gpu.buffers.positions)
    }

    fn sealed_check(&self, operation: &'static str) -> VerletResult<()> {
        if self.is_baked {
            tracing::error!(operation, "simulation mutated after bake");
            return Err(VerletError::Sealed(operation));
        }
        Ok(())
    }

    fn sim_uniforms(&self) -> SimUniforms {
        SimUniforms {
            vertex_count: self.topology.vertex_count(),
            spring_count: self.topology.spring_count(),
            damping: self.config.damping,
            min_length: MIN_SPRING_LENGTH,
            gravity: self.config.gravity,
            _padding: 0.0,
        }
    }

    /// Freeze topology into GPU buffers and compile the kernels.
    ///
    /// Runs in order: object `bake` callbacks (which may still add topology
    /// and anchors), buffer upload, the one-shot rest-length pass over the
    /// declared pose, then the bridge bake placing every anchor. Returns
    /// with all initial GPU work complete, so state is valid pre-render.
    pub fn bake(&mut self) -> VerletResult<()> {
        self.sealed_check("bake")?;

        let mut objects = std::mem::take(&mut self.objects);
        let bake_result = (|| -> VerletResult<()> {
            for object in &mut objects {
                let mut ctx = BakeContext {
                    topology: &mut self.topology,
                    bridge: &mut self.bridge,
                };
                object.bake(&mut ctx)?;
            }
            Ok(())
        })();
        self.objects = objects;
        bake_result?;

        let positions = self.topology.initial_positions();
        let springs = self.topology.spring_records();
        let factors = self.topology.rest_length_factors();
        let (ranges, entries) = self.topology.flatten_influences();

        tracing::info!(
            vertices = self.topology.vertex_count(),
            springs = self.topology.spring_count(),
            anchors = self.bridge.anchor_count(),
            "baking simulation"
        );

        let device = self.context.device();
        let queue = self.context.queue();

        let buffers = SimBuffers::new(
            device,
            &positions,
            &springs,
            &factors,
            &ranges,
            &entries,
            &self.sim_uniforms(),
        );

        // Rest lengths derive from the declared pose, so this must run
        // before the bridge moves any anchored vertex.
        Self::run_rest_length_pass(device, queue, &buffers, self.topology.spring_count());

        self.bridge
            .bake(device, queue, &buffers.positions, self.topology.vertex_count())?;

        let gpu = Self::build_step_pipelines(device, buffers);

        let _ = device.poll(wgpu::Maintain::Wait);

        self.gpu = Some(gpu);
        self.is_baked = true;
        Ok(())
    }

    /// One-shot pass writing each spring's rest length. The pipeline is
    /// transient; nothing re-derives rest lengths after bake.
    fn run_rest_length_pass(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buffers: &SimBuffers,
        spring_count: u32,
    ) {
        if spring_count == 0 {
            return;
        }

        let shaders = SimShaders::new();
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Rest Length Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders.rest_lengths.into()),
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Rest Length Bind Group Layout"),
                entries: &[
                    storage_layout_entry(0, true),
                    storage_layout_entry(1, false),
                    storage_layout_entry(2, true),
                    uniform_layout_entry(3),
                ],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Rest Length Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Rest Length Pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("rest_lengths"),
            compilation_options: Default::default(),
            cache: None,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Rest Length Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.positions.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.springs.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffers.rest_length_factors.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: buffers.uniforms.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Rest Length Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Rest Length Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(spring_count.div_ceil(WORKGROUP_SIZE).max(1), 1, 1);
        }
        queue.submit(std::iter::once(encoder.finish()));
    }

    fn build_step_pipelines(device: &wgpu::Device, buffers: SimBuffers) -> SimGpu {
        let shaders = SimShaders::new();

        let spring_force_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Spring Force Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders.spring_force.into()),
        });
        let vertex_force_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Vertex Force Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders.vertex_force.into()),
        });
        let integrate_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Integrate Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders.integrate.into()),
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Physics Bind Group Layout"),
                entries: &[
                    storage_layout_entry(0, false),
                    storage_layout_entry(1, true),
                    storage_layout_entry(2, false),
                    storage_layout_entry(3, false),
                    storage_layout_entry(4, true),
                    storage_layout_entry(5, true),
                    uniform_layout_entry(6),
                ],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Physics Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let spring_force_pipeline =
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Spring Force Pipeline"),
                layout: Some(&pipeline_layout),
                module: &spring_force_module,
                entry_point: Some("spring_force"),
                compilation_options: Default::default(),
                cache: None,
            });
        let vertex_force_pipeline =
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Vertex Force Pipeline"),
                layout: Some(&pipeline_layout),
                module: &vertex_force_module,
                entry_point: Some("vertex_force"),
                compilation_options: Default::default(),
                cache: None,
            });
        let integrate_pipeline =
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Integrate Pipeline"),
                layout: Some(&pipeline_layout),
                module: &integrate_module,
                entry_point: Some("integrate"),
                compilation_options: Default::default(),
                cache: None,
            });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Physics Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.positions.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.springs.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffers.forces.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: buffers.spring_forces.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: buffers.influence_ranges.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: buffers.influence_entries.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: buffers.uniforms.as_entire_binding(),
                },
            ],
        });

        SimGpu {
            buffers,
            spring_force_pipeline,
            vertex_force_pipeline,
            integrate_pipeline,
            bind_group,
        }
    }

    /// Advance the simulation by a frame.
    ///
    /// `frame_delta` is clamped, banked into the accumulator and consumed
    /// in fixed substeps, so spring behavior is independent of the caller's
    /// frame rate. `elapsed` is the host's wall clock; the internal
    /// simulation clock stays authoritative for physics. Returns the number
    /// of substeps executed.
    pub fn update(&mut self, frame_delta: f32, elapsed: f64) -> VerletResult<u32> {
        if !self.is_baked {
            tracing::error!("update called before bake");
            return Err(VerletError::NotBaked("update"));
        }
        tracing::trace!(frame_delta, elapsed, "advancing simulation");

        self.timestep.accumulate(frame_delta);
        let mut steps = 0u32;
        while self.timestep.step() {
            self.substep()?;
            steps += 1;
        }
        Ok(steps)
    }

    /// One fixed substep: object callbacks, anchor placement, then the
    /// three physics kernels in order. Passes within the encoder are
    /// sequenced, so each kernel sees the previous one's writes.
    fn substep(&mut self) -> VerletResult<()> {
        let mut objects = std::mem::take(&mut self.objects);
        let step_result = (|| -> VerletResult<()> {
            for object in &mut objects {
                let mut ctx = StepContext {
                    bridge: &mut self.bridge,
                    substep_dt: self.timestep.dt(),
                    sim_time: self.timestep.sim_time(),
                };
                object.update(&mut ctx)?;
            }
            Ok(())
        })();
        self.objects = objects;
        step_result?;

        let device = self.context.device();
        let queue = self.context.queue();

        self.bridge.run_update_pass(device, queue);

        let gpu = self.gpu.as_ref().ok_or(VerletError::NotBaked("substep"))?;
        gpu.buffers.write_uniforms(queue, &self.sim_uniforms());

        let vertex_count = self.topology.vertex_count();
        let spring_count = self.topology.spring_count();
        let vertex_workgroups = vertex_count.div_ceil(WORKGROUP_SIZE);
        let spring_workgroups = spring_count.div_ceil(WORKGROUP_SIZE);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Physics Encoder"),
        });

        if spring_count > 0 {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Spring Force Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&gpu.spring_force_pipeline);
            pass.set_bind_group(0, &gpu.bind_group, &[]);
            pass.dispatch_workgroups(spring_workgroups.max(1), 1, 1);
        }

        if vertex_count > 0 {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Vertex Force Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&gpu.vertex_force_pipeline);
            pass.set_bind_group(0, &gpu.bind_group, &[]);
            pass.dispatch_workgroups(vertex_workgroups.max(1), 1, 1);
        }

        if vertex_count > 0 {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Integration Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&gpu.integrate_pipeline);
            pass.set_bind_group(0, &gpu.bind_group, &[]);
            pass.dispatch_workgroups(vertex_workgroups.max(1), 1, 1);
        }

        queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Read back current vertex positions (vec4: xyz + free mask)
    pub fn read_positions(&self) -> VerletResult<Vec<[f32; 4]>> {
        let gpu = self
            .gpu
            .as_ref()
            .ok_or(VerletError::NotBaked("read_positions"))?;
        gpu.buffers.read_vec(
            self.context.device(),
            self.context.queue(),
            &gpu.buffers.positions,
            self.topology.vertex_count() as usize,
        )
    }

    /// Read back accumulated per-vertex forces
    pub fn read_forces(&self) -> VerletResult<Vec<[f32; 4]>> {
        let gpu = self
            .gpu
            .as_ref()
            .ok_or(VerletError::NotBaked("read_forces"))?;
        gpu.buffers.read_vec(
            self.context.device(),
            self.context.queue(),
            &gpu.buffers.forces,
            self.topology.vertex_count() as usize,
        )
    }

    /// Read back spring records, including rest lengths derived at bake
    pub fn read_springs(&self) -> VerletResult<Vec<GpuSpring>> {
        let gpu = self
            .gpu
            .as_ref()
            .ok_or(VerletError::NotBaked("read_springs"))?;
        gpu.buffers.read_vec(
            self.context.device(),
            self.context.queue(),
            &gpu.buffers.springs,
            self.topology.spring_count() as usize,
        )
    }
}
