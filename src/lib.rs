//! GPU-parallel mass-spring simulation with kinematically driven anchors
//!
//! This crate animates soft-body structures on the GPU via wgpu compute
//! shaders. Springs connect vertices built up before a one-shot bake; after
//! the bake a fixed-timestep loop advances the system at a constant rate
//! regardless of the caller's frame cadence. A kinematic bridge drives
//! "fixed" vertices from a caller-supplied procedural surface function,
//! batched across many independently transformed instances in one dispatch.
//!
//! # Features
//!
//! - **Race-free parallelism**: per-vertex influence lists let forces be
//!   gathered by the owning vertex instead of scattered by springs, so no
//!   atomics are needed
//! - **Render-rate decoupling**: frame deltas are banked in an accumulator
//!   and consumed in fixed substeps, keeping stiffness behavior identical
//!   at 30 or 240 fps
//! - **Batched instances**: all anchored vertices across all instances are
//!   placed by one kernel over one queue
//! - **Shared-device embedding**: the solver can wrap a host renderer's
//!   device and expose its position buffer for direct drawing
//!
//! # Example
//!
//! ```rust,ignore
//! use verlet_gpu::{GpuContext, IDENTITY_TRANSFORM, SurfaceFunction, VerletPhysics};
//!
//! let context = GpuContext::new()?;
//! let mut sim = VerletPhysics::new(context);
//!
//! // A strand hanging from an anchored vertex
//! let top = sim.add_vertex([0.0, 1.0, 0.0], true)?;
//! let bottom = sim.add_vertex([0.0, 0.0, 0.0], false)?;
//! sim.add_spring(top, bottom, 0.5, 1.0)?;
//!
//! // Drive the anchor from a procedural surface
//! sim.bridge_mut().set_surface(SurfaceFunction::unit_sphere())?;
//! let instance = sim.bridge_mut().register_instance(IDENTITY_TRANSFORM, 0.0)?;
//! sim.bridge_mut()
//!     .register_vertex(instance, top, 0.5, 0.0, false, [0.0; 3], 0.0, true)?;
//!
//! sim.bake()?;
//!
//! // Per frame
//! sim.update(frame_delta, elapsed)?;
//! let positions = sim.read_positions()?;
//! ```
//!
//! # Kernels
//!
//! Every substep runs three kernels in order, each one's writes visible to
//! the next:
//!
//! - **Spring force**: per spring, Hooke-style force along the current
//!   delta, halved because both endpoints will consume it
//! - **Vertex force**: per vertex, damp the persistent force, gather signed
//!   spring forces through the influence list, add gravity
//! - **Integrate**: per free vertex, advance position by the accumulated
//!   force, which doubles as velocity
//!
//! Stability comes from damping below one, not from physical rigor; see
//! [`SolverConfig`] for the tunables.

mod bridge;
mod buffers;
mod context;
mod error;
mod object;
mod shaders;
mod solver;
mod timestep;
mod topology;
mod types;

pub use bridge::{InstanceId, KinematicBridge};
pub use context::GpuContext;
pub use error::{VerletError, VerletResult};
pub use object::{BakeContext, PhysicsObject, StepContext};
pub use shaders::{SimShaders, SurfaceFunction, anchor_shader};
pub use solver::VerletPhysics;
pub use timestep::FixedTimestep;
pub use topology::{SpringId, VertexId};
pub use types::{
    // Default constants for customization
    DEFAULT_DAMPING,
    DEFAULT_GRAVITY,
    DEFAULT_MAX_FRAME_DELTA,
    DEFAULT_SUBSTEP_DT,
    GpuInstance,
    GpuSpring,
    IDENTITY_TRANSFORM,
    InfluenceRange,
    MIN_SPRING_LENGTH,
    SURFACE_EPSILON,
    SimUniforms,
    SolverConfig,
    WORKGROUP_SIZE,
};
