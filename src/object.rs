//! Soft-body object trait
//!
//! A [`PhysicsObject`] contributes topology when the simulation bakes and
//! may steer the kinematic bridge every substep. Objects never touch GPU
//! state directly; everything goes through the contexts handed to them.

use crate::bridge::KinematicBridge;
use crate::error::VerletResult;
use crate::topology::{SpringId, Topology, VertexId};

/// A participant in the simulation, registered before bake.
///
/// Both methods default to doing nothing, so purely declarative objects can
/// implement whichever side they need.
pub trait PhysicsObject {
    /// Contribute vertices, springs and anchors. Called exactly once,
    /// during bake, in registration order.
    fn bake(&mut self, ctx: &mut BakeContext<'_>) -> VerletResult<()> {
        let _ = ctx;
        Ok(())
    }

    /// Drive instance transforms or phases for the coming substep. Called
    /// once per substep, in registration order, before anchors are placed.
    fn update(&mut self, ctx: &mut StepContext<'_>) -> VerletResult<()> {
        let _ = ctx;
        Ok(())
    }
}

/// Mutable view of the simulation handed to [`PhysicsObject::bake`]
pub struct BakeContext<'a> {
    pub(crate) topology: &'a mut Topology,
    pub(crate) bridge: &'a mut KinematicBridge,
}

impl BakeContext<'_> {
    /// Add a vertex at `position`. Fixed vertices are skipped by the
    /// integrator and are usually driven through the bridge.
    pub fn add_vertex(&mut self, position: [f32; 3], fixed: bool) -> VertexId {
        self.topology.add_vertex(position, fixed)
    }

    /// Connect two vertices with a spring. The rest length is derived on
    /// the GPU from the vertices' baked positions, scaled by
    /// `rest_length_factor`.
    pub fn add_spring(
        &mut self,
        a: VertexId,
        b: VertexId,
        stiffness: f32,
        rest_length_factor: f32,
    ) -> VerletResult<SpringId> {
        self.topology.add_spring(a, b, stiffness, rest_length_factor)
    }

    /// The kinematic bridge, for registering instances and anchored
    /// vertices
    pub fn bridge(&mut self) -> &mut KinematicBridge {
        self.bridge
    }
}

/// View of the simulation handed to [`PhysicsObject::update`] each substep
pub struct StepContext<'a> {
    pub(crate) bridge: &'a mut KinematicBridge,
    pub(crate) substep_dt: f32,
    pub(crate) sim_time: f64,
}

impl StepContext<'_> {
    /// The kinematic bridge, for moving instances between substeps
    pub fn bridge(&mut self) -> &mut KinematicBridge {
        self.bridge
    }

    /// Fixed duration of the substep about to run
    pub fn substep_dt(&self) -> f32 {
        self.substep_dt
    }

    /// Simulation clock for this substep, in seconds. The clock has already
    /// been advanced by `substep_dt` when this runs.
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }
}
