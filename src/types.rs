//! GPU buffer types and solver configuration
//!
//! These types are uploaded directly to GPU buffers. All use f32 for GPU
//! compatibility and are repr(C) for predictable layout; vec3 quantities
//! occupy 16-byte slots to match WGSL storage-array stride rules.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

// =============================================================================
// Default Constants
// =============================================================================

/// Default force damping applied each substep (<1; doubles as velocity decay)
pub const DEFAULT_DAMPING: f32 = 0.997;

/// Default external acceleration added to every free vertex each substep
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -2e-4, 0.0];

/// Default fixed substep duration in seconds (360 Hz)
pub const DEFAULT_SUBSTEP_DT: f32 = 1.0 / 360.0;

/// Default upper clamp on a frame delta (bounds catch-up after a stall)
pub const DEFAULT_MAX_FRAME_DELTA: f32 = 0.1;

/// Epsilon floor for spring length (guards coincident endpoints)
pub const MIN_SPRING_LENGTH: f32 = 1e-6;

/// Parameter-space step for the finite-difference surface normal estimate
pub const SURFACE_EPSILON: f32 = 1e-3;

/// Workgroup size shared by all compute kernels
pub const WORKGROUP_SIZE: u32 = 256;

/// Column-major 4x4 identity, the default instance transform
pub const IDENTITY_TRANSFORM: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// A spring record in the GPU simulation.
///
/// Layout matches the WGSL struct for direct buffer upload. `rest_length`
/// starts at zero and is filled by the one-shot bake pass as
/// `restLengthFactor x distance(initialA, initialB)`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuSpring {
    /// Index of endpoint A (positive influence sign)
    pub vertex_a: u32,
    /// Index of endpoint B (negative influence sign)
    pub vertex_b: u32,
    /// Spring stiffness (higher = stronger pull toward rest length)
    pub stiffness: f32,
    /// Rest length, derived on the GPU at bake time
    pub rest_length: f32,
}

impl GpuSpring {
    /// Create a spring record with an underived (zero) rest length
    pub fn new(vertex_a: u32, vertex_b: u32, stiffness: f32) -> Self {
        Self {
            vertex_a,
            vertex_b,
            stiffness,
            rest_length: 0.0,
        }
    }
}

/// A `(start, count)` run into the flat influence-entry array.
///
/// Fixed vertices keep `count = 0`: their accumulated force is never
/// consumed by integration, so no spring references are flattened for them.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct InfluenceRange {
    /// First entry index in the influence array
    pub start: u32,
    /// Number of entries belonging to this vertex
    pub count: u32,
}

/// Per-instance kinematic state: a transform and a surface phase.
///
/// Layout matches the WGSL `Instance` struct; the trailing padding brings the
/// record to the 80-byte array stride WGSL assigns it.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuInstance {
    /// Column-major world transform applied to anchor positions
    pub transform: [[f32; 4]; 4],
    /// Scalar phase passed to the surface function
    pub phase: f32,
    /// Padding to the WGSL array stride
    pub _padding: [f32; 3],
}

impl GpuInstance {
    /// Create instance state from a column-major transform and a phase
    pub fn new(transform: [[f32; 4]; 4], phase: f32) -> Self {
        Self {
            transform,
            phase,
            _padding: [0.0; 3],
        }
    }
}

impl Default for GpuInstance {
    fn default() -> Self {
        Self::new(IDENTITY_TRANSFORM, 0.0)
    }
}

/// Simulation parameters passed to the physics kernels as uniforms
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SimUniforms {
    /// Number of vertices
    pub vertex_count: u32,
    /// Number of springs
    pub spring_count: u32,
    /// Force damping applied each substep
    pub damping: f32,
    /// Epsilon floor for spring length
    pub min_length: f32,
    /// External acceleration added each substep
    pub gravity: [f32; 3],
    /// Padding for 16-byte alignment
    pub _padding: f32,
}

/// Dispatch window passed to the anchor kernel as uniforms
///
/// `base` and `count` select a sub-range of the sorted anchor queue: the full
/// queue at bake and on the first post-bake update, the fixed prefix (or one
/// instance's slice of it) afterwards.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct AnchorUniforms {
    /// First queue entry covered by this pass
    pub base: u32,
    /// Number of queue entries covered by this pass
    pub count: u32,
    /// Parameter-space step for the surface normal estimate
    pub surface_epsilon: f32,
    /// Padding for 16-byte alignment
    pub _padding: u32,
}

impl AnchorUniforms {
    /// Window covering `count` queue entries starting at `base`
    pub fn window(base: u32, count: u32) -> Self {
        Self {
            base,
            count,
            surface_epsilon: SURFACE_EPSILON,
            _padding: 0,
        }
    }
}

/// Tunable solver parameters.
///
/// Damping and gravity are deliberately configuration rather than constants:
/// stability comes from damping, not physical rigor, and useful values depend
/// on the stiffness range of the topology being simulated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Fixed substep duration in seconds
    pub substep_dt: f32,
    /// Upper clamp on a frame delta before it is banked
    pub max_frame_delta: f32,
    /// Force damping applied each substep (<1)
    pub damping: f32,
    /// External acceleration added to every free vertex each substep
    pub gravity: [f32; 3],
}

impl SolverConfig {
    /// Set the substep duration
    pub fn with_substep_dt(mut self, substep_dt: f32) -> Self {
        self.substep_dt = substep_dt;
        self
    }

    /// Set the frame-delta clamp
    pub fn with_max_frame_delta(mut self, max_frame_delta: f32) -> Self {
        self.max_frame_delta = max_frame_delta;
        self
    }

    /// Set the per-substep force damping
    pub fn with_damping(mut self, damping: f32) -> Self {
        self.damping = damping;
        self
    }

    /// Set the per-substep external acceleration
    pub fn with_gravity(mut self, gravity: [f32; 3]) -> Self {
        self.gravity = gravity;
        self
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            substep_dt: DEFAULT_SUBSTEP_DT,
            max_frame_delta: DEFAULT_MAX_FRAME_DELTA,
            damping: DEFAULT_DAMPING,
            gravity: DEFAULT_GRAVITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_spring_size() {
        // 2 u32 + 2 f32 = 16 bytes, one WGSL array slot
        assert_eq!(std::mem::size_of::<GpuSpring>(), 16);
    }

    #[test]
    fn test_influence_range_size() {
        assert_eq!(std::mem::size_of::<InfluenceRange>(), 8);
    }

    #[test]
    fn test_gpu_instance_size() {
        // mat4x4 (64) + phase (4) + padding (12) = 80 bytes, the WGSL stride
        assert_eq!(std::mem::size_of::<GpuInstance>(), 80);
    }

    #[test]
    fn test_uniforms_size() {
        let size = std::mem::size_of::<SimUniforms>();
        assert_eq!(size % 16, 0, "SimUniforms size {} is not 16-byte aligned", size);

        let size = std::mem::size_of::<AnchorUniforms>();
        assert_eq!(
            size % 16,
            0,
            "AnchorUniforms size {} is not 16-byte aligned",
            size
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = SolverConfig::default();
        assert!(config.damping < 1.0);
        assert!(config.substep_dt > 0.0);
        assert!(config.max_frame_delta >= config.substep_dt);
    }

    #[test]
    fn test_config_builders() {
        let config = SolverConfig::default()
            .with_damping(0.998)
            .with_gravity([0.0, 0.0, 0.0])
            .with_substep_dt(1.0 / 256.0)
            .with_max_frame_delta(0.25);
        assert_eq!(config.damping, 0.998);
        assert_eq!(config.gravity, [0.0, 0.0, 0.0]);
        assert_eq!(config.substep_dt, 1.0 / 256.0);
        assert_eq!(config.max_frame_delta, 0.25);
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = SolverConfig::default().with_damping(0.9975);
        let json = serde_json::to_string(&config).unwrap();
        let back: SolverConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.damping, config.damping);
        assert_eq!(back.gravity, config.gravity);
        assert_eq!(back.substep_dt, config.substep_dt);
    }

    #[test]
    fn test_identity_transform() {
        let instance = GpuInstance::default();
        for (col, column) in instance.transform.iter().enumerate() {
            for (row, value) in column.iter().enumerate() {
                let expected = if row == col { 1.0 } else { 0.0 };
                assert_eq!(*value, expected);
            }
        }
        assert_eq!(instance.phase, 0.0);
    }
}
