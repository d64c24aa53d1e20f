//! WGSL compute kernels for the Verlet simulation
//!
//! Four physics kernels share one storage layout: a one-shot rest-length
//! derivation at bake, then spring-force, vertex-force and integrate every
//! substep. The anchor kernel has its own layout and is composed at bake time
//! with the caller's surface function spliced between header and entry point.
//!
//! Force layout rule: a spring invocation writes only its own `springForce`
//! slot, and a vertex invocation gathers from those slots through its
//! influence run. No two invocations of one kernel ever write the same
//! element, so no atomics are needed.

/// Struct definitions shared by the physics kernels
pub const SIM_STRUCTS: &str = r#"
struct Spring {
    vertex_a: u32,
    vertex_b: u32,
    stiffness: f32,
    rest_length: f32,
}

struct InfluenceRange {
    start: u32,
    count: u32,
}

struct Uniforms {
    vertex_count: u32,
    spring_count: u32,
    damping: f32,
    min_length: f32,
    gravity: vec3<f32>,
}
"#;

/// Bindings for the per-substep kernels. Springs are read-only here; only
/// the bake pass may write rest lengths.
pub const STEP_BINDINGS: &str = r#"
@group(0) @binding(0) var<storage, read_write> positions: array<vec4<f32>>;
@group(0) @binding(1) var<storage, read> springs: array<Spring>;
@group(0) @binding(2) var<storage, read_write> forces: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read_write> spring_forces: array<vec4<f32>>;
@group(0) @binding(4) var<storage, read> influence_ranges: array<InfluenceRange>;
@group(0) @binding(5) var<storage, read> influence_entries: array<i32>;
@group(0) @binding(6) var<uniform> uniforms: Uniforms;
"#;

/// Bindings for the one-shot rest-length pass, the only writer of springs
pub const REST_LENGTH_BINDINGS: &str = r#"
@group(0) @binding(0) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(1) var<storage, read_write> springs: array<Spring>;
@group(0) @binding(2) var<storage, read> rest_length_factors: array<f32>;
@group(0) @binding(3) var<uniform> uniforms: Uniforms;
"#;

/// One-shot bake pass - derives each spring's rest length from the declared
/// pose, scaled by its factor
pub const REST_LENGTH_KERNEL: &str = r#"
@compute @workgroup_size(256)
fn rest_lengths(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let spring_idx = global_id.x;
    if (spring_idx >= uniforms.spring_count) {
        return;
    }

    let spring = springs[spring_idx];
    let delta = positions[spring.vertex_b].xyz - positions[spring.vertex_a].xyz;
    springs[spring_idx].rest_length = length(delta) * rest_length_factors[spring_idx];
}
"#;

/// Per-spring force kernel - one invocation per spring, writes scratch only
pub const SPRING_FORCE_KERNEL: &str = r#"
@compute @workgroup_size(256)
fn spring_force(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let spring_idx = global_id.x;
    if (spring_idx >= uniforms.spring_count) {
        return;
    }

    let spring = springs[spring_idx];
    let delta = positions[spring.vertex_b].xyz - positions[spring.vertex_a].xyz;
    let dist = max(length(delta), uniforms.min_length);

    // Half magnitude: both endpoints gather this value with opposite signs.
    let magnitude = (dist - spring.rest_length) * spring.stiffness / dist * 0.5;
    spring_forces[spring_idx] = vec4<f32>(delta * magnitude, 0.0);
}
"#;

/// Per-vertex gather kernel - damps the persistent force, pulls in signed
/// spring forces through the influence run, adds gravity
pub const VERTEX_FORCE_KERNEL: &str = r#"
@compute @workgroup_size(256)
fn vertex_force(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let vertex_idx = global_id.x;
    if (vertex_idx >= uniforms.vertex_count) {
        return;
    }

    let range = influence_ranges[vertex_idx];
    var force = forces[vertex_idx].xyz * uniforms.damping;

    for (var i = 0u; i < range.count; i++) {
        let entry = influence_entries[range.start + i];
        let spring_idx = u32(abs(entry)) - 1u;
        let side = select(-1.0, 1.0, entry > 0);
        force += spring_forces[spring_idx].xyz * side;
    }

    force += uniforms.gravity;
    forces[vertex_idx] = vec4<f32>(force, 0.0);
}
"#;

/// Integration kernel - advances free vertices by their accumulated force.
/// The damped force doubles as velocity; there is no separate velocity field.
pub const INTEGRATE_KERNEL: &str = r#"
@compute @workgroup_size(256)
fn integrate(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let vertex_idx = global_id.x;
    if (vertex_idx >= uniforms.vertex_count) {
        return;
    }

    let position = positions[vertex_idx];
    // w is the free mask: 1 = simulated, 0 = kinematically driven.
    if (position.w > 0.5) {
        positions[vertex_idx] = vec4<f32>(position.xyz + forces[vertex_idx].xyz, position.w);
    }
}
"#;

/// Structs and bindings for the anchor kernel
pub const ANCHOR_HEADER: &str = r#"
struct Instance {
    transform: mat4x4<f32>,
    phase: f32,
}

struct AnchorUniforms {
    base: u32,
    count: u32,
    surface_epsilon: f32,
}

@group(0) @binding(0) var<storage, read_write> positions: array<vec4<f32>>;
@group(0) @binding(1) var<storage, read> anchor_vertices: array<u32>;
@group(0) @binding(2) var<storage, read> anchor_instances: array<u32>;
@group(0) @binding(3) var<storage, read> anchor_params: array<vec2<f32>>;
@group(0) @binding(4) var<storage, read> anchor_surfaces: array<u32>;
@group(0) @binding(5) var<storage, read> anchor_offsets: array<vec4<f32>>;
@group(0) @binding(6) var<storage, read> instances: array<Instance>;
@group(0) @binding(7) var<uniform> anchor_uniforms: AnchorUniforms;
"#;

/// Anchor placement kernel - one invocation per queue entry in the uniform
/// window. A nonzero directional offset (`offset.w`) replaces the fixed
/// offset with a displacement along the estimated surface normal, and the
/// written position keeps the vertex's stored free mask.
pub const ANCHOR_KERNEL: &str = r#"
@compute @workgroup_size(256)
fn place_anchors(@builtin(global_invocation_id) global_id: vec3<u32>) {
    if (global_id.x >= anchor_uniforms.count) {
        return;
    }
    let entry_idx = anchor_uniforms.base + global_id.x;

    let instance = instances[anchor_instances[entry_idx]];
    let params = anchor_params[entry_idx];
    let secondary = f32(anchor_surfaces[entry_idx]);
    let offset = anchor_offsets[entry_idx];

    var local = surface_position(instance.phase, params.x, params.y, secondary);
    if (abs(offset.w) > 1e-8) {
        // Two tangent-plane samples around (paramA, paramB); their cross
        // product estimates the surface normal.
        let e = anchor_uniforms.surface_epsilon;
        let tangent =
            surface_position(instance.phase, params.x + e, params.y - e, secondary) - local;
        let bitangent =
            surface_position(instance.phase, params.x + e, params.y + e, secondary) - local;
        local += normalize(cross(tangent, bitangent)) * offset.w;
    } else {
        local += offset.xyz;
    }

    let world = instance.transform * vec4<f32>(local, 1.0);
    let vertex_idx = anchor_vertices[entry_idx];
    positions[vertex_idx] = vec4<f32>(world.xyz, positions[vertex_idx].w);
}
"#;

/// Composed shader sources for the physics pipelines
pub struct SimShaders {
    pub rest_lengths: String,
    pub spring_force: String,
    pub vertex_force: String,
    pub integrate: String,
}

impl SimShaders {
    pub fn new() -> Self {
        Self {
            rest_lengths: format!(
                "{}\n{}\n{}",
                SIM_STRUCTS, REST_LENGTH_BINDINGS, REST_LENGTH_KERNEL
            ),
            spring_force: format!("{}\n{}\n{}", SIM_STRUCTS, STEP_BINDINGS, SPRING_FORCE_KERNEL),
            vertex_force: format!("{}\n{}\n{}", SIM_STRUCTS, STEP_BINDINGS, VERTEX_FORCE_KERNEL),
            integrate: format!("{}\n{}\n{}", SIM_STRUCTS, STEP_BINDINGS, INTEGRATE_KERNEL),
        }
    }
}

impl Default for SimShaders {
    fn default() -> Self {
        Self::new()
    }
}

/// The procedural surface driving anchored vertices, supplied as WGSL.
///
/// The source must define
/// `fn surface_position(phase: f32, param_a: f32, param_b: f32, secondary: f32) -> vec3<f32>`
/// as a pure function; it is evaluated inside the anchor kernel, several
/// times per entry when a directional offset needs a normal estimate.
#[derive(Debug, Clone)]
pub struct SurfaceFunction {
    source: String,
}

impl SurfaceFunction {
    /// Wrap a WGSL source string defining `surface_position`
    pub fn from_wgsl(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// A unit sphere parameterized by polar angle `param_a` and azimuth
    /// `param_b`, ignoring phase and the secondary flag. Useful as a
    /// reference surface and in tests.
    pub fn unit_sphere() -> Self {
        Self::from_wgsl(
            r#"
fn surface_position(phase: f32, param_a: f32, param_b: f32, secondary: f32) -> vec3<f32> {
    return vec3<f32>(
        sin(param_a) * sin(param_b),
        cos(param_a),
        sin(param_a) * cos(param_b)
    );
}
"#,
        )
    }

    /// The raw WGSL source
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Compose the anchor kernel with a surface function spliced in
pub fn anchor_shader(surface: &SurfaceFunction) -> String {
    format!("{}\n{}\n{}", ANCHOR_HEADER, surface.source(), ANCHOR_KERNEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_shaders_compose_entry_points() {
        let shaders = SimShaders::new();
        assert!(shaders.rest_lengths.contains("fn rest_lengths"));
        assert!(shaders.spring_force.contains("fn spring_force"));
        assert!(shaders.vertex_force.contains("fn vertex_force"));
        assert!(shaders.integrate.contains("fn integrate"));
        // Every composed source carries the shared structs
        assert!(shaders.spring_force.contains("struct Spring"));
        assert!(shaders.integrate.contains("struct Uniforms"));
    }

    #[test]
    fn step_kernels_bind_springs_read_only() {
        let shaders = SimShaders::new();
        assert!(shaders.spring_force.contains("var<storage, read> springs"));
        assert!(
            shaders
                .rest_lengths
                .contains("var<storage, read_write> springs"),
            "only the bake pass writes rest lengths"
        );
    }

    #[test]
    fn anchor_shader_splices_surface_before_kernel() {
        let surface = SurfaceFunction::unit_sphere();
        let source = anchor_shader(&surface);

        let definition = source
            .find("fn surface_position")
            .expect("surface function present");
        let usage = source.find("fn place_anchors").expect("entry point present");
        assert!(definition < usage);
        assert!(source.contains("struct Instance"));
    }
}
