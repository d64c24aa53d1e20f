//! Pre-bake topology accumulation
//!
//! Vertices and springs are collected host-side until `bake()` freezes them
//! into GPU buffers. Each spring registers a signed reference into both
//! endpoints' pending lists; flattening turns those lists into the compact
//! influence array the vertex-force kernel walks. The signed encoding is
//! `(springId + 1) x sign` with 0 reserved, positive meaning the vertex is
//! endpoint A and negative endpoint B.

use crate::error::{VerletError, VerletResult};
use crate::types::{GpuSpring, InfluenceRange};

/// Handle to a vertex added pre-bake. Ids are dense insertion indices and
/// stay stable after bake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexId(pub(crate) u32);

impl VertexId {
    /// Dense index of this vertex, usable to address the position buffer
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Handle to a spring added pre-bake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpringId(pub(crate) u32);

impl SpringId {
    /// Dense index of this spring
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug)]
struct VertexSeed {
    position: [f32; 3],
    fixed: bool,
    /// Signed spring references, in registration order
    refs: Vec<i32>,
}

#[derive(Debug)]
struct SpringSeed {
    vertex_a: u32,
    vertex_b: u32,
    stiffness: f32,
    rest_length_factor: f32,
}

/// Accumulates vertices and springs before bake
#[derive(Debug, Default)]
pub(crate) struct Topology {
    vertices: Vec<VertexSeed>,
    springs: Vec<SpringSeed>,
}

impl Topology {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub(crate) fn spring_count(&self) -> u32 {
        self.springs.len() as u32
    }

    pub(crate) fn add_vertex(&mut self, position: [f32; 3], fixed: bool) -> VertexId {
        let id = self.vertices.len() as u32;
        self.vertices.push(VertexSeed {
            position,
            fixed,
            refs: Vec::new(),
        });
        VertexId(id)
    }

    /// Register a spring between two existing vertices. Cycles and duplicate
    /// pairs are allowed; the graph is whatever the caller declares.
    pub(crate) fn add_spring(
        &mut self,
        a: VertexId,
        b: VertexId,
        stiffness: f32,
        rest_length_factor: f32,
    ) -> VerletResult<SpringId> {
        let count = self.vertices.len() as u32;
        if a.0 >= count {
            return Err(VerletError::UnknownVertex(a.0));
        }
        if b.0 >= count {
            return Err(VerletError::UnknownVertex(b.0));
        }

        let id = self.springs.len() as u32;
        let encoded = (id + 1) as i32;
        self.vertices[a.0 as usize].refs.push(encoded);
        self.vertices[b.0 as usize].refs.push(-encoded);
        self.springs.push(SpringSeed {
            vertex_a: a.0,
            vertex_b: b.0,
            stiffness,
            rest_length_factor,
        });
        Ok(SpringId(id))
    }

    /// Initial positions with the free-mask in w (1 = simulate, 0 = anchored)
    pub(crate) fn initial_positions(&self) -> Vec<[f32; 4]> {
        self.vertices
            .iter()
            .map(|v| {
                let mask = if v.fixed { 0.0 } else { 1.0 };
                [v.position[0], v.position[1], v.position[2], mask]
            })
            .collect()
    }

    /// Spring records with rest lengths left at zero for the bake pass
    pub(crate) fn spring_records(&self) -> Vec<GpuSpring> {
        self.springs
            .iter()
            .map(|s| GpuSpring::new(s.vertex_a, s.vertex_b, s.stiffness))
            .collect()
    }

    pub(crate) fn rest_length_factors(&self) -> Vec<f32> {
        self.springs.iter().map(|s| s.rest_length_factor).collect()
    }

    /// Flatten per-vertex pending references into `(start, count)` runs over
    /// one flat signed array. Fixed vertices flatten to an empty run: the
    /// integrate kernel never consumes their force, so gathering it would be
    /// wasted work.
    pub(crate) fn flatten_influences(&self) -> (Vec<InfluenceRange>, Vec<i32>) {
        let mut ranges = Vec::with_capacity(self.vertices.len());
        let mut entries = Vec::new();

        for vertex in &self.vertices {
            let start = entries.len() as u32;
            if vertex.fixed {
                ranges.push(InfluenceRange { start, count: 0 });
                continue;
            }
            entries.extend_from_slice(&vertex.refs);
            ranges.push(InfluenceRange {
                start,
                count: vertex.refs.len() as u32,
            });
        }

        (ranges, entries)
    }
}
