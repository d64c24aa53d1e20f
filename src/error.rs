//! Error types for simulation setup and execution
//!
//! Sequencing errors (mutating after bake, stepping before bake) are reported
//! loudly but leave the simulation in a usable state: the host may log the
//! error and keep driving frames. GPU acquisition and read-back failures are
//! fatal to the session.

use thiserror::Error;

/// Errors that can occur while building or running a simulation
#[derive(Error, Debug)]
pub enum VerletError {
    /// Topology or registration was mutated after `bake()`
    #[error("sequencing error: {0} is not allowed after bake")]
    Sealed(&'static str),

    /// Simulation state was used before `bake()`
    #[error("sequencing error: {0} requires a completed bake")]
    NotBaked(&'static str),

    /// A spring or anchor referenced a vertex id that was never added
    #[error("unknown vertex id {0}")]
    UnknownVertex(u32),

    /// An anchor referenced an instance id that was never registered
    #[error("unknown instance id {0}")]
    UnknownInstance(u32),

    /// Anchors were registered but no surface function was set before bake
    #[error("anchor queue is non-empty but no surface function was set")]
    MissingSurface,

    /// No GPU adapter is available on this host
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    /// The adapter refused to create a device
    #[error("device request failed: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    /// Mapping a staging buffer for read-back failed
    #[error("buffer map failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    /// The buffer-map callback was dropped before it reported a result
    #[error("buffer map callback dropped before completion")]
    ReadbackChannel,
}

/// Result type for simulation operations
pub type VerletResult<T> = Result<T, VerletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = VerletError::Sealed("add_vertex");
        assert_eq!(
            err.to_string(),
            "sequencing error: add_vertex is not allowed after bake"
        );

        let err = VerletError::NotBaked("update");
        assert_eq!(
            err.to_string(),
            "sequencing error: update requires a completed bake"
        );

        let err = VerletError::UnknownInstance(7);
        assert_eq!(err.to_string(), "unknown instance id 7");
    }
}
