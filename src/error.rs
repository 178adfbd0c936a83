use thiserror::Error;

/// Top-level error type for the tissue mesh solver.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Io(#[from] IoError),
}

/// Errors related to geometric computations.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("degenerate geometry: {0}")]
    Degenerate(String),

    #[error("zero-length vector")]
    ZeroVector,
}

/// Errors related to the mesh object graph.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// A handle refers to an object that was never created or was destroyed.
    #[error("invalid handle: {0}")]
    InvalidHandle(&'static str),

    /// An edit would violate a structural minimum or a relation is inconsistent.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Errors related to mesh editing and solver operations.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("already registered: {0}")]
    AlreadyRegistered(String),
}

/// Errors related to structured export and import.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("malformed element: {0}")]
    Malformed(String),

    #[error("missing key: {0}")]
    MissingKey(String),

    #[error("unknown element kind: {0}")]
    UnknownKind(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TopologyError {
    /// Shorthand for an [`TopologyError::InvalidTopology`] error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidTopology(msg.into())
    }
}

impl IoError {
    /// Shorthand for an [`IoError::Malformed`] error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

/// Convenience type alias for results using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;
