//! promptmesh core library - model decoding, normalization and view math
//!
//! Everything here is synchronous and free of rendering state so one decoded
//! model can back several live viewers at once.

pub mod error;
pub mod geometry;
pub mod normalize;
pub mod ply;
pub mod projection;
pub mod transform;

// Re-export commonly used types
pub use error::{DecodeError, GeometryError, TransportError};
pub use geometry::{ParsedMesh, TriangleIndices};
pub use normalize::{normalize, Bounds, NormalizedTransform};
pub use ply::decode;
pub use projection::{Camera, NORMALIZED_RADIUS};
pub use transform::{RotationState, Transform, DEFAULT_SMOOTHING};
