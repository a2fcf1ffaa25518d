//! The currently loaded asset and its decoded form.

use std::rc::Rc;

use promptmesh_core::{decode, normalize, DecodeError, NormalizedTransform, ParsedMesh};
use tracing::{info, warn};

/// A fetched payload and the locator it was retrieved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAsset {
    pub source_url: String,
    pub raw_text: String,
}

/// Immutable decoded geometry shared by every session showing the asset.
#[derive(Debug, Clone)]
pub struct DecodedMesh {
    pub mesh: Rc<ParsedMesh>,
    pub transform: NormalizedTransform,
}

/// An asset together with the outcome of decoding it.
#[derive(Debug)]
pub struct LoadedModel {
    asset: ModelAsset,
    decoded: Result<DecodedMesh, DecodeError>,
}

impl LoadedModel {
    /// Decode and normalize `asset`. A decode failure is kept rather than
    /// returned so viewers can still present the fallback shape.
    pub fn from_asset(asset: ModelAsset) -> Self {
        let decoded = decode(&asset.raw_text).map(|mesh| {
            let transform = normalize(&mesh);
            DecodedMesh {
                mesh: Rc::new(mesh),
                transform,
            }
        });
        match &decoded {
            Ok(d) => info!(
                target: "decode",
                url = %asset.source_url,
                vertices = d.mesh.vertices.len(),
                triangles = d.mesh.triangles.len(),
                scale = d.transform.scale,
                "asset decoded"
            ),
            Err(err) => warn!(
                target: "decode",
                url = %asset.source_url,
                error = %err,
                "asset failed to decode; viewers will show the fallback shape"
            ),
        }
        Self { asset, decoded }
    }

    pub fn asset(&self) -> &ModelAsset {
        &self.asset
    }

    pub fn decoded(&self) -> Result<&DecodedMesh, &DecodeError> {
        self.decoded.as_ref()
    }

    pub fn decode_error(&self) -> Option<&DecodeError> {
        self.decoded.as_ref().err()
    }
}
