//! Error types for persistence, bundles and exports.

use crate::types::SceneId;
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by the external data API.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("map {0} is not published")]
    NotPublished(SceneId),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ApiError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        ApiError::NotFound { entity, id }
    }
}

/// Failure while reading or writing a `.bibmap` bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("malformed bundle: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("import failed: {0}")]
    Api(#[from] ApiError),
}

/// Failure while producing a static export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("SVG error: {0}")]
    Svg(String),

    #[error("PNG error: {0}")]
    Png(String),
}
