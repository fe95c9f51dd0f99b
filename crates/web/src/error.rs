//! API error envelope.
//!
//! Client-facing messages are generic French strings; the precise
//! failure cause goes to the logs at the point where the error is
//! constructed, never over the wire.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Non authentifié")]
    Unauthenticated,
    #[error("Paramètre invalide: {0}")]
    InvalidParam(&'static str),
    #[error("Erreur lors de l'analyse IA")]
    Analysis,
    #[error("Erreur lors de la génération du persona")]
    PersonaGeneration,
    #[error("Erreur serveur")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::InvalidParam(_) => StatusCode::BAD_REQUEST,
            Self::Analysis | Self::PersonaGeneration | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

/// Log the underlying cause and map it to the generic server error.
pub fn internal(error: &anyhow::Error) -> ApiError {
    tracing::error!(error = %error, "request failed");
    ApiError::Internal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_envelope_shape() {
        let response = ApiError::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Non authentifié");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::InvalidParam("limit").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Analysis.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::PersonaGeneration.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
