use axum::{
    Json,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use tracing::error;

use crate::usecases::{payment_orchestrator::OrchestratorError, stripe_webhook::WebhookError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorErrorResponse {
    pub error: String,
    pub error_type: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookErrorResponse {
    pub error: String,
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        // Database and internal causes stay in the logs.
        let message = match &self {
            OrchestratorError::Database(source) | OrchestratorError::Internal(source) => {
                error!(error_type, error = ?source, "payment_orchestrator: request failed");
                self.to_string()
            }
            other => {
                error!(error_type, error = %other, "payment_orchestrator: request failed");
                other.to_string()
            }
        };

        let body = Json(OrchestratorErrorResponse {
            error: message,
            error_type: error_type.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        });

        (status, body).into_response()
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            WebhookError::Internal(source) => {
                error!(error = ?source, "stripe_webhook: handler failed");
                "Webhook handler failed".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(WebhookErrorResponse { error: message })).into_response()
    }
}
