use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::domain::value_objects::payment_commands::{
    CREATE_CHECKOUT_SESSION, CreateCheckoutSessionInput, PaymentRequest,
};

/// What the pricing page sends: the same input the orchestrator parses.
pub type CheckoutRequest = CreateCheckoutSessionInput;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRedirect {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrchestratorErrorBody {
    error: String,
    error_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum CheckoutInitiatorError {
    #[error("checkout rejected ({error_type}): {message}")]
    Rejected {
        status: u16,
        error_type: String,
        message: String,
    },
    #[error("payment orchestrator unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("payment orchestrator returned an unexpected body: {0}")]
    UnexpectedBody(String),
}

impl CheckoutInitiatorError {
    pub fn error_type(&self) -> &str {
        match self {
            CheckoutInitiatorError::Rejected { error_type, .. } => error_type,
            CheckoutInitiatorError::Transport(_) => "TransportError",
            CheckoutInitiatorError::UnexpectedBody(_) => "UnexpectedResponse",
        }
    }
}

/// Starts a hosted checkout through the payment orchestrator and hands back
/// the URL the browser should be redirected to.
pub struct CheckoutInitiator {
    http: reqwest::Client,
    orchestrator_url: Url,
    bearer_token: Option<String>,
}

impl CheckoutInitiator {
    pub fn new(orchestrator_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            orchestrator_url,
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn build_request(request: &CheckoutRequest) -> Result<PaymentRequest, serde_json::Error> {
        Ok(PaymentRequest {
            action: CREATE_CHECKOUT_SESSION.to_string(),
            params: Some(serde_json::to_value(request)?),
            data: None,
        })
    }

    pub async fn start_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutRedirect, CheckoutInitiatorError> {
        let body = Self::build_request(request)
            .map_err(|err| CheckoutInitiatorError::UnexpectedBody(err.to_string()))?;

        let mut builder = self.http.post(self.orchestrator_url.clone()).json(&body);
        if let Some(token) = &self.bearer_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        let redirect = parse_response(status.as_u16(), &text).inspect_err(|err| {
            error!(
                status = status.as_u16(),
                error_type = err.error_type(),
                error = %err,
                "checkout_initiator: orchestrator rejected checkout"
            );
        })?;

        info!(
            session_id = %redirect.session_id,
            "checkout_initiator: checkout session ready"
        );
        Ok(redirect)
    }
}

fn parse_response(status: u16, body: &str) -> Result<CheckoutRedirect, CheckoutInitiatorError> {
    if (200..300).contains(&status) {
        return serde_json::from_str::<CheckoutRedirect>(body)
            .map_err(|err| CheckoutInitiatorError::UnexpectedBody(err.to_string()));
    }

    match serde_json::from_str::<OrchestratorErrorBody>(body) {
        Ok(envelope) => Err(CheckoutInitiatorError::Rejected {
            status,
            error_type: envelope
                .error_type
                .unwrap_or_else(|| "UnknownError".to_string()),
            message: envelope.error,
        }),
        Err(_) => Err(CheckoutInitiatorError::Rejected {
            status,
            error_type: "UnknownError".to_string(),
            message: body.to_string(),
        }),
    }
}
