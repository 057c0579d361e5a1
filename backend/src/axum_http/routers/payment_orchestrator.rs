use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Response},
    routing::post,
};
use fitcoach_shared::{
    domain::{
        repositories::{
            account_balances::AccountBalanceRepository, invoices::InvoiceRepository,
            payment_history::PaymentHistoryRepository, payments::PaymentRepository,
            stripe_customers::StripeCustomerRepository,
        },
        value_objects::payment_commands::{CommandError, PaymentRequest},
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            account_balances::AccountBalancePostgres, invoices::InvoicePostgres,
            payment_history::PaymentHistoryPostgres, payments::PaymentPostgres,
            stripe_customers::StripeCustomerPostgres,
        },
    },
    payments::stripe_client::StripeClient,
};
use tracing::info;

use crate::usecases::{
    payment_orchestrator::{OrchestratorError, PaymentOrchestratorUseCase},
    stripe_gateway::StripeGateway,
};

// Run example
//   curl -X POST "http://localhost:$SERVER_PORT_BACKEND/payment-orchestrator" \
//     -H "Content-Type: application/json" \
//     -d '{"action":"test-connection"}'

pub fn routes(db_pool: Arc<PgPoolSquad>, stripe_client: Arc<StripeClient>) -> Router {
    let usecase = PaymentOrchestratorUseCase::new(
        Arc::new(PaymentPostgres::new(Arc::clone(&db_pool))),
        Arc::new(PaymentHistoryPostgres::new(Arc::clone(&db_pool))),
        Arc::new(AccountBalancePostgres::new(Arc::clone(&db_pool))),
        Arc::new(StripeCustomerPostgres::new(Arc::clone(&db_pool))),
        Arc::new(InvoicePostgres::new(Arc::clone(&db_pool))),
        stripe_client,
    );

    router(Arc::new(usecase))
}

pub fn router<Pay, Hist, Bal, Cust, Inv, Stripe>(
    usecase: Arc<PaymentOrchestratorUseCase<Pay, Hist, Bal, Cust, Inv, Stripe>>,
) -> Router
where
    Pay: PaymentRepository + Send + Sync + 'static,
    Hist: PaymentHistoryRepository + Send + Sync + 'static,
    Bal: AccountBalanceRepository + Send + Sync + 'static,
    Cust: StripeCustomerRepository + Send + Sync + 'static,
    Inv: InvoiceRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    Router::new()
        .route("/", post(orchestrate::<Pay, Hist, Bal, Cust, Inv, Stripe>))
        .with_state(usecase)
}

pub async fn orchestrate<Pay, Hist, Bal, Cust, Inv, Stripe>(
    State(usecase): State<Arc<PaymentOrchestratorUseCase<Pay, Hist, Bal, Cust, Inv, Stripe>>>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> Response
where
    Pay: PaymentRepository + Send + Sync + 'static,
    Hist: PaymentHistoryRepository + Send + Sync + 'static,
    Bal: AccountBalanceRepository + Send + Sync + 'static,
    Cust: StripeCustomerRepository + Send + Sync + 'static,
    Inv: InvoiceRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return OrchestratorError::Command(CommandError::Validation(format!(
                "Invalid request body: {}",
                rejection.body_text()
            )))
            .into_response();
        }
    };

    info!(action = %request.action, "payment_orchestrator: request received");
    match usecase.execute(request).await {
        Ok(body) => Json(body).into_response(),
        Err(err) => err.into_response(),
    }
}
