use std::{collections::BTreeMap, sync::Arc};

use anyhow::anyhow;
use chrono::Utc;
use fitcoach_shared::{
    domain::{
        entities::{
            account_balances::{BalanceCredit, CurrencyMismatch},
            invoices::ProviderInvoiceUpdate,
            payment_history::InsertPaymentHistoryEntity, payments::InsertPaymentEntity,
            payments::PaymentTransition, stripe_customers::InsertStripeCustomerEntity,
        },
        repositories::{
            account_balances::AccountBalanceRepository, invoices::InvoiceRepository,
            payment_history::PaymentHistoryRepository, payments::PaymentRepository,
            stripe_customers::StripeCustomerRepository,
        },
        value_objects::{
            enums::payment_statuses::PaymentStatus,
            money::{DEFAULT_CURRENCY, MinorUnits},
            payment_commands::{
                CommandError, CreateCheckoutSession, CreateInvoice, CreatePaymentIntent,
                PaymentCommand, PaymentRequest, UpdateAccountBalance, UpdatePaymentStatus,
            },
            payments::{
                AccountBalanceDto, CheckoutSessionCreatedDto, ConnectionStatusDto,
                InvoiceCreatedDto, PaymentDto, PaymentIntentCreatedDto, PaymentStatusUpdatedDto,
            },
            plans::SubscriptionPlanDto,
        },
    },
    payments::stripe_client::{
        CheckoutSessionParams, InvoiceItemParams, InvoiceParams, PaymentIntentParams,
    },
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::usecases::stripe_gateway::{StripeGateway, ts_to_datetime};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid payment status transition from {from} to {to}")]
    InvalidTransition { from: PaymentStatus, to: PaymentStatus },
    #[error("payment {0} changed while it was being updated; reload and retry")]
    Conflict(Uuid),
    #[error("Stripe is not configured")]
    ProcessorNotConfigured,
    #[error("payment processor error: {0}")]
    Processor(anyhow::Error),
    #[error("database error")]
    Database(anyhow::Error),
    #[error("internal error")]
    Internal(anyhow::Error),
}

impl OrchestratorError {
    pub fn error_type(&self) -> &'static str {
        match self {
            OrchestratorError::Command(CommandError::UnknownAction(_)) => "UnknownAction",
            OrchestratorError::Command(CommandError::Validation(_)) => "ValidationError",
            OrchestratorError::NotFound(_) => "NotFound",
            OrchestratorError::InvalidTransition { .. } => "InvalidTransition",
            OrchestratorError::Conflict(_) => "Conflict",
            OrchestratorError::ProcessorNotConfigured | OrchestratorError::Processor(_) => {
                "ProcessorError"
            }
            OrchestratorError::Database(_) => "DatabaseError",
            OrchestratorError::Internal(_) => "InternalError",
        }
    }

    /// Every orchestrator failure is reported as a 500 with a typed envelope.
    pub fn status_code(&self) -> axum::http::StatusCode {
        axum::http::StatusCode::INTERNAL_SERVER_ERROR
    }
}

pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

pub struct PaymentOrchestratorUseCase<Pay, Hist, Bal, Cust, Inv, Stripe>
where
    Pay: PaymentRepository + Send + Sync + 'static,
    Hist: PaymentHistoryRepository + Send + Sync + 'static,
    Bal: AccountBalanceRepository + Send + Sync + 'static,
    Cust: StripeCustomerRepository + Send + Sync + 'static,
    Inv: InvoiceRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    payment_repo: Arc<Pay>,
    history_repo: Arc<Hist>,
    balance_repo: Arc<Bal>,
    customer_repo: Arc<Cust>,
    invoice_repo: Arc<Inv>,
    stripe_client: Arc<Stripe>,
}

impl<Pay, Hist, Bal, Cust, Inv, Stripe> PaymentOrchestratorUseCase<Pay, Hist, Bal, Cust, Inv, Stripe>
where
    Pay: PaymentRepository + Send + Sync + 'static,
    Hist: PaymentHistoryRepository + Send + Sync + 'static,
    Bal: AccountBalanceRepository + Send + Sync + 'static,
    Cust: StripeCustomerRepository + Send + Sync + 'static,
    Inv: InvoiceRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    pub fn new(
        payment_repo: Arc<Pay>,
        history_repo: Arc<Hist>,
        balance_repo: Arc<Bal>,
        customer_repo: Arc<Cust>,
        invoice_repo: Arc<Inv>,
        stripe_client: Arc<Stripe>,
    ) -> Self {
        Self {
            payment_repo,
            history_repo,
            balance_repo,
            customer_repo,
            invoice_repo,
            stripe_client,
        }
    }

    pub async fn execute(&self, request: PaymentRequest) -> OrchestratorResult<Value> {
        let action = request.action.clone();
        let command = request.into_command().inspect_err(|err| {
            warn!(%action, error = %err, "payment_orchestrator: rejected request");
        })?;

        info!(action = command.action(), "payment_orchestrator: dispatching action");

        match command {
            PaymentCommand::TestConnection => to_json(self.test_connection()),
            PaymentCommand::CreatePaymentIntent(cmd) => {
                to_json(self.create_payment_intent(cmd).await?)
            }
            PaymentCommand::GetSubscriptionPlans => to_json(self.get_subscription_plans().await?),
            PaymentCommand::UpdatePaymentStatus(cmd) => {
                to_json(self.update_payment_status(cmd).await?)
            }
            PaymentCommand::UpdateAccountBalance(cmd) => {
                to_json(self.update_account_balance(cmd).await?)
            }
            PaymentCommand::CreateCheckoutSession(cmd) => {
                to_json(self.create_checkout_session(cmd).await?)
            }
            PaymentCommand::CreateInvoice(cmd) => to_json(self.create_invoice(cmd).await?),
        }
    }

    pub fn test_connection(&self) -> ConnectionStatusDto {
        ConnectionStatusDto {
            success: true,
            timestamp: Utc::now(),
            stripe_configured: self.stripe_client.is_configured(),
        }
    }

    pub async fn create_payment_intent(
        &self,
        cmd: CreatePaymentIntent,
    ) -> OrchestratorResult<PaymentIntentCreatedDto> {
        self.ensure_processor()?;

        let payment_id = match cmd.user_id {
            Some(user_id) => {
                let payment_id = self
                    .payment_repo
                    .create_payment(InsertPaymentEntity {
                        user_id: Some(user_id),
                        amount_minor: cmd.amount.get(),
                        currency: cmd.currency.clone(),
                        status: PaymentStatus::Pending.to_string(),
                        method: None,
                        description: cmd.description.clone(),
                        metadata: json!(cmd.metadata),
                    })
                    .await
                    .map_err(|err| {
                        error!(%user_id, db_error = ?err, "payment_orchestrator: failed to insert pending payment");
                        OrchestratorError::Database(err)
                    })?;
                Some(payment_id)
            }
            None => None,
        };

        let mut metadata: BTreeMap<String, String> = cmd.metadata.into_iter().collect();
        if let Some(user_id) = cmd.user_id {
            metadata.insert("user_id".to_string(), user_id.to_string());
        }
        if let Some(payment_id) = payment_id {
            metadata.insert("payment_id".to_string(), payment_id.to_string());
        }

        let intent = match self
            .stripe_client
            .create_payment_intent(PaymentIntentParams {
                amount_minor: cmd.amount.get(),
                currency: cmd.currency,
                customer: None,
                description: cmd.description,
                metadata,
                idempotency_key: cmd.idempotency_key,
            })
            .await
        {
            Ok(intent) => intent,
            Err(err) => {
                error!(payment_id = ?payment_id, error = ?err, "payment_orchestrator: payment intent creation failed");
                if let Some(payment_id) = payment_id {
                    if let Err(db_err) = self
                        .payment_repo
                        .mark_failed(payment_id, &err.to_string())
                        .await
                    {
                        error!(%payment_id, db_error = ?db_err, "payment_orchestrator: failed to mark payment failed");
                    }
                }
                return Err(OrchestratorError::Processor(err));
            }
        };

        if let Some(payment_id) = payment_id {
            self.payment_repo
                .merge_metadata(payment_id, json!({ "payment_intent_id": intent.id }))
                .await
                .map_err(|err| {
                    error!(%payment_id, db_error = ?err, "payment_orchestrator: failed to attach payment intent");
                    OrchestratorError::Database(err)
                })?;
        }

        info!(payment_intent_id = %intent.id, payment_id = ?payment_id, "payment_orchestrator: payment intent created");

        Ok(PaymentIntentCreatedDto {
            client_secret: intent.client_secret,
            payment_intent_id: intent.id,
            payment_id,
        })
    }

    pub async fn get_subscription_plans(&self) -> OrchestratorResult<Vec<SubscriptionPlanDto>> {
        self.ensure_processor()?;

        let prices = self
            .stripe_client
            .list_recurring_prices()
            .await
            .map_err(|err| {
                error!(error = ?err, "payment_orchestrator: failed to list prices");
                OrchestratorError::Processor(err)
            })?;

        let plans: Vec<SubscriptionPlanDto> = prices
            .into_iter()
            .filter(|price| price.active)
            .map(SubscriptionPlanDto::from)
            .collect();

        info!(plan_count = plans.len(), "payment_orchestrator: subscription plans loaded");
        Ok(plans)
    }

    pub async fn update_payment_status(
        &self,
        cmd: UpdatePaymentStatus,
    ) -> OrchestratorResult<PaymentStatusUpdatedDto> {
        let payment_id = cmd.payment_id;
        let payment = self
            .payment_repo
            .find_by_id(payment_id)
            .await
            .map_err(|err| {
                error!(%payment_id, db_error = ?err, "payment_orchestrator: failed to load payment");
                OrchestratorError::Database(err)
            })?
            .ok_or_else(|| OrchestratorError::NotFound(format!("payment {payment_id}")))?;

        let current = PaymentStatus::from_str(&payment.status).ok_or_else(|| {
            OrchestratorError::Internal(anyhow!(
                "payment {payment_id} has unknown status {}",
                payment.status
            ))
        })?;

        if !current.can_transition_to(cmd.status) {
            warn!(%payment_id, from = %current, to = %cmd.status, "payment_orchestrator: rejected payment status transition");
            return Err(OrchestratorError::InvalidTransition {
                from: current,
                to: cmd.status,
            });
        }

        if current == cmd.status {
            info!(%payment_id, status = %current, "payment_orchestrator: payment already in requested status");
            return Ok(PaymentStatusUpdatedDto {
                payment: PaymentDto::from(payment),
                balance: None,
            });
        }

        let credit = match cmd.amount.filter(|amount| amount.is_positive()) {
            Some(amount) if cmd.status == PaymentStatus::Completed => {
                let user_id = cmd.user_id.or(payment.user_id).ok_or_else(|| {
                    CommandError::Validation(
                        "userId is required to credit a completed payment".to_string(),
                    )
                })?;
                Some(BalanceCredit {
                    user_id,
                    amount_minor: amount.get(),
                    currency: payment.currency.clone(),
                    description: Some(format!("Payment {payment_id} completed")),
                    metadata: json!({ "payment_id": payment_id, "source": "payment_completed" }),
                })
            }
            _ => None,
        };

        let outcome = self
            .payment_repo
            .transition_status(PaymentTransition {
                payment_id,
                expected_status: current.to_string(),
                status: cmd.status.to_string(),
                method: cmd.method,
                credit,
            })
            .await
            .map_err(|err| {
                error!(%payment_id, db_error = ?err, "payment_orchestrator: payment status transaction failed");
                balance_error(err)
            })?
            .ok_or_else(|| {
                warn!(%payment_id, expected = %current, "payment_orchestrator: payment status changed concurrently");
                OrchestratorError::Conflict(payment_id)
            })?;

        info!(
            %payment_id,
            from = %current,
            to = %cmd.status,
            credited = outcome.balance.is_some(),
            "payment_orchestrator: payment status updated"
        );

        Ok(PaymentStatusUpdatedDto {
            payment: PaymentDto::from(outcome.payment),
            balance: outcome.balance.map(AccountBalanceDto::from),
        })
    }

    pub async fn update_account_balance(
        &self,
        cmd: UpdateAccountBalance,
    ) -> OrchestratorResult<AccountBalanceDto> {
        let user_id = cmd.user_id;
        let balance = self
            .balance_repo
            .apply_credit(BalanceCredit {
                user_id,
                amount_minor: cmd.amount.get(),
                currency: cmd.currency,
                description: cmd.description,
                metadata: json!({ "source": "balance_adjustment" }),
            })
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "payment_orchestrator: failed to update balance");
                balance_error(err)
            })?;

        info!(%user_id, delta = %cmd.amount, balance_minor = balance.balance_minor, "payment_orchestrator: account balance updated");
        Ok(AccountBalanceDto::from(balance))
    }

    pub async fn create_checkout_session(
        &self,
        cmd: CreateCheckoutSession,
    ) -> OrchestratorResult<CheckoutSessionCreatedDto> {
        self.ensure_processor()?;

        let customer = match cmd.user_id {
            Some(user_id) => self
                .customer_repo
                .find_customer_id_by_user(user_id)
                .await
                .map_err(|err| {
                    error!(%user_id, db_error = ?err, "payment_orchestrator: failed to load stripe customer");
                    OrchestratorError::Database(err)
                })?,
            None => None,
        };

        let mut metadata = BTreeMap::new();
        if let Some(user_id) = cmd.user_id {
            metadata.insert("user_id".to_string(), user_id.to_string());
        }
        if let Some(plan_id) = &cmd.plan_id {
            metadata.insert("plan_id".to_string(), plan_id.clone());
        }
        if !cmd.addons.is_empty() {
            let addons = serde_json::to_string(&cmd.addons)
                .map_err(|err| OrchestratorError::Internal(err.into()))?;
            metadata.insert("addons".to_string(), addons);
        }
        if let Some(quiz_result_id) = cmd.quiz_result_id {
            metadata.insert("quiz_result_id".to_string(), quiz_result_id.to_string());
        }

        let mut line_items = vec![cmd.price_id.clone()];
        line_items.extend(cmd.addons.iter().filter_map(|addon| addon.price_id.clone()));

        let addons_total = cmd
            .addons
            .iter()
            .try_fold(MinorUnits::ZERO, |total, addon| total.checked_add(addon.amount))
            .ok_or_else(|| CommandError::Validation("addon amounts overflow".to_string()))?;

        let history_entry = match cmd.user_id {
            Some(user_id) => {
                let entry_id = self
                    .history_repo
                    .record_entry(InsertPaymentHistoryEntity {
                        user_id,
                        amount_minor: addons_total.get(),
                        currency: DEFAULT_CURRENCY.to_string(),
                        status: PaymentStatus::Pending.to_string(),
                        description: Some(match &cmd.plan_id {
                            Some(plan_id) => format!("Checkout for plan {plan_id}"),
                            None => "Checkout".to_string(),
                        }),
                        metadata: json!({
                            "price_id": cmd.price_id,
                            "plan_id": cmd.plan_id,
                            "mode": cmd.mode,
                            "addons": cmd.addons,
                        }),
                    })
                    .await
                    .map_err(|err| {
                        error!(%user_id, db_error = ?err, "payment_orchestrator: failed to record pending checkout");
                        OrchestratorError::Database(err)
                    })?;
                Some(entry_id)
            }
            None => None,
        };

        let session = match self
            .stripe_client
            .create_checkout_session(CheckoutSessionParams {
                mode: cmd.mode.to_string(),
                line_items,
                customer_email: if customer.is_none() {
                    cmd.user_email.clone()
                } else {
                    None
                },
                customer,
                metadata,
                success_url: cmd.success_url,
                cancel_url: cmd.cancel_url,
            })
            .await
        {
            Ok(session) => session,
            Err(err) => {
                error!(user_id = ?cmd.user_id, error = ?err, "payment_orchestrator: checkout session creation failed");
                if let Some(entry_id) = history_entry {
                    if let Err(db_err) = self
                        .history_repo
                        .mark_failed(entry_id, &err.to_string())
                        .await
                    {
                        error!(%entry_id, db_error = ?db_err, "payment_orchestrator: failed to mark checkout failed");
                    }
                }
                return Err(OrchestratorError::Processor(err));
            }
        };

        if let Some(entry_id) = history_entry {
            self.history_repo
                .attach_checkout_session(entry_id, &session.id)
                .await
                .map_err(|err| {
                    error!(%entry_id, session_id = %session.id, db_error = ?err, "payment_orchestrator: failed to attach checkout session");
                    OrchestratorError::Database(err)
                })?;
        }

        let url = session.url.ok_or_else(|| {
            OrchestratorError::Processor(anyhow!("Stripe Checkout session URL is missing"))
        })?;

        info!(session_id = %session.id, user_id = ?cmd.user_id, "payment_orchestrator: checkout session created");

        Ok(CheckoutSessionCreatedDto {
            session_id: session.id,
            url,
        })
    }

    pub async fn create_invoice(&self, cmd: CreateInvoice) -> OrchestratorResult<InvoiceCreatedDto> {
        self.ensure_processor()?;

        let customer = self
            .resolve_customer(&cmd.customer_email, cmd.customer_name.clone(), cmd.user_id)
            .await?;

        let mut metadata = BTreeMap::new();
        if let Some(invoice_id) = cmd.invoice_id {
            metadata.insert("invoice_id".to_string(), invoice_id.to_string());
        }
        if let Some(user_id) = cmd.user_id {
            metadata.insert("user_id".to_string(), user_id.to_string());
        }

        let invoice = self
            .stripe_client
            .create_invoice(InvoiceParams {
                customer: customer.clone(),
                days_until_due: cmd.days_until_due,
                description: cmd.description.clone(),
                metadata,
            })
            .await
            .map_err(OrchestratorError::Processor)?;

        self.stripe_client
            .create_invoice_item(InvoiceItemParams {
                customer,
                invoice: invoice.id.clone(),
                amount_minor: cmd.amount.get(),
                currency: cmd.currency,
                description: cmd.description,
            })
            .await
            .map_err(OrchestratorError::Processor)?;

        let finalized = self
            .stripe_client
            .finalize_invoice(&invoice.id)
            .await
            .map_err(OrchestratorError::Processor)?;

        let sent = self
            .stripe_client
            .send_invoice(&invoice.id)
            .await
            .map_err(OrchestratorError::Processor)?;

        let hosted_invoice_url = sent.hosted_invoice_url.or(finalized.hosted_invoice_url);
        let status = sent
            .status
            .or(finalized.status)
            .unwrap_or_else(|| "open".to_string());

        if let Some(invoice_id) = cmd.invoice_id {
            let attached = self
                .invoice_repo
                .attach_provider_invoice(
                    invoice_id,
                    ProviderInvoiceUpdate {
                        stripe_invoice_id: sent.id.clone(),
                        status: status.clone(),
                        hosted_invoice_url: hosted_invoice_url.clone(),
                        issued_at: sent.created.and_then(ts_to_datetime),
                        due_at: sent.due_date.and_then(ts_to_datetime),
                    },
                )
                .await
                .map_err(|err| {
                    error!(%invoice_id, stripe_invoice_id = %sent.id, db_error = ?err, "payment_orchestrator: failed to persist invoice");
                    OrchestratorError::Database(err)
                })?;

            if !attached {
                warn!(%invoice_id, stripe_invoice_id = %sent.id, "payment_orchestrator: invoice record not found; stripe invoice was still sent");
            }
        }

        info!(stripe_invoice_id = %sent.id, %status, "payment_orchestrator: invoice sent");

        Ok(InvoiceCreatedDto {
            stripe_invoice_id: sent.id,
            hosted_invoice_url,
            status,
            invoice_id: cmd.invoice_id,
        })
    }

    /// Local mapping first, then the processor's customer search, then a new customer.
    async fn resolve_customer(
        &self,
        email: &str,
        name: Option<String>,
        user_id: Option<Uuid>,
    ) -> OrchestratorResult<String> {
        if let Some(customer_id) = self
            .customer_repo
            .find_customer_id_by_email(email)
            .await
            .map_err(OrchestratorError::Database)?
        {
            return Ok(customer_id);
        }

        let customer_id = match self
            .stripe_client
            .find_customer_by_email(email)
            .await
            .map_err(OrchestratorError::Processor)?
        {
            Some(customer_id) => customer_id,
            None => {
                let customer_id = self
                    .stripe_client
                    .create_customer(email, name, user_id)
                    .await
                    .map_err(OrchestratorError::Processor)?;
                info!(stripe_customer_id = %customer_id, "payment_orchestrator: stripe customer created");
                customer_id
            }
        };

        self.customer_repo
            .link_customer(InsertStripeCustomerEntity {
                user_id,
                stripe_customer_id: customer_id.clone(),
                email: Some(email.to_ascii_lowercase()),
            })
            .await
            .map_err(|err| {
                error!(stripe_customer_id = %customer_id, db_error = ?err, "payment_orchestrator: failed to store customer mapping");
                OrchestratorError::Database(err)
            })?;

        Ok(customer_id)
    }

    fn ensure_processor(&self) -> OrchestratorResult<()> {
        if self.stripe_client.is_configured() {
            Ok(())
        } else {
            Err(OrchestratorError::ProcessorNotConfigured)
        }
    }
}

/// Currency mismatches are caller errors; anything else from a balance write is a database failure.
fn balance_error(err: anyhow::Error) -> OrchestratorError {
    match err.downcast_ref::<CurrencyMismatch>() {
        Some(mismatch) => CommandError::Validation(mismatch.to_string()).into(),
        None => OrchestratorError::Database(err),
    }
}

fn to_json<T: Serialize>(value: T) -> OrchestratorResult<Value> {
    serde_json::to_value(value).map_err(|err| OrchestratorError::Internal(err.into()))
}
