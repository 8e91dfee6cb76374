//! Payment service: creation, method dispatch, and manual transitions.

use std::sync::Arc;

use common::AggregateId;
use domain::money::MONEY_SCALE;
use domain::payment::{InitiatePayment, OpenWalletTransaction, keys, wallet_keys};
use domain::{
    Aggregate, CommandHandler, CommandResult, CreatePayment, DomainError, Money,
    OrderPaymentStatus, OrderService, OrderStatus, Payment, PaymentError, PaymentRoute,
    PaymentStatus, WalletTransaction, WalletType,
};
use serde::Serialize;
use store::{EventEnvelope, RecordQuery, RecordStore};
use tokio::task::JoinHandle;

use crate::gateway::WalletGateway;
use crate::reconciler::{ReconcilerConfig, WalletReconciler};

const PAYMENT_DISPLAY_ID_SEQUENCE: &str = "payment_display_id";
const WALLET_DISPLAY_ID_SEQUENCE: &str = "wallet_display_id";

/// Background reconciliation of an e-wallet payment.
pub type Reconciliation = JoinHandle<Result<Payment, DomainError>>;

/// Outcome of [`PaymentService::create_payment`].
#[derive(Debug)]
pub struct PaymentCreated {
    /// The payment as it stood when creation returned: `PENDING` for cash and
    /// bank transfers, `PROCESSING` for e-wallets.
    pub payment: Payment,
    pub wallet_transaction: Option<WalletTransaction>,
    /// The gateway call running in the background, for e-wallets.
    pub reconciliation: Option<Reconciliation>,
}

/// Count and total of payments in one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub status: PaymentStatus,
    pub count: u64,
    pub total_amount: Money,
}

/// Generates a prefixed reference with 32 uppercase hex characters.
fn generate_reference(prefix: &str) -> String {
    format!(
        "{prefix}-{}",
        uuid::Uuid::new_v4().simple().to_string().to_ascii_uppercase()
    )
}

fn record_transition(transition: &'static str) {
    metrics::counter!("payment_transitions_total", "transition" => transition).increment(1);
}

/// Service for payment operations.
///
/// Cash on delivery and bank transfers wait in `PENDING` for a manual
/// confirmation. E-wallet payments are handed to the [`WalletReconciler`] on
/// a background task; creation returns as soon as the payment is `PROCESSING`.
pub struct PaymentService<S: RecordStore> {
    payments: CommandHandler<S, Payment>,
    wallets: CommandHandler<S, WalletTransaction>,
    orders: OrderService<S>,
    reconciler: WalletReconciler<S>,
}

impl<S: RecordStore + Clone> Clone for PaymentService<S> {
    fn clone(&self) -> Self {
        Self {
            payments: self.payments.clone(),
            wallets: self.wallets.clone(),
            orders: self.orders.clone(),
            reconciler: self.reconciler.clone(),
        }
    }
}

impl<S: RecordStore + Clone + 'static> PaymentService<S> {
    /// Creates a new payment service.
    pub fn new(
        store: S,
        orders: OrderService<S>,
        gateway: Arc<dyn WalletGateway>,
        config: ReconcilerConfig,
    ) -> Self {
        let reconciler = WalletReconciler::new(store.clone(), orders.clone(), gateway, config);
        Self {
            payments: CommandHandler::new(store.clone()),
            wallets: CommandHandler::new(store),
            orders,
            reconciler,
        }
    }

    pub fn reconciler(&self) -> &WalletReconciler<S> {
        &self.reconciler
    }

    /// Creates a payment attempt and dispatches it by method.
    ///
    /// Input is validated before anything is written. If dispatch fails once
    /// the payment exists, the payment is marked `FAILED` before the error is
    /// returned.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, method = %cmd.payment_method))]
    pub async fn create_payment(&self, cmd: CreatePayment) -> Result<PaymentCreated, DomainError> {
        if !cmd.amount.is_positive() {
            return Err(PaymentError::InvalidAmount(cmd.amount).into());
        }
        if cmd.amount.scale() > MONEY_SCALE {
            return Err(PaymentError::TooManyDecimalPlaces(cmd.amount).into());
        }
        let wallet_phone = match cmd.payment_method.wallet_type() {
            Some(wallet_type) => Some(validate_wallet_phone(wallet_type, cmd.wallet_phone.as_deref())?),
            None => None,
        };

        let order = self.orders.get_order(cmd.order_id).await?;
        if order.status() == OrderStatus::Cancelled {
            return Err(PaymentError::OrderNotPayable {
                order_status: order.status().to_string(),
            }
            .into());
        }
        let currency = cmd.currency.clone().unwrap_or_else(|| order.currency().clone());
        if &currency != order.currency() {
            return Err(PaymentError::CurrencyMismatch {
                expected: order.currency().to_string(),
                found: currency.to_string(),
            }
            .into());
        }
        let order_total = order.amounts().total_amount;
        if cmd.amount > order_total {
            return Err(PaymentError::AmountExceedsOrderTotal {
                amount: cmd.amount,
                order_total,
            }
            .into());
        }

        let sequence = self
            .payments
            .store()
            .next_sequence(PAYMENT_DISPLAY_ID_SEQUENCE)
            .await?;
        let payment_id = AggregateId::new();
        let initiate = InitiatePayment {
            payment_id,
            display_id: format!("PAY-{sequence:06}"),
            transaction_id: generate_reference("TXN"),
            order_id: cmd.order_id,
            payment_method: cmd.payment_method,
            amount: cmd.amount,
            currency,
            bank_reference: cmd.bank_reference.clone(),
        };
        let payment = self
            .payments
            .create(payment_id, |p| p.initiate(initiate))
            .await?
            .aggregate;

        metrics::counter!("payments_created_total", "method" => cmd.payment_method.as_str())
            .increment(1);
        tracing::info!(
            %payment_id,
            display_id = %payment.display_id(),
            amount = %payment.amount(),
            gateway = %payment.payment_gateway(),
            "payment created"
        );

        match cmd.payment_method.route() {
            PaymentRoute::Wallet(_) => {
                let phone = wallet_phone.unwrap_or_default();
                match self.dispatch_wallet(&payment, phone).await {
                    Ok(created) => Ok(created),
                    Err(e) => {
                        tracing::error!(%payment_id, error = %e, "wallet dispatch failed");
                        if let Err(fail_err) = self
                            .reconciler
                            .fail_payment(payment_id, format!("wallet dispatch failed: {e}"))
                            .await
                        {
                            tracing::error!(
                                %payment_id,
                                error = %fail_err,
                                "could not mark payment failed after dispatch error"
                            );
                        }
                        Err(e)
                    }
                }
            }
            PaymentRoute::OnCollection | PaymentRoute::ManualReconciliation => Ok(PaymentCreated {
                payment,
                wallet_transaction: None,
                reconciliation: None,
            }),
        }
    }

    /// Moves the payment to `PROCESSING`, opens its wallet leg, and starts
    /// the gateway call in the background.
    async fn dispatch_wallet(
        &self,
        payment: &Payment,
        wallet_phone: String,
    ) -> Result<PaymentCreated, DomainError> {
        let payment_id = payment
            .id()
            .ok_or_else(|| DomainError::Integrity("payment has no id".to_string()))?;

        let payment = self
            .payments
            .execute(payment_id, |p| p.mark_processing())
            .await?
            .aggregate;
        record_transition("start_processing");

        let sequence = self
            .wallets
            .store()
            .next_sequence(WALLET_DISPLAY_ID_SEQUENCE)
            .await?;
        let wallet_id = AggregateId::new();
        let open = OpenWalletTransaction {
            wallet_id,
            display_id: format!("WTX-{sequence:06}"),
            transaction_reference: generate_reference("WR"),
            payment_id,
            payment_method: payment.payment_method(),
            wallet_phone,
            amount: payment.amount(),
            payment_amount: payment.amount(),
        };
        let wallet = self
            .wallets
            .create(wallet_id, |w| w.open(open))
            .await?
            .aggregate;
        tracing::info!(
            %payment_id,
            %wallet_id,
            reference = %wallet.transaction_reference(),
            "wallet transaction opened"
        );

        let reconciler = self.reconciler.clone();
        let reconciliation = tokio::spawn(async move {
            let result = reconciler.process_wallet_payment(wallet_id).await;
            if let Err(e) = &result {
                tracing::error!(%wallet_id, error = %e, "wallet reconciliation failed");
            }
            result
        });

        Ok(PaymentCreated {
            payment,
            wallet_transaction: Some(wallet),
            reconciliation: Some(reconciliation),
        })
    }

    /// Confirms a pending payment, e.g. on cash collection, and marks the
    /// order paid. A pending order is confirmed as a result.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        payment_id: AggregateId,
        gateway_transaction_id: Option<String>,
    ) -> Result<CommandResult<Payment>, DomainError> {
        let result = self
            .payments
            .execute(payment_id, |p| p.confirm(gateway_transaction_id))
            .await?;
        record_transition("confirm");
        tracing::info!(%payment_id, "payment confirmed");

        self.sync_order(&result.aggregate, OrderPaymentStatus::Paid)
            .await?;
        Ok(result)
    }

    /// Fails a payment that hasn't reached a terminal state.
    ///
    /// A wallet payment can only be rejected once its wallet transaction has
    /// failed; while the charge is open or after it was collected the
    /// outcome belongs to the gateway.
    #[tracing::instrument(skip(self))]
    pub async fn reject_payment(
        &self,
        payment_id: AggregateId,
        reason: String,
    ) -> Result<CommandResult<Payment>, DomainError> {
        if let Some(wallet) = self.wallet_for_payment(payment_id).await?
            && wallet.status() != PaymentStatus::Failed
        {
            tracing::warn!(%payment_id, wallet_status = %wallet.status(), "manual reject refused");
            return Err(PaymentError::WalletLegUnsettled {
                wallet_status: wallet.status(),
            }
            .into());
        }

        let result = self
            .payments
            .execute(payment_id, |p| p.reject(reason))
            .await?;
        record_transition("reject");
        tracing::info!(%payment_id, reason = ?result.aggregate.failure_reason(), "payment rejected");

        self.sync_order(&result.aggregate, OrderPaymentStatus::Failed)
            .await?;
        Ok(result)
    }

    /// Refunds a completed payment and marks the order refunded.
    #[tracing::instrument(skip(self))]
    pub async fn refund_payment(
        &self,
        payment_id: AggregateId,
        reason: Option<String>,
    ) -> Result<CommandResult<Payment>, DomainError> {
        let result = self
            .payments
            .execute(payment_id, |p| p.refund(reason))
            .await?;
        record_transition("refund");
        tracing::info!(%payment_id, "payment refunded");

        self.sync_order(&result.aggregate, OrderPaymentStatus::Refunded)
            .await?;
        Ok(result)
    }

    /// Abandons a pending payment. The order is left as it is.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_payment(
        &self,
        payment_id: AggregateId,
        reason: Option<String>,
    ) -> Result<CommandResult<Payment>, DomainError> {
        let result = self
            .payments
            .execute(payment_id, |p| p.cancel(reason))
            .await?;
        record_transition("cancel");
        tracing::info!(%payment_id, "payment cancelled");
        Ok(result)
    }

    async fn sync_order(
        &self,
        payment: &Payment,
        status: OrderPaymentStatus,
    ) -> Result<(), DomainError> {
        if let Some(order_id) = payment.order_id() {
            self.orders.update_payment_status(order_id, status).await?;
        }
        Ok(())
    }

    /// Loads a payment by ID, failing with `NotFound` if it doesn't exist.
    pub async fn get_payment(&self, payment_id: AggregateId) -> Result<Payment, DomainError> {
        self.payments.get(payment_id).await
    }

    /// Finds a payment by UUID, display ID, or transaction ID.
    pub async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>, DomainError> {
        if let Some(id) = AggregateId::parse(reference) {
            return self.payments.load(id).await;
        }
        if let Some(payment) = self
            .payments
            .find_unique(keys::DISPLAY_ID, reference)
            .await?
        {
            return Ok(Some(payment));
        }
        self.payments
            .find_unique(keys::TRANSACTION_ID, reference)
            .await
    }

    /// Like [`find_by_reference`](Self::find_by_reference), failing with `NotFound`.
    pub async fn get_by_reference(&self, reference: &str) -> Result<Payment, DomainError> {
        self.find_by_reference(reference)
            .await?
            .ok_or_else(|| DomainError::not_found(Payment::aggregate_type(), reference))
    }

    /// Lists every payment attempt for an order, oldest first.
    pub async fn list_by_order(&self, order_id: AggregateId) -> Result<Vec<Payment>, DomainError> {
        self.payments
            .query(
                RecordQuery::for_type(Payment::aggregate_type())
                    .key(keys::ORDER_ID, order_id.to_string()),
            )
            .await
    }

    /// Returns the wallet leg of a payment, if it has one.
    pub async fn wallet_for_payment(
        &self,
        payment_id: AggregateId,
    ) -> Result<Option<WalletTransaction>, DomainError> {
        self.wallets
            .find_unique(wallet_keys::PAYMENT_ID, &payment_id.to_string())
            .await
    }

    pub async fn get_wallet_transaction(
        &self,
        wallet_id: AggregateId,
    ) -> Result<WalletTransaction, DomainError> {
        self.wallets.get(wallet_id).await
    }

    /// Finds a wallet transaction by the reference sent to the gateway.
    pub async fn find_wallet_by_reference(
        &self,
        transaction_reference: &str,
    ) -> Result<Option<WalletTransaction>, DomainError> {
        self.wallets
            .find_unique(wallet_keys::TRANSACTION_REFERENCE, transaction_reference)
            .await
    }

    /// Returns the audit log of a payment.
    pub async fn history(&self, payment_id: AggregateId) -> Result<Vec<EventEnvelope>, DomainError> {
        self.payments.get(payment_id).await?;
        self.payments.history(payment_id).await
    }

    /// Number of payments in a status.
    pub async fn count_by_status(&self, status: PaymentStatus) -> Result<u64, DomainError> {
        let count = self
            .payments
            .store()
            .count(status_query(status))
            .await?;
        Ok(count)
    }

    /// Sum of payment amounts in a status.
    pub async fn sum_by_status(&self, status: PaymentStatus) -> Result<Money, DomainError> {
        let payments = self.payments.query(status_query(status)).await?;
        Money::checked_sum(payments.iter().map(Payment::amount))
            .ok_or_else(|| PaymentError::TotalOutOfRange { status }.into())
    }

    /// Count and total per status, for every status.
    pub async fn stats(&self) -> Result<Vec<StatusSummary>, DomainError> {
        let mut summaries = Vec::with_capacity(PaymentStatus::ALL.len());
        for status in PaymentStatus::ALL {
            summaries.push(StatusSummary {
                status,
                count: self.count_by_status(status).await?,
                total_amount: self.sum_by_status(status).await?,
            });
        }
        Ok(summaries)
    }
}

fn status_query(status: PaymentStatus) -> RecordQuery {
    RecordQuery::for_type(Payment::aggregate_type()).key(keys::STATUS, status.as_str())
}

fn validate_wallet_phone(
    wallet_type: WalletType,
    phone: Option<&str>,
) -> Result<String, PaymentError> {
    match phone.map(str::trim).filter(|p| !p.is_empty()) {
        Some(phone) => wallet_type.validate_phone(phone),
        None => Err(PaymentError::MissingWalletPhone(wallet_type)),
    }
}
