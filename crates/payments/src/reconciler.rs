//! Wallet reconciliation: the gateway call and its propagation back into the
//! payment and the order.
//!
//! A wallet payment is settled in two hops. The wallet transaction records
//! the gateway outcome first, then the payment follows it. The hops are
//! separate saves, so each one is idempotent and [`WalletReconciler::recover`]
//! can finish a reconciliation that was interrupted between them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::AggregateId;
use domain::payment::{keys, wallet_keys};
use domain::{
    Aggregate, CommandHandler, DomainError, OrderPaymentStatus, OrderService, Payment,
    PaymentStatus, WalletFailureKind, WalletTransaction,
};
use store::{RecordQuery, RecordStore};

use crate::gateway::{GatewayError, WalletChargeReceipt, WalletChargeRequest, WalletGateway};

/// Reason recorded on a processing payment whose wallet leg was never opened.
const ORPHANED_REASON: &str = "wallet gateway error: dispatch interrupted before the wallet transaction was opened";

/// Settings for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Upper bound on one gateway call.
    pub gateway_timeout: Duration,
    /// Processing payments untouched for this long are picked up by the recovery sweep.
    pub stale_after: Duration,
    /// Attempts per save when a concurrent writer gets there first.
    pub conflict_attempts: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(30),
            stale_after: Duration::from_secs(60),
            conflict_attempts: 5,
        }
    }
}

/// What one recovery sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Processing payments old enough to be examined.
    pub examined: usize,
    /// Payments that reached a terminal state during the sweep.
    pub settled: usize,
    /// Processing payments with no wallet transaction, failed outright.
    pub orphaned: usize,
    /// Payments the sweep could not finish; they stay for the next run.
    pub errors: usize,
}

/// Drives wallet transactions through the gateway and reconciles the outcome.
pub struct WalletReconciler<S: RecordStore> {
    payments: CommandHandler<S, Payment>,
    wallets: CommandHandler<S, WalletTransaction>,
    orders: OrderService<S>,
    gateway: Arc<dyn WalletGateway>,
    config: ReconcilerConfig,
}

impl<S: RecordStore + Clone> Clone for WalletReconciler<S> {
    fn clone(&self) -> Self {
        Self {
            payments: self.payments.clone(),
            wallets: self.wallets.clone(),
            orders: self.orders.clone(),
            gateway: self.gateway.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: RecordStore + Clone> WalletReconciler<S> {
    pub fn new(
        store: S,
        orders: OrderService<S>,
        gateway: Arc<dyn WalletGateway>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            payments: CommandHandler::new(store.clone()),
            wallets: CommandHandler::new(store),
            orders,
            gateway,
            config,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Charges a wallet transaction and reconciles the outcome into its payment.
    ///
    /// A terminal wallet transaction is never sent to the gateway again; only
    /// the second hop runs, which changes nothing if the payment already
    /// followed. A transaction left in `PROCESSING` is charged again with its
    /// original reference.
    #[tracing::instrument(skip(self))]
    pub async fn process_wallet_payment(
        &self,
        wallet_id: AggregateId,
    ) -> Result<Payment, DomainError> {
        let mut wallet = self.wallets.get(wallet_id).await?;
        let payment_id = wallet_payment_id(&wallet)?;

        if wallet.is_terminal() {
            tracing::debug!(%wallet_id, status = %wallet.status(), "wallet transaction already terminal");
            return self.reconcile_payment(&wallet).await;
        }

        let payment = self.payments.get(payment_id).await?;
        let request = WalletChargeRequest {
            wallet_type: wallet.wallet_type(),
            wallet_phone: wallet.wallet_phone().to_string(),
            amount: wallet.amount(),
            currency: payment.currency().clone(),
            transaction_reference: wallet.transaction_reference().to_string(),
        };

        if wallet.status() == PaymentStatus::Pending {
            let payload = serde_json::to_value(&request)?;
            wallet = self
                .wallets
                .execute_with_retry(wallet_id, self.config.conflict_attempts, |w| {
                    if w.status() == PaymentStatus::Pending {
                        w.start_processing(payload.clone())
                    } else {
                        Ok(vec![])
                    }
                })
                .await?
                .aggregate;
        }

        let outcome = self.charge(request).await;
        wallet = self.record_outcome(wallet_id, outcome).await?;

        self.reconcile_payment(&wallet).await
    }

    /// Calls the gateway, bounded by the configured timeout.
    async fn charge(
        &self,
        request: WalletChargeRequest,
    ) -> Result<WalletChargeReceipt, GatewayError> {
        let reference = request.transaction_reference.clone();
        let started = Instant::now();

        let outcome = match tokio::time::timeout(
            self.config.gateway_timeout,
            self.gateway.charge(request),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(GatewayError::Timeout(self.config.gateway_timeout)),
        };

        metrics::histogram!("wallet_gateway_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        match &outcome {
            Ok(receipt) => {
                metrics::counter!("wallet_gateway_calls_total", "outcome" => "approved")
                    .increment(1);
                tracing::info!(%reference, wallet_transaction_id = %receipt.wallet_transaction_id, "wallet charge approved");
            }
            Err(e) => {
                metrics::counter!("wallet_gateway_calls_total", "outcome" => e.outcome())
                    .increment(1);
                tracing::warn!(%reference, kind = %e.failure_kind(), error = %e, "wallet charge failed");
            }
        }
        outcome
    }

    /// First hop: records the gateway outcome on the wallet transaction.
    async fn record_outcome(
        &self,
        wallet_id: AggregateId,
        outcome: Result<WalletChargeReceipt, GatewayError>,
    ) -> Result<WalletTransaction, DomainError> {
        let result = self
            .wallets
            .execute_with_retry(wallet_id, self.config.conflict_attempts, |w| {
                // Another worker may have recorded an outcome meanwhile
                if w.is_terminal() {
                    return Ok(vec![]);
                }
                match &outcome {
                    Ok(receipt) => w.complete(
                        receipt.wallet_transaction_id.clone(),
                        receipt.fees,
                        receipt.response_payload.clone(),
                    ),
                    Err(e) => w.fail(e.failure_kind(), e.to_string(), None),
                }
            })
            .await?;
        Ok(result.aggregate)
    }

    /// Second hop: moves the payment to the wallet transaction's outcome and
    /// updates the order's payment status.
    ///
    /// Does nothing to a payment that is already terminal, and nothing at all
    /// while the wallet transaction is still open. A collected charge meeting
    /// a failed payment is logged and counted for manual follow-up.
    #[tracing::instrument(skip(self, wallet), fields(wallet_id = ?wallet.id()))]
    pub async fn reconcile_payment(
        &self,
        wallet: &WalletTransaction,
    ) -> Result<Payment, DomainError> {
        let payment_id = wallet_payment_id(wallet)?;
        if !wallet.is_terminal() {
            return self.payments.get(payment_id).await;
        }

        let result = self
            .payments
            .execute_with_retry(payment_id, self.config.conflict_attempts, |p| {
                if p.status().is_terminal() {
                    return Ok(vec![]);
                }
                match wallet.status() {
                    PaymentStatus::Completed => {
                        let gateway_id = wallet.wallet_transaction_id().map(str::to_string);
                        match gateway_id {
                            Some(id) if p.status().can_settle() => p.settle(id),
                            id => p.confirm(id),
                        }
                    }
                    _ => p.reject(
                        wallet
                            .payment_failure_reason()
                            .unwrap_or_else(|| WalletFailureKind::GatewayError.payment_reason("no details")),
                    ),
                }
            })
            .await?;

        let payment = result.aggregate;
        if !result.events.is_empty() {
            let outcome = if payment.is_successful() { "completed" } else { "failed" };
            metrics::counter!("wallet_reconciliations_total", "outcome" => outcome).increment(1);
            tracing::info!(
                %payment_id,
                status = %payment.status(),
                reason = ?payment.failure_reason(),
                "payment reconciled from wallet transaction"
            );
        }
        if wallet.status() == PaymentStatus::Completed && payment.status() == PaymentStatus::Failed {
            metrics::counter!("wallet_reconciliations_total", "outcome" => "mismatch").increment(1);
            tracing::warn!(
                %payment_id,
                reference = %wallet.transaction_reference(),
                wallet_transaction_id = ?wallet.wallet_transaction_id(),
                "wallet charge collected for a failed payment"
            );
        }

        self.sync_order(&payment).await?;
        Ok(payment)
    }

    /// Fails a payment whose dispatch broke off, and the order's view of it.
    pub async fn fail_payment(
        &self,
        payment_id: AggregateId,
        reason: String,
    ) -> Result<Payment, DomainError> {
        let result = self
            .payments
            .execute_with_retry(payment_id, self.config.conflict_attempts, |p| {
                if p.status().is_terminal() {
                    Ok(vec![])
                } else {
                    p.reject(reason.clone())
                }
            })
            .await?;
        self.sync_order(&result.aggregate).await?;
        Ok(result.aggregate)
    }

    /// Applies a terminal payment outcome to the order's payment status.
    async fn sync_order(&self, payment: &Payment) -> Result<(), DomainError> {
        let status = match payment.status() {
            PaymentStatus::Completed => OrderPaymentStatus::Paid,
            PaymentStatus::Failed => OrderPaymentStatus::Failed,
            PaymentStatus::Refunded => OrderPaymentStatus::Refunded,
            _ => return Ok(()),
        };
        if let Some(order_id) = payment.order_id() {
            self.orders.update_payment_status(order_id, status).await?;
        }
        Ok(())
    }

    /// Finishes every stale `PROCESSING` payment.
    ///
    /// Payments whose wallet transaction is terminal only get the second hop.
    /// Open wallet transactions are charged again with their original
    /// reference. A processing payment without a wallet transaction is
    /// failed. Errors are logged and counted; the payment is retried on the
    /// next sweep.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> Result<RecoveryReport, DomainError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.stale_after)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let processing = self
            .payments
            .query(
                RecordQuery::for_type(Payment::aggregate_type())
                    .key(keys::STATUS, PaymentStatus::Processing.as_str()),
            )
            .await?;

        let mut report = RecoveryReport::default();
        for payment in processing {
            let Some(payment_id) = payment.id() else {
                continue;
            };
            if payment.updated_at().is_some_and(|at| at > cutoff) {
                continue;
            }
            report.examined += 1;

            match self.recover_payment(payment_id).await {
                Ok(Some(recovered)) if recovered.status().is_terminal() => report.settled += 1,
                Ok(Some(_)) => {}
                Ok(None) => report.orphaned += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(%payment_id, error = %e, "recovery failed, will retry");
                }
            }
        }

        if report.examined > 0 {
            metrics::counter!("wallet_reconciliations_total", "outcome" => "recovered")
                .increment(report.settled as u64);
            tracing::info!(
                examined = report.examined,
                settled = report.settled,
                orphaned = report.orphaned,
                errors = report.errors,
                "recovery sweep finished"
            );
        }
        Ok(report)
    }

    /// Resumes one payment. Returns `None` if it had no wallet transaction.
    async fn recover_payment(
        &self,
        payment_id: AggregateId,
    ) -> Result<Option<Payment>, DomainError> {
        let wallet = self
            .wallets
            .find_unique(wallet_keys::PAYMENT_ID, &payment_id.to_string())
            .await?;

        match wallet.and_then(|w| w.id()) {
            Some(wallet_id) => {
                tracing::warn!(%payment_id, %wallet_id, "resuming interrupted wallet payment");
                self.process_wallet_payment(wallet_id).await.map(Some)
            }
            None => {
                tracing::warn!(%payment_id, "processing payment has no wallet transaction");
                self.fail_payment(payment_id, ORPHANED_REASON.to_string())
                    .await?;
                Ok(None)
            }
        }
    }
}

fn wallet_payment_id(wallet: &WalletTransaction) -> Result<AggregateId, DomainError> {
    wallet.payment_id().ok_or_else(|| {
        DomainError::Integrity(format!(
            "wallet transaction {} has no payment",
            wallet.display_id()
        ))
    })
}
