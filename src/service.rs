//! Service layer API for the payment confirmation workflow
use super::error::PaymentError;
use super::ledger::{self, PaymentConfirmation, ReceiptLedger};
use super::order::{Order, OrderBook};
use super::types::TimeStamp;
use super::utils::{from_cbor, to_cbor};
use super::validation::{ConfirmRequest, VerifyRequest};
use sled::Transactional;
use sled::transaction::abort;
use std::sync::Arc;
use tracing::{info, warn};

pub struct PaymentService {
    instance: Arc<sled::Db>,
    orders: OrderBook,
    ledger: ReceiptLedger,
    verifier_id: String,
}

impl PaymentService {
    pub fn new(instance: Arc<sled::Db>, verifier_id: impl Into<String>) -> Result<Self, PaymentError> {
        let orders = OrderBook::open(&instance)?;
        let ledger = ReceiptLedger::open(&instance)?;

        Ok(Self {
            instance,
            orders,
            ledger,
            verifier_id: verifier_id.into(),
        })
    }

    pub fn orders(&self) -> &OrderBook {
        &self.orders
    }

    pub fn ledger(&self) -> &ReceiptLedger {
        &self.ledger
    }

    /// Flushes pending writes to disk.
    pub async fn flush(&self) -> Result<(), PaymentError> {
        self.instance.flush_async().await?;
        Ok(())
    }

    /// Records a customer's claim of having paid for an order.
    ///
    /// The claim must repeat the order's number, phone and total exactly. The
    /// ledger entry and the order's payment metadata are written in one
    /// transaction, which also re-checks the receipt code index so that two
    /// concurrent claims with the same code cannot both succeed.
    pub fn confirm_payment(&self, request: ConfirmRequest) -> Result<PaymentConfirmation, PaymentError> {
        let raw_metadata =
            serde_json::to_string(&request).map_err(|e| PaymentError::Codec(e.to_string()))?;
        let claim = request.validate()?;

        let order = self.orders.lookup(&claim.order_id)?;
        if !order.matches(&claim) {
            warn!(order_id = %claim.order_id, "payment claim does not match order");
            return Err(PaymentError::OrderMismatch);
        }

        // fast path, the index is checked again inside the transaction
        if self.ledger.exists(&claim.receipt_code)? {
            warn!(order_id = %claim.order_id, receipt_code = %claim.receipt_code, "receipt code reused");
            return Err(PaymentError::DuplicateReceipt);
        }

        let now = TimeStamp::new();
        let entry = PaymentConfirmation::submitted(&claim, raw_metadata, now.clone())?;
        let encoded_entry = to_cbor(&entry)?;
        let order_key = claim.order_id.as_bytes();

        let result = (
            self.orders.tree(),
            self.ledger.codes_tree(),
            self.ledger.entries_tree(),
        )
            .transaction(|(orders, codes, entries)| {
                let Some(bytes) = orders.get(order_key)? else {
                    return abort(PaymentError::OrderNotFound);
                };
                let mut order: Order = match from_cbor(&bytes) {
                    Ok(order) => order,
                    Err(err) => return abort(err),
                };
                if let Err(err) = order.record_submission(&claim, &now) {
                    return abort(err);
                }
                let encoded_order = match to_cbor(&order) {
                    Ok(encoded) => encoded,
                    Err(err) => return abort(err),
                };

                ledger::reserve_and_insert(codes, entries, &entry, &encoded_entry)?;
                orders.insert(&order_key[..], encoded_order)?;
                Ok(())
            });

        if let Err(err) = result {
            let err = PaymentError::from(err);
            match err {
                PaymentError::DuplicateReceipt => {
                    warn!(order_id = %claim.order_id, receipt_code = %claim.receipt_code, "receipt code claimed concurrently");
                }
                PaymentError::OrderAlreadyPaid => {
                    warn!(order_id = %claim.order_id, receipt_code = %claim.receipt_code, "payment claim against a paid order");
                }
                _ => {}
            }
            return Err(err);
        }

        info!(
            order_id = %claim.order_id,
            receipt_code = %claim.receipt_code,
            confirmation_id = %entry.id,
            channel = %claim.channel,
            amount = %claim.amount,
            "payment confirmation submitted"
        );

        Ok(entry)
    }

    /// Applies an admin decision to a submitted confirmation.
    ///
    /// The entry is matched on both receipt code and order id. The entry's status
    /// and the order's payment state change together or not at all.
    pub fn verify_payment(&self, request: VerifyRequest) -> Result<PaymentConfirmation, PaymentError> {
        let decision = request.validate()?;
        let now = TimeStamp::new();
        let order_key = decision.order_id.as_bytes();

        let updated = (
            self.orders.tree(),
            self.ledger.codes_tree(),
            self.ledger.entries_tree(),
        )
            .transaction(|(orders, codes, entries)| {
                let mut entry =
                    ledger::load_for_order(codes, entries, &decision.receipt_code, &decision.order_id)?;
                if let Err(err) = entry.decide(
                    decision.verdict,
                    &self.verifier_id,
                    decision.admin_note.clone(),
                    now.clone(),
                ) {
                    return abort(err);
                }

                let Some(bytes) = orders.get(order_key)? else {
                    return abort(PaymentError::OrderNotFound);
                };
                let mut order: Order = match from_cbor(&bytes) {
                    Ok(order) => order,
                    Err(err) => return abort(err),
                };
                order.apply_verdict(decision.verdict, &now);

                let (encoded_entry, encoded_order) = match (to_cbor(&entry), to_cbor(&order)) {
                    (Ok(e), Ok(o)) => (e, o),
                    (Err(err), _) | (_, Err(err)) => return abort(err),
                };
                entries.insert(entry.id.as_str(), encoded_entry)?;
                orders.insert(&order_key[..], encoded_order)?;
                Ok(entry)
            })
            .map_err(PaymentError::from);

        match updated {
            Ok(entry) => {
                info!(
                    order_id = %decision.order_id,
                    receipt_code = %decision.receipt_code,
                    status = decision.verdict.as_str(),
                    verifier = %self.verifier_id,
                    "payment confirmation decided"
                );
                Ok(entry)
            }
            Err(err) => {
                if !err.is_internal() {
                    warn!(
                        order_id = %decision.order_id,
                        receipt_code = %decision.receipt_code,
                        "verification refused: {err}"
                    );
                }
                Err(err)
            }
        }
    }
}
