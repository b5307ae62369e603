//! Order records as seen by the payment workflow.
//!
//! Orders are created by the storefront before a payment is claimed. This module
//! only reads the fields needed to cross-check a claim and writes the payment
//! metadata subset.
use crate::error::PaymentError;
use crate::types::{Amount, OrderId, PaymentChannel, ReceiptCode, TimeStamp};
use crate::utils::{from_cbor, to_cbor};
use crate::validation::{ConfirmPayment, Verdict};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PaymentState {
    #[n(0)]
    #[default]
    Unpaid,
    #[n(1)]
    Submitted,
    #[n(2)]
    Paid,
    #[n(3)]
    Failed,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderStatus {
    #[n(0)]
    #[default]
    Pending,
    #[n(1)]
    Confirmed,
    #[n(2)]
    Cancelled,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentMetadata {
    #[n(0)]
    pub submitted_at: Option<TimeStamp<Utc>>,
    #[n(1)]
    pub receipt_code: Option<ReceiptCode>,
    #[n(2)]
    pub phone: Option<String>,
    #[n(3)]
    pub amount: Option<Amount>,
    #[n(4)]
    pub channel: Option<PaymentChannel>,
    #[n(5)]
    pub verified_at: Option<TimeStamp<Utc>>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Order {
    #[n(0)]
    pub id: OrderId,
    #[n(1)]
    pub order_number: String,
    #[n(2)]
    pub customer_phone: String,
    #[n(3)]
    pub total: Amount,
    #[n(4)]
    pub status: OrderStatus,
    #[n(5)]
    pub payment_state: PaymentState,
    #[n(6)]
    pub payment: PaymentMetadata,
}

/// The three fields a payment claim is checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSummary {
    pub order_number: String,
    pub customer_phone: String,
    pub total: Amount,
}

impl Order {
    pub fn new(order_number: &str, customer_phone: &str, total: Amount) -> Self {
        Self {
            id: OrderId::new(),
            order_number: order_number.to_owned(),
            customer_phone: customer_phone.to_owned(),
            total,
            status: OrderStatus::default(),
            payment_state: PaymentState::default(),
            payment: PaymentMetadata::default(),
        }
    }

    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            order_number: self.order_number.clone(),
            customer_phone: self.customer_phone.clone(),
            total: self.total,
        }
    }

    /// Copies a submitted claim onto the order. A settled order keeps its
    /// verified receipt and refuses further claims.
    pub fn record_submission(
        &mut self,
        claim: &ConfirmPayment,
        at: &TimeStamp<Utc>,
    ) -> Result<(), PaymentError> {
        if self.payment_state == PaymentState::Paid {
            return Err(PaymentError::OrderAlreadyPaid);
        }
        self.payment_state = PaymentState::Submitted;
        self.payment.submitted_at = Some(at.clone());
        self.payment.receipt_code = Some(claim.receipt_code.clone());
        self.payment.phone = Some(claim.customer_phone.clone());
        self.payment.amount = Some(claim.amount);
        self.payment.channel = Some(claim.channel);
        Ok(())
    }

    /// Verified claims settle and confirm the order; rejected ones only mark the payment failed.
    pub fn apply_verdict(&mut self, verdict: Verdict, at: &TimeStamp<Utc>) {
        match verdict {
            Verdict::Verified => {
                self.payment_state = PaymentState::Paid;
                self.payment.verified_at = Some(at.clone());
                self.status = OrderStatus::Confirmed;
            }
            Verdict::Rejected => {
                self.payment_state = PaymentState::Failed;
            }
        }
    }
}

impl OrderSummary {
    pub fn matches(&self, claim: &ConfirmPayment) -> bool {
        self.order_number == claim.order_number
            && self.customer_phone == claim.customer_phone
            && self.total == claim.amount
    }
}

/// Orders stored in the `orders` tree, keyed by the order id bytes.
#[derive(Clone)]
pub struct OrderBook {
    tree: sled::Tree,
}

impl OrderBook {
    pub const TREE: &'static str = "orders";

    pub fn open(db: &sled::Db) -> Result<Self, PaymentError> {
        Ok(Self {
            tree: db.open_tree(Self::TREE)?,
        })
    }

    pub(crate) fn tree(&self) -> &sled::Tree {
        &self.tree
    }

    /// Stores an order as the storefront would, replacing any previous version.
    pub fn insert(&self, order: &Order) -> Result<(), PaymentError> {
        self.tree.insert(order.id.as_bytes(), to_cbor(order)?)?;
        Ok(())
    }

    pub fn get(&self, id: &OrderId) -> Result<Option<Order>, PaymentError> {
        self.tree
            .get(id.as_bytes())?
            .map(|bytes| from_cbor(&bytes))
            .transpose()
    }

    /// Single-record fetch by primary key.
    pub fn lookup(&self, id: &OrderId) -> Result<OrderSummary, PaymentError> {
        self.get(id)?
            .map(|order| order.summary())
            .ok_or(PaymentError::OrderNotFound)
    }
}
