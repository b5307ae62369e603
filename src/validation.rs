//! Schema checks for the untrusted confirm and verify request bodies.
//!
//! Request bodies are first deserialised into loosely typed structs so that a
//! wrongly typed field is reported as a violation of that field instead of
//! failing the whole body. `validate` then either returns the constrained value
//! or every violation found.
use crate::error::{FieldViolation, ValidationError};
use crate::types::{Amount, OrderId, PaymentChannel, ReceiptCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ORDER_NUMBER_LEN: (usize, usize) = (3, 32);
pub const PAYMENT_REFERENCE_LEN: (usize, usize) = (3, 64);
pub const CUSTOMER_PHONE_LEN: (usize, usize) = (6, 20);
pub const RECEIPT_CODE_LEN: (usize, usize) = (6, 12);
pub const ADMIN_NOTE_MAX: usize = 300;

/// Body of `POST /api/payments/confirm` as received.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub order_id: Value,
    pub order_number: Value,
    pub payment_reference: Value,
    pub customer_phone: Value,
    pub amount: Value,
    pub receipt_code: Value,
    pub payment_channel: Value,
}

/// Body of `POST /api/payments/verify` as received.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VerifyRequest {
    pub order_id: Value,
    pub receipt_code: Value,
    pub status: Value,
    pub admin_note: Value,
}

/// A customer's payment claim after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmPayment {
    pub order_id: OrderId,
    pub order_number: String,
    pub payment_reference: String,
    pub customer_phone: String,
    pub amount: Amount,
    pub receipt_code: ReceiptCode,
    pub channel: PaymentChannel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    Rejected,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Verified => "verified",
            Verdict::Rejected => "rejected",
        }
    }
}

/// An admin decision after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyPayment {
    pub order_id: OrderId,
    pub receipt_code: ReceiptCode,
    pub verdict: Verdict,
    pub admin_note: Option<String>,
}

impl ConfirmRequest {
    pub fn validate(&self) -> Result<ConfirmPayment, ValidationError> {
        let mut check = Checker::default();

        let order_id = check.order_id("orderId", &self.order_id);
        let order_number = check.text("orderNumber", &self.order_number, ORDER_NUMBER_LEN);
        let payment_reference = check.text(
            "paymentReference",
            &self.payment_reference,
            PAYMENT_REFERENCE_LEN,
        );
        let customer_phone = check.text("customerPhone", &self.customer_phone, CUSTOMER_PHONE_LEN);
        let amount = check.amount("amount", &self.amount);
        let receipt_code = check.receipt_code("receiptCode", &self.receipt_code);
        let channel = check.channel("paymentChannel", &self.payment_channel);

        let (
            Some(order_id),
            Some(order_number),
            Some(payment_reference),
            Some(customer_phone),
            Some(amount),
            Some(receipt_code),
            Some(channel),
        ) = (
            order_id,
            order_number,
            payment_reference,
            customer_phone,
            amount,
            receipt_code,
            channel,
        )
        else {
            return Err(check.into_error());
        };

        Ok(ConfirmPayment {
            order_id,
            order_number,
            payment_reference,
            customer_phone,
            amount,
            receipt_code,
            channel,
        })
    }
}

impl VerifyRequest {
    pub fn validate(&self) -> Result<VerifyPayment, ValidationError> {
        let mut check = Checker::default();

        let order_id = check.order_id("orderId", &self.order_id);
        let receipt_code = check.receipt_code("receiptCode", &self.receipt_code);
        let verdict = check.verdict("status", &self.status);
        let admin_note = check.note("adminNote", &self.admin_note);

        let (Some(order_id), Some(receipt_code), Some(verdict), Some(admin_note)) =
            (order_id, receipt_code, verdict, admin_note)
        else {
            return Err(check.into_error());
        };

        Ok(VerifyPayment {
            order_id,
            receipt_code,
            verdict,
            admin_note,
        })
    }
}

// Each check returns `None` exactly when it recorded a violation.
#[derive(Default)]
struct Checker {
    violations: Vec<FieldViolation>,
}

impl Checker {
    fn reject<T>(&mut self, field: &'static str, message: impl Into<String>) -> Option<T> {
        self.violations.push(FieldViolation::new(field, message));
        None
    }

    fn into_error(self) -> ValidationError {
        ValidationError {
            violations: self.violations,
        }
    }

    fn string<'a>(&mut self, field: &'static str, value: &'a Value) -> Option<&'a str> {
        match value {
            Value::String(s) => Some(s.trim()),
            Value::Null => self.reject(field, "is required"),
            _ => self.reject(field, "must be a string"),
        }
    }

    fn text(&mut self, field: &'static str, value: &Value, (min, max): (usize, usize)) -> Option<String> {
        let s = self.string(field, value)?;
        let len = s.chars().count();
        if len < min || len > max {
            return self.reject(field, format!("must be between {min} and {max} characters"));
        }
        Some(s.to_owned())
    }

    fn order_id(&mut self, field: &'static str, value: &Value) -> Option<OrderId> {
        let s = self.string(field, value)?;
        match s.parse::<OrderId>() {
            Ok(id) => Some(id),
            Err(_) => self.reject(field, "must be a valid UUID"),
        }
    }

    fn receipt_code(&mut self, field: &'static str, value: &Value) -> Option<ReceiptCode> {
        let s = self.text(field, value, RECEIPT_CODE_LEN)?;
        if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return self.reject(field, "must contain only letters and digits");
        }
        Some(ReceiptCode::normalise(&s))
    }

    // numbers and numeric strings are both accepted
    fn amount(&mut self, field: &'static str, value: &Value) -> Option<Amount> {
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Null => return self.reject(field, "is required"),
            _ => None,
        };
        let Some(number) = number.filter(|n| n.is_finite()) else {
            return self.reject(field, "must be a number");
        };
        if number <= 0.0 {
            return self.reject(field, "must be greater than 0");
        }
        match Amount::from_major(number) {
            Some(amount) if !amount.is_zero() => Some(amount),
            Some(_) => self.reject(field, "must be greater than 0"),
            None => self.reject(field, "is out of range"),
        }
    }

    fn channel(&mut self, field: &'static str, value: &Value) -> Option<PaymentChannel> {
        if value.is_null() {
            return Some(PaymentChannel::default());
        }
        let s = self.string(field, value)?;
        match PaymentChannel::parse(s) {
            Some(channel) => Some(channel),
            None => {
                let allowed: Vec<&str> = PaymentChannel::ALL.iter().map(|c| c.as_str()).collect();
                self.reject(field, format!("must be one of: {}", allowed.join(", ")))
            }
        }
    }

    fn verdict(&mut self, field: &'static str, value: &Value) -> Option<Verdict> {
        match self.string(field, value)? {
            "verified" => Some(Verdict::Verified),
            "rejected" => Some(Verdict::Rejected),
            _ => self.reject(field, "must be one of: verified, rejected"),
        }
    }

    // outer None marks a violation, inner None an absent note
    fn note(&mut self, field: &'static str, value: &Value) -> Option<Option<String>> {
        if value.is_null() {
            return Some(None);
        }
        let s = self.string(field, value)?;
        if s.chars().count() > ADMIN_NOTE_MAX {
            return self.reject(field, format!("must be at most {ADMIN_NOTE_MAX} characters"));
        }
        Some((!s.is_empty()).then(|| s.to_owned()))
    }
}
