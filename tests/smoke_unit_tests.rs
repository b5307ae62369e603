//! Smoke Screen Unit tests for payment workflow components
//!
//! These test are unit tests that span the codebase, testing behavior in
//! isolation from the service scenarios. These are intended as smoke-screen
//! and generally test the happy-path.
//!

use payment_verification::{
    ledger::{ConfirmationStatus, PaymentConfirmation, ReceiptLedger},
    order::{Order, OrderBook, OrderStatus, PaymentState},
    types::{Amount, OrderId, PaymentChannel, ReceiptCode, TimeStamp},
    utils::new_uuid_to_bech32,
    validation::{ConfirmPayment, Verdict},
};

fn temporary_db() -> sled::Db {
    sled::Config::new()
        .temporary(true)
        .open()
        .expect("temporary db")
}

fn claim_for(order: &Order, code: &str) -> ConfirmPayment {
    ConfirmPayment {
        order_id: order.id,
        order_number: order.order_number.clone(),
        payment_reference: "MPESA123".into(),
        customer_phone: order.customer_phone.clone(),
        amount: order.total,
        receipt_code: ReceiptCode::normalise(code),
        channel: PaymentChannel::AirtelMoney,
    }
}

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Test that new_uuid_to_bech32 generates valid bech32-encoded strings
    /// with the correct human-readable prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let encoded = new_uuid_to_bech32("pay").unwrap();

        assert!(encoded.starts_with("pay1"));
        assert!(encoded.len() > 10);
    }

    /// Test that multiple calls generate unique identifiers
    #[test]
    fn generates_unique_ids() {
        let id1 = new_uuid_to_bech32("pay").unwrap();
        let id2 = new_uuid_to_bech32("pay").unwrap();

        assert_ne!(id1, id2);
    }
}

// TYPES MODULE TESTS
#[cfg(test)]
mod types_tests {
    use super::*;
    use chrono::Utc;

    /// Test that TimeStamp::new() creates a timestamp close to current time
    #[test]
    fn timestamp_new_creates_current_time() {
        let ts = TimeStamp::new();
        let now = Utc::now();

        let diff = (now - ts.to_datetime_utc()).num_seconds().abs();
        assert!(diff < 1);
    }

    /// Test that order ids survive a display/parse cycle
    #[test]
    fn order_id_display_parses_back() {
        let id = OrderId::new();
        let parsed: OrderId = id.to_string().parse().unwrap();

        assert_eq!(id, parsed);
    }

    /// Test that amounts print with two decimals
    #[test]
    fn amount_displays_major_units() {
        assert_eq!(Amount::from_minor(150_000).to_string(), "1500.00");
        assert_eq!(Amount::from_minor(5).to_string(), "0.05");
    }
}

// ORDER MODULE TESTS
#[cfg(test)]
mod order_tests {
    use super::*;

    /// Test that a new order starts unpaid and pending
    #[test]
    fn new_order_defaults() {
        let order = Order::new("ORD-100", "254700000000", Amount::from_minor(150_000));

        assert_eq!(order.payment_state, PaymentState::Unpaid);
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.payment.receipt_code.is_none());
    }

    /// Test that stored orders can be looked up by id
    #[test]
    fn order_book_lookup() {
        let db = temporary_db();
        let book = OrderBook::open(&db).unwrap();
        let order = Order::new("ORD-100", "254700000000", Amount::from_minor(150_000));
        book.insert(&order).unwrap();

        let summary = book.lookup(&order.id).unwrap();
        assert_eq!(summary.order_number, "ORD-100");
        assert_eq!(summary.customer_phone, "254700000000");
        assert_eq!(summary.total, Amount::from_minor(150_000));

        assert_eq!(book.get(&order.id).unwrap(), Some(order));
    }

    /// Test that a missing order is reported as not found
    #[test]
    fn order_book_lookup_missing() {
        let db = temporary_db();
        let book = OrderBook::open(&db).unwrap();

        assert!(book.lookup(&OrderId::new()).is_err());
        assert_eq!(book.get(&OrderId::new()).unwrap(), None);
    }
}

// LEDGER MODULE TESTS
#[cfg(test)]
mod ledger_tests {
    use super::*;

    /// Test that a fresh entry copies the claim and starts submitted
    #[test]
    fn submitted_entry_copies_claim() {
        let order = Order::new("ORD-100", "254700000000", Amount::from_minor(150_000));
        let claim = claim_for(&order, "qwe789");

        let entry = PaymentConfirmation::submitted(&claim, "{}".into(), TimeStamp::new()).unwrap();

        assert!(entry.id.starts_with("pay1"));
        assert_eq!(entry.order_id, order.id);
        assert_eq!(entry.receipt_code.as_str(), "QWE789");
        assert_eq!(entry.channel, PaymentChannel::AirtelMoney);
        assert_eq!(entry.status, ConfirmationStatus::Submitted);
        assert!(entry.verified_at.is_none());
    }

    /// Test that entries can be listed per order
    #[test]
    fn list_for_order_filters_by_order() {
        let db = temporary_db();
        let ledger = ReceiptLedger::open(&db).unwrap();
        let first = Order::new("ORD-100", "254700000000", Amount::from_minor(150_000));
        let second = Order::new("ORD-200", "254711111111", Amount::from_minor(90_000));

        for (order, code) in [(&first, "AAA111"), (&first, "BBB222"), (&second, "CCC333")] {
            let entry =
                PaymentConfirmation::submitted(&claim_for(order, code), "{}".into(), TimeStamp::new())
                    .unwrap();
            ledger.insert(&entry).unwrap();
        }

        let entries = ledger.list_for_order(&first.id).unwrap();
        let mut codes: Vec<&str> = entries.iter().map(|e| e.receipt_code.as_str()).collect();
        codes.sort();
        assert_eq!(codes, vec!["AAA111", "BBB222"]);
        assert_eq!(ledger.list_for_order(&second.id).unwrap().len(), 1);
    }

    /// Test that a rejection records the note and verifier
    #[test]
    fn rejection_records_note() {
        let order = Order::new("ORD-100", "254700000000", Amount::from_minor(150_000));
        let mut entry =
            PaymentConfirmation::submitted(&claim_for(&order, "ABC123"), "{}".into(), TimeStamp::new())
                .unwrap();

        entry
            .decide(
                Verdict::Rejected,
                "ops-desk",
                Some("code not on statement".into()),
                TimeStamp::new(),
            )
            .unwrap();

        assert_eq!(entry.status, ConfirmationStatus::Rejected);
        assert_eq!(entry.verified_by.as_deref(), Some("ops-desk"));
        assert_eq!(entry.admin_note.as_deref(), Some("code not on statement"));
    }
}
