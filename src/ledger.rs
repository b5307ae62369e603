//! Append-only ledger of customer payment claims.
//!
//! Entries live in the `confirmations` tree keyed by their record id. The
//! `receipt_codes` tree maps each receipt code to the entry that consumed it and
//! is the unique index: a code is written there exactly once, inside the same
//! transaction as the entry itself.
use crate::error::PaymentError;
use crate::types::{Amount, OrderId, PaymentChannel, ReceiptCode, TimeStamp};
use crate::utils::{from_cbor, new_uuid_to_bech32, to_cbor};
use crate::validation::{ConfirmPayment, Verdict};
use chrono::Utc;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree, abort};

pub const RECORD_ID_PREFIX: &str = "pay";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfirmationStatus {
    #[n(0)]
    #[default]
    Submitted,
    #[n(1)]
    Verified,
    #[n(2)]
    Rejected,
}

impl From<Verdict> for ConfirmationStatus {
    fn from(value: Verdict) -> Self {
        match value {
            Verdict::Verified => ConfirmationStatus::Verified,
            Verdict::Rejected => ConfirmationStatus::Rejected,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub order_id: OrderId,
    #[n(2)]
    pub order_number: String,
    #[n(3)]
    pub payment_reference: String,
    #[n(4)]
    pub customer_phone: String,
    #[n(5)]
    pub amount: Amount,
    #[n(6)]
    pub receipt_code: ReceiptCode,
    #[n(7)]
    pub channel: PaymentChannel,
    #[n(8)]
    pub status: ConfirmationStatus,
    #[n(9)]
    pub raw_metadata: String, // request body as submitted, JSON
    #[n(10)]
    pub submitted_at: TimeStamp<Utc>,
    #[n(11)]
    pub verified_at: Option<TimeStamp<Utc>>,
    #[n(12)]
    pub verified_by: Option<String>,
    #[n(13)]
    pub admin_note: Option<String>,
}

impl PaymentConfirmation {
    /// A fresh `submitted` entry for a validated claim.
    pub fn submitted(
        claim: &ConfirmPayment,
        raw_metadata: String,
        at: TimeStamp<Utc>,
    ) -> Result<Self, PaymentError> {
        Ok(Self {
            id: new_uuid_to_bech32(RECORD_ID_PREFIX)?,
            order_id: claim.order_id,
            order_number: claim.order_number.clone(),
            payment_reference: claim.payment_reference.clone(),
            customer_phone: claim.customer_phone.clone(),
            amount: claim.amount,
            receipt_code: claim.receipt_code.clone(),
            channel: claim.channel,
            status: ConfirmationStatus::Submitted,
            raw_metadata,
            submitted_at: at,
            verified_at: None,
            verified_by: None,
            admin_note: None,
        })
    }

    /// Records the admin outcome. Only a `submitted` entry may be decided.
    pub fn decide(
        &mut self,
        verdict: Verdict,
        verifier: &str,
        note: Option<String>,
        at: TimeStamp<Utc>,
    ) -> Result<(), PaymentError> {
        if self.status != ConfirmationStatus::Submitted {
            return Err(PaymentError::AlreadyProcessed);
        }
        self.status = verdict.into();
        self.verified_at = Some(at);
        self.verified_by = Some(verifier.to_owned());
        self.admin_note = note;
        Ok(())
    }
}

#[derive(Clone)]
pub struct ReceiptLedger {
    entries: sled::Tree,
    codes: sled::Tree,
}

impl ReceiptLedger {
    pub const ENTRIES_TREE: &'static str = "confirmations";
    pub const CODES_TREE: &'static str = "receipt_codes";

    pub fn open(db: &sled::Db) -> Result<Self, PaymentError> {
        Ok(Self {
            entries: db.open_tree(Self::ENTRIES_TREE)?,
            codes: db.open_tree(Self::CODES_TREE)?,
        })
    }

    pub(crate) fn entries_tree(&self) -> &sled::Tree {
        &self.entries
    }

    pub(crate) fn codes_tree(&self) -> &sled::Tree {
        &self.codes
    }

    /// Exact match on the receipt code, across all orders.
    pub fn exists(&self, code: &ReceiptCode) -> Result<bool, PaymentError> {
        Ok(self.codes.contains_key(code.as_str())?)
    }

    /// Inserts an entry on its own, failing with `DuplicateReceipt` if the code is taken.
    pub fn insert(&self, entry: &PaymentConfirmation) -> Result<String, PaymentError> {
        let encoded = to_cbor(entry)?;
        (&self.codes, &self.entries).transaction(|(codes, entries)| {
            reserve_and_insert(codes, entries, entry, &encoded)
        })?;
        Ok(entry.id.clone())
    }

    pub fn get(&self, id: &str) -> Result<Option<PaymentConfirmation>, PaymentError> {
        self.entries
            .get(id)?
            .map(|bytes| from_cbor(&bytes))
            .transpose()
    }

    pub fn find_by_code(
        &self,
        code: &ReceiptCode,
    ) -> Result<Option<PaymentConfirmation>, PaymentError> {
        match self.codes.get(code.as_str())? {
            Some(id) => self
                .entries
                .get(id)?
                .map(|bytes| from_cbor(&bytes))
                .transpose(),
            None => Ok(None),
        }
    }

    /// All claims made against one order, oldest first.
    pub fn list_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<PaymentConfirmation>, PaymentError> {
        let mut found = Vec::new();
        for item in self.entries.iter() {
            let (_, bytes) = item?;
            let entry: PaymentConfirmation = from_cbor(&bytes)?;
            if entry.order_id == *order_id {
                found.push(entry);
            }
        }
        found.sort_by_key(|e| e.submitted_at.to_datetime_utc());
        Ok(found)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Claims the receipt code in the unique index and writes the entry.
/// Aborts with `DuplicateReceipt` when the code is already indexed.
pub(crate) fn reserve_and_insert(
    codes: &TransactionalTree,
    entries: &TransactionalTree,
    entry: &PaymentConfirmation,
    encoded: &[u8],
) -> ConflictableTransactionResult<(), PaymentError> {
    if codes.get(entry.receipt_code.as_str())?.is_some() {
        return abort(PaymentError::DuplicateReceipt);
    }
    codes.insert(entry.receipt_code.as_str(), entry.id.as_str())?;
    entries.insert(entry.id.as_str(), encoded)?;
    Ok(())
}

/// Loads the entry indexed under `code`, provided it belongs to `order_id`.
pub(crate) fn load_for_order(
    codes: &TransactionalTree,
    entries: &TransactionalTree,
    code: &ReceiptCode,
    order_id: &OrderId,
) -> ConflictableTransactionResult<PaymentConfirmation, PaymentError> {
    let Some(id) = codes.get(code.as_str())? else {
        return abort(PaymentError::ConfirmationNotFound);
    };
    let Some(bytes) = entries.get(&id)? else {
        return abort(PaymentError::ConfirmationNotFound);
    };
    let entry: PaymentConfirmation = match from_cbor(&bytes) {
        Ok(entry) => entry,
        Err(err) => return abort(err),
    };
    if entry.order_id != *order_id {
        return abort(PaymentError::ConfirmationNotFound);
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn claim(code: &str) -> ConfirmPayment {
        ConfirmPayment {
            order_id: OrderId::new(),
            order_number: "ORD-100".into(),
            payment_reference: "MPESA123".into(),
            customer_phone: "254700000000".into(),
            amount: Amount::from_minor(150_000),
            receipt_code: ReceiptCode::normalise(code),
            channel: PaymentChannel::Mpesa,
        }
    }

    #[test]
    fn unique_index_rejects_second_insert() {
        let temp_dir = tempdir().unwrap();
        let db = sled::open(temp_dir.path().join("ledger.db")).unwrap();
        let ledger = ReceiptLedger::open(&db).unwrap();

        let first = PaymentConfirmation::submitted(&claim("ABC123"), "{}".into(), TimeStamp::new()).unwrap();
        let second = PaymentConfirmation::submitted(&claim("abc123"), "{}".into(), TimeStamp::new()).unwrap();

        assert!(!ledger.exists(&first.receipt_code).unwrap());
        let id = ledger.insert(&first).unwrap();
        assert!(ledger.exists(&first.receipt_code).unwrap());

        assert!(matches!(
            ledger.insert(&second),
            Err(PaymentError::DuplicateReceipt)
        ));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(&id).unwrap(), Some(first.clone()));
        assert_eq!(ledger.find_by_code(&first.receipt_code).unwrap(), Some(first));
    }

    #[test]
    fn decision_is_made_once() {
        let mut entry = PaymentConfirmation::submitted(&claim("ABC123"), "{}".into(), TimeStamp::new()).unwrap();

        entry
            .decide(Verdict::Verified, "admin", None, TimeStamp::new())
            .unwrap();
        assert_eq!(entry.status, ConfirmationStatus::Verified);
        assert_eq!(entry.verified_by.as_deref(), Some("admin"));

        assert!(matches!(
            entry.decide(Verdict::Rejected, "admin", None, TimeStamp::new()),
            Err(PaymentError::AlreadyProcessed)
        ));
        assert_eq!(entry.status, ConfirmationStatus::Verified);
    }

    #[test]
    fn list_for_order_is_oldest_first() {
        let temp_dir = tempdir().unwrap();
        let db = sled::open(temp_dir.path().join("ledger.db")).unwrap();
        let ledger = ReceiptLedger::open(&db).unwrap();

        let order_id = OrderId::new();
        let base = Utc::now();
        for (code, offset) in [("LATE01", 30), ("EARLY1", 0), ("MIDDLE", 10)] {
            let same_order = ConfirmPayment {
                order_id,
                ..claim(code)
            };
            let at = TimeStamp::from(base + chrono::Duration::seconds(offset));
            ledger
                .insert(&PaymentConfirmation::submitted(&same_order, "{}".into(), at).unwrap())
                .unwrap();
        }
        ledger
            .insert(&PaymentConfirmation::submitted(&claim("OTHER1"), "{}".into(), TimeStamp::new()).unwrap())
            .unwrap();

        let codes: Vec<String> = ledger
            .list_for_order(&order_id)
            .unwrap()
            .iter()
            .map(|e| e.receipt_code.to_string())
            .collect();
        assert_eq!(codes, vec!["EARLY1", "MIDDLE", "LATE01"]);
    }
}
