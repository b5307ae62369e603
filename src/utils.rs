//! Utility functions for record identifiers and CBOR storage encoding

use crate::error::PaymentError;
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique record id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, PaymentError> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| PaymentError::Codec(e.to_string()))?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| PaymentError::Codec(e.to_string()))?;
    Ok(encode)
}

pub(crate) fn to_cbor<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, PaymentError> {
    Ok(minicbor::to_vec(value)?)
}

pub(crate) fn from_cbor<T>(bytes: &[u8]) -> Result<T, PaymentError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    Ok(minicbor::decode(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_prefixed_unique_ids() {
        let a = new_uuid_to_bech32("pay").unwrap();
        let b = new_uuid_to_bech32("pay").unwrap();

        assert!(a.starts_with("pay1"));
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_empty_prefix() {
        assert!(new_uuid_to_bech32("").is_err());
    }
}
