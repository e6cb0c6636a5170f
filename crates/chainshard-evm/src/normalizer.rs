//! Converts alloy-core `DynSolValue` → `FieldValue`, and `FieldType` → `DynSolType`.

use alloy_core::dyn_abi::{DynSolType, DynSolValue};

use chainshard_core::event::FieldValue;
use chainshard_core::schema::FieldType;

/// Build the alloy `DynSolType` for a schema field type.
pub fn to_dyn_type(ty: &FieldType) -> DynSolType {
    match ty {
        FieldType::Uint(bits) => DynSolType::Uint(*bits as usize),
        FieldType::Int(bits) => DynSolType::Int(*bits as usize),
        FieldType::Bool => DynSolType::Bool,
        FieldType::Address => DynSolType::Address,
        FieldType::FixedBytes(n) => DynSolType::FixedBytes(*n as usize),
        FieldType::Bytes => DynSolType::Bytes,
        FieldType::String => DynSolType::String,
        FieldType::Array(elem) => DynSolType::Array(Box::new(to_dyn_type(elem))),
        FieldType::FixedArray(elem, len) => {
            DynSolType::FixedArray(Box::new(to_dyn_type(elem)), *len)
        }
        FieldType::Tuple(members) => DynSolType::Tuple(members.iter().map(to_dyn_type).collect()),
    }
}

/// Convert a decoded `DynSolValue` into a `FieldValue`.
pub fn normalize(val: DynSolValue) -> FieldValue {
    match val {
        DynSolValue::Bool(b) => FieldValue::Bool(b),

        DynSolValue::Int(i, _bits) => match i128::try_from(i) {
            Ok(v) => FieldValue::Int(v),
            Err(_) => FieldValue::BigInt(i.to_string()),
        },

        DynSolValue::Uint(u, _bits) => match u128::try_from(u) {
            Ok(v) => FieldValue::Uint(v),
            Err(_) => FieldValue::BigUint(u.to_string()),
        },

        // bytesN is left-aligned in its 32-byte word
        DynSolValue::FixedBytes(word, size) => FieldValue::Bytes(word[..size].to_vec()),

        DynSolValue::Bytes(b) => FieldValue::Bytes(b),

        DynSolValue::String(s) => FieldValue::Str(s),

        DynSolValue::Address(a) => FieldValue::Address(a.to_checksum(None)),

        DynSolValue::Array(vals) | DynSolValue::FixedArray(vals) | DynSolValue::Tuple(vals) => {
            FieldValue::Array(vals.into_iter().map(normalize).collect())
        }

        DynSolValue::Function(f) => FieldValue::Bytes(f.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, FixedBytes, I256, U256};

    #[test]
    fn normalize_uint_sizes() {
        assert_eq!(
            normalize(DynSolValue::Uint(U256::from(42u64), 256)),
            FieldValue::Uint(42)
        );
        assert_eq!(
            normalize(DynSolValue::Uint(U256::MAX, 256)),
            FieldValue::BigUint(
                "115792089237316195423570985008687907853269984665640564039457584007913129639935"
                    .into()
            )
        );
    }

    #[test]
    fn normalize_negative_int() {
        let v = normalize(DynSolValue::Int("-5".parse::<I256>().unwrap(), 24));
        assert_eq!(v, FieldValue::Int(-5));
        assert_eq!(v.to_string(), "-5");
    }

    #[test]
    fn normalize_address_is_checksummed() {
        let addr: Address = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045".parse().unwrap();
        assert_eq!(
            normalize(DynSolValue::Address(addr)),
            FieldValue::Address("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".into())
        );
    }

    #[test]
    fn normalize_fixed_bytes_truncates_padding() {
        let mut word = FixedBytes::<32>::ZERO;
        word[0] = 0xab;
        word[1] = 0xcd;
        assert_eq!(
            normalize(DynSolValue::FixedBytes(word, 2)),
            FieldValue::Bytes(vec![0xab, 0xcd])
        );
    }

    #[test]
    fn dyn_types_round_trip_through_display() {
        for s in ["uint256", "int24", "bool", "address", "bytes4", "bytes", "string", "uint8[3]", "address[]", "(address,uint256)", "(bool,bytes32)[]"] {
            let ty = FieldType::parse(s).unwrap();
            assert_eq!(to_dyn_type(&ty).sol_type_name(), s);
        }
    }
}
