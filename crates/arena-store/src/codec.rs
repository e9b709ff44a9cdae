//! Column encodings.
//!
//! Block numbers and counters are INTEGER (checked `u64` <-> `i64`), wei
//! amounts are decimal TEXT so `U256` survives unchanged, addresses and hashes
//! are lowercase `0x` hex TEXT.

use crate::error::{
    StoreError,
    StoreResult,
};
use alloy::primitives::{
    Address,
    B256,
    U256,
};

pub(crate) fn int(value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange(value))
}

pub(crate) fn uint(column: &'static str, value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| {
        StoreError::Corrupt {
            column,
            value: value.to_string(),
        }
    })
}

pub(crate) fn amount(value: U256) -> String {
    value.to_string()
}

pub(crate) fn parse_amount(column: &'static str, value: &str) -> StoreResult<U256> {
    value.parse::<U256>().map_err(|_| {
        StoreError::Corrupt {
            column,
            value: value.to_owned(),
        }
    })
}

pub(crate) fn parse_opt_amount(column: &'static str, value: Option<String>) -> StoreResult<Option<U256>> {
    value.map(|v| parse_amount(column, &v)).transpose()
}

pub(crate) fn address(value: &Address) -> String {
    arena_core::address_key(value)
}

pub(crate) fn parse_address(column: &'static str, value: &str) -> StoreResult<Address> {
    value.parse::<Address>().map_err(|_| {
        StoreError::Corrupt {
            column,
            value: value.to_owned(),
        }
    })
}

pub(crate) fn hash(value: &B256) -> String {
    alloy::hex::encode_prefixed(value)
}

pub(crate) fn parse_opt_hash(column: &'static str, value: Option<String>) -> StoreResult<Option<B256>> {
    value
        .map(|v| {
            v.parse::<B256>().map_err(|_| {
                StoreError::Corrupt {
                    column,
                    value: v.clone(),
                }
            })
        })
        .transpose()
}
