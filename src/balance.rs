//! Mote amounts and their exact CSPR representation.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{ToPrimitive, Zero};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::WalletError;

/// 1 CSPR = 10^9 motes.
pub const MOTES_PER_CSPR: u64 = 1_000_000_000;
const FRACTION_DIGITS: usize = 9;

/// A spendable balance in motes. Arbitrary precision, node values are U512.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Balance {
    motes: BigUint,
}

impl Balance {
    pub fn from_motes(motes: BigUint) -> Self {
        Self { motes }
    }

    /// Parse the decimal string returned as `balance_value`.
    pub fn parse_motes(s: &str) -> Result<Self, WalletError> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WalletError::MalformedResponse(format!(
                "balance_value is not an unsigned integer: {:?}",
                s
            )));
        }
        let motes = BigUint::from_str(trimmed)
            .map_err(|e| WalletError::MalformedResponse(format!("balance_value: {}", e)))?;
        Ok(Self { motes })
    }

    /// Inverse of the display conversion: `whole * 10^9 + fraction`.
    pub fn from_cspr(whole: BigUint, fraction_motes: u32) -> Result<Self, WalletError> {
        if u64::from(fraction_motes) >= MOTES_PER_CSPR {
            return Err(WalletError::MalformedResponse(format!(
                "fraction {} exceeds one CSPR",
                fraction_motes
            )));
        }
        Ok(Self {
            motes: whole * BigUint::from(MOTES_PER_CSPR) + BigUint::from(fraction_motes),
        })
    }

    pub fn motes(&self) -> &BigUint {
        &self.motes
    }

    pub fn is_zero(&self) -> bool {
        self.motes.is_zero()
    }

    /// Exact split into whole CSPR and the remaining motes.
    pub fn to_cspr_parts(&self) -> (BigUint, u32) {
        let (whole, rem) = self.motes.div_rem(&BigUint::from(MOTES_PER_CSPR));
        // rem < 10^9 always fits.
        (whole, rem.to_u32().unwrap_or_default())
    }

    /// Display units as a `Decimal`, `None` if the amount exceeds its 96-bit range.
    pub fn to_decimal(&self) -> Option<Decimal> {
        Decimal::from_str(&self.to_cspr_string()).ok()
    }

    /// Shortest exact decimal rendering in CSPR.
    pub fn to_cspr_string(&self) -> String {
        let (whole, frac) = self.to_cspr_parts();
        if frac == 0 {
            return whole.to_string();
        }
        let digits = format!("{:0width$}", frac, width = FRACTION_DIGITS);
        format!("{}.{}", whole, digits.trim_end_matches('0'))
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} CSPR", self.to_cspr_string())
    }
}
