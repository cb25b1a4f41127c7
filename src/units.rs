//! Unit-carrying amount types
//!
//! On-chain values arrive as wei-precision integers, the UI side works in
//! human decimals, USD and percentages. Each gets its own type so a wei total
//! can never be summed against a decimal figure by accident.
//!
//! The only way from `Wei` to a float is through the pool's decimal count.

use alloy_primitives::U256;
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

// ============================================
// WEI
// ============================================

/// Integer token amount as reported by a contract or the subgraph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Wei(pub U256);

impl Wei {
    pub const ZERO: Wei = Wei(U256::ZERO);

    pub fn new(raw: U256) -> Self {
        Self(raw)
    }

    pub fn from_u128(raw: u128) -> Self {
        Self(U256::from(raw))
    }

    /// Parse a base-10 integer string (the subgraph's `BigInt` encoding)
    pub fn from_dec_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(eyre!("empty wei amount"));
        }
        U256::from_str_radix(trimmed, 10)
            .map(Self)
            .map_err(|e| eyre!("invalid wei amount {:?}: {}", s, e))
    }

    pub fn raw(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn saturating_sub(self, other: Wei) -> Wei {
        Wei(self.0.saturating_sub(other.0))
    }

    /// Exact decimal rendering: `1500000000000000000` at 18 decimals is `"1.5"`
    pub fn to_decimal_string(&self, decimals: u8) -> String {
        if decimals == 0 {
            return self.0.to_string();
        }

        let scale = U256::from(10u64).pow(U256::from(decimals));
        let whole = self.0 / scale;
        let frac = self.0 % scale;

        if frac.is_zero() {
            return whole.to_string();
        }

        let frac_str = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
        format!("{}.{}", whole, frac_str.trim_end_matches('0'))
    }

    /// Lossy conversion into a human-decimal float
    pub fn to_token_amount(&self, decimals: u8) -> TokenAmount {
        TokenAmount(self.to_decimal_string(decimals).parse().unwrap_or(0.0))
    }
}

impl Add for Wei {
    type Output = Wei;

    fn add(self, rhs: Wei) -> Wei {
        Wei(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Wei {
    fn add_assign(&mut self, rhs: Wei) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} wei", self.0)
    }
}

impl From<U256> for Wei {
    fn from(raw: U256) -> Self {
        Self(raw)
    }
}

// ============================================
// TOKEN AMOUNT (human decimal)
// ============================================

#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct TokenAmount(pub f64);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0.0);

    /// Parse a human-decimal string such as `"12.5"`
    pub fn parse(s: &str) -> Result<Self> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|e| eyre!("invalid decimal amount {:?}: {}", s, e))?;
        if !value.is_finite() {
            return Err(eyre!("non-finite decimal amount {:?}", s));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Price this amount in USD
    pub fn to_usd(&self, price: UsdValue) -> UsdValue {
        UsdValue(self.0 * price.0)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================
// USD / PERCENT
// ============================================

#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct UsdValue(pub f64);

impl UsdValue {
    pub const ZERO: UsdValue = UsdValue(0.0);

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Add for UsdValue {
    type Output = UsdValue;

    fn add(self, rhs: UsdValue) -> UsdValue {
        UsdValue(self.0 + rhs.0)
    }
}

impl AddAssign for UsdValue {
    fn add_assign(&mut self, rhs: UsdValue) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for UsdValue {
    fn sum<I: Iterator<Item = UsdValue>>(iter: I) -> Self {
        iter.fold(UsdValue::ZERO, |acc, v| acc + v)
    }
}

impl fmt::Display for UsdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

/// Percentage value, `365.0` means 365%
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Percent(pub f64);

impl Percent {
    pub const ZERO: Percent = Percent(0.0);

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", self.0)
    }
}

// ============================================
// TESTS
// ============================================
