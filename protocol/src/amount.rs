//! Ledger amounts.
//!
//! Everything that compares money compares integer lamports. SOL values as
//! `f64` exist only at the edges: the exchange rate, and what gets shown to
//! a human. `0.1 + 0.2 != 0.3` is a fun party trick until it's somebody's
//! ride fare.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

use crate::config::{LAMPORTS_PER_SOL, LEDGER_UNIT_SYMBOL};

/// An amount of the ledger's native unit, in its smallest denomination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lamports(pub u64);

impl Lamports {
    pub const ZERO: Lamports = Lamports(0);

    /// Convert whole-unit SOL to lamports, rounding to the nearest lamport.
    /// Negative and non-finite inputs give zero.
    pub fn from_sol(sol: f64) -> Self {
        if !sol.is_finite() || sol <= 0.0 {
            return Self::ZERO;
        }
        let raw = (sol * LAMPORTS_PER_SOL as f64).round();
        if raw >= u64::MAX as f64 {
            Self(u64::MAX)
        } else {
            Self(raw as u64)
        }
    }

    pub fn as_sol(&self) -> f64 {
        self.0 as f64 / LAMPORTS_PER_SOL as f64
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// Absolute distance between two amounts.
    pub fn abs_diff(&self, other: Lamports) -> Lamports {
        Lamports(self.0.abs_diff(other.0))
    }

    /// Whether `self` is within `tolerance` of `expected`, inclusive.
    pub fn within(&self, expected: Lamports, tolerance: Lamports) -> bool {
        self.abs_diff(expected) <= tolerance
    }
}

impl Add for Lamports {
    type Output = Lamports;
    fn add(self, rhs: Self) -> Self::Output {
        Lamports(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Lamports {
    type Output = Lamports;
    fn sub(self, rhs: Self) -> Self::Output {
        Lamports(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Lamports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9} {}", self.as_sol(), LEDGER_UNIT_SYMBOL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sol_rounds_to_nearest_lamport() {
        assert_eq!(Lamports::from_sol(0.05), Lamports(50_000_000));
        assert_eq!(Lamports::from_sol(0.0000000014), Lamports(1));
        assert_eq!(Lamports::from_sol(0.0000000016), Lamports(2));
    }

    #[test]
    fn test_from_sol_rejects_nonsense() {
        assert_eq!(Lamports::from_sol(-1.0), Lamports::ZERO);
        assert_eq!(Lamports::from_sol(f64::NAN), Lamports::ZERO);
        assert_eq!(Lamports::from_sol(f64::INFINITY), Lamports::ZERO);
    }

    #[test]
    fn test_within_is_inclusive() {
        let expected = Lamports(500_000_000);
        let tolerance = Lamports(1_000_000);
        assert!(Lamports(501_000_000).within(expected, tolerance));
        assert!(Lamports(499_000_000).within(expected, tolerance));
        assert!(!Lamports(501_000_001).within(expected, tolerance));
    }

    #[test]
    fn test_display() {
        assert_eq!(Lamports(50_000_000).to_string(), "0.050000000 SOL");
    }
}
