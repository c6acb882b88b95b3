//! # Potential — Fractional Confidence Tracks
//!
//! A [`Potential`] is a whole-unit balance plus a demotion depth
//! (`exponent`). Producing adds one unit, consuming removes one, and
//! ordering conflicts move the value by halving steps:
//!
//! ```text
//! demote:  exponent += 1, then subtract 1 / 2^max(exponent, 0)
//! promote: add 1 / 2^max(exponent, 0), then exponent -= 1
//! ```
//!
//! The steps telescope, so the exact value is a closed form of the two
//! fields:
//!
//! ```text
//! value = units + G(exponent)
//! G(e)  = -e          e <= 0
//! G(e)  = 2^-e - 1    e >  0
//! ```
//!
//! Demotions never cost a whole unit, however deep they go, and a promote
//! directly after a demote restores the representation exactly. Every step
//! is O(1); no fraction is ever reduced.
//!
//! # Invariant
//!
//! The implied denominator is `2^max(exponent, 0)`, positive by
//! construction. Overflow of `units` or `exponent` panics.

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use alloc::string::String;

/// How a track's value is compared against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PotentialMode {
    /// Quotient rounded toward zero; sub-unit movement is invisible.
    #[default]
    Truncate,
    /// True rational comparison.
    Exact,
}

impl FromStr for PotentialMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "truncate" => Ok(Self::Truncate),
            "exact" => Ok(Self::Exact),
            other => Err(alloc::format!("unknown potential mode: {other}")),
        }
    }
}

impl fmt::Display for PotentialMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Truncate => "truncate",
            Self::Exact => "exact",
        })
    }
}

// =============================================================================
// Dyadic values
// =============================================================================

/// Exact value of a track: `whole`, plus `1 / 2^depth` when `depth > 0`.
///
/// Every value a [`Potential`] can take has this shape, and so does every
/// value reached from one by adding integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dyadic {
    whole: i128,
    depth: u32,
}

impl Dyadic {
    pub const ZERO: Dyadic = Dyadic { whole: 0, depth: 0 };

    /// `whole + 1/2^depth`; `depth == 0` means no fractional part.
    #[inline]
    pub const fn new(whole: i128, depth: u32) -> Self {
        Self { whole, depth }
    }

    #[inline]
    pub const fn from_integer(value: i128) -> Self {
        Self {
            whole: value,
            depth: 0,
        }
    }

    /// Integer part, rounded toward negative infinity.
    #[inline]
    pub fn floor(&self) -> i128 {
        self.whole
    }

    /// Exponent of the fractional part, 0 for integers.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn is_integer(&self) -> bool {
        self.depth == 0
    }

    // The fractional part lies in (0, 1/2], so the sign is the sign of
    // `whole` once a fraction is present.

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.whole < 0
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        if self.is_integer() {
            self.whole > 0
        } else {
            self.whole >= 0
        }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.is_integer() && self.whole == 0
    }

    /// Smallest integer not below the value.
    #[inline]
    pub fn ceil(&self) -> i128 {
        if self.is_integer() {
            self.whole
        } else {
            self.whole + 1
        }
    }

    /// Quotient rounded toward zero.
    #[inline]
    pub fn trunc(&self) -> i128 {
        if self.is_integer() || self.whole >= 0 {
            self.whole
        } else {
            self.whole + 1
        }
    }

    /// `value + self`, exact.
    #[inline]
    pub fn plus_integer(&self, value: i128) -> Dyadic {
        Dyadic {
            whole: checked_add(self.whole, value),
            depth: self.depth,
        }
    }

    /// `(numerator, denominator)` when both fit in an `i128`.
    pub fn as_fraction(&self) -> Option<(i128, i128)> {
        if self.is_integer() {
            return Some((self.whole, 1));
        }
        let denominator = 1i128.checked_shl(self.depth).filter(|d| *d > 0)?;
        let numerator = self.whole.checked_mul(denominator)?.checked_add(1)?;
        Some((numerator, denominator))
    }

    pub fn to_f64(&self) -> f64 {
        if self.is_integer() {
            self.whole as f64
        } else {
            self.whole as f64 + negative_power_of_two(self.depth)
        }
    }
}

impl Ord for Dyadic {
    fn cmp(&self, other: &Self) -> Ordering {
        self.whole.cmp(&other.whole).then_with(|| match (self.depth, other.depth) {
            (0, 0) => Ordering::Equal,
            (0, _) => Ordering::Less,
            (_, 0) => Ordering::Greater,
            // A deeper fraction is a smaller one.
            (a, b) => b.cmp(&a),
        })
    }
}

impl PartialOrd for Dyadic {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Dyadic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_fraction() {
            Some((n, 1)) => write!(f, "{n}"),
            Some((n, d)) => write!(f, "{n}/{d}"),
            None => write!(f, "{}+2^-{}", self.whole, self.depth),
        }
    }
}

/// `2^-depth` as the nearest `f64`, 0 once it underflows.
fn negative_power_of_two(depth: u32) -> f64 {
    match depth {
        0 => 1.0,
        1..=1022 => f64::from_bits(u64::from(1023 - depth) << 52),
        1023..=1074 => f64::from_bits(1u64 << (1074 - depth)),
        _ => 0.0,
    }
}

// =============================================================================
// Potential
// =============================================================================

/// One potential track (main, failed, or reader).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Potential {
    units: i64,
    exponent: i32,
}

impl Potential {
    /// Zero potential, no demotions.
    pub const fn new() -> Self {
        Self {
            units: 0,
            exponent: 0,
        }
    }

    /// Whole units added and removed so far.
    #[inline]
    pub fn units(&self) -> i64 {
        self.units
    }

    #[inline]
    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    /// The exact value.
    #[inline]
    pub fn exact(&self) -> Dyadic {
        let units = i128::from(self.units);
        if self.exponent <= 0 {
            Dyadic::from_integer(units - i128::from(self.exponent))
        } else {
            Dyadic::new(units - 1, self.exponent as u32)
        }
    }

    /// The value as the verifier sees it under `mode`.
    #[inline]
    pub fn sum(&self, mode: PotentialMode) -> Dyadic {
        let exact = self.exact();
        match mode {
            PotentialMode::Exact => exact,
            PotentialMode::Truncate => Dyadic::from_integer(exact.trunc()),
        }
    }

    pub fn add_int(&mut self, x: i64) {
        self.units = self.units.checked_add(x).expect("potential units overflow");
    }

    pub fn sub_int(&mut self, x: i64) {
        self.units = self.units.checked_sub(x).expect("potential units overflow");
    }

    /// One step deeper: the next adjustment is half the size of this one.
    #[inline]
    pub fn demote(&mut self) {
        self.exponent = self.exponent.checked_add(1).expect("potential exponent overflow");
    }

    /// Undo the most recent demotion step.
    #[inline]
    pub fn promote(&mut self) {
        self.exponent = self.exponent.checked_sub(1).expect("potential exponent overflow");
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[inline]
fn checked_add(a: i128, b: i128) -> i128 {
    a.checked_add(b).expect("potential arithmetic overflow")
}

// =============================================================================
// Kani Proofs: Potential Arithmetic
// =============================================================================

#[cfg(kani)]
mod proofs {
    use super::*;

    fn any_potential() -> Potential {
        let units: i8 = kani::any();
        let exponent: i16 = kani::any();
        Potential {
            units: units as i64,
            exponent: exponent as i32,
        }
    }

    /// **Proof: promote undoes demote exactly**
    #[kani::proof]
    fn verify_promote_inverts_demote() {
        let original = any_potential();
        let mut p = original.clone();
        p.demote();
        p.promote();
        assert!(p == original, "promote(demote(p)) changed the representation");
    }

    /// **Proof: a demotion costs exactly its step**
    ///
    /// From exponent `e >= 0`, demoting subtracts `1/2^(e+1)`: the value
    /// falls strictly, stays above `units - 1`, and lands on the next depth.
    #[kani::proof]
    fn verify_demotion_stays_above_one_unit_loss() {
        let units: i8 = kani::any();
        let exponent: u8 = kani::any();
        let mut p = Potential {
            units: units as i64,
            exponent: exponent as i32,
        };
        let before = p.exact();
        p.demote();
        let after = p.exact();
        assert!(after < before);
        assert!(after > Dyadic::from_integer(units as i128 - 1));
        assert!(after.depth() == exponent as u32 + 1);
    }

    /// **Proof: the implied denominator is always a positive power of two**
    #[kani::proof]
    fn verify_denominator_positive() {
        let p = any_potential();
        let exact = p.exact();
        if exact.depth() <= 126 {
            let (_, d) = exact.as_fraction().unwrap();
            assert!(d > 0);
        }
    }
}
