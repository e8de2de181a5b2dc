//! The 9-trit machine word (tryte).
//!
//! A tryte is the console's native integer: 9 balanced ternary digits,
//! most significant first, covering [-9841, +9841]. Trytes are mutable
//! containers — the ALU rewrites their digits in place — so the type is
//! deliberately `Clone` but *not* `Copy`: every duplication is an explicit
//! `.clone()`, which keeps ownership of each word unambiguous at the call
//! site. The shared constants (`ZERO`, `PLUS_ONE`, ...) must be cloned
//! before they are handed to anything that mutates.

use crate::ternary::Trit;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of trits in a tryte.
pub const TRYTE_WIDTH: usize = 9;

/// A 9-trit balanced ternary word.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Tryte {
    /// Digits stored most significant (3^8) first.
    trits: [Trit; TRYTE_WIDTH],
}

impl Tryte {
    /// Largest representable value: +9841 (`+++++++++`).
    pub const MAX_VALUE: i32 = 9_841;

    /// Smallest representable value: -9841 (`---------`).
    pub const MIN_VALUE: i32 = -9_841;

    /// The all-zero word.
    pub const ZERO: Tryte = Tryte { trits: [Trit::O; 9] };

    /// The word with value +1.
    pub const PLUS_ONE: Tryte = Tryte {
        trits: [
            Trit::O,
            Trit::O,
            Trit::O,
            Trit::O,
            Trit::O,
            Trit::O,
            Trit::O,
            Trit::O,
            Trit::P,
        ],
    };

    /// The word with value -1.
    pub const MINUS_ONE: Tryte = Tryte {
        trits: [
            Trit::O,
            Trit::O,
            Trit::O,
            Trit::O,
            Trit::O,
            Trit::O,
            Trit::O,
            Trit::O,
            Trit::N,
        ],
    };

    /// The largest word, all `+`.
    pub const MAX: Tryte = Tryte { trits: [Trit::P; 9] };

    /// The smallest word, all `-`.
    pub const MIN: Tryte = Tryte { trits: [Trit::N; 9] };

    /// Build a tryte from an array of trits, most significant first.
    #[inline]
    pub const fn from_trits(trits: [Trit; TRYTE_WIDTH]) -> Self {
        Self { trits }
    }

    /// The underlying digits, most significant first.
    #[inline]
    pub const fn trits(&self) -> &[Trit; TRYTE_WIDTH] {
        &self.trits
    }

    /// Mutable access to the digits, most significant first.
    #[inline]
    pub fn trits_mut(&mut self) -> &mut [Trit; TRYTE_WIDTH] {
        &mut self.trits
    }

    /// Read one digit (0 = most significant).
    #[inline]
    pub const fn trit(&self, index: usize) -> Trit {
        self.trits[index]
    }

    /// Write one digit (0 = most significant).
    #[inline]
    pub fn set_trit(&mut self, index: usize, trit: Trit) {
        self.trits[index] = trit;
    }

    /// Convert a signed integer to balanced ternary.
    ///
    /// Repeated division by 3, balancing remainder 2 to a `-` digit with a
    /// carry into the next one; a negative input flips every produced digit.
    ///
    /// # Panics
    /// Panics if value is outside [-9841, +9841].
    pub fn from_i32(value: i32) -> Self {
        assert!(
            (Self::MIN_VALUE..=Self::MAX_VALUE).contains(&value),
            "value {} out of tryte range [{}, {}]",
            value,
            Self::MIN_VALUE,
            Self::MAX_VALUE
        );

        let negative = value < 0;
        let mut n = value.abs();
        let mut trits = [Trit::O; TRYTE_WIDTH];

        // Produce digits least significant first, filling from the back.
        for slot in trits.iter_mut().rev() {
            let digit = match n % 3 {
                0 => Trit::O,
                1 => Trit::P,
                2 => {
                    n += 1;
                    Trit::N
                }
                _ => unreachable!(),
            };
            *slot = if negative { digit.neg() } else { digit };
            n /= 3;
        }

        Self { trits }
    }

    /// Evaluate the positional polynomial back to a signed integer.
    pub fn to_i32(&self) -> i32 {
        let mut n = 0i32;
        let mut power = 1i32;

        for trit in self.trits.iter().rev() {
            n += trit.to_i8() as i32 * power;
            power *= 3;
        }

        n
    }

    /// Returns true if every digit is zero.
    pub fn is_zero(&self) -> bool {
        self.trits.iter().all(|t| t.is_zero())
    }
}

impl fmt::Display for Tryte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for trit in &self.trits {
            write!(f, "{}", trit.glyph())?;
        }
        Ok(())
    }
}

impl fmt::Debug for Tryte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tryte({} = {})", self, self.to_i32())
    }
}

/// Errors from parsing a tryte out of text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseTryteError {
    #[error("decimal value {0} out of tryte range [-9841, 9841]")]
    OutOfRange(i64),

    #[error("trit string is {0} glyphs long (at most 9)")]
    TooLong(usize),

    #[error("unknown trit glyph '{0}' (expected '+', 'o', or '-')")]
    InvalidGlyph(char),
}

impl FromStr for Tryte {
    type Err = ParseTryteError;

    /// Parse either a decimal integer or a glyph string.
    ///
    /// Glyph strings shorter than 9 characters are padded with `o` on the
    /// most-significant side.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(decimal) = s.parse::<i64>() {
            if decimal < Self::MIN_VALUE as i64 || decimal > Self::MAX_VALUE as i64 {
                return Err(ParseTryteError::OutOfRange(decimal));
            }
            return Ok(Self::from_i32(decimal as i32));
        }

        let glyphs: Vec<char> = s.chars().collect();
        if glyphs.len() > TRYTE_WIDTH {
            return Err(ParseTryteError::TooLong(glyphs.len()));
        }

        let mut trits = [Trit::O; TRYTE_WIDTH];
        let pad = TRYTE_WIDTH - glyphs.len();
        for (i, ch) in glyphs.into_iter().enumerate() {
            trits[pad + i] = Trit::from_glyph(ch).ok_or(ParseTryteError::InvalidGlyph(ch))?;
        }

        Ok(Self { trits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_values() {
        assert_eq!(Tryte::from_i32(0), Tryte::ZERO);
        assert_eq!(Tryte::from_i32(1), Tryte::PLUS_ONE);
        assert_eq!(Tryte::from_i32(-1), Tryte::MINUS_ONE);
        assert_eq!(Tryte::from_i32(9841), Tryte::MAX);
        assert_eq!(Tryte::from_i32(-9841), Tryte::MIN);

        // 42 = +81 -27 -9 -3 = +--o with trailing zero
        assert_eq!(Tryte::from_i32(42).to_string(), "oooo+---o");
    }

    #[test]
    fn glyph_parsing() {
        // +27 -9 -3, left-padded with o
        let t: Tryte = "+--o".parse().unwrap();
        assert_eq!(t.to_i32(), 15);

        let decimal: Tryte = "-42".parse().unwrap();
        assert_eq!(decimal.to_i32(), -42);

        let single: Tryte = "+".parse().unwrap();
        assert_eq!(single.to_i32(), 1);

        assert_eq!(
            "++++++++++".parse::<Tryte>(),
            Err(ParseTryteError::TooLong(10))
        );
        assert_eq!(
            "ox+".parse::<Tryte>(),
            Err(ParseTryteError::InvalidGlyph('x'))
        );
        assert_eq!(
            "10000".parse::<Tryte>(),
            Err(ParseTryteError::OutOfRange(10000))
        );
    }

    #[test]
    fn clone_does_not_alias() {
        let mut a = Tryte::ZERO.clone();
        a.set_trit(8, Trit::P);
        assert_eq!(Tryte::ZERO.to_i32(), 0);
        assert_eq!(a.to_i32(), 1);
    }

    #[test]
    #[should_panic]
    fn from_i32_rejects_out_of_range() {
        Tryte::from_i32(9842);
    }

    proptest! {
        #[test]
        fn decimal_roundtrip(n in -9841i32..=9841) {
            prop_assert_eq!(Tryte::from_i32(n).to_i32(), n);
        }

        #[test]
        fn glyph_roundtrip(n in -9841i32..=9841) {
            let t = Tryte::from_i32(n);
            let parsed: Tryte = t.to_string().parse().unwrap();
            prop_assert_eq!(parsed, t);
        }
    }
}
