//! Single balanced ternary digit (trit).
//!
//! A trit holds one of three values: -1, 0, or +1, written with the
//! glyphs `-`, `o`, and `+` everywhere the console shows ternary to a
//! human (assembly immediates, register dumps, object images).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single balanced ternary digit.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i8)]
pub enum Trit {
    /// Negative (-1), glyph `-`
    N = -1,
    /// Zero (0), glyph `o`
    O = 0,
    /// Positive (+1), glyph `+`
    P = 1,
}

impl Trit {
    /// All trit values in ascending order: N, O, P.
    pub const ALL: [Trit; 3] = [Trit::N, Trit::O, Trit::P];

    /// Create a trit from an integer value.
    ///
    /// # Panics
    /// Panics if value is not in {-1, 0, 1}.
    #[inline]
    pub fn from_i8(value: i8) -> Self {
        match value {
            -1 => Trit::N,
            0 => Trit::O,
            1 => Trit::P,
            _ => panic!("invalid trit value: {} (must be -1, 0, or 1)", value),
        }
    }

    /// Convert to the integer value.
    #[inline]
    pub const fn to_i8(self) -> i8 {
        self as i8
    }

    /// Create a trit from a glyph character.
    #[inline]
    pub fn from_glyph(ch: char) -> Option<Self> {
        match ch {
            '-' => Some(Trit::N),
            'o' => Some(Trit::O),
            '+' => Some(Trit::P),
            _ => None,
        }
    }

    /// The glyph character for this trit.
    #[inline]
    pub const fn glyph(self) -> char {
        match self {
            Trit::N => '-',
            Trit::O => 'o',
            Trit::P => '+',
        }
    }

    /// Negate the trit (flip N and P, O stays O).
    #[inline]
    pub const fn neg(self) -> Self {
        match self {
            Trit::N => Trit::P,
            Trit::O => Trit::O,
            Trit::P => Trit::N,
        }
    }

    /// Returns true if this trit is zero.
    #[inline]
    pub const fn is_zero(self) -> bool {
        matches!(self, Trit::O)
    }
}

impl Default for Trit {
    fn default() -> Self {
        Trit::O
    }
}

impl fmt::Debug for Trit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.glyph())
    }
}

impl fmt::Display for Trit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.glyph())
    }
}

impl std::ops::Neg for Trit {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Trit::neg(self)
    }
}

impl From<Trit> for i8 {
    fn from(trit: Trit) -> Self {
        trit.to_i8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_is_involution() {
        for t in Trit::ALL {
            assert_eq!(t.neg().neg(), t);
        }
    }

    #[test]
    fn i8_roundtrip() {
        for t in Trit::ALL {
            assert_eq!(Trit::from_i8(t.to_i8()), t);
        }
    }

    #[test]
    fn glyph_roundtrip() {
        for t in Trit::ALL {
            assert_eq!(Trit::from_glyph(t.glyph()), Some(t));
        }
        assert_eq!(Trit::from_glyph('x'), None);
        assert_eq!(Trit::from_glyph('0'), None);
    }

    #[test]
    #[should_panic]
    fn from_i8_rejects_out_of_range() {
        Trit::from_i8(2);
    }
}
