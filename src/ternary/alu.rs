//! The base-3 arithmetic-logic unit.
//!
//! ALU operations take the form `f(a, b)` where `a` is mutated in place to
//! the result. The unit is stateful: the carry trit persists across calls,
//! which is what makes multi-word addition chains work — callers beginning
//! an unrelated add must pass `with_carry = false` to clear it.
//!
//! Not every ternary logical operation is implemented; there would be far
//! too many. See <http://homepage.divms.uiowa.edu/~jones/ternary/logic.shtml>.

use crate::ternary::{Trit, Tryte, TRYTE_WIDTH};

/// Number of distinct tryte values (3^9); used when wrapping oversized
/// multiply results back into range.
const TRYTE_VALUES: i64 = 19_683;

/// Stateful balanced ternary ALU.
#[derive(Debug, Default)]
pub struct Alu {
    /// Carry out of the last add, or the last trit shifted out.
    pub carry: Trit,
}

impl Alu {
    pub fn new() -> Self {
        Self { carry: Trit::O }
    }

    /// `a += b`, trit by trit from least to most significant.
    ///
    /// With `with_carry` the current carry trit seeds the least significant
    /// digit, continuing a multi-word chain; without it the carry is cleared
    /// first. To subtract, `neg` the operand beforehand.
    pub fn add(&mut self, a: &mut Tryte, b: &Tryte, with_carry: bool) {
        if !with_carry {
            self.carry = Trit::O;
        }

        for d in (0..TRYTE_WIDTH).rev() {
            let val = a.trit(d).to_i8() + b.trit(d).to_i8() + self.carry.to_i8();

            let (digit, carry) = match val {
                3 => (Trit::O, Trit::P),
                2 => (Trit::N, Trit::P),
                1 => (Trit::P, Trit::O),
                0 => (Trit::O, Trit::O),
                -1 => (Trit::N, Trit::O),
                -2 => (Trit::P, Trit::N),
                -3 => (Trit::O, Trit::N),
                bad => unreachable!("trit sum {} outside [-3, 3]", bad),
            };

            a.set_trit(d, digit);
            self.carry = carry;
        }
    }

    /// `a *= b`, via conversion through ordinary integers.
    ///
    /// Oversized products are truncated to 9 trits (wrapped into range).
    pub fn multiply(&mut self, a: &mut Tryte, b: &Tryte) {
        let product = a.to_i32() as i64 * b.to_i32() as i64;
        self.copy(a, &Tryte::from_i32(wrap_to_tryte(product)));
    }

    /// `a /= b`, via conversion through ordinary integers, truncating
    /// toward zero. A zero divisor leaves `a` untouched.
    pub fn divide(&mut self, a: &mut Tryte, b: &Tryte) {
        if b.is_zero() {
            log::warn!("division by zero leaves operand unchanged");
            return;
        }
        let quotient = a.to_i32() / b.to_i32();
        self.copy(a, &Tryte::from_i32(quotient));
    }

    /// `a %= b`, remainder of the truncating division. A zero divisor
    /// leaves `a` untouched.
    pub fn modulo(&mut self, a: &mut Tryte, b: &Tryte) {
        if b.is_zero() {
            log::warn!("modulo by zero leaves operand unchanged");
            return;
        }
        let remainder = a.to_i32() % b.to_i32();
        self.copy(a, &Tryte::from_i32(remainder));
    }

    /// Three-way comparison, most significant trit first.
    ///
    /// Returns `+` when a > b, `-` when a < b, `o` when equal. Comparing
    /// against [`Tryte::ZERO`] yields the sign of `a`.
    pub fn compare(&self, a: &Tryte, b: &Tryte) -> Trit {
        for d in 0..TRYTE_WIDTH {
            if a.trit(d).to_i8() > b.trit(d).to_i8() {
                return Trit::P;
            } else if a.trit(d).to_i8() < b.trit(d).to_i8() {
                return Trit::N;
            }
        }

        Trit::O
    }

    /// `a = -b`, the tritwise negation (ternary NOT).
    pub fn neg(&mut self, a: &mut Tryte, b: &Tryte) {
        for d in 0..TRYTE_WIDTH {
            a.set_trit(d, b.trit(d).neg());
        }
    }

    /// Tritwise minimum (ternary AND).
    pub fn min(&mut self, a: &mut Tryte, b: &Tryte) {
        for d in 0..TRYTE_WIDTH {
            if a.trit(d).to_i8() > b.trit(d).to_i8() {
                a.set_trit(d, b.trit(d));
            }
        }
    }

    /// Tritwise maximum (ternary OR).
    pub fn max(&mut self, a: &mut Tryte, b: &Tryte) {
        for d in 0..TRYTE_WIDTH {
            if a.trit(d).to_i8() < b.trit(d).to_i8() {
                a.set_trit(d, b.trit(d));
            }
        }
    }

    /// Tritwise XOR: opposite trits give `+`, like non-zero trits give `-`,
    /// and if either trit is zero the result is zero.
    ///
    /// Crafted masks turn this into a field extractor — a mask of `-` trits
    /// copies the other operand's trits in those positions and zeroes the
    /// rest:
    ///
    /// ```text
    ///   ooo---ooo
    /// ^ +o-+o-+o-
    /// = ooo+o-ooo
    /// ```
    pub fn xor(&mut self, a: &mut Tryte, b: &Tryte) {
        for d in 0..TRYTE_WIDTH {
            let result = match (a.trit(d), b.trit(d)) {
                (Trit::O, _) | (_, Trit::O) => Trit::O,
                (x, y) if x == y => Trit::N,
                _ => Trit::P,
            };
            a.set_trit(d, result);
        }
    }

    /// Tritwise consensus: trits of `a` that disagree with `b` are zeroed;
    /// the value survives only where both operands agree.
    pub fn consensus(&mut self, a: &mut Tryte, b: &Tryte) {
        for d in 0..TRYTE_WIDTH {
            if a.trit(d) != b.trit(d) {
                a.set_trit(d, Trit::O);
            }
        }
    }

    /// Tritwise accept-anything: a zero trit of `a` adopts `b`'s trit, and
    /// outright disagreement (one `+`, one `-`) zeroes the position.
    ///
    /// Merges two trytes that each know disjoint parts of a value:
    ///
    /// ```text
    ///     oooooo---
    /// ANY +++oooooo
    ///   = +++ooo---
    /// ```
    pub fn accept_anything(&mut self, a: &mut Tryte, b: &Tryte) {
        for d in 0..TRYTE_WIDTH {
            match (a.trit(d), b.trit(d)) {
                (Trit::O, other) => a.set_trit(d, other),
                (Trit::P, Trit::N) | (Trit::N, Trit::P) => a.set_trit(d, Trit::O),
                _ => {}
            }
        }
    }

    /// `a = b`, overwriting every trit.
    pub fn copy(&mut self, a: &mut Tryte, b: &Tryte) {
        for d in 0..TRYTE_WIDTH {
            a.set_trit(d, b.trit(d));
        }
    }

    /// Logical right shift by a tryte-valued count, zero-filling.
    ///
    /// Each single step pops the least significant trit into the carry and
    /// prepends a zero at the most significant end. A negative count shifts
    /// leftward instead (most significant trit into carry, zero appended).
    /// The count is walked to zero with the ALU's own `add`, so the full
    /// representable range works; a zero count is a no-op.
    pub fn shift_right(&mut self, a: &mut Tryte, amount: &Tryte) {
        match self.compare(amount, &Tryte::ZERO) {
            Trit::P => {
                let mut i = amount.clone();
                while self.compare(&i, &Tryte::ZERO) != Trit::O {
                    self.carry = a.trit(TRYTE_WIDTH - 1);
                    for d in (1..TRYTE_WIDTH).rev() {
                        let up = a.trit(d - 1);
                        a.set_trit(d, up);
                    }
                    a.set_trit(0, Trit::O);

                    self.add(&mut i, &Tryte::MINUS_ONE, false);
                }
            }
            Trit::N => {
                let mut i = amount.clone();
                while self.compare(&i, &Tryte::ZERO) != Trit::O {
                    self.carry = a.trit(0);
                    for d in 0..TRYTE_WIDTH - 1 {
                        let down = a.trit(d + 1);
                        a.set_trit(d, down);
                    }
                    a.set_trit(TRYTE_WIDTH - 1, Trit::O);

                    self.add(&mut i, &Tryte::PLUS_ONE, false);
                }
            }
            Trit::O => {}
        }
    }

    /// Cyclic value shift: rotates every trit's three-valued state rather
    /// than moving digit positions. One upward step maps `+` to `-`, `o` to
    /// `+`, and `-` to `o`; a negative count applies the inverse map.
    pub fn shift_up(&mut self, a: &mut Tryte, amount: &Tryte) {
        match self.compare(amount, &Tryte::ZERO) {
            Trit::P => {
                let mut i = amount.clone();
                while self.compare(&i, &Tryte::ZERO) == Trit::P {
                    for d in 0..TRYTE_WIDTH {
                        let rotated = match a.trit(d) {
                            Trit::P => Trit::N,
                            Trit::O => Trit::P,
                            Trit::N => Trit::O,
                        };
                        a.set_trit(d, rotated);
                    }

                    self.add(&mut i, &Tryte::MINUS_ONE, false);
                }
            }
            Trit::N => {
                let mut i = amount.clone();
                while self.compare(&i, &Tryte::ZERO) == Trit::N {
                    for d in 0..TRYTE_WIDTH {
                        let rotated = match a.trit(d) {
                            Trit::P => Trit::O,
                            Trit::O => Trit::N,
                            Trit::N => Trit::P,
                        };
                        a.set_trit(d, rotated);
                    }

                    self.add(&mut i, &Tryte::PLUS_ONE, false);
                }
            }
            Trit::O => {}
        }
    }
}

/// Truncate an integer to 9 balanced ternary digits (symmetric wrap).
fn wrap_to_tryte(value: i64) -> i32 {
    let max = Tryte::MAX_VALUE as i64;
    ((value + max).rem_euclid(TRYTE_VALUES) - max) as i32
}
