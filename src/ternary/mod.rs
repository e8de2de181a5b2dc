//! Balanced ternary primitives.
//!
//! - [`Trit`] - a single balanced ternary digit (-1, 0, +1)
//! - [`Tryte`] - the 9-trit machine word, range [-9841, +9841]
//! - [`Alu`] - the stateful arithmetic-logic unit operating on trytes

mod alu;
mod trit;
mod tryte;

pub use alu::Alu;
pub use trit::Trit;
pub use tryte::{ParseTryteError, Tryte, TRYTE_WIDTH};
