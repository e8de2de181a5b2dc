//! Instruction encoding and decoding.
//!
//! A machine instruction is one tryte, most significant trits first:
//!
//! ```text
//!  oooo m xx yy
//!  |    | |  |
//!  |    | |  | y: register selector or short immediate (2 trits)
//!  |    | |
//!  |    | | x: register selector (2 trits)
//!  |    |
//!  |    | addressing mode (1 trit)
//!  |
//!  | opcode (4 trits)
//! ```
//!
//! Only the word-immediate addressing mode consumes a second tryte `z`
//! (a wide immediate or an address) from the instruction stream.

use crate::ternary::{Trit, Tryte};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How an instruction's second operand is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressingMode {
    /// `y` selects a register; no trailing word. Mode trit `-`.
    RegisterRegister,
    /// `y` is itself a small literal in [-4, 4]; no trailing word.
    /// Mode trit `o`.
    ShortImmediate,
    /// A full trailing tryte `z` carries an address or wide immediate.
    /// Mode trit `+`.
    WordImmediate,
}

impl AddressingMode {
    pub fn from_trit(t: Trit) -> Self {
        match t {
            Trit::N => AddressingMode::RegisterRegister,
            Trit::O => AddressingMode::ShortImmediate,
            Trit::P => AddressingMode::WordImmediate,
        }
    }

    pub fn to_trit(self) -> Trit {
        match self {
            AddressingMode::RegisterRegister => Trit::N,
            AddressingMode::ShortImmediate => Trit::O,
            AddressingMode::WordImmediate => Trit::P,
        }
    }
}

/// The operation table, keyed by the signed value of the 4-trit opcode
/// field. Values outside the enum are unknown and halt the CPU; -40 is
/// reserved.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    IntoPrimitive,
    TryFromPrimitive,
)]
#[repr(i8)]
pub enum Opcode {
    Add = -39,
    Adc = -38,
    Mul = -37,
    Div = -36,
    Mod = -35,
    Neg = -34,
    Min = -33,
    Max = -32,
    Xor = -31,
    Con = -30,
    Any = -29,
    Shr = -28,
    Shu = -27,

    Mov = 0,
    Lda = 1,
    Sta = 2,
    Ldo = 3,
    Sto = 4,

    Jeq = 30,
    Jne = 31,
    Jgt = 32,
    Jlt = 33,
    Jge = 34,
    Jle = 35,
    Jmp = 36,
    Jal = 37,
}

impl Opcode {
    /// The assembly mnemonic for this opcode.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "ADD",
            Opcode::Adc => "ADC",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Neg => "NEG",
            Opcode::Min => "MIN",
            Opcode::Max => "MAX",
            Opcode::Xor => "XOR",
            Opcode::Con => "CON",
            Opcode::Any => "ANY",
            Opcode::Shr => "SHR",
            Opcode::Shu => "SHU",
            Opcode::Mov => "MOV",
            Opcode::Lda => "LDA",
            Opcode::Sta => "STA",
            Opcode::Ldo => "LDO",
            Opcode::Sto => "STO",
            Opcode::Jeq => "JEQ",
            Opcode::Jne => "JNE",
            Opcode::Jgt => "JGT",
            Opcode::Jlt => "JLT",
            Opcode::Jge => "JGE",
            Opcode::Jle => "JLE",
            Opcode::Jmp => "JMP",
            Opcode::Jal => "JAL",
        }
    }
}

/// A decoded machine instruction.
///
/// `x` and `y` are the raw 2-trit field values (-4..=4); the CPU adds the
/// register bias when it resolves them. `z` is present exactly when the
/// addressing mode is [`AddressingMode::WordImmediate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub mode: AddressingMode,
    pub x: i8,
    pub y: i8,
    pub z: Option<Tryte>,
}

impl Instruction {
    /// Pack the instruction into its encoded form: the instruction tryte
    /// plus the trailing word, if any.
    pub fn encode(&self) -> (Tryte, Option<Tryte>) {
        let mut word = Tryte::ZERO.clone();
        let trits = word.trits_mut();

        encode_field(i8::from(self.opcode), &mut trits[0..4]);
        trits[4] = self.mode.to_trit();
        encode_field(self.x, &mut trits[5..7]);
        encode_field(self.y, &mut trits[7..9]);

        (word, self.z.clone())
    }

    /// Unpack one instruction tryte. `fetch` is called to pull the trailing
    /// `z` word from the instruction stream, and only for word-immediate
    /// instructions.
    pub fn decode<F>(word: &Tryte, fetch: F) -> Result<Self, DecodeError>
    where
        F: FnOnce() -> Tryte,
    {
        let trits = word.trits();

        let opcode_value = decode_field(&trits[0..4]);
        let opcode = Opcode::try_from(opcode_value)
            .map_err(|_| DecodeError::UnknownOpcode(opcode_value))?;
        let mode = AddressingMode::from_trit(trits[4]);
        let x = decode_field(&trits[5..7]);
        let y = decode_field(&trits[7..9]);

        let z = match mode {
            AddressingMode::WordImmediate => Some(fetch()),
            _ => None,
        };

        Ok(Self { opcode, mode, x, y, z })
    }
}

/// Write a small signed value into a trit field, most significant first.
///
/// A field of width w holds [-(3^w - 1)/2, +(3^w - 1)/2]; the caller is
/// responsible for staying in range.
fn encode_field(value: i8, out: &mut [Trit]) {
    let mut n = value as i32;

    for slot in out.iter_mut().rev() {
        let mut digit = n % 3;
        n /= 3;
        if digit == 2 {
            digit = -1;
            n += 1;
        } else if digit == -2 {
            digit = 1;
            n -= 1;
        }
        *slot = Trit::from_i8(digit as i8);
    }

    debug_assert_eq!(n, 0, "field value {} does not fit {} trits", value, out.len());
}

/// Read a small signed value out of a trit field, most significant first.
fn decode_field(trits: &[Trit]) -> i8 {
    trits
        .iter()
        .fold(0i8, |acc, trit| acc * 3 + trit.to_i8())
}

/// Errors from unpacking an instruction tryte.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode {0}")]
    UnknownOpcode(i8),
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_OPCODES: [Opcode; 26] = [
        Opcode::Add,
        Opcode::Adc,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Neg,
        Opcode::Min,
        Opcode::Max,
        Opcode::Xor,
        Opcode::Con,
        Opcode::Any,
        Opcode::Shr,
        Opcode::Shu,
        Opcode::Mov,
        Opcode::Lda,
        Opcode::Sta,
        Opcode::Ldo,
        Opcode::Sto,
        Opcode::Jeq,
        Opcode::Jne,
        Opcode::Jgt,
        Opcode::Jlt,
        Opcode::Jge,
        Opcode::Jle,
        Opcode::Jmp,
        Opcode::Jal,
    ];

    #[test]
    fn field_roundtrip() {
        let mut buf = [Trit::O; 4];
        for value in -40i8..=40 {
            encode_field(value, &mut buf);
            assert_eq!(decode_field(&buf), value);
        }

        let mut small = [Trit::O; 2];
        for value in -4i8..=4 {
            encode_field(value, &mut small);
            assert_eq!(decode_field(&small), value);
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        for opcode in ALL_OPCODES {
            for (mode, z) in [
                (AddressingMode::RegisterRegister, None),
                (AddressingMode::ShortImmediate, None),
                (AddressingMode::WordImmediate, Some(Tryte::from_i32(-321))),
            ] {
                for x in [-4i8, 0, 3] {
                    for y in [-2i8, 0, 4] {
                        let record = Instruction {
                            opcode,
                            mode,
                            x,
                            y,
                            z: z.clone(),
                        };

                        let (word, tail) = record.encode();
                        let decoded = Instruction::decode(&word, || {
                            tail.clone().expect("fetch called without trailing word")
                        })
                        .unwrap();

                        assert_eq!(decoded, record);
                    }
                }
            }
        }
    }

    #[test]
    fn canonical_nop_encoding() {
        // MOV r4, r4: opcode 0, register-register, x = y = 0.
        let nop = Instruction {
            opcode: Opcode::Mov,
            mode: AddressingMode::RegisterRegister,
            x: 0,
            y: 0,
            z: None,
        };

        let (word, tail) = nop.encode();
        assert_eq!(word.to_string(), "oooo-oooo");
        assert!(tail.is_none());
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        // Opcode field -40 is reserved and not in the table.
        let mut word = Tryte::ZERO.clone();
        encode_field(-40, &mut word.trits_mut()[0..4]);

        let err = Instruction::decode(&word, || unreachable!()).unwrap_err();
        assert_eq!(err, DecodeError::UnknownOpcode(-40));
    }

    #[test]
    fn only_word_immediate_fetches_z() {
        let record = Instruction {
            opcode: Opcode::Add,
            mode: AddressingMode::ShortImmediate,
            x: -4,
            y: 3,
            z: None,
        };
        let (word, _) = record.encode();

        // The fetch closure must not run for a one-word instruction.
        let decoded = Instruction::decode(&word, || panic!("fetched z")).unwrap();
        assert_eq!(decoded, record);
    }
}
