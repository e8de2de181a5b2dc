//! Disassembler: renders decoded instructions as assembly-like text.
//!
//! Feeds the CLI's trace output and the `disasm` subcommand; the CPU does
//! not depend on it.

use crate::ternary::Tryte;
use crate::vm::instruction::{AddressingMode, Instruction, Opcode};
use crate::vm::REGISTER_NAMES;

fn register_name(selector: i8) -> &'static str {
    REGISTER_NAMES[(selector + 4) as usize]
}

/// The second-operand spelling: register name, short literal, or the
/// trailing word's value.
fn operand_text(instruction: &Instruction) -> String {
    match instruction.mode {
        AddressingMode::RegisterRegister => register_name(instruction.y).to_string(),
        AddressingMode::ShortImmediate => instruction.y.to_string(),
        AddressingMode::WordImmediate => match &instruction.z {
            Some(z) => z.to_i32().to_string(),
            None => "?".to_string(),
        },
    }
}

/// Render one decoded instruction.
pub fn disassemble_instruction(instruction: &Instruction) -> String {
    let mnemonic = instruction.opcode.mnemonic();

    match instruction.opcode {
        Opcode::Ldo
        | Opcode::Sto
        | Opcode::Jeq
        | Opcode::Jne
        | Opcode::Jgt
        | Opcode::Jlt
        | Opcode::Jge
        | Opcode::Jle => {
            let target = match &instruction.z {
                Some(z) => z.to_i32().to_string(),
                None => "?".to_string(),
            };
            format!(
                "{} {}, {}, {}",
                mnemonic,
                register_name(instruction.x),
                register_name(instruction.y),
                target
            )
        }

        Opcode::Jmp | Opcode::Jal => format!("{} {}", mnemonic, operand_text(instruction)),

        _ => format!(
            "{} {}, {}",
            mnemonic,
            register_name(instruction.x),
            operand_text(instruction)
        ),
    }
}

/// Render a whole object image, one line per instruction, with addresses.
/// Undecodable words are listed as raw `.word` lines.
pub fn disassemble(image: &[Tryte]) -> Vec<String> {
    let mut listing = Vec::new();
    let mut index = 0;

    while index < image.len() {
        let address = Tryte::MIN_VALUE + index as i32;
        let word = &image[index];
        index += 1;

        let text = match Instruction::decode(word, || {
            let z = image.get(index).cloned().unwrap_or(Tryte::ZERO);
            index += 1;
            z
        }) {
            Ok(instruction) => disassemble_instruction(&instruction),
            Err(_) => format!(".word {}", word),
        };

        listing.push(format!("{:>6}  {}", address, text));
    }

    listing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;

    #[test]
    fn renders_addressing_modes() {
        let assembly =
            assemble("ADD r0, r1\nADD r0, -2\nADD r0, 1000\nJLT r0, r4, 100\nJMP .end\n.end")
                .unwrap();
        let listing = disassemble(&assembly.image);

        assert_eq!(listing.len(), 5);
        assert!(listing[0].ends_with("ADD r0, r1"));
        assert!(listing[1].ends_with("ADD r0, -2"));
        assert!(listing[2].ends_with("ADD r0, 1000"));
        assert!(listing[3].ends_with("JLT r0, r4, 100"));
        assert!(listing[4].ends_with(&format!("JMP {}", Tryte::MIN_VALUE + 8)));
    }

    #[test]
    fn unknown_words_fall_back_to_raw() {
        let bad: Tryte = "----ooooo".parse().unwrap();
        let listing = disassemble(&[bad]);
        assert!(listing[0].ends_with(".word ----ooooo"));
    }
}
