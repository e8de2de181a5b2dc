//! Two-pass assembler for the console's mnemonic language.
//!
//! ```text
//! ; comment
//! .loop            ; label bound to the current address
//! $cursor          ; reserve one tryte of data
//! $palette[27]     ; reserve 27 trytes
//!     ADD r0, +    ; short immediate
//!     LDA r1, $cursor
//!     JLT r0, $ZERO, .loop
//!     PSH r0, r1   ; pseudo-instruction, expands to real ones
//! ```
//!
//! Pass 1 lays out addresses and parses instruction records without
//! resolving symbol references; pass 2 merges the hardware, label, and
//! data symbol tables, resolves, encodes, and emits the object image.

use crate::asm::symbols::{Symbol, SymbolTable};
use crate::ternary::Tryte;
use crate::vm::instruction::{AddressingMode, Instruction, Opcode};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Register selector for `sp`, used by pseudo-instruction expansion.
const SP_SELECTOR: i8 = 4;

/// The result of a successful assembly: the object image (dense, indexed
/// from the entry address) and the debug side channel.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub image: Vec<Tryte>,
    pub debug: DebugInfo,
}

/// Debug map for an external debugger UI. Not consumed by the CPU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugInfo {
    /// Emitted instruction address -> 1-based source line.
    pub lines: HashMap<i32, usize>,
    /// The fully resolved symbol table, built-ins included.
    pub symbols: HashMap<String, Symbol>,
}

/// Assemble source text into an object image.
///
/// Any error is fatal to the whole run; no partial output is returned.
pub fn assemble(source: &str) -> Result<Assembly, AsmError> {
    let builtins = SymbolTable::with_builtins();

    // Pass 1: layout. Walk the lines with a running address, collecting
    // labels, data reservations, and unresolved instruction records.
    let mut address = Tryte::MIN_VALUE;
    let mut records = Vec::new();
    let mut labels: HashMap<String, i32> = HashMap::new();
    let mut data: HashMap<String, Symbol> = HashMap::new();

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.split(';').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('.') {
            let name = parse_symbol_name(rest).ok_or(AsmError::MalformedLabel { line: line_no })?;
            let key = format!(".{}", name);
            if labels.contains_key(&key) {
                return Err(AsmError::DuplicateSymbol { line: line_no, name: key });
            }
            labels.insert(key, address);
        } else if let Some(rest) = line.strip_prefix('$') {
            let (name, size) = parse_data_declaration(rest, line_no)?;
            let key = format!("${}", name);
            if data.contains_key(&key) {
                return Err(AsmError::DuplicateSymbol { line: line_no, name: key });
            }
            data.insert(
                key,
                Symbol {
                    address,
                    size: Some(size as u32),
                },
            );
            address += size;
        } else {
            for proto in parse_instruction_line(line, line_no, &builtins)? {
                let width = 1 + proto.z.is_some() as i32;
                records.push(Record {
                    address,
                    line: line_no,
                    proto,
                });
                address += width;
            }
        }

        if address > Tryte::MAX_VALUE + 1 {
            return Err(AsmError::ProgramTooLarge { line: line_no });
        }
    }

    // Pass 2: merge symbol sources (later shadows earlier), resolve, and
    // emit.
    let mut symbols = builtins;
    for (name, label_address) in &labels {
        symbols.insert(
            name,
            Symbol {
                address: *label_address,
                size: None,
            },
        );
    }
    for (name, reservation) in &data {
        symbols.insert(name, reservation.clone());
    }

    let mut image = vec![Tryte::ZERO; (address - Tryte::MIN_VALUE) as usize];
    let mut lines = HashMap::new();

    for record in &records {
        let z = match &record.proto.z {
            None => None,
            Some(ZOperand::Literal(value)) => Some(value.clone()),
            Some(ZOperand::Symbol(reference)) => {
                let symbol =
                    symbols
                        .get(&reference.name)
                        .ok_or_else(|| AsmError::UndefinedSymbol {
                            line: record.line,
                            name: reference.name.clone(),
                        })?;
                let value = symbol.address as i64 + reference.offset as i64;
                if value < Tryte::MIN_VALUE as i64 || value > Tryte::MAX_VALUE as i64 {
                    return Err(AsmError::SymbolOutOfRange {
                        line: record.line,
                        name: reference.name.clone(),
                        value,
                    });
                }
                Some(Tryte::from_i32(value as i32))
            }
        };

        let instruction = Instruction {
            opcode: record.proto.opcode,
            mode: record.proto.mode,
            x: record.proto.x,
            y: record.proto.y,
            z,
        };
        let (word, tail) = instruction.encode();

        let base = (record.address - Tryte::MIN_VALUE) as usize;
        debug!("{:>6}: {} ; line {}", record.address, word, record.line);
        image[base] = word;
        if let Some(tail) = tail {
            debug!("{:>6}: {}", record.address + 1, tail);
            image[base + 1] = tail;
        }
        lines.insert(record.address, record.line);
    }

    Ok(Assembly {
        image,
        debug: DebugInfo {
            lines,
            symbols: symbols.entries().clone(),
        },
    })
}

/// An instruction with its z operand possibly still symbolic.
#[derive(Debug, Clone)]
struct Proto {
    opcode: Opcode,
    mode: AddressingMode,
    x: i8,
    y: i8,
    z: Option<ZOperand>,
}

#[derive(Debug, Clone)]
struct Record {
    address: i32,
    line: usize,
    proto: Proto,
}

#[derive(Debug, Clone)]
enum ZOperand {
    Literal(Tryte),
    Symbol(SymbolRef),
}

/// A sigil-prefixed symbol reference with an optional bracketed offset.
#[derive(Debug, Clone)]
struct SymbolRef {
    name: String,
    offset: i32,
}

/// Result of the shared y/z operand chooser.
enum YZ {
    Register(i8),
    Short(i8),
    Wide(ZOperand),
}

/// Classify a second operand: register, short immediate (fits the 2-trit
/// y field), or something that needs the trailing word.
fn choose_yz(operand: &str) -> Option<YZ> {
    if let Some(selector) = register_selector(operand) {
        return Some(YZ::Register(selector));
    }

    if let Ok(value) = operand.parse::<Tryte>() {
        let n = value.to_i32();
        return Some(if (-4..=4).contains(&n) {
            YZ::Short(n as i8)
        } else {
            YZ::Wide(ZOperand::Literal(value))
        });
    }

    parse_symbol_ref(operand).map(|reference| YZ::Wide(ZOperand::Symbol(reference)))
}

/// An address operand: a symbol reference or a raw immediate.
fn parse_address_operand(operand: &str) -> Option<ZOperand> {
    if let Some(reference) = parse_symbol_ref(operand) {
        return Some(ZOperand::Symbol(reference));
    }
    operand.parse::<Tryte>().ok().map(ZOperand::Literal)
}

/// The fixed register table, mapping names to bias-adjusted selectors.
fn register_selector(operand: &str) -> Option<i8> {
    match operand.to_lowercase().as_str() {
        "r0" => Some(-4),
        "r1" => Some(-3),
        "r2" => Some(-2),
        "r3" => Some(-1),
        "r4" => Some(0),
        "r5" => Some(1),
        "r6" => Some(2),
        "ra" => Some(3),
        "sp" => Some(4),
        _ => None,
    }
}

/// Validate a bare symbol name (no sigil, no brackets, no whitespace).
fn parse_symbol_name(name: &str) -> Option<&str> {
    let name = name.trim();
    if name.is_empty()
        || name.contains(|c: char| c.is_whitespace() || c == '[' || c == ']' || c == ',')
    {
        return None;
    }
    Some(name)
}

/// Parse `$name` / `.name` with an optional `[offset]` suffix.
fn parse_symbol_ref(operand: &str) -> Option<SymbolRef> {
    if !operand.starts_with('$') && !operand.starts_with('.') {
        return None;
    }

    let (body, offset) = match operand.find('[') {
        Some(open) => {
            let inner = operand.strip_suffix(']')?;
            let offset = inner[open + 1..].trim().parse::<i32>().ok()?;
            (&operand[..open], offset)
        }
        None => (operand, 0),
    };

    parse_symbol_name(&body[1..])?;
    Some(SymbolRef {
        name: body.to_string(),
        offset,
    })
}

/// Parse the body of a `$name` or `$name[size]` data declaration.
fn parse_data_declaration(rest: &str, line: usize) -> Result<(&str, i32), AsmError> {
    let malformed = AsmError::MalformedData { line };

    match rest.find('[') {
        Some(open) => {
            let inner = rest.strip_suffix(']').ok_or_else(|| malformed.clone())?;
            let name = parse_symbol_name(&rest[..open]).ok_or_else(|| malformed.clone())?;
            let size = inner[open + 1..]
                .trim()
                .parse::<i32>()
                .map_err(|_| malformed)?;
            if size <= 0 {
                return Err(AsmError::NonPositiveDataSize {
                    line,
                    name: name.to_string(),
                    size,
                });
            }
            Ok((name, size))
        }
        None => {
            let name = parse_symbol_name(rest).ok_or(malformed)?;
            Ok((name, 1))
        }
    }
}

/// Split an instruction line into mnemonic and comma-separated operands.
fn split_line(line: &str) -> (&str, Vec<&str>) {
    match line.split_once(char::is_whitespace) {
        Some((mnemonic, rest)) if !rest.trim().is_empty() => {
            (mnemonic, rest.split(',').map(str::trim).collect())
        }
        Some((mnemonic, _)) => (mnemonic, Vec::new()),
        None => (line, Vec::new()),
    }
}

/// Parse one instruction line into one or more records (pseudo-instructions
/// expand here).
fn parse_instruction_line(
    line: &str,
    line_no: usize,
    builtins: &SymbolTable,
) -> Result<Vec<Proto>, AsmError> {
    let (mnemonic_raw, operands) = split_line(line);
    let mnemonic = mnemonic_raw.to_uppercase();

    let bad = |operand: usize, expected: &'static str| AsmError::BadOperand {
        line: line_no,
        mnemonic: mnemonic.clone(),
        operand,
        expected,
    };
    let exactly = |count: usize| {
        if operands.len() > count {
            Err(AsmError::TooManyOperands {
                line: line_no,
                mnemonic: mnemonic.clone(),
            })
        } else {
            Ok(())
        }
    };

    let opcode = match mnemonic.as_str() {
        "ADD" => Opcode::Add,
        "ADC" => Opcode::Adc,
        "MUL" => Opcode::Mul,
        "DIV" => Opcode::Div,
        "MOD" => Opcode::Mod,
        "NEG" => Opcode::Neg,
        "MIN" => Opcode::Min,
        "MAX" => Opcode::Max,
        "XOR" => Opcode::Xor,
        "CON" => Opcode::Con,
        "ANY" => Opcode::Any,
        "SHR" => Opcode::Shr,
        "SHU" => Opcode::Shu,
        "MOV" => Opcode::Mov,
        "LDA" => Opcode::Lda,
        "STA" => Opcode::Sta,
        "LDO" => Opcode::Ldo,
        "STO" => Opcode::Sto,
        "JEQ" => Opcode::Jeq,
        "JNE" => Opcode::Jne,
        "JGT" => Opcode::Jgt,
        "JLT" => Opcode::Jlt,
        "JGE" => Opcode::Jge,
        "JLE" => Opcode::Jle,
        "JMP" => Opcode::Jmp,
        "JAL" => Opcode::Jal,

        "NOP" => {
            exactly(0)?;
            // Canonical encoding: MOV r4 onto itself.
            return Ok(vec![Proto {
                opcode: Opcode::Mov,
                mode: AddressingMode::RegisterRegister,
                x: 0,
                y: 0,
                z: None,
            }]);
        }

        "PSH" | "POP" => {
            if operands.is_empty() {
                return Err(bad(1, "a register"));
            }
            let mut selectors = Vec::with_capacity(operands.len());
            for (i, operand) in operands.iter().enumerate() {
                selectors
                    .push(register_selector(operand).ok_or_else(|| bad(i + 1, "a register"))?);
            }

            let mut expansion = Vec::with_capacity(selectors.len() * 2);
            if mnemonic == "PSH" {
                // Store at the stack pointer, then bump it - per operand,
                // right to left.
                for selector in selectors.iter().rev() {
                    expansion.push(Proto {
                        opcode: Opcode::Sta,
                        mode: AddressingMode::RegisterRegister,
                        x: *selector,
                        y: SP_SELECTOR,
                        z: None,
                    });
                    expansion.push(Proto {
                        opcode: Opcode::Add,
                        mode: AddressingMode::ShortImmediate,
                        x: SP_SELECTOR,
                        y: 1,
                        z: None,
                    });
                }
            } else {
                // Drop the stack pointer, then load - per operand, left to
                // right.
                for selector in &selectors {
                    expansion.push(Proto {
                        opcode: Opcode::Add,
                        mode: AddressingMode::ShortImmediate,
                        x: SP_SELECTOR,
                        y: -1,
                        z: None,
                    });
                    expansion.push(Proto {
                        opcode: Opcode::Lda,
                        mode: AddressingMode::RegisterRegister,
                        x: *selector,
                        y: SP_SELECTOR,
                        z: None,
                    });
                }
            }
            return Ok(expansion);
        }

        _ => {
            return Err(AsmError::UnknownMnemonic {
                line: line_no,
                mnemonic: mnemonic.clone(),
            })
        }
    };

    let proto = match opcode {
        // Arithmetic/logic and MOV: register destination, then the shared
        // y/z chooser.
        Opcode::Add
        | Opcode::Adc
        | Opcode::Mul
        | Opcode::Div
        | Opcode::Mod
        | Opcode::Neg
        | Opcode::Min
        | Opcode::Max
        | Opcode::Xor
        | Opcode::Con
        | Opcode::Any
        | Opcode::Shr
        | Opcode::Shu
        | Opcode::Mov => {
            exactly(2)?;
            let x = operands
                .first()
                .and_then(|s| register_selector(s))
                .ok_or_else(|| bad(1, "a register"))?;
            let yz = operands
                .get(1)
                .and_then(|s| choose_yz(s))
                .ok_or_else(|| bad(2, "a register or immediate"))?;
            proto_from_yz(opcode, x, yz)
        }

        // Loads and stores additionally accept address operands.
        Opcode::Lda | Opcode::Sta => {
            exactly(2)?;
            let x = operands
                .first()
                .and_then(|s| register_selector(s))
                .ok_or_else(|| bad(1, "a register"))?;
            let yz = operands
                .get(1)
                .and_then(|s| choose_yz(s))
                .ok_or_else(|| bad(2, "a register or address"))?;
            proto_from_yz(opcode, x, yz)
        }

        // Register-plus-offset addressing: two registers and an address
        // expression, always a trailing word.
        Opcode::Ldo | Opcode::Sto => {
            exactly(3)?;
            let x = operands
                .first()
                .and_then(|s| register_selector(s))
                .ok_or_else(|| bad(1, "a register"))?;
            let y = operands
                .get(1)
                .and_then(|s| register_selector(s))
                .ok_or_else(|| bad(2, "a register"))?;
            let z = operands
                .get(2)
                .and_then(|s| parse_address_operand(s))
                .ok_or_else(|| bad(3, "an address"))?;
            Proto {
                opcode,
                mode: AddressingMode::WordImmediate,
                x,
                y,
                z: Some(z),
            }
        }

        // Conditional branches: two registers and a target. The second
        // operand may also be a built-in symbol whose value fits the y
        // field - `$ZERO` selects the conventionally-zero r4.
        Opcode::Jeq | Opcode::Jne | Opcode::Jgt | Opcode::Jlt | Opcode::Jge | Opcode::Jle => {
            exactly(3)?;
            let x = operands
                .first()
                .and_then(|s| register_selector(s))
                .ok_or_else(|| bad(1, "a register"))?;
            let y = operands
                .get(1)
                .and_then(|s| branch_y_selector(s, builtins))
                .ok_or_else(|| bad(2, "a register"))?;
            let z = operands
                .get(2)
                .and_then(|s| parse_address_operand(s))
                .ok_or_else(|| bad(3, "an address"))?;
            Proto {
                opcode,
                mode: AddressingMode::WordImmediate,
                x,
                y,
                z: Some(z),
            }
        }

        // Jumps: a single operand through the chooser.
        Opcode::Jmp | Opcode::Jal => {
            exactly(1)?;
            let yz = operands
                .first()
                .and_then(|s| choose_yz(s))
                .ok_or_else(|| bad(1, "a register or address"))?;
            proto_from_yz(opcode, 0, yz)
        }
    };

    Ok(vec![proto])
}

fn proto_from_yz(opcode: Opcode, x: i8, yz: YZ) -> Proto {
    match yz {
        YZ::Register(y) => Proto {
            opcode,
            mode: AddressingMode::RegisterRegister,
            x,
            y,
            z: None,
        },
        YZ::Short(y) => Proto {
            opcode,
            mode: AddressingMode::ShortImmediate,
            x,
            y,
            z: None,
        },
        YZ::Wide(z) => Proto {
            opcode,
            mode: AddressingMode::WordImmediate,
            x,
            y: 0,
            z: Some(z),
        },
    }
}

/// Branch second operands resolve to a register selector: a register name,
/// or a built-in symbol whose value fits the 2-trit field.
fn branch_y_selector(operand: &str, builtins: &SymbolTable) -> Option<i8> {
    if let Some(selector) = register_selector(operand) {
        return Some(selector);
    }

    let reference = parse_symbol_ref(operand)?;
    let symbol = builtins.get(&reference.name)?;
    let value = symbol.address + reference.offset;
    if (-4..=4).contains(&value) {
        Some(value as i8)
    } else {
        None
    }
}

/// Errors that abort an assembly run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    #[error("line {line}: unknown mnemonic '{mnemonic}'")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("line {line}: {mnemonic}: operand {operand} must be {expected}")]
    BadOperand {
        line: usize,
        mnemonic: String,
        operand: usize,
        expected: &'static str,
    },

    #[error("line {line}: {mnemonic}: too many operands")]
    TooManyOperands { line: usize, mnemonic: String },

    #[error("line {line}: malformed label declaration")]
    MalformedLabel { line: usize },

    #[error("line {line}: malformed data declaration")]
    MalformedData { line: usize },

    #[error("line {line}: duplicate symbol '{name}'")]
    DuplicateSymbol { line: usize, name: String },

    #[error("line {line}: data reservation '{name}' has non-positive size {size}")]
    NonPositiveDataSize {
        line: usize,
        name: String,
        size: i32,
    },

    #[error("line {line}: reference to undeclared symbol '{name}'")]
    UndefinedSymbol { line: usize, name: String },

    #[error("line {line}: symbol '{name}' resolves to {value}, outside the address range")]
    SymbolOutOfRange {
        line: usize,
        name: String,
        value: i64,
    },

    #[error("line {line}: program exceeds the address space")]
    ProgramTooLarge { line: usize },
}
