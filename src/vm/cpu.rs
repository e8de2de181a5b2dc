//! The virtual CPU: registers, program counter, and the
//! fetch-decode-execute cycle.
//!
//! The CPU owns two ALUs. The user-visible one executes program
//! arithmetic and carries the carry flag from instruction to instruction
//! (ADC depends on it). The internal one handles address bookkeeping —
//! program-counter increments and offset addressing — so housekeeping can
//! never perturb the user-visible carry between instructions.

use crate::ternary::{Alu, Trit, Tryte};
use crate::vm::hardware::{
    self, MouseButton, TileEvent, ENTRY_ADDRESS, TILE_U_MASK, TILE_V_MASK,
};
use crate::vm::instruction::{AddressingMode, Instruction, Opcode};
use crate::vm::memory::Memory;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// Number of registers: r0..r6, ra, sp.
pub const REGISTER_COUNT: usize = 9;

/// Bias added to a decoded 2-trit selector (-4..=4) to get a register
/// index (0..=8).
pub const REGISTER_BIAS: i8 = 4;

/// Index of the return-address register.
pub const REG_RA: usize = 7;

/// Index of the stack-pointer register.
pub const REG_SP: usize = 8;

/// Register names in index order.
pub const REGISTER_NAMES: [&str; REGISTER_COUNT] =
    ["r0", "r1", "r2", "r3", "r4", "r5", "r6", "ra", "sp"];

/// Lifecycle of a CPU instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// No memory attached; stepping is an error.
    Unloaded,
    /// Memory attached, program counter at the entry address.
    Loaded,
    /// An external driver is pumping [`Cpu::step`].
    Running,
    /// Halted by a fatal error or [`Cpu::stop`]. Registers and memory stay
    /// inspectable.
    Stopped,
}

/// The 9-trit-word virtual CPU.
pub struct Cpu {
    /// User-visible ALU; its carry flag belongs to the program.
    alu: Alu,
    /// Internal ALU for fetch-pointer and operand-address arithmetic.
    ialu: Alu,
    registers: [Tryte; REGISTER_COUNT],
    /// Program counter: address of the next tryte to fetch.
    pc: Tryte,
    memory: Option<Memory>,
    state: CpuState,
    cycles: u64,
    tile_events: VecDeque<TileEvent>,
}

impl Cpu {
    /// Create a CPU with no cartridge memory attached.
    pub fn new() -> Self {
        Self {
            alu: Alu::new(),
            ialu: Alu::new(),
            registers: [Tryte::ZERO; REGISTER_COUNT],
            pc: ENTRY_ADDRESS,
            memory: None,
            state: CpuState::Unloaded,
            cycles: 0,
            tile_events: VecDeque::new(),
        }
    }

    /// Attach cartridge memory and reset to the entry address.
    pub fn load(&mut self, memory: Memory) {
        self.memory = Some(memory);
        self.reset();
    }

    /// Zero all registers and the program counter without touching memory
    /// contents.
    pub fn reset(&mut self) {
        self.registers = [Tryte::ZERO; REGISTER_COUNT];
        self.pc = ENTRY_ADDRESS;
        self.alu = Alu::new();
        self.ialu = Alu::new();
        self.cycles = 0;
        self.tile_events.clear();
        self.state = if self.memory.is_some() {
            CpuState::Loaded
        } else {
            CpuState::Unloaded
        };
    }

    /// Release the run loop: the CPU stops accepting steps but its state
    /// remains inspectable.
    pub fn stop(&mut self) {
        self.state = CpuState::Stopped;
    }

    pub fn state(&self) -> CpuState {
        self.state
    }

    /// Instructions executed since the last reset.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn pc(&self) -> &Tryte {
        &self.pc
    }

    /// Reposition the program counter.
    pub fn set_pc(&mut self, address: Tryte) {
        self.pc = address;
    }

    pub fn registers(&self) -> &[Tryte; REGISTER_COUNT] {
        &self.registers
    }

    pub fn register(&self, index: usize) -> &Tryte {
        &self.registers[index]
    }

    /// Raw read access to cartridge memory, for display and debugging.
    pub fn memory(&self) -> Option<&Memory> {
        self.memory.as_ref()
    }

    /// Raw write access to cartridge memory.
    pub fn memory_mut(&mut self) -> Option<&mut Memory> {
        self.memory.as_mut()
    }

    /// Drain the tile-change events emitted since the last call.
    pub fn take_tile_events(&mut self) -> Vec<TileEvent> {
        self.tile_events.drain(..).collect()
    }

    /// Run one fetch-decode-execute cycle.
    ///
    /// Returns the executed instruction. An unknown opcode stops the CPU
    /// and is a fatal error; stepping an unloaded or stopped CPU is an
    /// error without side effects.
    pub fn step(&mut self) -> Result<Instruction, CpuError> {
        match self.state {
            CpuState::Unloaded => return Err(CpuError::NotLoaded),
            CpuState::Stopped => return Err(CpuError::Stopped),
            CpuState::Loaded => self.state = CpuState::Running,
            CpuState::Running => {}
        }

        // Fetch and decode, consuming the trailing word when the
        // addressing mode asks for one.
        let word = self.fetch();
        let instruction = match Instruction::decode(&word, || self.fetch()) {
            Ok(instruction) => instruction,
            Err(err) => {
                self.state = CpuState::Stopped;
                return Err(CpuError::from(err));
            }
        };

        debug!("cycle {}: {:?}", self.cycles, instruction);
        self.execute(&instruction);
        self.cycles += 1;

        Ok(instruction)
    }

    /// Pump up to `steps` instructions for the periodic external driver.
    /// Returns the number actually executed.
    pub fn tick(&mut self, steps: u32) -> Result<u32, CpuError> {
        for executed in 0..steps {
            if let Err(err) = self.step() {
                return if executed > 0 && matches!(err, CpuError::Stopped) {
                    Ok(executed)
                } else {
                    Err(err)
                };
            }
        }
        Ok(steps)
    }

    fn execute(&mut self, instruction: &Instruction) {
        let x = (instruction.x + REGISTER_BIAS) as usize;
        let y = self.resolve_y(instruction);
        // Arithmetic source operand: the trailing word when present,
        // otherwise the resolved y.
        let src = instruction.z.clone().unwrap_or_else(|| y.clone());

        match instruction.opcode {
            Opcode::Add => self.alu.add(&mut self.registers[x], &src, false),
            Opcode::Adc => self.alu.add(&mut self.registers[x], &src, true),
            Opcode::Mul => self.alu.multiply(&mut self.registers[x], &src),
            Opcode::Div => self.alu.divide(&mut self.registers[x], &src),
            Opcode::Mod => self.alu.modulo(&mut self.registers[x], &src),
            Opcode::Neg => self.alu.neg(&mut self.registers[x], &src),
            Opcode::Min => self.alu.min(&mut self.registers[x], &src),
            Opcode::Max => self.alu.max(&mut self.registers[x], &src),
            Opcode::Xor => self.alu.xor(&mut self.registers[x], &src),
            Opcode::Con => self.alu.consensus(&mut self.registers[x], &src),
            Opcode::Any => self.alu.accept_anything(&mut self.registers[x], &src),
            Opcode::Shr => self.alu.shift_right(&mut self.registers[x], &src),
            Opcode::Shu => self.alu.shift_up(&mut self.registers[x], &src),

            Opcode::Mov => self.alu.copy(&mut self.registers[x], &src),

            Opcode::Lda => {
                let value = self.mem().load(&src);
                self.alu.copy(&mut self.registers[x], &value);
            }
            Opcode::Sta => {
                let value = self.registers[x].clone();
                self.store(value, &src);
            }
            Opcode::Ldo => match &instruction.z {
                Some(z) => {
                    let mut address = z.clone();
                    self.ialu.add(&mut address, &y, false);
                    let value = self.mem().load(&address);
                    self.alu.copy(&mut self.registers[x], &value);
                }
                None => warn!("LDO expects a trailing address word"),
            },
            Opcode::Sto => match &instruction.z {
                Some(z) => {
                    let mut address = z.clone();
                    self.ialu.add(&mut address, &y, false);
                    let value = self.registers[x].clone();
                    self.store(value, &address);
                }
                None => warn!("STO expects a trailing address word"),
            },

            Opcode::Jeq => self.branch(instruction, x, &y, |ord| ord == 0),
            Opcode::Jne => self.branch(instruction, x, &y, |ord| ord != 0),
            Opcode::Jgt => self.branch(instruction, x, &y, |ord| ord > 0),
            Opcode::Jlt => self.branch(instruction, x, &y, |ord| ord < 0),
            Opcode::Jge => self.branch(instruction, x, &y, |ord| ord >= 0),
            Opcode::Jle => self.branch(instruction, x, &y, |ord| ord <= 0),

            Opcode::Jmp => self.pc = src,
            Opcode::Jal => {
                self.registers[REG_RA] = self.pc.clone();
                self.pc = src;
            }
        }
    }

    /// Resolve the y field: register-register and word-immediate modes
    /// index a register (y + bias); short-immediate mode uses the field's
    /// literal value.
    fn resolve_y(&self, instruction: &Instruction) -> Tryte {
        match instruction.mode {
            AddressingMode::RegisterRegister | AddressingMode::WordImmediate => {
                self.registers[(instruction.y + REGISTER_BIAS) as usize].clone()
            }
            AddressingMode::ShortImmediate => Tryte::from_i32(instruction.y as i32),
        }
    }

    /// Conditional branches compare registers x and y as plain integers
    /// and jump to z when the condition holds.
    fn branch<F>(&mut self, instruction: &Instruction, x: usize, y: &Tryte, condition: F)
    where
        F: FnOnce(i32) -> bool,
    {
        let ord = self.registers[x].to_i32() - y.to_i32();
        if condition(ord.signum()) {
            match &instruction.z {
                Some(z) => self.pc = z.clone(),
                None => warn!(
                    "{} expects a trailing address word",
                    instruction.opcode.mnemonic()
                ),
            }
        }
    }

    /// Fetch the tryte at the program counter and advance it, using the
    /// internal ALU so the user-visible carry survives.
    fn fetch(&mut self) -> Tryte {
        let word = self.mem().load(&self.pc);
        self.ialu.add(&mut self.pc, &Tryte::PLUS_ONE, false);
        word
    }

    /// Store with the memory-mapped tile policy: writes landing inside the
    /// tile-map region additionally emit a decoded tile-change event.
    fn store(&mut self, value: Tryte, address: &Tryte) {
        let signed = address.to_i32();
        let in_tilemap = hardware::in_tilemap(signed);
        let stored = if in_tilemap { Some(value.clone()) } else { None };

        match self.memory.as_mut() {
            Some(memory) => memory.store(value, address),
            None => unreachable!("store with no memory attached"),
        }

        if let Some(stored) = stored {
            // Extract the packed u (middle tribble) and v (low tribble)
            // fields with the xor-mask-then-shift idiom.
            let mut u = TILE_U_MASK;
            self.ialu.xor(&mut u, &stored);
            self.ialu.shift_right(&mut u, &Tryte::from_i32(3));

            let mut v = TILE_V_MASK;
            self.ialu.xor(&mut v, &stored);

            self.tile_events.push_back(TileEvent {
                index: (signed - hardware::TILEMAP_BASE) as usize,
                u: u.to_i32(),
                v: v.to_i32(),
            });
        }
    }

    /// Inject a mouse position change as plain stores to the mouse
    /// registers, on the program's behalf.
    pub fn set_mouse_pos(&mut self, x: i32, y: i32) {
        if self.memory.is_none() {
            warn!("mouse injection with no cartridge loaded");
            return;
        }

        let clamp = |v: i32| v.clamp(Tryte::MIN_VALUE, Tryte::MAX_VALUE);
        let mem = self.mem_mut();
        mem.store(Tryte::from_i32(clamp(x)), &Tryte::from_i32(hardware::MOUSE_X));
        mem.store(Tryte::from_i32(clamp(y)), &Tryte::from_i32(hardware::MOUSE_Y));
    }

    /// Inject a button transition into the packed mouse-button register:
    /// the button's 3-trit field becomes +1 on press, -1 on release.
    pub fn set_mouse_button(&mut self, button: MouseButton, down: bool) {
        if self.memory.is_none() {
            warn!("mouse injection with no cartridge loaded");
            return;
        }

        let address = Tryte::from_i32(hardware::MOUSE_BTN);
        let mem = self.mem_mut();
        let mut packed = mem.load(&address);

        let field = button.field();
        packed.set_trit(field.start, Trit::O);
        packed.set_trit(field.start + 1, Trit::O);
        packed.set_trit(field.end - 1, if down { Trit::P } else { Trit::N });

        mem.store(packed, &address);
    }

    fn mem(&self) -> &Memory {
        match self.memory.as_ref() {
            Some(memory) => memory,
            None => unreachable!("CPU state machine guarantees attached memory"),
        }
    }

    fn mem_mut(&mut self) -> &mut Memory {
        match self.memory.as_mut() {
            Some(memory) => memory,
            None => unreachable!("CPU state machine guarantees attached memory"),
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("pc", &self.pc)
            .field("registers", &self.registers)
            .finish()
    }
}

/// Errors that stop the fetch-decode-execute cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("no cartridge memory attached")]
    NotLoaded,

    #[error("CPU is stopped")]
    Stopped,

    #[error("unknown opcode {0}")]
    UnknownOpcode(i8),
}

impl From<crate::vm::instruction::DecodeError> for CpuError {
    fn from(err: crate::vm::instruction::DecodeError) -> Self {
        match err {
            crate::vm::instruction::DecodeError::UnknownOpcode(value) => {
                CpuError::UnknownOpcode(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::hardware::{TILEMAP_BASE, TILEMAP_SIZE};

    fn rr(opcode: Opcode, x: i8, y: i8) -> Instruction {
        Instruction {
            opcode,
            mode: AddressingMode::RegisterRegister,
            x,
            y,
            z: None,
        }
    }

    fn short(opcode: Opcode, x: i8, y: i8) -> Instruction {
        Instruction {
            opcode,
            mode: AddressingMode::ShortImmediate,
            x,
            y,
            z: None,
        }
    }

    fn word(opcode: Opcode, x: i8, y: i8, z: i32) -> Instruction {
        Instruction {
            opcode,
            mode: AddressingMode::WordImmediate,
            x,
            y,
            z: Some(Tryte::from_i32(z)),
        }
    }

    fn load_program(instructions: &[Instruction]) -> Cpu {
        let mut image = Vec::new();
        for instruction in instructions {
            let (word, tail) = instruction.encode();
            image.push(word);
            if let Some(tail) = tail {
                image.push(tail);
            }
        }

        let mut memory = Memory::new();
        memory.load_image(&image).unwrap();

        let mut cpu = Cpu::new();
        cpu.load(memory);
        cpu
    }

    #[test]
    fn step_is_illegal_before_load() {
        let mut cpu = Cpu::new();
        assert_eq!(cpu.step().unwrap_err(), CpuError::NotLoaded);
    }

    #[test]
    fn add_add_mov_scenario() {
        // ADD r0, 3; ADD r0, 1; MOV r1, r0
        let mut cpu = load_program(&[
            short(Opcode::Add, -4, 3),
            short(Opcode::Add, -4, 1),
            rr(Opcode::Mov, -3, -4),
        ]);

        for _ in 0..3 {
            cpu.step().unwrap();
        }

        assert_eq!(cpu.register(0).to_i32(), 4);
        assert_eq!(cpu.register(1), cpu.register(0));
        assert_eq!(cpu.cycles(), 3);
    }

    #[test]
    fn carry_survives_between_instructions() {
        // ADD r0, max; ADD r0, 1 wraps and leaves a carry; ADC r1, 0 folds
        // it into the next word. The program-counter increments in between
        // must not disturb the flag.
        let mut cpu = load_program(&[
            word(Opcode::Add, -4, 0, 9841),
            short(Opcode::Add, -4, 1),
            short(Opcode::Adc, -3, 0),
        ]);

        for _ in 0..3 {
            cpu.step().unwrap();
        }

        assert_eq!(cpu.register(0).to_i32(), -9841);
        assert_eq!(cpu.register(1).to_i32(), 1);
    }

    #[test]
    fn unknown_opcode_stops_the_cpu() {
        let mut memory = Memory::new();
        // Opcode field -40 is reserved; hand-build the bad word.
        let bad: Tryte = "----ooooo".parse().unwrap();
        memory.load_image(&[bad]).unwrap();

        let mut cpu = Cpu::new();
        cpu.load(memory);

        assert_eq!(cpu.step().unwrap_err(), CpuError::UnknownOpcode(-40));
        assert_eq!(cpu.state(), CpuState::Stopped);
        assert_eq!(cpu.step().unwrap_err(), CpuError::Stopped);
    }

    #[test]
    fn lda_sta_roundtrip_through_memory() {
        // ADD r0, 7; STA r0, 100; LDA r1, 100
        let mut cpu = load_program(&[
            short(Opcode::Add, -4, 4),
            short(Opcode::Add, -4, 3),
            word(Opcode::Sta, -4, 0, 100),
            word(Opcode::Lda, -3, 0, 100),
        ]);

        for _ in 0..4 {
            cpu.step().unwrap();
        }

        assert_eq!(cpu.register(1).to_i32(), 7);
        assert_eq!(
            cpu.memory().unwrap().load(&Tryte::from_i32(100)).to_i32(),
            7
        );
    }

    #[test]
    fn ldo_adds_register_offset() {
        let mut cpu = load_program(&[
            short(Opcode::Add, -3, 2), // r1 = 2
            word(Opcode::Ldo, -4, -3, 200), // r0 = mem[200 + r1]
        ]);
        cpu.memory_mut()
            .unwrap()
            .store(Tryte::from_i32(55), &Tryte::from_i32(202));

        cpu.step().unwrap();
        cpu.step().unwrap();

        assert_eq!(cpu.register(0).to_i32(), 55);
    }

    #[test]
    fn jmp_and_jal() {
        // JAL to the instruction at entry+3, which is ADD r0, 1.
        let target = Tryte::MIN_VALUE + 3;
        let mut cpu = load_program(&[
            word(Opcode::Jal, 0, 0, target), // 2 trytes
            short(Opcode::Add, -4, 2),       // skipped
            short(Opcode::Add, -4, 1),       // jump target
        ]);

        cpu.step().unwrap();
        assert_eq!(cpu.pc().to_i32(), target);
        // Return address: the word after the JAL pair.
        assert_eq!(cpu.register(REG_RA).to_i32(), Tryte::MIN_VALUE + 2);

        cpu.step().unwrap();
        assert_eq!(cpu.register(0).to_i32(), 1);
    }

    #[test]
    fn conditional_branch_loop() {
        // r0 = -3; loop: ADD r0, 1; JLT r0, r4, loop  (r4 stays zero)
        let loop_addr = Tryte::MIN_VALUE + 1;
        let mut cpu = load_program(&[
            short(Opcode::Add, -4, -3),
            short(Opcode::Add, -4, 1),
            word(Opcode::Jlt, -4, 0, loop_addr),
        ]);

        // 1 init + 3 iterations of (ADD, JLT) = 7 steps to leave the loop.
        for _ in 0..7 {
            cpu.step().unwrap();
        }

        assert_eq!(cpu.register(0).to_i32(), 0);
    }

    #[test]
    fn tilemap_store_emits_one_event() {
        // The stored tryte packs u = +o- (8) and v = o+- (2).
        let packed: Tryte = "ooo+o-o+-".parse().unwrap();
        let mut cpu = load_program(&[
            word(Opcode::Mov, -4, 0, packed.to_i32()),
            word(Opcode::Sta, -4, 0, TILEMAP_BASE + 5),
            word(Opcode::Sta, -4, 0, TILEMAP_BASE + TILEMAP_SIZE), // outside
        ]);

        cpu.step().unwrap();
        cpu.step().unwrap();

        let events = cpu.take_tile_events();
        assert_eq!(
            events,
            vec![TileEvent {
                index: 5,
                u: 8,
                v: 2
            }]
        );

        // One past the end of the region: no event.
        cpu.step().unwrap();
        assert!(cpu.take_tile_events().is_empty());
    }

    #[test]
    fn tile_decode_does_not_touch_user_carry() {
        // Leave a carry pending, then store into the tile map; the event
        // decode runs on the internal ALU.
        let mut cpu = load_program(&[
            word(Opcode::Add, -4, 0, 9841),
            short(Opcode::Add, -4, 1),             // carry now +
            word(Opcode::Sta, -4, 0, TILEMAP_BASE),
            short(Opcode::Adc, -3, 0),             // r1 = carry
        ]);

        for _ in 0..4 {
            cpu.step().unwrap();
        }

        assert_eq!(cpu.register(1).to_i32(), 1);
        assert_eq!(cpu.take_tile_events().len(), 1);
    }

    #[test]
    fn reset_keeps_memory() {
        let mut cpu = load_program(&[short(Opcode::Add, -4, 1)]);
        cpu.step().unwrap();
        assert_eq!(cpu.register(0).to_i32(), 1);

        cpu.reset();
        assert_eq!(cpu.state(), CpuState::Loaded);
        assert_eq!(cpu.register(0).to_i32(), 0);
        assert_eq!(cpu.pc(), &ENTRY_ADDRESS);
        // Memory still holds the program: stepping re-executes it.
        cpu.step().unwrap();
        assert_eq!(cpu.register(0).to_i32(), 1);
    }

    #[test]
    fn mouse_injection_is_plain_memory_writes() {
        let mut cpu = Cpu::new();
        cpu.load(Memory::new());

        cpu.set_mouse_pos(120, -80);
        cpu.set_mouse_button(MouseButton::Left, true);
        cpu.set_mouse_button(MouseButton::Right, false);

        let mem = cpu.memory().unwrap();
        assert_eq!(mem.load(&Tryte::from_i32(hardware::MOUSE_X)).to_i32(), 120);
        assert_eq!(mem.load(&Tryte::from_i32(hardware::MOUSE_Y)).to_i32(), -80);

        let packed = mem.load(&Tryte::from_i32(hardware::MOUSE_BTN));
        assert_eq!(packed.trit(8), Trit::P); // left down
        assert_eq!(packed.trit(2), Trit::N); // right up
        assert_eq!(packed.trit(5), Trit::O); // middle untouched
    }

    #[test]
    fn tick_pumps_multiple_steps() {
        let mut cpu = load_program(&[
            short(Opcode::Add, -4, 1),
            short(Opcode::Add, -4, 1),
            short(Opcode::Add, -4, 1),
        ]);

        assert_eq!(cpu.tick(3).unwrap(), 3);
        assert_eq!(cpu.register(0).to_i32(), 3);
    }
}
