//! Command-line front end: assemble, run, and disassemble cartridge
//! programs without the graphical console around them.

use clap::{Parser, Subcommand};
use simple_logger::SimpleLogger;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use trine::asm::{assemble, disassemble, load_image_file, save_image_file};
use trine::vm::{Cpu, CpuState, Memory, REGISTER_NAMES};
use trine::Tryte;

#[derive(Parser)]
#[command(name = "trine", version)]
#[command(about = "Balanced ternary fantasy console core")]
struct Cli {
    /// Show per-instruction trace output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble source to an object image
    Asm {
        /// Path to the assembly source file
        source: PathBuf,
        /// Where to write the object image
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Dump the debug map (addresses, symbols) as JSON
        #[arg(long)]
        debug_map: bool,
    },
    /// Run a program (assembly source or object image) and dump the
    /// final machine state
    Run {
        /// Path to a `.asm` source or an image file
        program: PathBuf,
        /// Instructions pumped per tick of the run loop
        #[arg(short, long, default_value_t = 100)]
        steps_per_tick: u32,
        /// Stop after this many instructions
        #[arg(short, long, default_value_t = 10_000)]
        max_cycles: u64,
    },
    /// Print a readable listing of an object image
    Disasm {
        /// Path to the image file
        image: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if SimpleLogger::new().with_level(level).init().is_err() {
        eprintln!("warning: logger already initialized");
    }

    let result = match cli.command {
        Commands::Asm {
            source,
            output,
            debug_map,
        } => cmd_asm(&source, output.as_deref(), debug_map),
        Commands::Run {
            program,
            steps_per_tick,
            max_cycles,
        } => cmd_run(&program, steps_per_tick, max_cycles),
        Commands::Disasm { image } => cmd_disasm(&image),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn cmd_asm(source: &Path, output: Option<&Path>, debug_map: bool) -> Result<(), String> {
    let text = std::fs::read_to_string(source)
        .map_err(|e| format!("reading {}: {}", source.display(), e))?;
    let assembly = assemble(&text).map_err(|e| e.to_string())?;

    println!("assembled {} trytes", assembly.image.len());

    if let Some(path) = output {
        save_image_file(path, &assembly.image).map_err(|e| e.to_string())?;
        println!("wrote {}", path.display());
    }

    if debug_map {
        let json =
            serde_json::to_string_pretty(&assembly.debug).map_err(|e| e.to_string())?;
        println!("{}", json);
    }

    Ok(())
}

fn cmd_run(program: &Path, steps_per_tick: u32, max_cycles: u64) -> Result<(), String> {
    let image = load_program(program)?;

    let mut memory = Memory::new();
    memory.load_image(&image).map_err(|e| e.to_string())?;

    let mut cpu = Cpu::new();
    cpu.load(memory);

    // Stand-in for the front end's fixed-rate driver: pump batches of
    // steps until the cycle limit runs out or the CPU stops.
    let mut failure = None;
    while cpu.cycles() < max_cycles && cpu.state() != CpuState::Stopped {
        let remaining = max_cycles - cpu.cycles();
        let batch = steps_per_tick.max(1).min(remaining.min(u32::MAX as u64) as u32);
        if let Err(err) = cpu.tick(batch) {
            failure = Some(err);
            break;
        }
    }

    println!("executed {} instructions", cpu.cycles());
    for (name, value) in REGISTER_NAMES.iter().zip(cpu.registers()) {
        println!("{:>2} = {} ({})", name, value, value.to_i32());
    }
    println!("pc = {} ({})", cpu.pc(), cpu.pc().to_i32());

    let tiles = cpu.take_tile_events();
    if !tiles.is_empty() {
        println!("{} tile updates pending", tiles.len());
    }

    match failure {
        Some(err) => Err(err.to_string()),
        None => Ok(()),
    }
}

fn cmd_disasm(image: &Path) -> Result<(), String> {
    let image = load_image_file(image).map_err(|e| e.to_string())?;
    for line in disassemble(&image) {
        println!("{}", line);
    }
    Ok(())
}

/// Load either assembly source (by extension) or an object image.
fn load_program(path: &Path) -> Result<Vec<Tryte>, String> {
    if path.extension().is_some_and(|ext| ext == "asm") {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("reading {}: {}", path.display(), e))?;
        let assembly = assemble(&text).map_err(|e| e.to_string())?;
        Ok(assembly.image)
    } else {
        load_image_file(path).map_err(|e| e.to_string())
    }
}
