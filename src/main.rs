//! minimips - CLI Entry Point
//!
//! Commands:
//! - `minimips-emu run [--data <file>] <program>` - Run an instruction file or word image
//! - `minimips-emu debug [--data <file>] <program>` - Interactive debugger
//! - `minimips-emu asm <source>` - Assemble to a word image
//! - `minimips-emu disasm <image>` - Disassemble a word image

use std::path::{Path, PathBuf};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use minimips::isa::DEFAULT_MEMORY_WORDS;

#[derive(Parser)]
#[command(name = "minimips-emu")]
#[command(version)]
#[command(about = "A small MIPS-like instruction-set simulator with a write-through cache")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Instruction file, or a `.hex` word image
        program: PathBuf,
        /// Data file with initial memory (`binaryAddress,decimalValue` per line)
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Memory size in words
        #[arg(short = 'm', long, default_value_t = DEFAULT_MEMORY_WORDS)]
        memory_words: usize,
        /// Stop after this many instructions (default: run until halt)
        #[arg(long)]
        max_cycles: Option<u64>,
        /// Log every fetch and executed instruction
        #[arg(short, long)]
        trace: bool,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
        /// Start with the cache enabled
        #[arg(long)]
        cache: bool,
    },
    /// Interactive debugger
    Debug {
        /// Instruction file, or a `.hex` word image
        program: PathBuf,
        /// Data file with initial memory
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Memory size in words
        #[arg(short = 'm', long, default_value_t = DEFAULT_MEMORY_WORDS)]
        memory_words: usize,
    },
    /// Assemble an instruction file to a word image
    Asm {
        /// Path to the source file
        source: PathBuf,
        /// Output word image
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Disassemble a word image to readable text
    Disasm {
        /// Path to the word image
        image: PathBuf,
    },
    /// Run the built-in self-test
    Test,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = match &cli.command {
        Some(Commands::Run { trace: true, .. }) => "trace",
        _ => "warn",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    match cli.command {
        Some(Commands::Run { program, data, memory_words, max_cycles, trace: _, json, cache }) => {
            run_program(&program, data.as_deref(), memory_words, max_cycles, json, cache);
        }
        Some(Commands::Debug { program, data, memory_words }) => {
            debug_program(&program, data.as_deref(), memory_words);
        }
        Some(Commands::Asm { source, output }) => {
            assemble_file(&source, output);
        }
        Some(Commands::Disasm { image }) => {
            disassemble_file(&image);
        }
        Some(Commands::Test) => {
            run_self_test();
        }
        None => {
            println!("minimips v{}", env!("CARGO_PKG_VERSION"));
            println!("A small MIPS-like instruction-set simulator");
            println!();
            println!("Use --help for available commands");
        }
    }
}

fn load_or_exit(program: &Path, data: Option<&Path>) -> minimips::MemoryImage {
    match minimips::load_image(data, program) {
        Ok(image) if image.program.is_empty() => {
            eprintln!("❌ No instructions to execute");
            std::process::exit(1);
        }
        Ok(image) => image,
        Err(e) => {
            eprintln!("❌ Failed to load {}: {}", program.display(), e);
            std::process::exit(1);
        }
    }
}

fn run_program(
    program: &Path,
    data: Option<&Path>,
    memory_words: usize,
    max_cycles: Option<u64>,
    json: bool,
    cache_on: bool,
) {
    use minimips::{Cache, CacheControl, Cpu, MemoryBus, Report};

    let image = load_or_exit(program, data);

    let mut bus = MemoryBus::new(memory_words);
    let mut cache = Cache::new();
    let mut cpu = Cpu::new(&mut bus, &mut cache);

    if let Err(e) = cpu.reset(&image) {
        eprintln!("❌ Failed to load program into memory: {}", e);
        std::process::exit(1);
    }
    if cache_on {
        cpu.enable_cache(CacheControl::Enable.code());
    }

    info!("running from PC {:#x}", cpu.regs.pc);
    let result = match max_cycles {
        Some(limit) => cpu.run_limited(limit),
        None => cpu.run(),
    };

    let report = Report::capture(&cpu);
    if json {
        match report.to_json() {
            Ok(text) => println!("{}", text),
            Err(e) => error!("failed to render report: {}", e),
        }
    } else {
        println!("━━━ Result ━━━");
        print!("{}", report);
    }

    if let Some(limit) = max_cycles {
        if cpu.is_running() {
            eprintln!("⚠️  Reached max cycles limit ({}).", limit);
        }
    }

    if let Err(e) = result {
        eprintln!("❌ CPU error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "tui")]
fn debug_program(program: &Path, data: Option<&Path>, memory_words: usize) {
    let image = load_or_exit(program, data);

    println!("🚀 Launching debugger...");

    if let Err(e) = minimips::run_debugger(image, memory_words) {
        eprintln!("❌ Debugger error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_program: &Path, _data: Option<&Path>, _memory_words: usize) {
    eprintln!("❌ Built without the `tui` feature");
    std::process::exit(1);
}

fn assemble_file(source_path: &Path, output: Option<PathBuf>) {
    use minimips::asm::save_words;

    let out_path = output.unwrap_or_else(|| source_path.with_extension("hex"));

    println!("📝 Assembling: {} → {}", source_path.display(), out_path.display());

    let source = match std::fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Failed to read file: {}", e);
            std::process::exit(1);
        }
    };

    let words = match minimips::assemble(&source) {
        Ok(words) => words,
        Err(e) => {
            eprintln!("❌ Assembly error: {}", e);
            std::process::exit(1);
        }
    };

    println!("✓ Assembled {} instructions", words.len());

    if let Err(e) = save_words(&out_path, &words) {
        eprintln!("❌ Failed to save word image: {}", e);
        std::process::exit(1);
    }

    println!("✓ Saved to {}", out_path.display());
}

fn disassemble_file(path: &Path) {
    use minimips::asm::load_words;

    let words = match load_words(path) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("❌ Failed to load word image: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", minimips::disassemble(&words, 0));
}

fn run_source(
    source: &str,
    data: std::collections::BTreeMap<usize, u32>,
) -> Option<(minimips::Registers, minimips::CpuState, minimips::cpu::CacheStats)> {
    use minimips::{assemble, Cache, Cpu, MemoryBus, MemoryImage};

    let words = assemble(source).ok()?;
    let image = MemoryImage::new(data, words);
    let mut bus = MemoryBus::default();
    let mut cache = Cache::new();
    let mut cpu = Cpu::new(&mut bus, &mut cache);
    cpu.reset(&image).ok()?;
    cpu.run().ok()?;
    Some((cpu.regs.clone(), cpu.state, cpu.cache().stats()))
}

fn run_self_test() {
    use minimips::CpuState;
    use std::collections::BTreeMap;

    println!("━━━ minimips Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;

    let mut check = |name: &str, ok: bool| {
        if ok {
            println!("{}... ✓", name);
            passed += 1;
        } else {
            println!("{}... ✗", name);
            failed += 1;
        }
    };

    // Test 1: ADDI/ADD
    let result = run_source("ADDI,R1,R0,5\nADDI,R2,R0,10\nADD,R3,R1,R2\nHALT", BTreeMap::new());
    check(
        "ADDI/ADD arithmetic",
        matches!(&result, Some((regs, CpuState::Halted, _)) if regs.gpr[1..4] == [5u32, 10, 15]),
    );

    // Test 2: SLT is signed
    let result = run_source("ADDI,R1,R0,0xFFFF\nSUB,R1,R0,R1\nSLT,R2,R1,R0\nHALT", BTreeMap::new());
    check(
        "SLT signed comparison",
        matches!(&result, Some((regs, _, _)) if regs.gpr[2] == 1),
    );

    // Test 3: LW/SW through the cache
    let result = run_source("CACHE,1\nLW,R1,0(R0)\nSW,R1,R0,40\nLW,R2,40(R0)\nHALT", BTreeMap::from([(0, 77)]));
    check(
        "LW/SW write-through",
        matches!(&result, Some((regs, _, stats)) if regs.gpr[2] == 77 && stats.hits >= 1),
    );

    // Test 4: BNE loop
    let result = run_source(
        "ADDI,R1,R0,3\nADDI,R2,R2,1\nBNE,R1,R2,1\nHALT\nJ,1",
        BTreeMap::new(),
    );
    check(
        "BNE counted loop",
        matches!(&result, Some((regs, CpuState::Halted, _)) if regs.gpr[2] == 3),
    );

    // Test 5: runaway PC
    let result = run_source("J,5000", BTreeMap::new());
    check(
        "Out-of-range PC stops",
        matches!(&result, Some((_, CpuState::PcOutOfRange, _))),
    );

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        println!("✓ All tests passed!");
    } else {
        std::process::exit(1);
    }
}
