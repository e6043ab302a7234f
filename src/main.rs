//! Accumulator machine simulator - CLI Entry Point
//!
//! Commands:
//! - `accsim-emu run <program> [input]` - Run an ASM source or JSON image
//! - `accsim-emu translate <source>` - Translate ASM to a JSON image
//! - `accsim-emu disasm <image>` - Disassemble a JSON image
//! - `accsim-emu debug <program> [input]` - Interactive tick debugger

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "accsim-emu")]
#[command(author = "Yigit")]
#[command(version = "0.1.0")]
#[command(about = "A tick-accurate simulator for a small microprogrammed register machine")]
struct Cli {
    /// Log every instruction's machine state (up to --debug-limit)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts, runs out of input, or hits the tick limit
    Run {
        /// Path to the ASM source or JSON image
        program: String,
        /// Optional input file fed to the input port
        input: Option<String>,
        /// Maximum number of ticks to run
        #[arg(short, long, default_value = "100000")]
        limit: u64,
        /// Stop logging machine state after this tick
        #[arg(short, long, default_value = "200")]
        debug_limit: u64,
        /// Number of registers
        #[arg(short, long, default_value = "4")]
        registers: usize,
    },
    /// Translate ASM source to a JSON image
    Translate {
        /// Path to the source file
        source: String,
        /// Output image file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Disassemble a JSON image to readable text
    Disasm {
        /// Path to the image file
        image: String,
    },
    /// Interactive tick debugger
    Debug {
        /// Path to the ASM source or JSON image
        program: String,
        /// Optional input file fed to the input port
        input: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Run { program, input, limit, debug_limit, registers }) => {
            let config = accsim::SimConfig { registers, limit, debug_limit };
            run_program(&program, input.as_deref(), &config);
        }
        Some(Commands::Translate { source, output }) => {
            translate_file(&source, output);
        }
        Some(Commands::Disasm { image }) => {
            disassemble_file(&image);
        }
        Some(Commands::Debug { program, input }) => {
            debug_program(&program, input.as_deref());
        }
        None => {
            println!("accsim-emu v0.1.0");
            println!("A tick-accurate microprogrammed machine simulator");
            println!();
            println!("Use --help for available commands");
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load a program image, translating `.asm` sources on the fly.
fn load_program(path: &str) -> accsim::ProgramImage {
    use accsim::{load_image, translate};

    if path.ends_with(".asm") {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("❌ Failed to read file: {}", e);
                std::process::exit(1);
            }
        };

        match translate(&source) {
            Ok(image) => image,
            Err(e) => {
                eprintln!("❌ Translation error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        match load_image(path) {
            Ok(image) => image,
            Err(e) => {
                eprintln!("❌ Failed to load image: {}", e);
                std::process::exit(1);
            }
        }
    }
}

/// Read the input file, if any, into an input queue.
fn load_input(path: Option<&str>) -> Vec<char> {
    match path {
        None => Vec::new(),
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => accsim::sim::input_from_text(&text),
            Err(e) => {
                eprintln!("❌ Failed to read input: {}", e);
                std::process::exit(1);
            }
        },
    }
}

fn run_program(path: &str, input: Option<&str>, config: &accsim::SimConfig) {
    use accsim::simulate;

    let image = load_program(path);
    let input = load_input(input);

    match simulate(image, input, config) {
        Ok(report) => {
            println!("{}", report.output);
            println!("Instructions: {} Ticks: {}", report.instructions, report.ticks);
        }
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }
}

fn translate_file(source_path: &str, output: Option<String>) {
    use accsim::{save_image, translate};

    let out_path = output.unwrap_or_else(|| source_path.replace(".asm", ".json"));

    println!("📝 Translating: {} → {}", source_path, out_path);

    let source = match std::fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Failed to read file: {}", e);
            std::process::exit(1);
        }
    };

    let image = match translate(&source) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("❌ Translation error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = save_image(&out_path, &image) {
        eprintln!("❌ Failed to save image: {}", e);
        std::process::exit(1);
    }

    println!("LoC: {} Instr: {}", source.split('\n').count(), image.entry_count());
}

fn disassemble_file(image_path: &str) {
    use accsim::{disassemble, load_image};

    let image = match load_image(image_path) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("❌ Failed to load image: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", disassemble(&image));
}

#[cfg(feature = "tui")]
fn debug_program(path: &str, input: Option<&str>) {
    let image = load_program(path);
    let input = load_input(input);

    if image.code.is_empty() {
        eprintln!("❌ No instructions to execute");
        std::process::exit(1);
    }

    if let Err(e) = accsim::run_debugger(image, input) {
        eprintln!("❌ Debugger error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &str, _input: Option<&str>) {
    eprintln!("❌ This build has no debugger; rebuild with the `tui` feature");
    std::process::exit(1);
}
