extern crate x86vm;
extern crate env_logger;
extern crate termcolor;
extern crate log;
#[macro_use] extern crate structopt;

use x86vm::cpu::disasm::TermPrinter;
use x86vm::cpu::instr::Instr;
use x86vm::cpu::interpret::Interpreter;
use x86vm::cpu::State;
use x86vm::elf::Elf;
use x86vm::kernel::Kernel;
use x86vm::loader::{self, Image};
use x86vm::memory::Memory;

use structopt::StructOpt;
use termcolor::{ColorChoice, StandardStream};
use std::{fs, process};
use std::error::Error;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ImageType {
    Elf,
    Flat,
}

impl FromStr for ImageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "elf" => Ok(ImageType::Elf),
            "flat" => Ok(ImageType::Flat),
            _ => Err(format!("unknown executable type '{}' (expected 'elf' or 'flat')", s)),
        }
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal number.
fn parse_number(s: &str) -> Result<u32, String> {
    let result = if s.starts_with("0x") || s.starts_with("0X") {
        u32::from_str_radix(&s[2..], 16)
    } else {
        s.parse()
    };
    result.map_err(|e| format!("invalid number '{}': {}", s, e))
}

#[derive(Debug, StructOpt)]
#[structopt(name = "x86vm", about = "Runs 32-bit x86 Linux programs.")]
struct Opt {
    /// Executable type: `elf` or `flat`.
    #[structopt(short = "t", long = "type", default_value = "elf")]
    image_type: ImageType,
    /// Bytes of memory for the VM. ELF executables get this much on top of
    /// their loaded image.
    #[structopt(short = "m", long = "memory", default_value = "10000", parse(try_from_str = "parse_number"))]
    memory: u32,
    /// Load offset for flat images.
    #[structopt(short = "o", long = "offset", default_value = "0", parse(try_from_str = "parse_number"))]
    offset: u32,
    /// Trace every executed instruction.
    #[structopt(short = "d", long = "debug")]
    debug: bool,
    /// Print progress messages.
    #[structopt(short = "v", long = "verbose")]
    verbose: bool,
    /// Path to the program to run.
    #[structopt(parse(from_os_str))]
    path: PathBuf,
    /// Arguments passed to the program.
    args: Vec<String>,
}

/// Loads the program and returns the machine ready to run it.
fn load(opt: &Opt) -> Result<Interpreter<Kernel>, Box<Error>> {
    let contents = fs::read(&opt.path)?;

    let (mem, image, esp) = match opt.image_type {
        ImageType::Flat => {
            if !opt.args.is_empty() {
                return Err("flat images don't take arguments".into());
            }
            let mut mem = Memory::new(opt.memory);
            let image = loader::load_flat(&mut mem, &contents, opt.offset)?;
            let esp = mem.top();
            (mem, image, esp)
        }
        ImageType::Elf => {
            let elf = Elf::parse(&contents)?;
            let mut mem = Memory::new(0);
            let image = loader::load_elf(&mut mem, &elf, opt.memory)?;

            let mut args = vec![opt.path.to_string_lossy().into_owned()];
            args.extend(opt.args.iter().cloned());
            let mut state = State::new(image.entry, mem.top());
            loader::setup_stack(&mut state, &mut mem, &args)?;
            (mem, image, state.esp())
        }
    };

    if opt.verbose {
        let Image { entry, code_end, program_break } = image;
        eprintln!(
            "loaded '{}': {} bytes of memory, entry {:#010X}, code ends at {:#010X}, break {:#010X}",
            opt.path.display(), mem.size(), entry, code_end, program_break,
        );
    }

    let mut interpreter = Interpreter::new(mem, image.entry, Kernel::new(image.code_end));
    interpreter.state_mut().set_esp(esp);
    Ok(interpreter)
}

fn run(opt: &Opt) -> Result<i32, Box<Error>> {
    let mut interpreter = load(opt)?;

    if opt.debug {
        let mut printer = TermPrinter::new(StandardStream::stdout(ColorChoice::Auto));
        interpreter.set_tracer(Box::new(move |eip: u32, instr: &Instr| {
            printer.print_at(eip, instr);
            if let Err(e) = printer.finish() {
                eprintln!("(disassembler failed: {})", e);
            }
        }));
    }

    interpreter.run()?;

    let code = interpreter.exit_code().unwrap_or(0);
    if opt.verbose {
        eprintln!("program exited with status {}", code);
    }
    Ok(code)
}

fn main() {
    let opt = Opt::from_args();

    // By default, log all `info!` messages and higher
    let level = if opt.debug { log::LevelFilter::Trace } else { log::LevelFilter::Info };
    env_logger::Builder::from_default_env()
        .filter(None, level)
        .init();

    match run(&opt) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("exiting due to error: {}", e);
            process::exit(1);
        },
    }
}
