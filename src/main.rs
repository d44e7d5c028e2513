use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, IntoDiagnostic, Result};

use weft::{assemble, ExecutableImage, Host, RunState};

/// Weft is a complete & convenient assembler toolchain for the x366 architecture.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.asm` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run text `.asm` or binary `.x3` file directly and output to terminal
    Run {
        /// `.asm` or `.x3` file to run
        name: PathBuf,
        /// Argument string handed to the program in `AX`
        arg: Option<String>,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Create binary `.x3` file to run later or view compiled data
    Compile {
        /// `.asm` file to compile
        name: PathBuf,
        /// Destination to output .x3 file
        dest: Option<PathBuf>,
    },
    /// Check a `.asm` file without running or outputting binary
    Check {
        /// File to check
        name: PathBuf,
    },
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .context_lines(weft::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Some(command) = args.command {
        match command {
            Command::Run { name, arg, minimal } => run(&name, arg.as_deref(), minimal),
            Command::Compile { name, dest } => {
                file_message(Green, "Assembling", &name);
                let contents = fs::read_to_string(&name).into_diagnostic()?;
                let image = assemble_or_report(&contents)?;

                let out_file_name =
                    dest.unwrap_or(name.with_extension("x3").file_name().unwrap().into());
                let mut file = File::create(&out_file_name).into_diagnostic()?;
                file.write_all(&image.to_bytes()).into_diagnostic()?;

                message(Green, "Finished", "emit binary");
                file_message(Green, "Saved", &out_file_name);
                Ok(())
            }
            Command::Check { name } => {
                file_message(Green, "Checking", &name);
                let contents = fs::read_to_string(&name).into_diagnostic()?;
                let _ = assemble_or_report(&contents)?;
                message(Green, "Success", "no errors found!");
                Ok(())
            }
        }
    } else if let Some(path) = args.path {
        run(&path, None, false)
    } else {
        println!("\n~ weft v{VERSION} ~");
        println!("{}", LOGO.truecolor(155, 188, 15).bold());
        println!("{SHORT_INFO}");
        std::process::exit(0);
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &PathBuf) {
    let right = format!("target {}", right.to_str().unwrap());
    message(color, left, right.as_str());
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn run(name: &PathBuf, arg: Option<&str>, minimal: bool) -> Result<()> {
    if !minimal {
        file_message(MsgColor::Green, "Assembling", name);
    }
    let image = if let Some(ext) = name.extension() {
        match ext.to_str().unwrap() {
            "x3" => {
                let raw = fs::read(name).into_diagnostic()?;
                match ExecutableImage::from_bytes(&raw) {
                    Ok(image) => image,
                    Err(msg) => bail!("{msg}"),
                }
            }
            "asm" => {
                let contents = fs::read_to_string(name).into_diagnostic()?;
                assemble_or_report(&contents)?
            }
            _ => bail!("File has unknown extension. Exiting..."),
        }
    } else {
        bail!("File has no extension. Exiting...");
    };

    let mut program = match RunState::new(&image, Host::stdio(), arg) {
        Ok(program) => program,
        Err(e) => bail!("failed to load program: {e}"),
    };

    if !minimal {
        message(MsgColor::Green, "Running", "emitted binary");
    }
    if let Err(e) = program.run() {
        message(MsgColor::Red, "Fault", e.to_string().as_str());
        bail!("{e}");
    }

    if !minimal {
        file_message(MsgColor::Green, "Completed", name);
    }
    Ok(())
}

/// Assemble, converting errors into labeled source diagnostics.
fn assemble_or_report(contents: &str) -> Result<ExecutableImage> {
    assemble(contents).map_err(|e| e.report(contents))
}

const LOGO: &str = r"
                 ___ _
 __ __ __ ___   / _| |_
 \ V  V // -_) |  _|  _|
  \_/\_/ \___| |_|  \__|";

const SHORT_INFO: &str = r"
Welcome to weft, an all-in-one toolchain for assembling and running
x366 assembly code. Please use `-h` or `--help` to access the usage
instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
