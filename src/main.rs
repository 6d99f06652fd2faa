use std::fs;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use hotwatch::notify::Event;
use hotwatch::{
    blocking::{Flow, Hotwatch},
    EventKind,
};
use miette::{bail, IntoDiagnostic, Result};

use predsim::{AssemblyErrors, DebuggerOptions, Program, RunEnvironment};

/// Predsim assembles and runs programs for a small predicated 16-bit processor.
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
    /// Assemble a `.asm` file and run it, printing output to the terminal
    Run {
        /// `.asm` file to run
        name: PathBuf,
        /// Milliseconds between instructions
        #[arg(long)]
        interval: Option<u64>,
        /// Values for the input port, separated by commas
        #[arg(short, long, value_delimiter = ',')]
        input: Vec<String>,
        /// Print every executed instruction
        #[arg(short, long)]
        trace: bool,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Assemble a `.asm` file and step through it with the debugger
    Debug {
        /// `.asm` file to run
        name: PathBuf,
        /// Read debugger commands from argument
        #[arg(short, long)]
        command: Option<String>,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Check a `.asm` file without running it
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Print the assembled program next to its source
    List {
        /// `.asm` file to list
        name: PathBuf,
    },
    /// Place a watch on a `.asm` file to receive constant assembler updates
    Watch {
        /// `.asm` file to watch
        name: PathBuf,
    },
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    predsim::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(predsim::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Some(command) = args.command {
        match command {
            Command::Run {
                name,
                interval,
                input,
                trace,
                minimal,
            } => {
                let opts = RunOptions {
                    interval_ms: interval.unwrap_or_else(predsim::env::interval_ms),
                    inputs: input,
                    trace: trace || predsim::env::is_trace_enabled(),
                    minimal,
                };
                run(&name, None, opts)
            }
            Command::Debug {
                name,
                command,
                minimal,
            } => {
                let opts = RunOptions {
                    interval_ms: predsim::env::interval_ms(),
                    minimal,
                    trace: predsim::env::is_trace_enabled(),
                    ..Default::default()
                };
                run(&name, Some(DebuggerOptions { command }), opts)
            }
            Command::Check { name } => {
                file_message(Green, "Checking", &name);
                let contents = fs::read_to_string(&name).into_diagnostic()?;
                let program = assemble(&contents)?;
                message(
                    Green,
                    "Success",
                    &format!("no errors found, {} instructions", program.len()),
                );
                Ok(())
            }
            Command::List { name } => {
                let contents = fs::read_to_string(&name).into_diagnostic()?;
                let program = assemble(&contents)?;
                print!("{}", program.listing());
                Ok(())
            }
            Command::Watch { name } => {
                if !name.exists() {
                    bail!("File does not exist. Exiting...")
                }
                // Vim breaks if watching a single file
                let folder_path = match name.parent() {
                    Some(pth) if pth.is_dir() => pth.to_path_buf(),
                    _ => Path::new(".").to_path_buf(),
                };

                // Clear screen and move cursor to top left
                print!("\x1B[2J\x1B[2;1H");
                file_message(Green, "Watching", &name);
                message(Cyan, "Help", "press CTRL+C to exit");

                let mut watcher = Hotwatch::new_with_custom_delay(Duration::from_millis(500))
                    .into_diagnostic()?;

                watcher
                    .watch(folder_path, move |event: Event| match event.kind {
                        // Watch remove for vim changes
                        EventKind::Modify(_) | EventKind::Remove(_) => {
                            print!("\x1B[2J\x1B[2;1H");
                            file_message(Green, "Watching", &name);
                            message(Green, "Re-checking", "file change detected");
                            message(Cyan, "Help", "press CTRL+C to exit");

                            sleep(Duration::from_millis(50));

                            let contents = match fs::read_to_string(&name) {
                                Ok(cts) => cts,
                                Err(e) => {
                                    eprintln!("{e}. Exiting...");
                                    std::process::exit(1)
                                }
                            };
                            match predsim::assemble(&contents) {
                                Ok(_) => message(Green, "Success", "no errors found!"),
                                Err(errs) => print_errors(&errs, &contents),
                            }
                            Flow::Continue
                        }
                        _ => Flow::Continue,
                    })
                    .into_diagnostic()?;
                watcher.run();
                Ok(())
            }
        }
    } else if let Some(path) = args.path {
        let opts = RunOptions {
            interval_ms: predsim::env::interval_ms(),
            trace: predsim::env::is_trace_enabled(),
            ..Default::default()
        };
        run(&path, None, opts)
    } else {
        println!("\n~ predsim v{VERSION} - Copyright (c) 2024 Artemis Rosman ~");
        println!("{}", LOGO.truecolor(135, 206, 235).bold());
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

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    eprintln!("{left:>12} {right}");
}

#[derive(Default)]
struct RunOptions {
    interval_ms: u64,
    inputs: Vec<String>,
    trace: bool,
    minimal: bool,
}

fn run(name: &Path, debugger_opts: Option<DebuggerOptions>, opts: RunOptions) -> Result<()> {
    if name.extension().and_then(|ext| ext.to_str()) != Some("asm") {
        bail!("File must have the `.asm` extension. Exiting...");
    }
    if !opts.minimal {
        file_message(MsgColor::Green, "Assembling", name);
    }
    let contents = fs::read_to_string(name).into_diagnostic()?;
    let program = assemble(&contents)?;

    let mut env = RunEnvironment::from_program(program, debugger_opts);
    env.set_minimal(opts.minimal);
    env.set_trace(opts.trace);
    env.set_interval(opts.interval_ms);
    env.queue_inputs(opts.inputs);

    if !opts.minimal {
        message(MsgColor::Green, "Running", "assembled program");
    }
    env.run();

    if !opts.minimal {
        file_message(MsgColor::Green, "Completed", name);
    }
    Ok(())
}

/// Assemble source, printing every diagnostic on failure.
fn assemble(contents: &str) -> Result<Program> {
    match predsim::assemble(contents) {
        Ok(program) => Ok(program),
        Err(errs) => {
            print_errors(&errs, contents);
            bail!(
                "Assembly failed with {} error{}",
                errs.len(),
                if errs.len() == 1 { "" } else { "s" }
            );
        }
    }
}

fn print_errors(errs: &AssemblyErrors, contents: &str) {
    for report in errs.reports(contents) {
        eprintln!("{:?}", report);
    }
}

const LOGO: &str = r#"
                        _     _
  _ __  _ __ ___  __| |___(_)_ __ ___
 | '_ \| '__/ _ \/ _` / __| | '_ ` _ \
 | |_) | | |  __/ (_| \__ \ | | | | | |
 | .__/|_|  \___|\__,_|___/_|_| |_| |_|
 |_|"#;

const SHORT_INFO: &str = r"
Welcome to predsim, an assembler and simulator for a predicated 16-bit processor
with 512 words of memory and an I/O window at 0x1F0.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
