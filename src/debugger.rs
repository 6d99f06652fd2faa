use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use colored::Colorize;

use crate::driver::Status;
use crate::io::parse_input;
use crate::isa::{ADDR_MASK, MEMORY_SIZE};
use crate::output::{Condition, Output};
use crate::runtime::{read_line, RunEnvironment};
use crate::{dprint, dprintln};

/// Leave this as a struct, in case more options are added in the future.
#[derive(Debug, Default)]
pub struct DebuggerOptions {
    /// Commands separated by `;` or newlines, used instead of the terminal.
    pub command: Option<String>,
}

/// Steps through a program one command at a time.
pub struct Debugger {
    source: Source,
}

enum Source {
    Argument(VecDeque<String>),
    Terminal,
}

impl From<Option<String>> for Source {
    fn from(command: Option<String>) -> Self {
        match command {
            Some(text) => Source::Argument(
                text.split([';', '\n'])
                    .map(str::trim)
                    .filter(|cmd| !cmd.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            None => Source::Terminal,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Step { count: u32 },
    Run { interval_ms: Option<u64> },
    Input { value: String },
    Registers,
    Memory { addr: u16, count: u16 },
    Output,
    List,
    Status,
    Reset,
    Restart,
    Help,
    Quit,
}

/// Error parsing a command.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandError {
    InvalidCommand { command_name: String },
    MissingArgument { command_name: &'static str, argument_name: &'static str },
    InvalidArgument { command_name: &'static str, value: String },
    TooManyArguments { command_name: &'static str },
}

impl std::error::Error for CommandError {}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCommand { command_name } => {
                write!(f, "Not a command: `{}`", command_name)
            }
            Self::MissingArgument {
                command_name,
                argument_name,
            } => write!(f, "Missing argument `{}` for `{}`", argument_name, command_name),
            Self::InvalidArgument {
                command_name,
                value,
            } => write!(f, "Invalid argument `{}` for `{}`", value, command_name),
            Self::TooManyArguments { command_name } => {
                write!(f, "Too many arguments for `{}`", command_name)
            }
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Err(CommandError::InvalidCommand {
                command_name: String::new(),
            });
        };
        let args: Vec<&str> = words.collect();

        let command = match name.to_ascii_lowercase().as_str() {
            "step" | "s" => {
                max_args("step", &args, 1)?;
                let count = match args.first() {
                    Some(arg) => arg.parse::<u32>().ok().filter(|&n| n > 0).ok_or_else(|| {
                        CommandError::InvalidArgument {
                            command_name: "step",
                            value: arg.to_string(),
                        }
                    })?,
                    None => 1,
                };
                Command::Step { count }
            }
            "run" | "r" | "continue" | "c" => {
                max_args("run", &args, 1)?;
                let interval_ms = match args.first() {
                    Some(arg) => Some(arg.parse::<u64>().ok().ok_or_else(|| {
                        CommandError::InvalidArgument {
                            command_name: "run",
                            value: arg.to_string(),
                        }
                    })?),
                    None => None,
                };
                Command::Run { interval_ms }
            }
            "input" | "i" => {
                max_args("input", &args, 1)?;
                let value = args.first().ok_or(CommandError::MissingArgument {
                    command_name: "input",
                    argument_name: "value",
                })?;
                Command::Input {
                    value: value.to_string(),
                }
            }
            "registers" | "regs" => {
                max_args("registers", &args, 0)?;
                Command::Registers
            }
            "memory" | "mem" | "m" => {
                max_args("memory", &args, 2)?;
                let parse = |arg: &str| {
                    parse_input(arg)
                        .filter(|&n| n <= ADDR_MASK)
                        .ok_or_else(|| CommandError::InvalidArgument {
                            command_name: "memory",
                            value: arg.to_string(),
                        })
                };
                let addr = parse(args.first().copied().ok_or(CommandError::MissingArgument {
                    command_name: "memory",
                    argument_name: "address",
                })?)?;
                let count = match args.get(1).copied() {
                    Some(arg) => parse(arg)?.max(1),
                    None => 1,
                };
                Command::Memory { addr, count }
            }
            "output" | "out" => {
                max_args("output", &args, 0)?;
                Command::Output
            }
            "list" | "l" => {
                max_args("list", &args, 0)?;
                Command::List
            }
            "status" => {
                max_args("status", &args, 0)?;
                Command::Status
            }
            "reset" => {
                max_args("reset", &args, 0)?;
                Command::Reset
            }
            "restart" => {
                max_args("restart", &args, 0)?;
                Command::Restart
            }
            "help" | "h" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,
            _ => {
                return Err(CommandError::InvalidCommand {
                    command_name: name.to_string(),
                })
            }
        };
        Ok(command)
    }
}

fn max_args(command_name: &'static str, args: &[&str], max: usize) -> Result<(), CommandError> {
    if args.len() > max {
        return Err(CommandError::TooManyArguments { command_name });
    }
    Ok(())
}

const HELP: &str = "\
step [n]            execute n instructions (default 1)
run [ms]            run until halt or input, one step every ms
input <value>       supply a value to a waiting LDR 0x1F0
registers           show registers, flags and predicates
memory <addr> [n]   show n words of memory from addr
output              show everything written to the I/O window
list                show the assembled program
status              show the machine status
reset               clear the machine and unload the program
restart             reset and load the program again
help                show this message
quit                leave the debugger";

impl Debugger {
    pub fn new(opts: DebuggerOptions) -> Self {
        Debugger {
            source: Source::from(opts.command),
        }
    }

    fn next_command(&mut self) -> Option<String> {
        match &mut self.source {
            Source::Argument(commands) => commands.pop_front(),
            Source::Terminal => {
                Output::Debugger(Condition::Always).start_new_line();
                dprint!(Sometimes, "{} ", ">".blue());
                read_line()
            }
        }
    }

    /// Read and execute commands until `quit` or end of input.
    pub fn run(&mut self, env: &mut RunEnvironment) {
        while let Some(line) = self.next_command() {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(Command::Quit) => break,
                Ok(command) => self.execute(command, env),
                Err(err) => dprintln!(Always, "{}", err.to_string().red()),
            }
        }
    }

    fn execute(&mut self, command: Command, env: &mut RunEnvironment) {
        match command {
            Command::Step { count } => {
                for _ in 0..count {
                    let result = env.driver_mut().step();
                    env.flush();
                    if let Err(err) = result {
                        dprintln!(Always, "{}", err.to_string().red());
                        break;
                    }
                    if env.driver().status() != Status::Paused {
                        break;
                    }
                }
                self.print_status(env);
            }
            Command::Run { interval_ms } => {
                let interval_ms = interval_ms.unwrap_or(env.interval_ms());
                match env.driver_mut().run(interval_ms) {
                    Ok(()) => {
                        env.drive();
                        self.print_status(env);
                    }
                    Err(err) => dprintln!(Always, "{}", err.to_string().red()),
                }
            }
            Command::Input { value } => {
                match env.driver_mut().provide_input(&value) {
                    Ok(()) => env.flush(),
                    Err(err) => dprintln!(Always, "{}", err.to_string().red()),
                }
            }
            Command::Registers => {
                Output::Debugger(Condition::Always).print_registers(&env.driver().snapshot());
            }
            Command::Memory { addr, count } => {
                let state = env.driver().state();
                for offset in 0..count {
                    let addr = addr as usize + offset as usize;
                    if addr >= MEMORY_SIZE {
                        break;
                    }
                    let addr = addr as u16;
                    dprint!(Always, "0x{:03X}  ", addr);
                    Output::Debugger(Condition::Always).print_integer(state.mem(addr));
                    dprint!(Always, "  {}\n", state.tag(addr));
                }
            }
            Command::Output => {
                for record in env.driver().state().io().output() {
                    dprintln!(Always, "0x{:03X}: {}", record.address, record.value);
                }
            }
            Command::List => match env.driver().program() {
                Some(program) => dprint!(Always, "{}", program.listing()),
                None => dprintln!(Always, "{}", "No program loaded".red()),
            },
            Command::Status => self.print_status(env),
            Command::Reset => {
                env.driver_mut().reset();
                env.rewind_output();
                env.flush();
                self.print_status(env);
            }
            Command::Restart => {
                match env.driver_mut().restart() {
                    Ok(()) => {
                        env.rewind_output();
                        env.flush();
                    }
                    Err(err) => dprintln!(Always, "{}", err.to_string().red()),
                }
                self.print_status(env);
            }
            Command::Help => dprintln!(Always, "{}", HELP),
            Command::Quit => (),
        }
    }

    fn print_status(&self, env: &RunEnvironment) {
        let driver = env.driver();
        dprintln!(
            Always,
            "{} ({}), PC at 0x{:03X}",
            driver.status_line(),
            driver.status(),
            driver.state().pc()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn parse_commands() {
        assert_eq!("step".parse(), Ok(Command::Step { count: 1 }));
        assert_eq!("S 4".parse(), Ok(Command::Step { count: 4 }));
        assert_eq!(
            "run 20".parse(),
            Ok(Command::Run {
                interval_ms: Some(20)
            })
        );
        assert_eq!("c".parse(), Ok(Command::Run { interval_ms: None }));
        assert_eq!(
            "input 0x10".parse(),
            Ok(Command::Input {
                value: "0x10".to_string()
            })
        );
        assert_eq!(
            "mem 0x1F0 4".parse(),
            Ok(Command::Memory {
                addr: 0x1F0,
                count: 4
            })
        );
        assert_eq!("regs".parse(), Ok(Command::Registers));
        assert_eq!("q".parse(), Ok(Command::Quit));
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            "jump".parse::<Command>(),
            Err(CommandError::InvalidCommand {
                command_name: "jump".to_string()
            })
        );
        assert_eq!(
            "step 0".parse::<Command>(),
            Err(CommandError::InvalidArgument {
                command_name: "step",
                value: "0".to_string()
            })
        );
        assert_eq!(
            "input".parse::<Command>(),
            Err(CommandError::MissingArgument {
                command_name: "input",
                argument_name: "value"
            })
        );
        assert_eq!(
            "memory 512".parse::<Command>(),
            Err(CommandError::InvalidArgument {
                command_name: "memory",
                value: "512".to_string()
            })
        );
        assert_eq!(
            "regs now".parse::<Command>(),
            Err(CommandError::TooManyArguments {
                command_name: "registers"
            })
        );
    }

    #[test]
    fn commands_from_argument() {
        let Source::Argument(commands) = Source::from(Some("step; ;regs\nquit".to_string())) else {
            panic!("expected argument source");
        };
        assert_eq!(commands, ["step", "regs", "quit"]);
    }

    #[test]
    fn run_defaults_to_configured_interval() {
        let mut env = RunEnvironment::try_from(
            "MOV R0, R0, #1\nMOV R1, R1, #2\nHLT",
            Some(DebuggerOptions {
                command: Some("run".to_string()),
            }),
        )
        .unwrap();
        env.set_minimal(true);
        env.set_interval(25);
        let start = Instant::now();
        env.run();
        // First step is due at once, the other two wait one interval each
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(env.driver().status(), Status::Halted);
    }

    #[test]
    fn scripted_session() {
        let mut env = RunEnvironment::try_from(
            "LDR 0x1F0\nSTR 0x1F1\nHLT",
            Some(DebuggerOptions {
                command: Some("step; input 9; step 5; quit".to_string()),
            }),
        )
        .unwrap();
        env.set_minimal(true);
        env.run();
        assert_eq!(env.driver().status(), Status::Halted);
        let output = env.driver().state().io().output();
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].value, 9);
    }
}
