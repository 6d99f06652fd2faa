//! Owns the machine and decides when instructions execute.
//!
//! Continuous running is a deadline rather than a thread: [`Driver::run`] arms a schedule and
//! whoever owns the driver (a terminal loop, a UI timer) calls [`Driver::tick`] to execute
//! instructions as they come due. Each call executes at most one instruction, so steps are
//! atomic and [`Driver::stop`] is always safe between them.

use std::fmt;
use std::time::{Duration, Instant};

use crate::assembler::assemble;
use crate::engine::{self, Effect, Fault};
use crate::error::AssemblyErrors;
use crate::io::OutputRecord;
use crate::isa::{FormatTag, MEMORY_SIZE};
use crate::program::{LoadError, Program};
use crate::state::{Flags, MachineState};

/// Shortest interval between scheduled steps.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub fn clamp_interval(interval_ms: u64) -> Duration {
    Duration::from_millis(interval_ms).max(MIN_INTERVAL)
}

/// Lifecycle of the driver.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    /// Nothing loaded.
    Idle,
    /// Loaded and not yet stepped.
    Ready,
    /// Run schedule active.
    Running,
    /// Stepped at least once, no schedule active.
    Paused,
    /// Blocked on a load from the input port.
    WaitingForInput,
    /// Only `reset` leaves this state.
    Halted,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Idle => "idle",
            Status::Ready => "ready",
            Status::Running => "running",
            Status::Paused => "paused",
            Status::WaitingForInput => "waiting for input",
            Status::Halted => "halted",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Level {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
}

/// Request the driver refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriverError {
    NotLoaded,
    Halted,
    WaitingForInput,
    AlreadyRunning,
    NotWaiting,
    Load(LoadError),
    /// Instruction could not be executed; the machine is now halted.
    Fault(Fault),
}

impl std::error::Error for DriverError {}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotLoaded => write!(f, "No program is loaded"),
            Self::Halted => write!(f, "Machine is halted, reset to continue"),
            Self::WaitingForInput => write!(f, "Machine is waiting for input"),
            Self::AlreadyRunning => write!(f, "Machine is already running"),
            Self::NotWaiting => write!(f, "Machine is not waiting for input"),
            Self::Load(err) => write!(f, "Cannot load program: {err}"),
            Self::Fault(fault) => write!(f, "{fault}"),
        }
    }
}

/// Copy of everything an observer may display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub pc: u16,
    pub gpr: [u16; 8],
    pub flags: Flags,
    pub predicates: [bool; 4],
    pub memory: Box<[u16; MEMORY_SIZE]>,
    pub halted: bool,
    pub waiting_for_input: bool,
    pub input_address: Option<u16>,
    pub output_log: Vec<OutputRecord>,
    pub status: Status,
}

#[derive(Clone, Copy, Debug)]
struct Schedule {
    interval: Duration,
    next_due: Instant,
}

/// Sole owner of the machine state.
pub struct Driver {
    state: MachineState,
    /// Last loaded program, kept for `restart`
    program: Option<Program>,
    loaded: bool,
    schedule: Option<Schedule>,
    /// Instructions executed since load
    steps: u64,
    status_line: String,
    log: Vec<LogEntry>,
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver {
    pub fn new() -> Self {
        Driver {
            state: MachineState::new(),
            program: None,
            loaded: false,
            schedule: None,
            steps: 0,
            status_line: "No program loaded".to_string(),
            log: Vec::new(),
        }
    }

    fn info(&mut self, message: impl Into<String>) {
        self.push_log(Level::Info, message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.push_log(Level::Warning, message.into());
    }

    fn push_log(&mut self, level: Level, message: String) {
        self.log.push(LogEntry { level, message });
    }

    /// Take every log entry recorded since the last call.
    pub fn drain_log(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut self.log)
    }

    /// Assemble and load `src`. On failure the current machine is left untouched.
    pub fn assemble_and_load(&mut self, src: &str) -> Result<(), AssemblyErrors> {
        let program = assemble(src)?;
        self.load(program);
        Ok(())
    }

    /// Load separately stored words and tags.
    pub fn load_raw(&mut self, words: &[u16], tags: &[FormatTag]) -> Result<(), DriverError> {
        let program = Program::from_parts(words, tags).map_err(DriverError::Load)?;
        self.load(program);
        Ok(())
    }

    /// Replace the machine with a fresh one holding `program`.
    pub fn load(&mut self, program: Program) {
        self.state = MachineState::with_program(&program);
        self.info(format!("Loaded {} instructions", program.len()));
        self.program = Some(program);
        self.loaded = true;
        self.schedule = None;
        self.steps = 0;
        self.status_line = "Ready".to_string();
    }

    /// Fetch and execute exactly one instruction.
    pub fn step(&mut self) -> Result<Effect, DriverError> {
        if !self.loaded {
            return Err(DriverError::NotLoaded);
        }
        if self.state.halted() {
            return Err(DriverError::Halted);
        }
        if self.state.waiting_for_input() {
            return Err(DriverError::WaitingForInput);
        }

        let (pc, word, tag) = self.state.fetch();
        let result = engine::execute(pc, word, tag, &mut self.state);
        self.steps += 1;

        match &result {
            Ok(effect) => {
                self.info(format!("0x{pc:03X}  {}", effect.trace));
                if let Some(warning) = &effect.warning {
                    self.warn(warning.clone());
                }
                if effect.halted {
                    self.status_line = format!("Halted at 0x{pc:03X}");
                } else if effect.suspended {
                    self.status_line = "Waiting for input".to_string();
                } else {
                    self.status_line = format!("PC at 0x{:03X}", self.state.pc());
                }
            }
            Err(fault) => {
                self.push_log(Level::Error, fault.to_string());
                self.status_line = format!("Halted: {fault}");
            }
        }

        if self.state.halted() || self.state.waiting_for_input() {
            self.schedule = None;
        }
        result.map_err(DriverError::Fault)
    }

    /// Start stepping every `interval_ms` (at least [`MIN_INTERVAL`]). The first step is due
    /// immediately.
    pub fn run(&mut self, interval_ms: u64) -> Result<(), DriverError> {
        if !self.loaded {
            return Err(DriverError::NotLoaded);
        }
        if self.schedule.is_some() {
            return Err(DriverError::AlreadyRunning);
        }
        if self.state.halted() {
            return Err(DriverError::Halted);
        }
        if self.state.waiting_for_input() {
            return Err(DriverError::WaitingForInput);
        }
        self.schedule = Some(Schedule {
            interval: clamp_interval(interval_ms),
            next_due: Instant::now(),
        });
        self.status_line = "Running".to_string();
        Ok(())
    }

    /// Change the interval of an active run, keeping the machine as it is.
    pub fn set_interval(&mut self, interval_ms: u64) -> Result<(), DriverError> {
        if self.schedule.is_none() {
            return Ok(());
        }
        self.stop();
        self.run(interval_ms)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.schedule.map(|schedule| schedule.interval)
    }

    /// When the next scheduled step is due, if running.
    pub fn next_due(&self) -> Option<Instant> {
        self.schedule.map(|schedule| schedule.next_due)
    }

    /// Execute one instruction if a scheduled step is due at `now`.
    ///
    /// Returns `None` when nothing was due.
    pub fn tick(&mut self, now: Instant) -> Option<Result<Effect, DriverError>> {
        let schedule = self.schedule.as_mut()?;
        if now < schedule.next_due {
            return None;
        }
        schedule.next_due = now + schedule.interval;
        let result = self.step();
        if result.is_err() {
            self.schedule = None;
        }
        Some(result)
    }

    /// Cancel any active run. Safe to call at any time.
    pub fn stop(&mut self) {
        if self.schedule.take().is_some() {
            self.status_line = "Paused".to_string();
        }
    }

    /// Zero every register, flag, predicate and memory cell, and cancel any run.
    ///
    /// The last program is remembered for [`Driver::restart`] but no longer loaded.
    pub fn reset(&mut self) {
        self.schedule = None;
        self.state = MachineState::new();
        self.loaded = false;
        self.steps = 0;
        self.status_line = "Reset".to_string();
        self.info("Machine reset");
    }

    /// Reset, then load the last program again.
    pub fn restart(&mut self) -> Result<(), DriverError> {
        let program = self.program.take().ok_or(DriverError::NotLoaded)?;
        self.reset();
        self.load(program);
        Ok(())
    }

    /// Complete a load from the input port. Execution continues on the next step.
    pub fn provide_input(&mut self, raw: &str) -> Result<(), DriverError> {
        let resumed = self.state.io.provide(raw).ok_or(DriverError::NotWaiting)?;
        *self.state.reg_mut(resumed.dest) = resumed.value;
        if let Some(warning) = resumed.warning {
            self.warn(warning);
        }
        self.info(format!("{} = 0x{:04X} from input", resumed.dest, resumed.value));
        self.status_line = "Paused".to_string();
        Ok(())
    }

    pub fn status(&self) -> Status {
        if !self.loaded {
            Status::Idle
        } else if self.state.halted() {
            Status::Halted
        } else if self.state.waiting_for_input() {
            Status::WaitingForInput
        } else if self.schedule.is_some() {
            Status::Running
        } else if self.steps > 0 {
            Status::Paused
        } else {
            Status::Ready
        }
    }

    /// Human-readable status, naming the cause of a halt.
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = &self.state;
        Snapshot {
            pc: state.pc(),
            gpr: state.registers(),
            flags: state.flags(),
            predicates: state.predicates(),
            memory: Box::new(*state.memory()),
            halted: state.halted(),
            waiting_for_input: state.waiting_for_input(),
            input_address: state.io().pending().map(|pending| pending.address),
            output_log: state.io().output().to_vec(),
            status: self.status(),
        }
    }
}
