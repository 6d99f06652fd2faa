use std::collections::VecDeque;
use std::io::{stdin, IsTerminal};
use std::thread::sleep;
use std::time::Instant;

use colored::Colorize;
use console::Term;

use crate::debugger::{Debugger, DebuggerOptions};
use crate::driver::{Driver, Level, Status};
use crate::error::AssemblyErrors;
use crate::output::{Condition, Output};
use crate::program::Program;
use crate::{dprint, dprintln};

/// Runs an assembled program against the terminal.
pub struct RunEnvironment {
    driver: Driver,
    debugger: Option<Debugger>,
    /// Print every executed instruction
    trace: bool,
    interval_ms: u64,
    /// Values given up front for the input port, used before prompting
    inputs: VecDeque<String>,
    /// Output records already printed
    printed_output: usize,
}

impl RunEnvironment {
    pub fn try_from(
        src: &str,
        debugger_opts: Option<DebuggerOptions>,
    ) -> Result<RunEnvironment, AssemblyErrors> {
        let mut driver = Driver::new();
        driver.assemble_and_load(src)?;
        driver.drain_log();
        Ok(RunEnvironment {
            driver,
            debugger: debugger_opts.map(Debugger::new),
            trace: false,
            interval_ms: 0,
            inputs: VecDeque::new(),
            printed_output: 0,
        })
    }

    pub fn from_program(
        program: Program,
        debugger_opts: Option<DebuggerOptions>,
    ) -> RunEnvironment {
        let mut driver = Driver::new();
        driver.load(program);
        driver.drain_log();
        RunEnvironment {
            driver,
            debugger: debugger_opts.map(Debugger::new),
            trace: false,
            interval_ms: 0,
            inputs: VecDeque::new(),
            printed_output: 0,
        }
    }

    pub fn set_minimal(&mut self, minimal: bool) {
        Output::set_minimal(minimal);
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    pub fn set_interval(&mut self, interval_ms: u64) {
        self.interval_ms = interval_ms;
    }

    /// Interval used when `run` is not given one.
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn queue_inputs<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(values.into_iter().map(Into::into));
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut Driver {
        &mut self.driver
    }

    /// Run to completion, or hand control to the debugger if one was requested.
    pub fn run(&mut self) {
        if let Some(mut debugger) = self.debugger.take() {
            debugger.run(self);
            return;
        }

        loop {
            if let Err(err) = self.driver.run(self.interval_ms) {
                dprintln!(Always, "{}", err.to_string().red());
                break;
            }
            self.drive();

            match self.driver.status() {
                Status::WaitingForInput => {
                    let Some(value) = self.next_input() else {
                        dprintln!(Always, "{}", "No more input. Stopping.".yellow());
                        break;
                    };
                    if let Err(err) = self.driver.provide_input(&value) {
                        dprintln!(Always, "{}", err.to_string().red());
                        break;
                    }
                    self.flush();
                }
                _ => break,
            }
        }

        if self.driver.status() == Status::Halted {
            Output::Debugger(Condition::Always).start_new_line();
            dprintln!(Always, "{:>12} {}", "Halted".cyan(), self.driver.status_line());
        }
    }

    /// Tick the driver until its run schedule ends.
    pub fn drive(&mut self) {
        while let Some(due) = self.driver.next_due() {
            let now = Instant::now();
            if now < due {
                sleep(due - now);
            }
            self.driver.tick(Instant::now());
            self.flush();
        }
    }

    /// Print pending log entries and new machine output.
    pub fn flush(&mut self) {
        for entry in self.driver.drain_log() {
            match entry.level {
                Level::Info if !self.trace => (),
                Level::Info => Output::Debugger(Condition::Sometimes).print_log(&entry),
                Level::Warning | Level::Error => {
                    Output::Debugger(Condition::Always).print_log(&entry)
                }
            }
        }

        let output = self.driver.state().io().output();
        for record in &output[self.printed_output..] {
            Output::Normal.print_str(&format!(
                "OUT 0x{:03X}: {}\n",
                record.address, record.value
            ));
        }
        self.printed_output = output.len();
    }

    /// Reprint output from the start after the machine was reset.
    pub fn rewind_output(&mut self) {
        self.printed_output = 0;
    }

    /// Next queued input value, else ask the terminal.
    pub fn next_input(&mut self) -> Option<String> {
        if let Some(value) = self.inputs.pop_front() {
            return Some(value);
        }
        Output::Debugger(Condition::Always).start_new_line();
        dprint!(Always, "{:>12} ", "Input".green());
        read_line()
    }
}

/// Read one line from the terminal or piped stdin. `None` on end of input.
pub(crate) fn read_line() -> Option<String> {
    if stdin().is_terminal() {
        let line = Term::stdout().read_line().ok()?;
        Output::set_line_start(true);
        Some(line)
    } else {
        let mut line = String::new();
        match stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                Output::set_line_start(true);
                Some(line.trim_end().to_string())
            }
        }
    }
}
