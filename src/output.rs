use std::cell::RefCell;
use std::str::Chars;

use colored::{ColoredString, Colorize};

use crate::driver::{Level, LogEntry, Snapshot};

#[macro_export]
macro_rules! dprint {
    ( $cond:expr, $fmt:literal $($tt:tt)* ) => {{
        #[allow(unused_imports)]
        use $crate::output::Condition::*;
        let s = format!(
            $fmt
            $($tt)*
        );
        $crate::output::Output::Debugger($cond).print_str(&s);
    }};
}

#[macro_export]
macro_rules! dprintln {
    ( $cond:expr ) => {{
        #[allow(unused_imports)]
        use $crate::output::Condition::*;
        $crate::output::Output::Debugger($cond).print_str("\n");
    }};
    ( $cond:expr, $fmt:literal $($tt:tt)* ) => {{
        #[allow(unused_imports)]
        use $crate::output::Condition::*;
        let s = format!(
            concat!($fmt, "\n")
            $($tt)*
        );
        $crate::output::Output::Debugger($cond).print_str(&s);
    }};
}

/// Where a message goes.
#[derive(Clone, Copy, Debug)]
pub enum Output {
    /// Machine output, on stdout.
    Normal,
    /// Tool messages, on stderr.
    Debugger(Condition),
}

/// Whether a tool message survives `--minimal`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Always,
    Sometimes,
}

struct Decolored<'a> {
    chars: Chars<'a>,
}

impl Output {
    thread_local! {
        static IS_LINE_START: RefCell<bool> = const { RefCell::new(true) };
        static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
    }

    pub fn set_line_start(new_value: bool) -> bool {
        Self::IS_LINE_START.with(|value| value.replace(new_value))
    }
    fn is_line_start() -> bool {
        Self::IS_LINE_START.with(|value| *value.borrow())
    }
    pub fn set_minimal(new_value: bool) -> bool {
        Self::IS_MINIMAL.with(|value| value.replace(new_value))
    }
    pub fn is_minimal() -> bool {
        Self::IS_MINIMAL.with(|value| *value.borrow())
    }

    fn set_line_start_from_str(string: &str) {
        if let Some(ch) = Decolored::new(string).last() {
            Output::set_line_start(ch == '\n');
        }
    }

    pub fn print_str(&self, string: &str) {
        match self {
            Self::Normal => {
                print!("{}", string);
                Self::set_line_start_from_str(string);
            }
            Self::Debugger(condition) => match (Self::is_minimal(), *condition) {
                (false, _) => {
                    eprint!("{}", string);
                    Self::set_line_start_from_str(string);
                }
                // Always remove color if `--minimal`
                (true, Condition::Always) => {
                    eprint!("{}", decolor(string));
                    Self::set_line_start_from_str(string);
                }
                (true, Condition::Sometimes) => (),
            },
        }
    }

    pub fn start_new_line(&self) {
        if !Self::is_line_start() {
            self.print_str("\n");
        }
    }

    /// Print a driver log entry, colored by level.
    pub fn print_log(&self, entry: &LogEntry) {
        let text = ColoredString::from(entry.message.as_str());
        let line = match entry.level {
            Level::Info => format!("{:>12} {}\n", "Trace".cyan(), text),
            Level::Warning => format!("{:>12} {}\n", "Warning".yellow(), text.yellow()),
            Level::Error => format!("{:>12} {}\n", "Error".red(), text.red()),
        };
        self.print_str(&line);
    }

    pub fn print_registers(&self, snap: &Snapshot) {
        let bit = |set: bool| set as u8;
        let flags = format!(
            "Z{} N{} C{} V{}",
            bit(snap.flags.z),
            bit(snap.flags.n),
            bit(snap.flags.c),
            bit(snap.flags.v)
        );
        let preds = format!(
            "P0{} P1{} P2{} P3{}",
            bit(snap.predicates[0]),
            bit(snap.predicates[1]),
            bit(snap.predicates[2]),
            bit(snap.predicates[3])
        );

        if Self::is_minimal() {
            for (i, val) in snap.gpr.iter().enumerate() {
                self.print_str(&format!("R{} {}\n", i, val));
            }
            self.print_str(&format!("PC {}\n", snap.pc));
            self.print_str(&format!("FLAGS {flags}\n"));
            self.print_str(&format!("PREDS {preds}\n"));
            return;
        }

        self.print_str("\x1b[2m┌──────────────────────────────┐\x1b[0m\n");
        self.print_str("\x1b[2m│        \x1b[3mhex     uint     int\x1b[0m\x1b[2m │\x1b[0m\n");
        for (i, val) in snap.gpr.iter().enumerate() {
            self.print_str("\x1b[2m│\x1b[0m");
            self.print_str(&format!(" \x1b[1mR{}\x1b[0m  ", i));
            self.print_integer(*val);
            self.print_str(" \x1b[2m│\x1b[0m\n");
        }
        self.print_str("\x1b[2m│\x1b[0m");
        self.print_str(&format!(" \x1b[1mPC\x1b[0m  0x{:03x}", snap.pc));
        self.print_str(&format!("   {:<17}", flags));
        self.print_str("\x1b[2m│\x1b[0m\n");
        self.print_str("\x1b[2m│\x1b[0m");
        self.print_str(&format!("           {:<19}", preds));
        self.print_str("\x1b[2m│\x1b[0m\n");
        self.print_str("\x1b[2m└──────────────────────────────┘\x1b[0m\n");
    }

    pub fn print_integer(&self, value: u16) {
        if Self::is_minimal() {
            self.print_str(&format!("{}", value));
            return;
        }
        self.print_str(&format!("0x{:04x}  ", value));
        self.print_str(&format!("{:-6}  ", value));
        self.print_str(&format!("{:-6}", value as i16));
    }
}

impl<'a> Decolored<'a> {
    pub fn new(string: &'a str) -> Self {
        Self {
            chars: string.chars(),
        }
    }
}

impl<'a> Iterator for Decolored<'a> {
    type Item = char;
    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.chars.next() {
            // Skip everything between '\x1b' and 'm' (inclusive)
            if ch == '\x1b' {
                while self.chars.next().is_some_and(|ch| ch != 'm') {}
                continue;
            }
            return Some(ch);
        }
        None
    }
}

pub fn decolor(string: &str) -> String {
    Decolored::new(string).collect()
}
