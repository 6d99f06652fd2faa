use std::{cell::RefCell, ffi::OsStr};

/// Default interval between steps of `run`, in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 0;

#[derive(Clone, Copy)]
struct Env {
    trace_enabled: bool,
    interval_ms: u64,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

/// Read `PREDSIM_TRACE` and `PREDSIM_INTERVAL`.
pub fn init() {
    let value = Env {
        trace_enabled: var_is("PREDSIM_TRACE", "1"),
        interval_ms: std::env::var("PREDSIM_INTERVAL")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_INTERVAL_MS),
    };
    set_env(value);
}

pub fn is_trace_enabled() -> bool {
    with_env(|env| env.trace_enabled)
}

pub fn interval_ms() -> u64 {
    with_env(|env| env.interval_ms)
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn var_is(name: impl AsRef<OsStr>, value: impl AsRef<str>) -> bool {
    std::env::var(name.as_ref()).is_ok_and(|v| v == value.as_ref())
}
