//! Symbolic signal name mapping
//!
//! The wire carries signal names, never numeric values: numbers differ
//! between platforms, names do not. Both directions use the fixed tables
//! below; a name or value outside the table is dropped by the caller.

use nix::sys::signal::Signal;

/// Map a symbolic name to its platform signal. Unknown names yield `None`.
pub fn signal_for(name: &str) -> Option<Signal> {
    let signal = match name {
        "SIGHUP" => Signal::SIGHUP,
        "SIGINT" => Signal::SIGINT,
        "SIGQUIT" => Signal::SIGQUIT,
        "SIGILL" => Signal::SIGILL,
        "SIGTRAP" => Signal::SIGTRAP,
        "SIGABRT" => Signal::SIGABRT,
        "SIGBUS" => Signal::SIGBUS,
        "SIGFPE" => Signal::SIGFPE,
        "SIGKILL" => Signal::SIGKILL,
        "SIGUSR1" => Signal::SIGUSR1,
        "SIGSEGV" => Signal::SIGSEGV,
        "SIGUSR2" => Signal::SIGUSR2,
        "SIGPIPE" => Signal::SIGPIPE,
        "SIGALRM" => Signal::SIGALRM,
        "SIGTERM" => Signal::SIGTERM,
        "SIGCHLD" => Signal::SIGCHLD,
        "SIGCONT" => Signal::SIGCONT,
        "SIGSTOP" => Signal::SIGSTOP,
        "SIGTSTP" => Signal::SIGTSTP,
        "SIGTTIN" => Signal::SIGTTIN,
        "SIGTTOU" => Signal::SIGTTOU,
        "SIGURG" => Signal::SIGURG,
        "SIGXCPU" => Signal::SIGXCPU,
        "SIGXFSZ" => Signal::SIGXFSZ,
        "SIGVTALRM" => Signal::SIGVTALRM,
        "SIGPROF" => Signal::SIGPROF,
        "SIGWINCH" => Signal::SIGWINCH,
        "SIGIO" => Signal::SIGIO,
        "SIGSYS" => Signal::SIGSYS,
        _ => return None,
    };
    Some(signal)
}

/// Map a platform signal back to its symbolic name.
///
/// The inverse of [`signal_for`]; platform-specific signals outside the
/// canonical POSIX set yield `None` and are dropped by the sender.
pub fn name_for(signal: Signal) -> Option<&'static str> {
    let name = match signal {
        Signal::SIGHUP => "SIGHUP",
        Signal::SIGINT => "SIGINT",
        Signal::SIGQUIT => "SIGQUIT",
        Signal::SIGILL => "SIGILL",
        Signal::SIGTRAP => "SIGTRAP",
        Signal::SIGABRT => "SIGABRT",
        Signal::SIGBUS => "SIGBUS",
        Signal::SIGFPE => "SIGFPE",
        Signal::SIGKILL => "SIGKILL",
        Signal::SIGUSR1 => "SIGUSR1",
        Signal::SIGSEGV => "SIGSEGV",
        Signal::SIGUSR2 => "SIGUSR2",
        Signal::SIGPIPE => "SIGPIPE",
        Signal::SIGALRM => "SIGALRM",
        Signal::SIGTERM => "SIGTERM",
        Signal::SIGCHLD => "SIGCHLD",
        Signal::SIGCONT => "SIGCONT",
        Signal::SIGSTOP => "SIGSTOP",
        Signal::SIGTSTP => "SIGTSTP",
        Signal::SIGTTIN => "SIGTTIN",
        Signal::SIGTTOU => "SIGTTOU",
        Signal::SIGURG => "SIGURG",
        Signal::SIGXCPU => "SIGXCPU",
        Signal::SIGXFSZ => "SIGXFSZ",
        Signal::SIGVTALRM => "SIGVTALRM",
        Signal::SIGPROF => "SIGPROF",
        Signal::SIGWINCH => "SIGWINCH",
        Signal::SIGIO => "SIGIO",
        Signal::SIGSYS => "SIGSYS",
        _ => return None,
    };
    Some(name)
}
