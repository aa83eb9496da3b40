//! Message printers injected into the shell server.

use crate::session::CRLF;

/// Readiness marker written before each prompt.
pub const READY: &str = "Ready.";

/// Prefix of the unknown-command message.
pub const NO_SUCH_COMMAND: &str = "No such command";

/// Formatting hook: writes into the session's output buffer, optionally
/// using a hint token.
pub type PrintFn = fn(&mut String, Option<&str>);

/// The two formatting hooks a session calls after dispatch.
#[derive(Debug, Clone, Copy)]
pub struct MessagePrinters {
    pub ready: PrintFn,
    pub no_command: PrintFn,
}

impl Default for MessagePrinters {
    fn default() -> Self {
        Self {
            ready: print_ready,
            no_command: print_no_command,
        }
    }
}

/// Writes `Ready.`.
pub fn print_ready(out: &mut String, _hint: Option<&str>) {
    out.push_str(READY);
    out.push_str(CRLF);
}

/// Writes `No such command: <hint>` or `No such command.`.
pub fn print_no_command(out: &mut String, hint: Option<&str>) {
    out.push_str(NO_SUCH_COMMAND);
    match hint {
        Some(token) => {
            out.push_str(": ");
            out.push_str(token);
        }
        None => out.push('.'),
    }
    out.push_str(CRLF);
}
