//! Minimal formatted print over a pluggable byte output.
//!
//! The board layer registers a `putc` (UART, SWO, semihosting) with
//! [`os_console_set_putc`]; [`kprint!`]/[`kprintln!`](crate::kprintln)
//! then format through `core::fmt` straight into it. No buffering, no
//! allocation; output is dropped silently until a putc is registered.

use core::fmt::{self, Write};

use crate::critical::{critical_section, CsCell};

/// Byte output function supplied by the board layer.
pub type PutcFn = fn(u8);

static PUTC: CsCell<Option<PutcFn>> = CsCell::new(None);

/// Register (or clear with `None`) the console byte output.
pub fn os_console_set_putc(putc: Option<PutcFn>) {
    critical_section(|cs| *PUTC.get(cs) = putc);
}

struct Console;

impl Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // Single-word read; registration happens during bring-up.
        if let Some(putc) = unsafe { *PUTC.get_unchecked() } {
            for &b in s.as_bytes() {
                putc(b);
            }
        }
        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    let _ = Console.write_fmt(args);
}

/// Print through the registered console output.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::print::_print(core::format_args!($($arg)*))
    };
}

/// Print through the registered console output, with a trailing
/// newline.
#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::kprint!("\n")
    };
    ($($arg:tt)*) => {{
        $crate::print::_print(core::format_args!($($arg)*));
        $crate::print::_print(core::format_args!("\n"));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::String;
    use std::sync::Mutex;

    static CAPTURED: Mutex<String> = Mutex::new(String::new());

    fn capture(b: u8) {
        CAPTURED.lock().unwrap().push(b as char);
    }

    #[test]
    fn formats_through_registered_putc() {
        os_console_set_putc(Some(capture));

        kprint!("tick={} name={}", 42u32, "idle");
        kprintln!(" [{:#06x}]", 0xA5u32);

        let out = CAPTURED.lock().unwrap().clone();
        assert_eq!(out, "tick=42 name=idle [0x00a5]\n");

        os_console_set_putc(None);
        kprint!("dropped");
        assert_eq!(CAPTURED.lock().unwrap().as_str(), out);
    }
}
