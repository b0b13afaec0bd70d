//! Fatal fault policy.
//!
//! A panic on any thread, spawned tasks included, is an unrecoverable fault:
//! it is logged with a backtrace and the process exits with status 1.

use std::any::Any;
use std::backtrace::Backtrace;
use tracing::error;

/// Install the process-wide panic hook. Call after logging is initialised.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::force_capture();
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        error!(
            message = panic_message(info.payload()),
            %location,
            %backtrace,
            "Unrecoverable fault, exiting"
        );
        std::process::exit(1);
    }));
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_from_str_payload() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
    }

    #[test]
    fn message_from_string_payload() {
        let payload: Box<dyn Any + Send> = Box::new(format!("bad state {}", 7));
        assert_eq!(panic_message(payload.as_ref()), "bad state 7");
    }

    #[test]
    fn message_from_other_payload() {
        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn caught_panic_payload_is_readable() {
        let err = std::panic::catch_unwind(|| panic!("task exploded")).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "task exploded");
    }
}
