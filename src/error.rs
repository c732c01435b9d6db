//! Error taxonomy and the `TRY`/`CATCH` exception-frame stack.
//!
//! Internal fallible operations use [`SammError`]; anything that crosses the
//! C ABI is converted at the edge into either a numeric [`BasicErrorCode`]
//! (for `ERR`/`ERL`) or a `FATAL:` diagnostic plus process exit, matching the
//! propagation rules in SPEC_FULL.md §7.

use crate::protection::{raw_longjmp, raw_setjmp, JmpBuf};
use crate::samm::Samm;
use std::cell::RefCell;
use thiserror::Error;

/// Numeric BASIC runtime error codes, surfaced to user code via `ERR`/`ERL`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(i32)]
pub enum BasicErrorCode {
    IllegalFunctionCall = 5,
    Overflow = 6,
    Subscript = 9,
    DivisionByZero = 11,
    TypeMismatch = 13,
    BadFileNumber = 52,
    FileNotFound = 53,
    DiskFull = 61,
    InputPastEnd = 62,
    DiskNotReady = 71,
}

impl BasicErrorCode {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            5 => Self::IllegalFunctionCall,
            6 => Self::Overflow,
            9 => Self::Subscript,
            11 => Self::DivisionByZero,
            13 => Self::TypeMismatch,
            52 => Self::BadFileNumber,
            53 => Self::FileNotFound,
            61 => Self::DiskFull,
            62 => Self::InputPastEnd,
            71 => Self::DiskNotReady,
            _ => return None,
        })
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::IllegalFunctionCall => "Illegal function call",
            Self::Overflow => "Overflow",
            Self::Subscript => "Subscript out of range",
            Self::DivisionByZero => "Division by zero",
            Self::TypeMismatch => "Type mismatch",
            Self::BadFileNumber => "Bad file number",
            Self::FileNotFound => "File not found",
            Self::DiskFull => "Disk full",
            Self::InputPastEnd => "Input past end of file",
            Self::DiskNotReady => "Disk not ready",
        }
    }
}

/// Internal error type. Variants that wrap a [`BasicErrorCode`] may cross the
/// `throw`/`ERR` boundary; the rest are invariant violations that only ever
/// reach a `FATAL:` diagnostic.
#[derive(Error, Debug)]
pub enum SammError {
    #[error("{0}")]
    Basic(#[from] BasicCodeError),
    #[error("slab pool exhausted (pool {pool}, requested {requested} slots)")]
    PoolExhausted { pool: &'static str, requested: usize },
    #[error("scope stack overflow (max depth {max})")]
    ScopeOverflow { max: usize },
    #[error("scope stack underflow: attempted to exit the global scope")]
    ScopeUnderflow,
    #[error("retain target depth {target} exceeds current depth {current}")]
    RetainOutOfRange { target: usize, current: usize },
    #[error("allocation failed after all fallbacks ({context})")]
    AllocationFailed { context: &'static str },
}

#[derive(Error, Debug)]
#[error("{}", .0.message())]
pub struct BasicCodeError(pub BasicErrorCode);

/// A single live `TRY`/`CATCH` handler frame: the non-local-jump target
/// installed by [`try_catch`], plus the scope-stack depth at entry so a jump
/// back into it can drain every scope opened since.
struct HandlerFrame {
    buf: JmpBuf,
    scope_depth: usize,
}

struct ExceptionState {
    handlers: Vec<HandlerFrame>,
    last_err: i32,
    last_erl: i32,
}

thread_local! {
    static EXC: RefCell<ExceptionState> = RefCell::new(ExceptionState {
        handlers: Vec::new(),
        last_err: 0,
        last_erl: 0,
    });
}

/// Run `body` as the protected region of a `TRY`/`CATCH` block.
///
/// Reuses `protection.rs`'s `setjmp`/`longjmp` primitive for a jump-target
/// stack of its own — logically separate from the JIT protection harness's
/// stack, since a BASIC exception and a JIT-host-level abort/timeout unwind
/// to different places.
///
/// On normal completion of `body`, returns `Ok(value)`. If `throw`/`rethrow`
/// unwinds back into this frame, every scope entered after this call (and
/// not yet exited) is drained via repeated `exit_scope` before returning
/// `Err(code)`, so TRY/CATCH composes with SAMM's scope tracking instead of
/// leaking allocations made inside the protected region across the jump.
pub fn try_catch<F, T>(samm: &Samm, body: F) -> Result<T, i32>
where
    F: FnOnce() -> T,
{
    let scope_depth = crate::scope::depth();
    EXC.with(|e| e.borrow_mut().handlers.push(HandlerFrame { buf: JmpBuf::zeroed(), scope_depth }));

    let jumped = EXC.with(|e| {
        let mut e = e.borrow_mut();
        let frame = e.handlers.last_mut().expect("handler frame just pushed");
        unsafe { raw_setjmp(&mut frame.buf as *mut JmpBuf) }
    });

    let result = if jumped == 0 {
        Ok(body())
    } else {
        while crate::scope::depth() > scope_depth {
            let _ = samm.exit_scope();
        }
        Err(jumped - 1)
    };

    EXC.with(|e| {
        e.borrow_mut().handlers.pop();
    });
    result
}

/// Copy the innermost handler's jump buffer out of the thread-local state
/// and jump to it. The copy happens inside the `with`/`borrow` closure so
/// the `RefCell` borrow is released before the (non-unwinding) `longjmp`
/// fires — `longjmp` skips `Drop`, so holding the borrow across it would
/// leave the `RefCell`'s borrow counter corrupted forever.
///
/// Returns (rather than diverging) only when no handler is installed.
fn jump_to_innermost(code: i32) {
    let buf = EXC.with(|e| e.borrow().handlers.last().map(|f| f.buf));
    if let Some(mut buf) = buf {
        unsafe { raw_longjmp(&mut buf as *mut JmpBuf, code + 1) };
    }
}

/// `basic_throw(code, line)`: record `ERR`/`ERL` and jump to the innermost
/// active `try_catch` handler. Returns only when no handler exists — that
/// case is definitionally unhandled, and the caller must perform the
/// unhandled-throw sequence (print taxonomy message, `runtime_exit(1)`).
pub fn throw(code: i32, line: i32) {
    EXC.with(|e| {
        let mut e = e.borrow_mut();
        e.last_err = code;
        e.last_erl = line;
    });
    jump_to_innermost(code);
}

/// `basic_rethrow`: re-throw the last recorded error to whatever handler is
/// now innermost (the handler that originally caught it has already been
/// popped by the `try_catch` call that's running the `CATCH` body). With no
/// outer handler this degrades to the unhandled path — intentional
/// (SPEC_FULL.md §12): a rethrow with nothing left to catch it is
/// definitionally unhandled, not a bug to special-case.
pub fn rethrow() {
    jump_to_innermost(err());
}

pub fn err() -> i32 {
    EXC.with(|e| e.borrow().last_err)
}

pub fn erl() -> i32 {
    EXC.with(|e| e.borrow().last_erl)
}

/// Format the unhandled-exception diagnostic for a given error code.
pub fn unhandled_message(code: i32, line: i32) -> String {
    match BasicErrorCode::from_code(code) {
        Some(c) => format!("Unhandled error {code} ({}) at line {line}", c.message()),
        None => format!("Unhandled error {code} at line {line}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // cargo's test harness reuses a small pool of OS threads across many
    // `#[test]` fns, so `EXC`'s thread-local state is not guaranteed fresh
    // per test (same consideration as `scope.rs`'s own `reset()` helper).
    fn reset() {
        EXC.with(|e| {
            *e.borrow_mut() = ExceptionState { handlers: Vec::new(), last_err: 0, last_erl: 0 };
        });
    }

    #[test]
    fn throw_without_a_handler_returns_and_leaves_err_erl_set() {
        reset();
        throw(11, 42);
        assert_eq!(err(), 11);
        assert_eq!(erl(), 42);
    }

    #[test]
    fn try_catch_catches_a_throw_from_inside_its_body() {
        reset();
        let samm = Samm::init();
        let result: Result<i32, i32> = try_catch(&samm, || {
            throw(6, 10);
            unreachable!("throw jumps back into try_catch and never returns here");
        });
        assert_eq!(result, Err(6));
        assert_eq!(err(), 6);
        assert_eq!(erl(), 10);
    }

    #[test]
    fn try_catch_returns_ok_on_normal_completion() {
        reset();
        let samm = Samm::init();
        let result = try_catch(&samm, || 42);
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn unwinding_to_a_handler_drains_scopes_entered_inside_the_protected_region() {
        reset();
        let samm = Samm::init();
        let before = crate::scope::depth();
        let result: Result<(), i32> = try_catch(&samm, || {
            samm.enter_scope().unwrap();
            samm.enter_scope().unwrap();
            throw(11, 7);
            unreachable!("throw jumps away and never returns here");
        });
        assert_eq!(result, Err(11));
        assert_eq!(err(), 11);
        assert_eq!(erl(), 7);
        assert_eq!(crate::scope::depth(), before);
    }

    #[test]
    fn rethrow_with_no_outer_handler_degrades_to_the_unhandled_path() {
        reset();
        let samm = Samm::init();
        let result: Result<(), i32> = try_catch(&samm, || {
            throw(5, 1);
            unreachable!();
        });
        assert_eq!(result, Err(5));
        // Handler already popped on the way out of try_catch: nothing left
        // to jump to, so rethrow just returns instead of unwinding again.
        rethrow();
        assert_eq!(err(), 5);
    }

    #[test]
    fn rethrow_propagates_to_an_outer_handler() {
        reset();
        let samm = Samm::init();
        let outer: Result<i32, i32> = try_catch(&samm, || {
            let inner: Result<i32, i32> = try_catch(&samm, || {
                throw(6, 3);
                unreachable!("throw jumps back into the inner try_catch");
            });
            assert_eq!(inner, Err(6));
            rethrow();
            unreachable!("rethrow jumps back into the outer try_catch");
        });
        assert_eq!(outer, Err(6));
    }

    #[test]
    fn basic_error_code_message_stable() {
        assert_eq!(BasicErrorCode::DivisionByZero.message(), "Division by zero");
        assert_eq!(BasicErrorCode::from_code(11), Some(BasicErrorCode::DivisionByZero));
        assert_eq!(BasicErrorCode::from_code(999), None);
    }
}
