//! The POSIX-style error taxonomy used at the syscall boundary.
//!
//! Internal subsystems return their own typed errors (`MmError`, `FsError`,
//! `ExecError`); each converts into `Errno` in exactly one place so that
//! "negative errno" at the syscall boundary is computed once, not matched
//! out by hand in every handler.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    Perm = 1,
    NoEnt = 2,
    Srch = 3,
    Io = 5,
    NoMem = 12,
    Fault = 14,
    Exist = 17,
    NotDir = 20,
    Inval = 22,
    NoSpc = 28,
    NotTy = 25,
    NoSys = 38,
    Overflow = 75,
}

impl Errno {
    /// The value a syscall handler returns on failure: `-errno`.
    pub const fn as_retval(self) -> i32 {
        -(self as i32)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            Errno::Perm => "Operation not permitted",
            Errno::NoEnt => "No such file or directory",
            Errno::Srch => "No such process",
            Errno::Io => "I/O error",
            Errno::NoMem => "Out of memory",
            Errno::Fault => "Bad address",
            Errno::Exist => "File exists",
            Errno::NotDir => "Not a directory",
            Errno::Inval => "Invalid argument",
            Errno::NoSpc => "No space left on device",
            Errno::NotTy => "Not a typewriter",
            Errno::NoSys => "Function not implemented",
            Errno::Overflow => "Value too large",
        };
        write!(f, "{}", msg)
    }
}

/// Result type for kernel-internal APIs that ultimately surface at a syscall.
pub type KResult<T> = Result<T, Errno>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retval_is_negative_errno() {
        assert_eq!(Errno::Fault.as_retval(), -14);
        assert_eq!(Errno::NoSys.as_retval(), -38);
    }
}
