//! Crate-wide error type for the recoverable half of the error taxonomy.
//!
//! Programmer errors and hardware faults are not represented here; those
//! are `panic!`/`assert!` per the error handling design.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// A physical frame or other fixed-size resource is exhausted.
    OutOfMemory,
    /// An operation referenced a virtual address with no mapping.
    NotMapped,
    /// An operation would have overwritten an existing mapping.
    AlreadyMapped,
    /// A caller-supplied argument violated a documented precondition.
    InvalidArgument,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::OutOfMemory => "out of memory",
            KernelError::NotMapped => "address not mapped",
            KernelError::AlreadyMapped => "address already mapped",
            KernelError::InvalidArgument => "invalid argument",
        };
        f.write_str(msg)
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
