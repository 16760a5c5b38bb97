use serde::Serialize;
use thiserror::Error;

/// Abnormal, frame-terminal conditions. A halt stops the frame immediately
/// and forfeits its remaining gas; REVERT is not a halt — it is a deliberate
/// termination that returns data and refunds unused gas upward.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExceptionalHalt {
    #[error("Insufficient gas")]
    InsufficientGas,
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Stack overflow")]
    StackOverflow,
    #[error("Invalid jump destination")]
    InvalidJumpDestination,
    #[error("Invalid operation: {0:#04x}")]
    InvalidOperation(u8),
    #[error("Illegal state change in read-only frame")]
    IllegalStateChange,
    #[error("Out of bounds memory access")]
    OutOfBoundsMemoryAccess,
    #[error("Precompile error")]
    PrecompileError,
    #[error("Contract creation too large: {0} bytes")]
    ContractCreationTooLarge(usize),
    #[error("Invalid code")]
    InvalidCode,
}
