//! A deterministic, gas-metered 256-bit stack machine for contract bytecode.
//!
//! The interpreter owns an explicit stack of message frames, dispatches
//! through an immutable per-fork operation table, and touches world state
//! only through the [`ext::Ext`] handle under snapshot/rollback discipline.
//! Given identical inputs, every run is byte-identical — the whole point.

pub mod bytecode;
pub mod common;
pub mod evm;
pub mod ext;
pub mod fork;
pub mod frame;
pub mod gas;
pub mod halt;
pub mod interpreter;
pub mod memory;
pub mod operation;
pub mod operations;
pub mod precompiles;
pub mod stack;
pub mod tracer;
pub mod transact;

pub use bytecode::Bytecode;
pub use common::{Address, Word};
pub use evm::{BlockEnv, Env, Evm, TxEnv};
pub use ext::{Ext, MemoryExt};
pub use fork::Fork;
pub use frame::{CallKind, FrameResult, LogEntry, MessageFrame};
pub use gas::{Gas, GasSchedule};
pub use halt::ExceptionalHalt;
pub use interpreter::Interpreter;
pub use transact::{ExecutionResult, ExecutionStatus, Ferrite, TransactError};
