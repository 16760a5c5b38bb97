use crate::{
    evm::{Env, Evm},
    ext::Ext,
    frame::MessageFrame,
    halt::ExceptionalHalt,
};

/// Program-counter effect of one executed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcUpdate {
    /// Move forward by this many bytes (1 for plain opcodes, 1+N for PUSH-N).
    Advance(usize),
    /// Absolute target, used only by the jump operations.
    Jump(usize),
}

/// What one execution step produced: the gas to debit, an optional halt
/// (charged first, then terminal), and the PC effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationResult {
    pub gas_cost: u64,
    pub halt: Option<ExceptionalHalt>,
    pub pc: PcUpdate,
}

impl OperationResult {
    pub fn advance(gas_cost: u64) -> Self {
        Self {
            gas_cost,
            halt: None,
            pc: PcUpdate::Advance(1),
        }
    }

    pub fn advance_by(gas_cost: u64, bytes: usize) -> Self {
        Self {
            gas_cost,
            halt: None,
            pc: PcUpdate::Advance(bytes),
        }
    }

    pub fn jump(gas_cost: u64, dest: usize) -> Self {
        Self {
            gas_cost,
            halt: None,
            pc: PcUpdate::Jump(dest),
        }
    }

    /// Halt that still charges its computed cost (e.g. a jump to an invalid
    /// destination charges the fixed jump cost before terminating).
    pub fn halt(gas_cost: u64, reason: ExceptionalHalt) -> Self {
        Self {
            gas_cost,
            halt: Some(reason),
            pc: PcUpdate::Advance(1),
        }
    }
}

/// Execution outcome channel: `Err` halts without charging anything further
/// (the interpreter drains the ledger itself for InsufficientGas), `Ok` with
/// a `halt` charges the carried cost first.
pub type OpResult = Result<OperationResult, ExceptionalHalt>;

pub type ExecFn = fn(&mut MessageFrame, &mut dyn Ext, &Evm, &Env) -> OpResult;

/// One opcode's behavior: its byte, mnemonic, declared stack arity, and the
/// function the dispatch table jumps through.
#[derive(Clone, Copy)]
pub struct Operation {
    pub opcode: u8,
    pub name: &'static str,
    pub stack_items_consumed: usize,
    pub stack_items_produced: usize,
    pub execute: ExecFn,
}

impl Operation {
    pub const fn new(
        opcode: u8,
        name: &'static str,
        stack_items_consumed: usize,
        stack_items_produced: usize,
        execute: ExecFn,
    ) -> Self {
        Self {
            opcode,
            name,
            stack_items_consumed,
            stack_items_produced,
            execute,
        }
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("opcode", &format_args!("{:#04x}", self.opcode))
            .field("name", &self.name)
            .field("consumed", &self.stack_items_consumed)
            .field("produced", &self.stack_items_produced)
            .finish()
    }
}
