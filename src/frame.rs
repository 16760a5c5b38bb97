use std::sync::Arc;

use serde::Serialize;

use crate::{
    bytecode::Bytecode,
    common::{Address, Hex, Word},
    gas::Gas,
    halt::ExceptionalHalt,
    memory::Memory,
    stack::OperandStack,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallKind {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
    Create,
    Create2,
}

impl CallKind {
    pub fn is_create(&self) -> bool {
        matches!(self, CallKind::Create | CallKind::Create2)
    }
}

/// Frame life cycle. `Suspended` means a child request is pending and the
/// interpreter will resume the frame with the child's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Running,
    Suspended,
    CompletedSuccess,
    CompletedRevert,
    Halted(ExceptionalHalt),
}

/// A log event emitted by a frame; discarded with the frame on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<Word>,
    pub data: Hex,
}

/// Child invocation requested by a call- or create-type operation. The
/// requesting operation has already debited `charged` from the parent; on a
/// spawn that never runs (depth or balance), `charged` flows back.
#[derive(Debug)]
pub struct ChildRequest {
    pub kind: CallKind,
    /// Account whose code runs (calls only; creates carry code in `input`).
    pub code_address: Address,
    /// Storage and self-address context of the child.
    pub context_address: Address,
    pub caller: Address,
    /// Value the child observes via CALLVALUE.
    pub value: Word,
    /// Value actually moved between accounts (zero for delegate/static).
    pub transfer_value: Word,
    pub input: Vec<u8>,
    pub gas_limit: u64,
    pub charged: u64,
    pub ret_offset: usize,
    pub ret_size: usize,
    pub salt: Option<Word>,
    pub is_static: bool,
}

/// One nested call or contract-creation execution context.
#[derive(Debug)]
pub struct MessageFrame {
    pub kind: CallKind,
    pub code: Arc<Bytecode>,
    pub pc: usize,
    pub gas: Gas,
    pub stack: OperandStack,
    pub memory: Memory,
    pub input: Vec<u8>,
    /// Output buffer of the most recently completed child.
    pub return_data: Vec<u8>,
    /// This frame's own RETURN/REVERT payload.
    pub output: Vec<u8>,
    pub caller: Address,
    pub address: Address,
    pub value: Word,
    pub depth: usize,
    pub is_static: bool,
    pub state: FrameState,
    pub pending: Option<ChildRequest>,
    pub logs: Vec<LogEntry>,
    pub selfdestructs: Vec<Address>,
    pub refund: i64,
    /// State journal position at frame entry; set by the interpreter.
    pub(crate) snapshot: usize,
}

impl MessageFrame {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: CallKind,
        code: Arc<Bytecode>,
        input: Vec<u8>,
        caller: Address,
        address: Address,
        value: Word,
        gas_limit: u64,
        depth: usize,
        is_static: bool,
    ) -> Self {
        Self {
            kind,
            code,
            pc: 0,
            gas: Gas::new(gas_limit),
            stack: OperandStack::new(),
            memory: Memory::new(),
            input,
            return_data: vec![],
            output: vec![],
            caller,
            address,
            value,
            depth,
            is_static,
            state: FrameState::Running,
            pending: None,
            logs: vec![],
            selfdestructs: vec![],
            refund: 0,
            snapshot: 0,
        }
    }

    pub fn stop(&mut self) {
        self.output.clear();
        self.state = FrameState::CompletedSuccess;
    }

    pub fn finish(&mut self, output: Vec<u8>) {
        self.output = output;
        self.state = FrameState::CompletedSuccess;
    }

    pub fn revert(&mut self, output: Vec<u8>) {
        self.output = output;
        self.state = FrameState::CompletedRevert;
    }

    pub fn halt(&mut self, reason: ExceptionalHalt) {
        if reason == ExceptionalHalt::InsufficientGas {
            self.gas.consume_all();
        }
        self.state = FrameState::Halted(reason);
    }

    pub fn request_child(&mut self, request: ChildRequest) {
        self.pending = Some(request);
        self.state = FrameState::Suspended;
    }
}

/// Terminal outcome of a frame, handed to the parent (or the transaction
/// layer at depth zero). A halted frame forfeits its gas: `gas_remaining`
/// is zero however much was left in its ledger.
#[derive(Debug)]
pub struct FrameResult {
    pub state: FrameState,
    pub output: Vec<u8>,
    pub gas_remaining: u64,
    pub refund: i64,
    pub logs: Vec<LogEntry>,
    pub selfdestructs: Vec<Address>,
    pub created: Option<Address>,
}

impl FrameResult {
    pub fn is_success(&self) -> bool {
        self.state == FrameState::CompletedSuccess
    }

    pub fn halt_reason(&self) -> Option<ExceptionalHalt> {
        match self.state {
            FrameState::Halted(reason) => Some(reason),
            _ => None,
        }
    }
}
