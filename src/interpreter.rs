use std::sync::Arc;

use crate::{
    bytecode::Bytecode,
    common::{Address, Word, hash::keccak256},
    evm::{Env, Evm},
    ext::Ext,
    frame::{ChildRequest, FrameResult, FrameState, MessageFrame},
    fork::Fork,
    halt::ExceptionalHalt,
    operation::PcUpdate,
    precompiles,
    stack::OperandStack,
    tracer::{Event, EventData, EventTracer, NoopTracer},
};

pub const CALL_DEPTH_LIMIT: usize = 1024;

/// A parent frame parked while its child runs, plus what the interpreter
/// needs to complete the suspending operation when the child returns.
struct Suspended {
    frame: MessageFrame,
    ret_offset: usize,
    ret_size: usize,
    is_create: bool,
}

/// Drives frames to completion against one fork's dispatch table. The nested
/// call stack is an explicit stack of frame records owned here, so depth is
/// bounded and inspectable without leaning on the host call stack; the whole
/// call tree runs on one thread, synchronously.
pub struct Interpreter<'a, T: EventTracer = NoopTracer> {
    evm: &'a Evm,
    env: &'a Env,
    tracer: T,
}

impl<'a> Interpreter<'a, NoopTracer> {
    pub fn new(evm: &'a Evm, env: &'a Env) -> Self {
        Self {
            evm,
            env,
            tracer: NoopTracer,
        }
    }
}

impl<'a, T: EventTracer> Interpreter<'a, T> {
    pub fn with_tracer(evm: &'a Evm, env: &'a Env, tracer: T) -> Self {
        Self { evm, env, tracer }
    }

    pub fn into_tracer(self) -> T {
        self.tracer
    }

    /// Run `frame` and every frame it spawns to completion. The caller has
    /// already applied any entry-time state effects (value transfer, account
    /// setup) under the snapshot recorded in the frame.
    pub fn run(&mut self, frame: MessageFrame, ext: &mut dyn Ext) -> FrameResult {
        let mut suspended: Vec<Suspended> = Vec::new();
        let mut frame = frame;
        self.trace_enter(&frame);
        loop {
            while frame.state == FrameState::Running {
                self.step(&mut frame, ext);
            }
            if frame.state == FrameState::Suspended {
                let request = frame
                    .pending
                    .take()
                    .expect("suspended frame carries a child request");
                frame.state = FrameState::Running;
                if let Some(child) = self.spawn(&mut frame, &request, ext) {
                    self.trace_enter(&child);
                    suspended.push(Suspended {
                        frame: std::mem::replace(&mut frame, child),
                        ret_offset: request.ret_offset,
                        ret_size: request.ret_size,
                        is_create: request.kind.is_create(),
                    });
                }
                continue;
            }
            let result = self.finish(frame, ext);
            match suspended.pop() {
                Some(parked) => {
                    let Suspended {
                        frame: parked_frame,
                        ret_offset,
                        ret_size,
                        is_create,
                    } = parked;
                    frame = parked_frame;
                    self.resume(&mut frame, ret_offset, ret_size, is_create, result);
                }
                None => return result,
            }
        }
    }

    /// One execution step: fetch, dispatch, arity checks, execute, debit,
    /// advance. Past code end the frame stops as if on STOP.
    fn step(&mut self, frame: &mut MessageFrame, ext: &mut dyn Ext) {
        let Some(opcode) = frame.code.opcode_at(frame.pc) else {
            frame.stop();
            return;
        };
        let Some(operation) = self.evm.operation(opcode).copied() else {
            frame.gas.consume_all();
            frame.halt(ExceptionalHalt::InvalidOperation(opcode));
            return;
        };
        if frame.stack.len() < operation.stack_items_consumed {
            frame.halt(ExceptionalHalt::StackUnderflow);
            return;
        }
        let after = frame.stack.len() - operation.stack_items_consumed
            + operation.stack_items_produced;
        if after > OperandStack::CAPACITY {
            frame.halt(ExceptionalHalt::StackOverflow);
            return;
        }

        let pc = frame.pc;
        let result = match (operation.execute)(frame, ext, self.evm, self.env) {
            Ok(result) => result,
            Err(reason) => {
                frame.halt(reason);
                return;
            }
        };
        if frame.gas.consume(result.gas_cost).is_err() {
            frame.halt(ExceptionalHalt::InsufficientGas);
            return;
        }
        self.tracer.push(Event {
            depth: frame.depth,
            data: EventData::Step {
                pc,
                opcode,
                name: operation.name,
                gas_cost: result.gas_cost,
            },
        });
        if let Some(reason) = result.halt {
            // Cost already charged; the remaining ledger is untouched until
            // the frame boundary forfeits it.
            frame.state = FrameState::Halted(reason);
            return;
        }
        match result.pc {
            PcUpdate::Advance(bytes) => frame.pc += bytes,
            PcUpdate::Jump(dest) => frame.pc = dest,
        }
    }

    /// Turn a child request into a frame, or complete it in place (depth or
    /// balance failure, precompile) and return `None`.
    fn spawn(
        &mut self,
        parent: &mut MessageFrame,
        request: &ChildRequest,
        ext: &mut dyn Ext,
    ) -> Option<MessageFrame> {
        if parent.depth + 1 > CALL_DEPTH_LIMIT {
            parent.gas.reclaim(request.charged);
            self.complete_in_place(parent, false, vec![]);
            return None;
        }
        if !request.transfer_value.is_zero()
            && ext.balance(&parent.address) < request.transfer_value
        {
            parent.gas.reclaim(request.charged);
            self.complete_in_place(parent, false, vec![]);
            return None;
        }
        if request.kind.is_create() {
            self.spawn_create(parent, request, ext)
        } else {
            self.spawn_call(parent, request, ext)
        }
    }

    fn spawn_call(
        &mut self,
        parent: &mut MessageFrame,
        request: &ChildRequest,
        ext: &mut dyn Ext,
    ) -> Option<MessageFrame> {
        if precompiles::is_precompile(self.evm.fork(), &request.code_address) {
            self.run_precompile(parent, request, ext);
            return None;
        }
        let snapshot = ext.snapshot();
        transfer(ext, &parent.address, &request.context_address, request.transfer_value);
        let code = ext.code(&request.code_address);
        let mut child = MessageFrame::new(
            request.kind,
            code,
            request.input.clone(),
            request.caller,
            request.context_address,
            request.value,
            request.gas_limit,
            parent.depth + 1,
            request.is_static,
        );
        child.snapshot = snapshot;
        Some(child)
    }

    fn spawn_create(
        &mut self,
        parent: &mut MessageFrame,
        request: &ChildRequest,
        ext: &mut dyn Ext,
    ) -> Option<MessageFrame> {
        let nonce = ext.nonce(&parent.address);
        let created = match request.salt {
            None => parent.address.create(nonce),
            Some(salt) => parent.address.create2(&salt, &keccak256(&request.input)),
        };
        // The creator's nonce moves forward even when the init code fails.
        ext.set_nonce(&parent.address, nonce + 1);
        ext.access_account(&created);

        if ext.nonce(&created) != 0 || !ext.code(&created).is_empty() {
            // Address collision burns the forwarded gas.
            self.complete_in_place(parent, false, vec![]);
            return None;
        }

        let snapshot = ext.snapshot();
        ext.create_account(&created);
        if self.evm.fork().at_least(Fork::SpuriousDragon) {
            ext.set_nonce(&created, 1);
        }
        transfer(ext, &parent.address, &created, request.transfer_value);

        let code = Arc::new(Bytecode::new(request.input.clone()));
        let mut child = MessageFrame::new(
            request.kind,
            code,
            vec![],
            request.caller,
            created,
            request.value,
            request.gas_limit,
            parent.depth + 1,
            false,
        );
        child.snapshot = snapshot;
        Some(child)
    }

    fn run_precompile(
        &mut self,
        parent: &mut MessageFrame,
        request: &ChildRequest,
        ext: &mut dyn Ext,
    ) {
        let snapshot = ext.snapshot();
        transfer(ext, &parent.address, &request.context_address, request.transfer_value);
        let cost = precompiles::cost(&request.code_address, &request.input);
        if cost > request.gas_limit {
            ext.rollback(snapshot);
            self.complete_in_place(parent, false, vec![]);
            return;
        }
        match precompiles::execute(&request.code_address, &request.input) {
            Ok(output) => {
                parent.gas.reclaim(request.gas_limit - cost);
                let n = output.len().min(request.ret_size);
                parent.memory.write(request.ret_offset, &output[..n]);
                self.complete_in_place(parent, true, output);
            }
            Err(_) => {
                // The halt taxonomy calls this PrecompileError; the parent
                // only observes failure and the burnt gas.
                ext.rollback(snapshot);
                self.complete_in_place(parent, false, vec![]);
            }
        }
    }

    /// Finish a suspending operation without ever creating a frame: push the
    /// success flag and refresh the return-data buffer.
    fn complete_in_place(&mut self, parent: &mut MessageFrame, success: bool, output: Vec<u8>) {
        parent.return_data = output;
        let flag = if success { Word::one() } else { Word::zero() };
        if parent.stack.push(flag).is_err() {
            parent.halt(ExceptionalHalt::StackOverflow);
        }
    }

    /// Tear down a terminal frame: settle creates, then commit or roll back
    /// its journal scope. Halted frames forfeit whatever gas was left.
    fn finish(&mut self, mut frame: MessageFrame, ext: &mut dyn Ext) -> FrameResult {
        if frame.kind.is_create() && frame.state == FrameState::CompletedSuccess {
            self.deposit_code(&mut frame, ext);
        }
        self.tracer.push(Event {
            depth: frame.depth,
            data: EventData::CallExit {
                success: frame.state == FrameState::CompletedSuccess,
                gas_remaining: frame.gas.remaining(),
                output: frame.output.clone().into(),
            },
        });
        match frame.state {
            FrameState::CompletedSuccess => {
                ext.commit(frame.snapshot);
                FrameResult {
                    state: frame.state,
                    output: frame.output,
                    gas_remaining: frame.gas.remaining(),
                    refund: frame.refund,
                    logs: frame.logs,
                    selfdestructs: frame.selfdestructs,
                    created: frame.kind.is_create().then_some(frame.address),
                }
            }
            FrameState::CompletedRevert => {
                ext.rollback(frame.snapshot);
                FrameResult {
                    state: frame.state,
                    output: frame.output,
                    gas_remaining: frame.gas.remaining(),
                    refund: 0,
                    logs: vec![],
                    selfdestructs: vec![],
                    created: None,
                }
            }
            FrameState::Halted(_) => {
                ext.rollback(frame.snapshot);
                FrameResult {
                    state: frame.state,
                    output: vec![],
                    gas_remaining: 0,
                    refund: 0,
                    logs: vec![],
                    selfdestructs: vec![],
                    created: None,
                }
            }
            FrameState::Running | FrameState::Suspended => {
                unreachable!("finish called on a live frame")
            }
        }
    }

    /// Charge the deposit and install the returned runtime code, or convert
    /// the success into the matching halt.
    fn deposit_code(&mut self, frame: &mut MessageFrame, ext: &mut dyn Ext) {
        let code = std::mem::take(&mut frame.output);
        let schedule = self.evm.schedule();
        let deposit = schedule.code_deposit.saturating_mul(code.len() as u64);
        if frame.gas.consume(deposit).is_err() {
            frame.state = FrameState::Halted(ExceptionalHalt::InsufficientGas);
            return;
        }
        if code.len() > schedule.max_code_size {
            frame.state = FrameState::Halted(ExceptionalHalt::ContractCreationTooLarge(code.len()));
            return;
        }
        if self.evm.fork().at_least(Fork::London) && code.first() == Some(&0xef) {
            frame.state = FrameState::Halted(ExceptionalHalt::InvalidCode);
            return;
        }
        ext.set_code(&frame.address, code);
    }

    /// Hand a child's outcome back to its parked parent.
    fn resume(
        &mut self,
        parent: &mut MessageFrame,
        ret_offset: usize,
        ret_size: usize,
        is_create: bool,
        result: FrameResult,
    ) {
        let success = result.is_success();
        parent.gas.reclaim(result.gas_remaining);
        if success {
            parent.refund += result.refund;
            parent.logs.extend(result.logs);
            parent.selfdestructs.extend(result.selfdestructs);
        }
        let pushed = if is_create {
            match result.created {
                Some(created) if success => {
                    parent.return_data.clear();
                    (&created).into()
                }
                _ => {
                    parent.return_data = result.output;
                    Word::zero()
                }
            }
        } else {
            let n = result.output.len().min(ret_size);
            parent.memory.write(ret_offset, &result.output[..n]);
            parent.return_data = result.output;
            if success {
                Word::one()
            } else {
                Word::zero()
            }
        };
        if parent.stack.push(pushed).is_err() {
            parent.halt(ExceptionalHalt::StackOverflow);
        }
    }

    fn trace_enter(&mut self, frame: &MessageFrame) {
        self.tracer.push(Event {
            depth: frame.depth,
            data: EventData::CallEnter {
                kind: frame.kind,
                from: frame.caller,
                to: frame.address,
                value: frame.value,
                gas: frame.gas.limit(),
            },
        });
    }
}

fn transfer(ext: &mut dyn Ext, from: &Address, to: &Address, value: Word) {
    if value.is_zero() || from == to {
        return;
    }
    let debited = ext.balance(from) - value;
    ext.set_balance(from, debited);
    let credited = ext.balance(to) + value;
    ext.set_balance(to, credited);
}
