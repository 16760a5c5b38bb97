use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::{
    bytecode::Bytecode,
    common::{Address, Hex, Word},
    evm::{Env, Evm},
    ext::Ext,
    fork::Fork,
    frame::{CallKind, FrameState, LogEntry, MessageFrame},
    halt::ExceptionalHalt,
    interpreter::Interpreter,
    precompiles,
    tracer::{EventTracer, NoopTracer},
};

/// Conditions that reject a transaction before the first instruction runs.
/// Distinct from halts: nothing executed, nothing is charged beyond what the
/// embedder decides.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactError {
    #[error("Intrinsic gas {needed} exceeds the gas limit {limit}")]
    IntrinsicGasExceedsLimit { needed: u64, limit: u64 },
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: Word, need: Word },
    #[error("Init code of {0} bytes exceeds the size ceiling")]
    InitCodeTooLarge(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExecutionStatus {
    Success,
    Reverted,
    Halted(ExceptionalHalt),
}

/// Everything the surrounding processor learns from one invocation.
#[derive(Debug, Serialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub gas_used: u64,
    pub gas_refunded: u64,
    pub output: Hex,
    pub logs: Vec<LogEntry>,
    pub created: Option<Address>,
    /// Accounts the transaction touched, including the pre-warmed set.
    pub touched: Vec<Address>,
    pub selfdestructs: Vec<Address>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Entry point tying the pieces together: pick a fork, describe the call,
/// apply it against a state handle.
#[derive(Debug, Clone)]
pub struct Ferrite {
    fork: Fork,
    env: Env,
}

impl Ferrite {
    pub fn new(fork: Fork) -> Self {
        Self {
            fork,
            env: Env::default(),
        }
    }

    pub fn with_env(mut self, env: Env) -> Self {
        self.env = env;
        self
    }

    pub fn call(&self, to: Address, data: Vec<u8>) -> CallBuilder {
        CallBuilder {
            fork: self.fork,
            env: self.env.clone(),
            to: Some(to),
            data,
            ..CallBuilder::default()
        }
    }

    pub fn create(&self, init_code: Vec<u8>) -> CallBuilder {
        CallBuilder {
            fork: self.fork,
            env: self.env.clone(),
            to: None,
            data: init_code,
            ..CallBuilder::default()
        }
    }

    pub fn transfer(&self, to: Address, value: Word) -> CallBuilder {
        CallBuilder {
            fork: self.fork,
            env: self.env.clone(),
            to: Some(to),
            value,
            ..CallBuilder::default()
        }
    }
}

impl Default for Ferrite {
    fn default() -> Self {
        Self::new(Fork::latest())
    }
}

#[derive(Debug, Clone)]
pub struct CallBuilder {
    fork: Fork,
    env: Env,
    from: Address,
    to: Option<Address>,
    value: Word,
    gas_limit: u64,
    data: Vec<u8>,
}

impl Default for CallBuilder {
    fn default() -> Self {
        Self {
            fork: Fork::latest(),
            env: Env::default(),
            from: Address::zero(),
            to: None,
            value: Word::zero(),
            gas_limit: 30_000_000,
            data: vec![],
        }
    }
}

impl CallBuilder {
    pub fn with_sender(mut self, sender: Address) -> Self {
        self.from = sender;
        self
    }

    pub fn with_value(mut self, value: Word) -> Self {
        self.value = value;
        self
    }

    pub fn with_gas(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn apply(self, ext: &mut dyn Ext) -> Result<ExecutionResult, TransactError> {
        self.apply_traced(ext, NoopTracer).map(|(result, _)| result)
    }

    /// Apply with a tracer attached; returns the tracer alongside the result.
    pub fn apply_traced<T: EventTracer>(
        self,
        ext: &mut dyn Ext,
        tracer: T,
    ) -> Result<(ExecutionResult, T), TransactError> {
        let evm = Evm::new(self.fork);
        let schedule = evm.schedule();
        let is_create = self.to.is_none();

        if is_create && self.data.len() > schedule.max_init_code_size {
            return Err(TransactError::InitCodeTooLarge(self.data.len()));
        }
        let intrinsic = schedule.intrinsic_cost(&self.data, is_create);
        if intrinsic > self.gas_limit {
            return Err(TransactError::IntrinsicGasExceedsLimit {
                needed: intrinsic,
                limit: self.gas_limit,
            });
        }

        ext.begin_transaction();
        let have = ext.balance(&self.from);
        if have < self.value {
            return Err(TransactError::InsufficientFunds {
                have,
                need: self.value,
            });
        }

        let sender_nonce = ext.nonce(&self.from);
        ext.set_nonce(&self.from, sender_nonce + 1);

        // Pre-warm the accounts every transaction touches.
        ext.access_account(&self.from);
        if let Some(to) = &self.to {
            ext.access_account(to);
        }
        for n in 1..=9u8 {
            let mut bytes = [0u8; 20];
            bytes[19] = n;
            ext.access_account(&Address(bytes));
        }
        if self.fork.at_least(Fork::Shanghai) {
            let coinbase = self.env.block.coinbase;
            ext.access_account(&coinbase);
        }

        let gas_limit = self.gas_limit;
        let frame_gas = gas_limit - intrinsic;

        let frame = match self.to {
            Some(to) if precompiles::is_precompile(self.fork, &to) => {
                // A top-level call straight into a precompile never builds a
                // frame; settle it inline.
                return Ok((
                    self.apply_precompile(ext, &to, frame_gas, intrinsic)?,
                    tracer,
                ));
            }
            Some(to) => {
                let snapshot = ext.snapshot();
                transfer(ext, &self.from, &to, self.value);
                let code = ext.code(&to);
                let mut frame = MessageFrame::new(
                    CallKind::Call,
                    code,
                    self.data.clone(),
                    self.from,
                    to,
                    self.value,
                    frame_gas,
                    0,
                    false,
                );
                frame.snapshot = snapshot;
                frame
            }
            None => {
                let created = self.from.create(sender_nonce);
                ext.access_account(&created);
                let snapshot = ext.snapshot();
                ext.create_account(&created);
                if self.fork.at_least(Fork::SpuriousDragon) {
                    ext.set_nonce(&created, 1);
                }
                transfer(ext, &self.from, &created, self.value);
                let code = Arc::new(Bytecode::new(self.data.clone()));
                let mut frame = MessageFrame::new(
                    CallKind::Create,
                    code,
                    vec![],
                    self.from,
                    created,
                    self.value,
                    frame_gas,
                    0,
                    false,
                );
                frame.snapshot = snapshot;
                frame
            }
        };

        let mut interpreter = Interpreter::with_tracer(&evm, &self.env, tracer);
        let result = interpreter.run(frame, ext);

        let (status, gas_refunded) = match result.state {
            FrameState::CompletedSuccess => {
                let used = gas_limit - result.gas_remaining;
                let refund = (result.refund.max(0) as u64).min(used / schedule.refund_quotient);
                (ExecutionStatus::Success, refund)
            }
            FrameState::CompletedRevert => (ExecutionStatus::Reverted, 0),
            FrameState::Halted(reason) => (ExecutionStatus::Halted(reason), 0),
            FrameState::Running | FrameState::Suspended => {
                unreachable!("interpreter returned a live frame")
            }
        };
        let gas_used = gas_limit - result.gas_remaining - gas_refunded;

        Ok((
            ExecutionResult {
                status,
                gas_used,
                gas_refunded,
                output: result.output.into(),
                logs: result.logs,
                created: result.created,
                touched: ext.touched_accounts(),
                selfdestructs: result.selfdestructs,
            },
            interpreter.into_tracer(),
        ))
    }

    fn apply_precompile(
        self,
        ext: &mut dyn Ext,
        to: &Address,
        frame_gas: u64,
        intrinsic: u64,
    ) -> Result<ExecutionResult, TransactError> {
        let snapshot = ext.snapshot();
        transfer(ext, &self.from, to, self.value);
        let cost = precompiles::cost(to, &self.data);
        if cost > frame_gas {
            ext.rollback(snapshot);
            return Ok(ExecutionResult {
                status: ExecutionStatus::Halted(ExceptionalHalt::InsufficientGas),
                gas_used: self.gas_limit,
                gas_refunded: 0,
                output: Hex::default(),
                logs: vec![],
                created: None,
                touched: ext.touched_accounts(),
                selfdestructs: vec![],
            });
        }
        match precompiles::execute(to, &self.data) {
            Ok(output) => Ok(ExecutionResult {
                status: ExecutionStatus::Success,
                gas_used: intrinsic + cost,
                gas_refunded: 0,
                output: output.into(),
                logs: vec![],
                created: None,
                touched: ext.touched_accounts(),
                selfdestructs: vec![],
            }),
            Err(_) => {
                ext.rollback(snapshot);
                Ok(ExecutionResult {
                    status: ExecutionStatus::Halted(ExceptionalHalt::PrecompileError),
                    gas_used: self.gas_limit,
                    gas_refunded: 0,
                    output: Hex::default(),
                    logs: vec![],
                    created: None,
                    touched: ext.touched_accounts(),
                    selfdestructs: vec![],
                })
            }
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{common::address::addr, ext::MemoryExt};

    const ALICE: Address = addr("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    const BOB: Address = addr("0x70997970c51812dc3a010c7d01b50e0d17dc79c8");

    #[test]
    fn test_plain_transfer() {
        let mut ext = MemoryExt::new();
        ext.credit(&ALICE, Word::from(1_000_000u64));
        let result = Ferrite::new(Fork::latest())
            .transfer(BOB, Word::from(250u64))
            .with_sender(ALICE)
            .with_gas(50_000)
            .apply(&mut ext)
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.gas_used, 21000);
        assert_eq!(ext.balance(&BOB), Word::from(250u64));
        assert_eq!(ext.balance(&ALICE), Word::from(999_750u64));
        assert_eq!(ext.nonce(&ALICE), 1);
    }

    #[test]
    fn test_insufficient_funds_rejected() {
        let mut ext = MemoryExt::new();
        ext.credit(&ALICE, Word::from(100u64));
        let error = Ferrite::new(Fork::latest())
            .transfer(BOB, Word::from(250u64))
            .with_sender(ALICE)
            .apply(&mut ext)
            .unwrap_err();
        assert_eq!(
            error,
            TransactError::InsufficientFunds {
                have: Word::from(100u64),
                need: Word::from(250u64),
            }
        );
        assert_eq!(ext.balance(&BOB), Word::zero());
    }

    #[test]
    fn test_intrinsic_gas_limit_rejected() {
        let mut ext = MemoryExt::new();
        let error = Ferrite::new(Fork::latest())
            .call(BOB, vec![])
            .with_sender(ALICE)
            .with_gas(20_000)
            .apply(&mut ext)
            .unwrap_err();
        assert_eq!(
            error,
            TransactError::IntrinsicGasExceedsLimit {
                needed: 21000,
                limit: 20_000,
            }
        );
    }

    #[test]
    fn test_top_level_precompile_call() {
        let mut ext = MemoryExt::new();
        let result = Ferrite::new(Fork::latest())
            .call(addr("0x0000000000000000000000000000000000000004"), b"ping".to_vec())
            .with_sender(ALICE)
            .with_gas(50_000)
            .apply(&mut ext)
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.output.0, b"ping");
    }

    #[test]
    fn test_init_code_ceiling() {
        let mut ext = MemoryExt::new();
        let error = Ferrite::new(Fork::Shanghai)
            .create(vec![0u8; 49153])
            .with_sender(ALICE)
            .with_gas(10_000_000)
            .apply(&mut ext)
            .unwrap_err();
        assert_eq!(error, TransactError::InitCodeTooLarge(49153));
    }
}
