//! One behavior per opcode, referenced by the fork's dispatch table. Stack
//! arity is pre-checked by the interpreter; gas is debited by the interpreter
//! from the returned cost, so any operation that touches world state checks
//! affordability itself before mutating.

use crate::{
    common::{Address, Word, hash::keccak256},
    evm::{Env, Evm},
    ext::Ext,
    frame::{CallKind, ChildRequest, LogEntry, MessageFrame},
    gas::Access,
    halt::ExceptionalHalt,
    operation::{OpResult, OperationResult},
};

/// Clamp a word used as a gas argument; anything above u64 forwards "all".
fn saturating_u64(word: &Word) -> u64 {
    if word.byte_len() > 8 {
        u64::MAX
    } else {
        word.low_u64()
    }
}

/// Pop a memory offset/size pair. A zero size ignores the offset entirely.
fn pop_range(frame: &mut MessageFrame) -> Result<(usize, usize), ExceptionalHalt> {
    let offset = frame.stack.pop()?;
    let size = frame.stack.pop()?;
    let size = size
        .try_as_usize()
        .ok_or(ExceptionalHalt::OutOfBoundsMemoryAccess)?;
    if size == 0 {
        return Ok((0, 0));
    }
    let offset = offset
        .try_as_usize()
        .ok_or(ExceptionalHalt::OutOfBoundsMemoryAccess)?;
    Ok((offset, size))
}

fn pop_offset(frame: &mut MessageFrame) -> Result<usize, ExceptionalHalt> {
    frame
        .stack
        .pop()?
        .try_as_usize()
        .ok_or(ExceptionalHalt::OutOfBoundsMemoryAccess)
}

// 0x00: STOP

pub fn stop(frame: &mut MessageFrame, _: &mut dyn Ext, _: &Evm, _: &Env) -> OpResult {
    frame.stop();
    Ok(OperationResult::advance(0))
}

// 0x01..0x0b: arithmetic

pub fn add(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    let (res, _) = a.overflowing_add(b);
    frame.stack.push(res)?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn mul(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    let (res, _) = a.overflowing_mul(b);
    frame.stack.push(res)?;
    Ok(OperationResult::advance(evm.schedule().low))
}

pub fn sub(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    let (res, _) = a.overflowing_sub(b);
    frame.stack.push(res)?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn div(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    let res = if b.is_zero() { Word::zero() } else { a / b };
    frame.stack.push(res)?;
    Ok(OperationResult::advance(evm.schedule().low))
}

pub fn sdiv(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    let a_signed = a.to_signed();
    let b_signed = b.to_signed();
    let res = if b.is_zero() {
        i256::I256::from(0)
    } else if a_signed == i256::I256::MIN && b_signed == i256::I256::from(-1) {
        i256::I256::MIN
    } else {
        a_signed / b_signed
    };
    frame.stack.push(Word::from_signed(res))?;
    Ok(OperationResult::advance(evm.schedule().low))
}

pub fn rem(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    let res = if b.is_zero() { Word::zero() } else { a % b };
    frame.stack.push(res)?;
    Ok(OperationResult::advance(evm.schedule().low))
}

pub fn srem(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    let res = if b.is_zero() {
        i256::I256::from(0)
    } else {
        a.to_signed() % b.to_signed()
    };
    frame.stack.push(Word::from_signed(res))?;
    Ok(OperationResult::advance(evm.schedule().low))
}

pub fn addmod(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    let n = frame.stack.pop()?;
    frame.stack.push(a.add_modulo(&b, &n))?;
    Ok(OperationResult::advance(evm.schedule().mid))
}

pub fn mulmod(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    let n = frame.stack.pop()?;
    frame.stack.push(a.mul_modulo(&b, &n))?;
    Ok(OperationResult::advance(evm.schedule().mid))
}

pub fn exp(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let base = frame.stack.pop()?;
    let exponent = frame.stack.pop()?;
    frame.stack.push(base.pow(exponent))?;
    Ok(OperationResult::advance(evm.schedule().exp_cost(&exponent)))
}

pub fn signextend(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let index = frame.stack.pop()?;
    let value = frame.stack.pop()?;
    let res = if index >= Word::from(31u64) {
        value
    } else {
        value.sign_extend(index.low_u64() as usize)
    };
    frame.stack.push(res)?;
    Ok(OperationResult::advance(evm.schedule().low))
}

// 0x10..0x1d: comparison and bitwise logic

fn bool_word(flag: bool) -> Word {
    if flag { Word::one() } else { Word::zero() }
}

pub fn lt(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    frame.stack.push(bool_word(a < b))?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn gt(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    frame.stack.push(bool_word(a > b))?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn slt(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    frame.stack.push(bool_word(a.to_signed() < b.to_signed()))?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn sgt(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    frame.stack.push(bool_word(a.to_signed() > b.to_signed()))?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn eq(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    frame.stack.push(bool_word(a == b))?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn iszero(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    frame.stack.push(bool_word(a.is_zero()))?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn and(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    frame.stack.push(a & b)?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn or(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    frame.stack.push(a | b)?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn xor(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    frame.stack.push(a ^ b)?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn not(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let a = frame.stack.pop()?;
    frame.stack.push(!a)?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn byte(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let index = frame.stack.pop()?;
    let value = frame.stack.pop()?;
    let res = if index < Word::from(32u64) {
        Word::from(value.into_bytes()[index.low_u64() as usize])
    } else {
        Word::zero()
    };
    frame.stack.push(res)?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn shl(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let shift = frame.stack.pop()?;
    let value = frame.stack.pop()?;
    let shift = shift.try_as_usize().unwrap_or(256);
    frame.stack.push(value << shift)?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn shr(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let shift = frame.stack.pop()?;
    let value = frame.stack.pop()?;
    let shift = shift.try_as_usize().unwrap_or(256);
    frame.stack.push(value >> shift)?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn sar(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let shift = frame.stack.pop()?;
    let value = frame.stack.pop()?;
    let shift = shift.try_as_usize().unwrap_or(256);
    frame.stack.push(value.sar(shift))?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

// 0x20: KECCAK256

pub fn keccak(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let schedule = evm.schedule();
    let (offset, size) = pop_range(frame)?;
    let cost = schedule.keccak_cost(size) + frame.memory.expansion_cost(offset, size, schedule)?;
    frame.gas.check(cost)?;
    let data = frame.memory.read(offset, size);
    frame.stack.push(Word::from_bytes(&keccak256(&data)))?;
    Ok(OperationResult::advance(cost))
}

// 0x30..0x3f: environment

pub fn address(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    frame.stack.push((&frame.address).into())?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn balance(frame: &mut MessageFrame, ext: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let schedule = evm.schedule();
    let address: Address = (&frame.stack.pop()?).into();
    let cost = schedule.account_access_cost(ext.access_account(&address), schedule.balance);
    frame.stack.push(ext.balance(&address))?;
    Ok(OperationResult::advance(cost))
}

pub fn origin(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, env: &Env) -> OpResult {
    frame.stack.push((&env.tx.origin).into())?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn caller(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    frame.stack.push((&frame.caller).into())?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn callvalue(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    frame.stack.push(frame.value)?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn calldataload(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let offset = frame.stack.pop()?;
    let mut bytes = [0u8; 32];
    if let Some(offset) = offset.try_as_usize() {
        if offset < frame.input.len() {
            let end = frame.input.len().min(offset + 32);
            bytes[..end - offset].copy_from_slice(&frame.input[offset..end]);
        }
    }
    frame.stack.push(Word::from_bytes(&bytes))?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn calldatasize(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    frame.stack.push(Word::from(frame.input.len()))?;
    Ok(OperationResult::advance(evm.schedule().base))
}

/// Shared body of the copy operations: charge base + per-word + expansion,
/// then write the zero-padded source window. Borrows memory and gas as
/// disjoint frame fields so the source may live in the same frame.
#[allow(clippy::too_many_arguments)]
fn charge_and_copy(
    memory: &mut crate::memory::Memory,
    gas: &crate::gas::Gas,
    schedule: &crate::gas::GasSchedule,
    base: u64,
    src: &[u8],
    dest_offset: Word,
    src_offset: Word,
    size: Word,
) -> Result<u64, ExceptionalHalt> {
    let size = size
        .try_as_usize()
        .ok_or(ExceptionalHalt::OutOfBoundsMemoryAccess)?;
    if size == 0 {
        return Ok(base);
    }
    let dest = dest_offset
        .try_as_usize()
        .ok_or(ExceptionalHalt::OutOfBoundsMemoryAccess)?;
    let cost = base + schedule.copy_cost(size) + memory.expansion_cost(dest, size, schedule)?;
    gas.check(cost)?;
    let window = src_offset
        .try_as_usize()
        .and_then(|offset| src.get(offset..))
        .unwrap_or(&[]);
    memory.write_padded(dest, size, window);
    Ok(cost)
}

pub fn calldatacopy(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let dest_offset = frame.stack.pop()?;
    let src_offset = frame.stack.pop()?;
    let size = frame.stack.pop()?;
    let cost = charge_and_copy(
        &mut frame.memory,
        &frame.gas,
        evm.schedule(),
        evm.schedule().very_low,
        &frame.input,
        dest_offset,
        src_offset,
        size,
    )?;
    Ok(OperationResult::advance(cost))
}

pub fn codesize(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    frame.stack.push(Word::from(frame.code.len()))?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn codecopy(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let dest_offset = frame.stack.pop()?;
    let src_offset = frame.stack.pop()?;
    let size = frame.stack.pop()?;
    let code = frame.code.clone();
    let cost = charge_and_copy(
        &mut frame.memory,
        &frame.gas,
        evm.schedule(),
        evm.schedule().very_low,
        code.raw(),
        dest_offset,
        src_offset,
        size,
    )?;
    Ok(OperationResult::advance(cost))
}

pub fn gasprice(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, env: &Env) -> OpResult {
    frame.stack.push(env.tx.gas_price)?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn extcodesize(frame: &mut MessageFrame, ext: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let schedule = evm.schedule();
    let address: Address = (&frame.stack.pop()?).into();
    let cost = schedule.account_access_cost(ext.access_account(&address), schedule.ext_code);
    frame.stack.push(Word::from(ext.code(&address).len()))?;
    Ok(OperationResult::advance(cost))
}

pub fn extcodecopy(frame: &mut MessageFrame, ext: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let schedule = evm.schedule();
    let address: Address = (&frame.stack.pop()?).into();
    let access = schedule.account_access_cost(ext.access_account(&address), schedule.ext_code);
    let code = ext.code(&address);
    let dest_offset = frame.stack.pop()?;
    let src_offset = frame.stack.pop()?;
    let size = frame.stack.pop()?;
    let cost = charge_and_copy(
        &mut frame.memory,
        &frame.gas,
        schedule,
        access,
        code.raw(),
        dest_offset,
        src_offset,
        size,
    )?;
    Ok(OperationResult::advance(cost))
}

pub fn returndatasize(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    frame.stack.push(Word::from(frame.return_data.len()))?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn returndatacopy(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let schedule = evm.schedule();
    let dest_offset = frame.stack.pop()?;
    let offset = frame.stack.pop()?;
    let size = frame.stack.pop()?;
    let size = size
        .try_as_usize()
        .ok_or(ExceptionalHalt::OutOfBoundsMemoryAccess)?;
    // Reading past the child's return data is a halt, never padding.
    let offset = offset
        .try_as_usize()
        .filter(|offset| offset.checked_add(size).is_some_and(|end| end <= frame.return_data.len()))
        .ok_or(ExceptionalHalt::OutOfBoundsMemoryAccess)?;
    if size == 0 {
        return Ok(OperationResult::advance(schedule.very_low));
    }
    let dest = dest_offset
        .try_as_usize()
        .ok_or(ExceptionalHalt::OutOfBoundsMemoryAccess)?;
    let cost = schedule.very_low
        + schedule.copy_cost(size)
        + frame.memory.expansion_cost(dest, size, schedule)?;
    frame.gas.check(cost)?;
    frame
        .memory
        .write_padded(dest, size, &frame.return_data[offset..offset + size]);
    Ok(OperationResult::advance(cost))
}

pub fn extcodehash(frame: &mut MessageFrame, ext: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let schedule = evm.schedule();
    let address: Address = (&frame.stack.pop()?).into();
    let cost = schedule.account_access_cost(ext.access_account(&address), schedule.ext_code_hash);
    let hash = if ext.is_empty(&address) {
        Word::zero()
    } else {
        ext.code_hash(&address)
    };
    frame.stack.push(hash)?;
    Ok(OperationResult::advance(cost))
}

// 0x40..0x4a: block information

pub fn blockhash(frame: &mut MessageFrame, ext: &mut dyn Ext, evm: &Evm, env: &Env) -> OpResult {
    let number = saturating_u64(&frame.stack.pop()?);
    let current = env.block.number;
    let hash = if number < current && current - number <= 256 {
        ext.block_hash(number)
    } else {
        Word::zero()
    };
    frame.stack.push(hash)?;
    Ok(OperationResult::advance(evm.schedule().blockhash))
}

pub fn coinbase(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, env: &Env) -> OpResult {
    frame.stack.push((&env.block.coinbase).into())?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn timestamp(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, env: &Env) -> OpResult {
    frame.stack.push(Word::from(env.block.timestamp))?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn number(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, env: &Env) -> OpResult {
    frame.stack.push(Word::from(env.block.number))?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn difficulty(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, env: &Env) -> OpResult {
    frame.stack.push(env.block.difficulty)?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn gaslimit(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, env: &Env) -> OpResult {
    frame.stack.push(Word::from(env.block.gas_limit))?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn chainid(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, env: &Env) -> OpResult {
    frame.stack.push(Word::from(env.block.chain_id))?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn selfbalance(frame: &mut MessageFrame, ext: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let balance = ext.balance(&frame.address);
    frame.stack.push(balance)?;
    Ok(OperationResult::advance(evm.schedule().low))
}

pub fn basefee(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, env: &Env) -> OpResult {
    frame.stack.push(env.block.base_fee)?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn blobhash(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, env: &Env) -> OpResult {
    let index = frame.stack.pop()?;
    let hash = index
        .try_as_usize()
        .and_then(|index| env.tx.blob_hashes.get(index))
        .copied()
        .unwrap_or_else(Word::zero);
    frame.stack.push(hash)?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

pub fn blobbasefee(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, env: &Env) -> OpResult {
    frame.stack.push(env.block.blob_base_fee)?;
    Ok(OperationResult::advance(evm.schedule().base))
}

// 0x50..0x5f: stack, memory, storage, flow

pub fn pop(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    frame.stack.pop()?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn mload(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let schedule = evm.schedule();
    let offset = pop_offset(frame)?;
    let cost = schedule.very_low + frame.memory.expansion_cost(offset, 32, schedule)?;
    frame.gas.check(cost)?;
    let value = frame.memory.read_word(offset);
    frame.stack.push(value)?;
    Ok(OperationResult::advance(cost))
}

pub fn mstore(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let schedule = evm.schedule();
    let offset = pop_offset(frame)?;
    let value = frame.stack.pop()?;
    let cost = schedule.very_low + frame.memory.expansion_cost(offset, 32, schedule)?;
    frame.gas.check(cost)?;
    frame.memory.write_word(offset, &value);
    Ok(OperationResult::advance(cost))
}

pub fn mstore8(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let schedule = evm.schedule();
    let offset = pop_offset(frame)?;
    let value = frame.stack.pop()?;
    let cost = schedule.very_low + frame.memory.expansion_cost(offset, 1, schedule)?;
    frame.gas.check(cost)?;
    frame.memory.write_byte(offset, value.byte(0));
    Ok(OperationResult::advance(cost))
}

pub fn sload(frame: &mut MessageFrame, ext: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let schedule = evm.schedule();
    let key = frame.stack.pop()?;
    let cost = if schedule.warm_cold_access {
        schedule.sload_cost(ext.access_storage(&frame.address, &key))
    } else {
        schedule.sload
    };
    let value = ext.storage(&frame.address, &key);
    frame.stack.push(value)?;
    Ok(OperationResult::advance(cost))
}

pub fn sstore(frame: &mut MessageFrame, ext: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let schedule = evm.schedule();
    if frame.is_static {
        return Err(ExceptionalHalt::IllegalStateChange);
    }
    // Net metering refuses to run on the last dregs of a value-call stipend.
    if schedule.net_sstore_metering && frame.gas.remaining() <= schedule.call_stipend {
        return Err(ExceptionalHalt::InsufficientGas);
    }
    let key = frame.stack.pop()?;
    let new = frame.stack.pop()?;
    let access = if schedule.warm_cold_access {
        ext.access_storage(&frame.address, &key)
    } else {
        Access::Warm
    };
    let current = ext.storage(&frame.address, &key);
    let original = ext.original_storage(&frame.address, &key);
    let cost = schedule.sstore_cost(original, current, new, access);
    frame.gas.check(cost)?;
    frame.refund += schedule.sstore_refund(original, current, new);
    ext.set_storage(&frame.address, key, new);
    Ok(OperationResult::advance(cost))
}

pub fn jump(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let cost = evm.schedule().mid;
    let dest = frame.stack.pop()?;
    match dest.try_as_usize() {
        Some(dest) if frame.code.is_valid_jump_destination(dest) => {
            Ok(OperationResult::jump(cost, dest))
        }
        _ => Ok(OperationResult::halt(
            cost,
            ExceptionalHalt::InvalidJumpDestination,
        )),
    }
}

pub fn jumpi(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    // Both branches charge the same fixed high-tier cost; cost must not leak
    // which way the branch went.
    let cost = evm.schedule().high;
    let dest = frame.stack.pop()?;
    let condition = frame.stack.pop()?;
    if condition.is_zero() {
        return Ok(OperationResult::advance(cost));
    }
    match dest.try_as_usize() {
        Some(dest) if frame.code.is_valid_jump_destination(dest) => {
            Ok(OperationResult::jump(cost, dest))
        }
        _ => Ok(OperationResult::halt(
            cost,
            ExceptionalHalt::InvalidJumpDestination,
        )),
    }
}

pub fn pc(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    frame.stack.push(Word::from(frame.pc))?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn msize(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    frame.stack.push(Word::from(frame.memory.len()))?;
    Ok(OperationResult::advance(evm.schedule().base))
}

pub fn gas(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let cost = evm.schedule().base;
    let remaining = frame.gas.remaining().saturating_sub(cost);
    frame.stack.push(Word::from(remaining))?;
    Ok(OperationResult::advance(cost))
}

pub fn jumpdest(_: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    Ok(OperationResult::advance(evm.schedule().jumpdest))
}

pub fn tload(frame: &mut MessageFrame, ext: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let key = frame.stack.pop()?;
    let value = ext.transient_storage(&frame.address, &key);
    frame.stack.push(value)?;
    Ok(OperationResult::advance(evm.schedule().transient))
}

pub fn tstore(frame: &mut MessageFrame, ext: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    if frame.is_static {
        return Err(ExceptionalHalt::IllegalStateChange);
    }
    let cost = evm.schedule().transient;
    frame.gas.check(cost)?;
    let key = frame.stack.pop()?;
    let value = frame.stack.pop()?;
    ext.set_transient_storage(&frame.address, key, value);
    Ok(OperationResult::advance(cost))
}

pub fn mcopy(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let schedule = evm.schedule();
    let dest = frame.stack.pop()?;
    let src = frame.stack.pop()?;
    let size = frame.stack.pop()?;
    let size = size
        .try_as_usize()
        .ok_or(ExceptionalHalt::OutOfBoundsMemoryAccess)?;
    if size == 0 {
        return Ok(OperationResult::advance(schedule.very_low));
    }
    let dest = dest
        .try_as_usize()
        .ok_or(ExceptionalHalt::OutOfBoundsMemoryAccess)?;
    let src = src
        .try_as_usize()
        .ok_or(ExceptionalHalt::OutOfBoundsMemoryAccess)?;
    let far = dest.max(src);
    let cost = schedule.very_low
        + schedule.copy_cost(size)
        + frame.memory.expansion_cost(far, size, schedule)?;
    frame.gas.check(cost)?;
    frame.memory.copy_within(src, dest, size);
    Ok(OperationResult::advance(cost))
}

pub fn push0(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    frame.stack.push(Word::zero())?;
    Ok(OperationResult::advance(evm.schedule().base))
}

// 0x60..0x7f: PUSH1..PUSH32, immediates zero-padded past code end

pub fn push(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let opcode = frame.code.opcode_at(frame.pc).unwrap_or(0x60);
    let width = (opcode - 0x60) as usize + 1;
    let value = frame.code.immediate(frame.pc, width);
    frame.stack.push(value)?;
    Ok(OperationResult::advance_by(
        evm.schedule().very_low,
        1 + width,
    ))
}

// 0x80..0x8f: DUP1..DUP16

pub fn dup(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let opcode = frame.code.opcode_at(frame.pc).unwrap_or(0x80);
    let n = (opcode - 0x80) as usize + 1;
    frame.stack.dup(n)?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

// 0x90..0x9f: SWAP1..SWAP16

pub fn swap(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let opcode = frame.code.opcode_at(frame.pc).unwrap_or(0x90);
    let n = (opcode - 0x90) as usize + 1;
    frame.stack.swap(n)?;
    Ok(OperationResult::advance(evm.schedule().very_low))
}

// 0xa0..0xa4: LOG0..LOG4

pub fn log(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    if frame.is_static {
        return Err(ExceptionalHalt::IllegalStateChange);
    }
    let schedule = evm.schedule();
    let opcode = frame.code.opcode_at(frame.pc).unwrap_or(0xa0);
    let topic_count = (opcode - 0xa0) as usize;
    let (offset, size) = pop_range(frame)?;
    let mut topics = Vec::with_capacity(topic_count);
    for _ in 0..topic_count {
        topics.push(frame.stack.pop()?);
    }
    let cost =
        schedule.log_cost(topic_count, size) + frame.memory.expansion_cost(offset, size, schedule)?;
    frame.gas.check(cost)?;
    let data = frame.memory.read(offset, size);
    frame.logs.push(LogEntry {
        address: frame.address,
        topics,
        data: data.into(),
    });
    Ok(OperationResult::advance(cost))
}

// 0xf0..0xff: system operations

fn call_like(
    frame: &mut MessageFrame,
    ext: &mut dyn Ext,
    evm: &Evm,
    kind: CallKind,
) -> OpResult {
    let schedule = evm.schedule();
    let gas_word = frame.stack.pop()?;
    let code_address: Address = (&frame.stack.pop()?).into();
    let value = if matches!(kind, CallKind::Call | CallKind::CallCode) {
        frame.stack.pop()?
    } else {
        Word::zero()
    };
    if frame.is_static && kind == CallKind::Call && !value.is_zero() {
        return Err(ExceptionalHalt::IllegalStateChange);
    }
    let (args_offset, args_size) = pop_range(frame)?;
    let (ret_offset, ret_size) = pop_range(frame)?;

    let mut touched = frame.memory.len();
    if args_size > 0 {
        touched = touched.max(
            args_offset
                .checked_add(args_size)
                .ok_or(ExceptionalHalt::OutOfBoundsMemoryAccess)?,
        );
    }
    if ret_size > 0 {
        touched = touched.max(
            ret_offset
                .checked_add(ret_size)
                .ok_or(ExceptionalHalt::OutOfBoundsMemoryAccess)?,
        );
    }
    let expansion = schedule.memory_expansion(frame.memory.len(), touched);

    let access = schedule.account_access_cost(ext.access_account(&code_address), schedule.call);
    let mut base = access + expansion;
    if !value.is_zero() {
        base += schedule.call_value;
        if kind == CallKind::Call && ext.is_empty(&code_address) {
            base += schedule.new_account;
        }
    }
    frame.gas.check(base)?;

    let available = frame.gas.remaining() - base;
    let requested = saturating_u64(&gas_word);
    if !schedule.all_but_one_64th && requested > available {
        return Err(ExceptionalHalt::InsufficientGas);
    }
    let forwarded = requested.min(schedule.call_gas_cap(available));
    let stipend = if value.is_zero() {
        0
    } else {
        schedule.call_stipend
    };

    let input = frame.memory.read(args_offset, args_size);
    frame.memory.touch(ret_offset, ret_size);

    let (context_address, child_caller, child_value, transfer_value) = match kind {
        CallKind::Call => (code_address, frame.address, value, value),
        CallKind::CallCode => (frame.address, frame.address, value, value),
        CallKind::DelegateCall => (frame.address, frame.caller, frame.value, Word::zero()),
        CallKind::StaticCall => (code_address, frame.address, Word::zero(), Word::zero()),
        CallKind::Create | CallKind::Create2 => unreachable!("not a call kind"),
    };

    frame.request_child(ChildRequest {
        kind,
        code_address,
        context_address,
        caller: child_caller,
        value: child_value,
        transfer_value,
        input,
        gas_limit: forwarded + stipend,
        charged: forwarded,
        ret_offset,
        ret_size,
        salt: None,
        is_static: frame.is_static || kind == CallKind::StaticCall,
    });
    Ok(OperationResult::advance(base + forwarded))
}

pub fn call(frame: &mut MessageFrame, ext: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    call_like(frame, ext, evm, CallKind::Call)
}

pub fn callcode(frame: &mut MessageFrame, ext: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    call_like(frame, ext, evm, CallKind::CallCode)
}

pub fn delegatecall(frame: &mut MessageFrame, ext: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    call_like(frame, ext, evm, CallKind::DelegateCall)
}

pub fn staticcall(frame: &mut MessageFrame, ext: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    call_like(frame, ext, evm, CallKind::StaticCall)
}

fn create_like(
    frame: &mut MessageFrame,
    evm: &Evm,
    kind: CallKind,
) -> OpResult {
    if frame.is_static {
        return Err(ExceptionalHalt::IllegalStateChange);
    }
    let schedule = evm.schedule();
    let value = frame.stack.pop()?;
    let (offset, size) = pop_range(frame)?;
    let salt = if kind == CallKind::Create2 {
        Some(frame.stack.pop()?)
    } else {
        None
    };

    if size > schedule.max_init_code_size {
        frame.gas.consume_all();
        return Ok(OperationResult::halt(0, ExceptionalHalt::InvalidCode));
    }

    let mut base = schedule.create
        + frame.memory.expansion_cost(offset, size, schedule)?
        + schedule.init_code_cost(size);
    if kind == CallKind::Create2 {
        base += schedule.keccak_word.saturating_mul((size as u64).div_ceil(32));
    }
    frame.gas.check(base)?;

    let available = frame.gas.remaining() - base;
    let forwarded = schedule.call_gas_cap(available);
    let init_code = frame.memory.read(offset, size);

    frame.request_child(ChildRequest {
        kind,
        code_address: Address::zero(),
        context_address: Address::zero(),
        caller: frame.address,
        value,
        transfer_value: value,
        input: init_code,
        gas_limit: forwarded,
        charged: forwarded,
        ret_offset: 0,
        ret_size: 0,
        salt,
        is_static: false,
    });
    Ok(OperationResult::advance(base + forwarded))
}

pub fn create(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    create_like(frame, evm, CallKind::Create)
}

pub fn create2(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    create_like(frame, evm, CallKind::Create2)
}

pub fn ret(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let schedule = evm.schedule();
    let (offset, size) = pop_range(frame)?;
    let cost = frame.memory.expansion_cost(offset, size, schedule)?;
    frame.gas.check(cost)?;
    let output = frame.memory.read(offset, size);
    frame.finish(output);
    Ok(OperationResult::advance(cost))
}

pub fn revert(frame: &mut MessageFrame, _: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    let schedule = evm.schedule();
    let (offset, size) = pop_range(frame)?;
    let cost = frame.memory.expansion_cost(offset, size, schedule)?;
    frame.gas.check(cost)?;
    let output = frame.memory.read(offset, size);
    frame.revert(output);
    Ok(OperationResult::advance(cost))
}

pub fn invalid(frame: &mut MessageFrame, _: &mut dyn Ext, _: &Evm, _: &Env) -> OpResult {
    frame.gas.consume_all();
    Ok(OperationResult::halt(
        0,
        ExceptionalHalt::InvalidOperation(0xfe),
    ))
}

pub fn selfdestruct(frame: &mut MessageFrame, ext: &mut dyn Ext, evm: &Evm, _: &Env) -> OpResult {
    if frame.is_static {
        return Err(ExceptionalHalt::IllegalStateChange);
    }
    let schedule = evm.schedule();
    let beneficiary: Address = (&frame.stack.pop()?).into();
    let mut cost = schedule.selfdestruct;
    if schedule.warm_cold_access && ext.access_account(&beneficiary) == Access::Cold {
        cost += schedule.cold_account_access;
    }
    let balance = ext.balance(&frame.address);
    if schedule.all_but_one_64th && !balance.is_zero() && ext.is_empty(&beneficiary) {
        cost += schedule.new_account;
    }
    frame.gas.check(cost)?;

    ext.set_balance(&frame.address, Word::zero());
    if beneficiary != frame.address {
        let prior = ext.balance(&beneficiary);
        ext.set_balance(&beneficiary, prior + balance);
    }
    if !frame.selfdestructs.contains(&frame.address) {
        frame.selfdestructs.push(frame.address);
        frame.refund += schedule.selfdestruct_refund as i64;
    }
    frame.stop();
    Ok(OperationResult::advance(cost))
}
