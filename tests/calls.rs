use ferrite::{
    Address, ExecutionStatus, Ext, Ferrite, Fork, MemoryExt, Word, common::address::addr,
};
use pretty_assertions::assert_eq;

const ALICE: Address = addr("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
const CALLER: Address = addr("0xe7f1725e7734ce288f8367e1bb143e90bb3f0512");
const CALLEE: Address = addr("0x70997970c51812dc3a010c7d01b50e0d17dc79c8");

fn push20(address: &Address) -> Vec<u8> {
    let mut bytes = vec![0x73];
    bytes.extend_from_slice(&address.0);
    bytes
}

/// call(gas 0xffff, callee, value 0, no args, ret at mem[0..32]), then
/// return the success flag as a word.
fn calling_code(callee: &Address) -> Vec<u8> {
    let mut code = vec![
        0x60, 0x20, // ret_size
        0x60, 0x00, // ret_offset
        0x60, 0x00, // args_size
        0x60, 0x00, // args_offset
        0x60, 0x00, // value
    ];
    code.extend(push20(callee));
    code.extend([0x61, 0xff, 0xff, 0xf1]); // gas, CALL
    code.extend([
        0x60, 0x40, 0x52, // mstore(0x40, success)
        0x60, 0x20, 0x60, 0x40, 0xf3, // return(0x40, 32)
    ]);
    code
}

/// staticcall(gas 0xffff, callee, no args, no ret), return the flag.
fn static_calling_code(callee: &Address) -> Vec<u8> {
    let mut code = vec![
        0x60, 0x00, // ret_size
        0x60, 0x00, // ret_offset
        0x60, 0x00, // args_size
        0x60, 0x00, // args_offset
    ];
    code.extend(push20(callee));
    code.extend([0x61, 0xff, 0xff, 0xfa]); // gas, STATICCALL
    code.extend([
        0x60, 0x00, 0x52, // mstore(0, flag)
        0x60, 0x20, 0x60, 0x00, 0xf3,
    ]);
    code
}

fn apply(ext: &mut MemoryExt) -> ferrite::ExecutionResult {
    Ferrite::new(Fork::latest())
        .call(CALLER, vec![])
        .with_sender(ALICE)
        .with_gas(1_000_000)
        .apply(ext)
        .unwrap()
}

#[test]
fn test_nested_call_returns_child_data() {
    let mut ext = MemoryExt::new();
    // Callee: mstore(0, 42); return(0, 32).
    ext.deploy(
        &CALLEE,
        vec![0x60, 0x2a, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3],
    );
    ext.deploy(&CALLER, calling_code(&CALLEE));
    let result = apply(&mut ext);
    assert!(result.is_success());
    // The caller returns the CALL success flag.
    assert_eq!(result.output.0, Word::one().into_bytes().to_vec());
}

#[test]
fn test_child_revert_rolls_back_child_only() {
    let mut ext = MemoryExt::new();
    // Callee: sstore(0, 1); revert(0, 0).
    ext.deploy(
        &CALLEE,
        vec![0x60, 0x01, 0x60, 0x00, 0x55, 0x60, 0x00, 0x60, 0x00, 0xfd],
    );
    // Caller: sstore(0, 7) first, then call, then return the flag.
    let mut code = vec![0x60, 0x07, 0x60, 0x00, 0x55];
    code.extend(calling_code(&CALLEE));
    ext.deploy(&CALLER, code);

    let result = apply(&mut ext);
    // The parent continues executing and completes normally.
    assert!(result.is_success());
    // It observed the child's failure as a zero flag.
    assert_eq!(result.output.0, Word::zero().into_bytes().to_vec());
    // The child's write vanished; the parent's own write stands.
    assert_eq!(ext.storage(&CALLEE, &Word::zero()), Word::zero());
    assert_eq!(ext.storage(&CALLER, &Word::zero()), Word::from(7u64));
}

#[test]
fn test_child_halt_is_observed_as_failure() {
    let mut ext = MemoryExt::new();
    // Callee hits the designated invalid opcode.
    ext.deploy(&CALLEE, vec![0xfe]);
    ext.deploy(&CALLER, calling_code(&CALLEE));
    let result = apply(&mut ext);
    assert!(result.is_success());
    assert_eq!(result.output.0, Word::zero().into_bytes().to_vec());
}

#[test]
fn test_static_call_blocks_state_writes() {
    let mut ext = MemoryExt::new();
    // Callee tries to sstore under a read-only frame.
    ext.deploy(&CALLEE, vec![0x60, 0x01, 0x60, 0x00, 0x55, 0x00]);
    ext.deploy(&CALLER, static_calling_code(&CALLEE));
    let result = apply(&mut ext);
    assert!(result.is_success());
    assert_eq!(result.output.0, Word::zero().into_bytes().to_vec());
    assert_eq!(ext.storage(&CALLEE, &Word::zero()), Word::zero());
}

#[test]
fn test_static_call_allows_reads() {
    let mut ext = MemoryExt::new();
    // Callee: mstore(0, sload(0)); return(0, 32).
    ext.deploy(
        &CALLEE,
        vec![0x60, 0x00, 0x54, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3],
    );
    ext.seed_storage(&CALLEE, Word::zero(), Word::from(5u64));
    ext.deploy(&CALLER, static_calling_code(&CALLEE));
    let result = apply(&mut ext);
    assert!(result.is_success());
    assert_eq!(result.output.0, Word::one().into_bytes().to_vec());
}

#[test]
fn test_value_bearing_call_moves_balance() {
    let mut ext = MemoryExt::new();
    ext.credit(&CALLER, Word::from(1000u64));
    // Callee with empty code accepts the value and succeeds.
    // call(gas 0xffff, callee, value 300, no args, no ret); stop.
    let mut code = vec![
        0x60, 0x00, // ret_size
        0x60, 0x00, // ret_offset
        0x60, 0x00, // args_size
        0x60, 0x00, // args_offset
        0x61, 0x01, 0x2c, // value 300
    ];
    code.extend(push20(&CALLEE));
    code.extend([0x61, 0xff, 0xff, 0xf1, 0x00]);
    ext.deploy(&CALLER, code);

    let result = apply(&mut ext);
    assert!(result.is_success());
    assert_eq!(ext.balance(&CALLEE), Word::from(300u64));
    assert_eq!(ext.balance(&CALLER), Word::from(700u64));
}

#[test]
fn test_call_with_value_beyond_balance_fails_cleanly() {
    let mut ext = MemoryExt::new();
    // No funding for the caller: the child never runs, the parent sees 0.
    let mut code = vec![
        0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, // ret/args
        0x61, 0x01, 0x2c, // value 300
    ];
    code.extend(push20(&CALLEE));
    code.extend([0x61, 0xff, 0xff, 0xf1]);
    code.extend([0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3]);
    ext.deploy(&CALLER, code);

    let result = apply(&mut ext);
    assert!(result.is_success());
    assert_eq!(result.output.0, Word::zero().into_bytes().to_vec());
    assert_eq!(ext.balance(&CALLEE), Word::zero());
}

#[test]
fn test_delegatecall_writes_to_caller_storage() {
    let mut ext = MemoryExt::new();
    // Library code writes 9 into slot 0 of whatever context runs it.
    ext.deploy(&CALLEE, vec![0x60, 0x09, 0x60, 0x00, 0x55, 0x00]);
    // delegatecall(gas 0xffff, callee, no args, no ret); stop.
    let mut code = vec![
        0x60, 0x00, // ret_size
        0x60, 0x00, // ret_offset
        0x60, 0x00, // args_size
        0x60, 0x00, // args_offset
    ];
    code.extend(push20(&CALLEE));
    code.extend([0x61, 0xff, 0xff, 0xf4, 0x00]);
    ext.deploy(&CALLER, code);

    let result = apply(&mut ext);
    assert!(result.is_success());
    assert_eq!(ext.storage(&CALLER, &Word::zero()), Word::from(9u64));
    assert_eq!(ext.storage(&CALLEE, &Word::zero()), Word::zero());
}

#[test]
fn test_precompile_call_from_contract() {
    let mut ext = MemoryExt::new();
    // Call the identity precompile with one word of data and echo the
    // returned word.
    let identity = addr("0x0000000000000000000000000000000000000004");
    let mut code = vec![
        0x60, 0x2a, 0x60, 0x00, 0x52, // mstore(0, 42): argument
        0x60, 0x20, // ret_size
        0x60, 0x20, // ret_offset
        0x60, 0x20, // args_size
        0x60, 0x00, // args_offset
        0x60, 0x00, // value
    ];
    code.extend(push20(&identity));
    code.extend([0x61, 0xff, 0xff, 0xf1]);
    code.extend([0x50, 0x60, 0x20, 0x60, 0x20, 0xf3]); // pop flag; return(0x20, 32)
    ext.deploy(&CALLER, code);

    let result = apply(&mut ext);
    assert!(result.is_success());
    assert_eq!(result.output.0, Word::from(42u64).into_bytes().to_vec());
}

#[test]
fn test_revert_unavailable_before_byzantium() {
    let mut ext = MemoryExt::new();
    ext.deploy(&CALLER, vec![0x60, 0x00, 0x60, 0x00, 0xfd]);
    let result = Ferrite::new(Fork::Homestead)
        .call(CALLER, vec![])
        .with_sender(ALICE)
        .with_gas(100_000)
        .apply(&mut ext)
        .unwrap();
    assert_eq!(
        result.status,
        ExecutionStatus::Halted(ferrite::ExceptionalHalt::InvalidOperation(0xfd))
    );
}
