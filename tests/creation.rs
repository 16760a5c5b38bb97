use ferrite::{
    Address, ExceptionalHalt, ExecutionStatus, Ext, Ferrite, Fork, MemoryExt, Word,
    common::address::addr,
};
use pretty_assertions::assert_eq;

const ALICE: Address = addr("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
const FACTORY: Address = addr("0xe7f1725e7734ce288f8367e1bb143e90bb3f0512");

/// Runtime that returns 42: mstore(0, 42); return(0, 32). Ten bytes.
const RUNTIME: [u8; 10] = [0x60, 0x2a, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3];

/// Init code: codecopy the trailing runtime into memory and return it.
fn init_code() -> Vec<u8> {
    let mut code = vec![
        0x60, 0x0a, // size 10
        0x60, 0x0c, // runtime starts at byte 12
        0x60, 0x00, // dest
        0x39, // codecopy
        0x60, 0x0a, 0x60, 0x00, 0xf3, // return(0, 10)
    ];
    code.extend(RUNTIME);
    code
}

#[test]
fn test_create_transaction_deploys_runtime() {
    let mut ext = MemoryExt::new();
    let result = Ferrite::new(Fork::latest())
        .create(init_code())
        .with_sender(ALICE)
        .with_gas(1_000_000)
        .apply(&mut ext)
        .unwrap();
    assert!(result.is_success());

    let created = result.created.expect("create reports the new address");
    assert_eq!(created, ALICE.create(0));
    assert_eq!(ext.code(&created).raw(), &RUNTIME);
    assert_eq!(ext.nonce(&created), 1);
    assert_eq!(ext.nonce(&ALICE), 1);

    // The deployed contract answers.
    let result = Ferrite::new(Fork::latest())
        .call(created, vec![])
        .with_sender(ALICE)
        .with_gas(100_000)
        .apply(&mut ext)
        .unwrap();
    assert_eq!(result.output.0, Word::from(42u64).into_bytes().to_vec());
}

#[test]
fn test_create_opcode_from_contract() {
    let mut ext = MemoryExt::new();
    let init = init_code();
    // Factory: codecopy its trailing init code to memory, create(0, 0, len),
    // then return the pushed address word.
    let prefix_len: u8 = 22;
    let mut code = vec![
        0x60, init.len() as u8, // size
        0x60, prefix_len, // init code offset within factory code
        0x60, 0x00, // dest
        0x39, // codecopy
        0x60, init.len() as u8, // size
        0x60, 0x00, // offset
        0x60, 0x00, // value
        0xf0, // create
        0x60, 0x00, 0x52, // mstore(0, address)
        0x60, 0x20, 0x60, 0x00, 0xf3, // return(0, 32)
    ];
    assert_eq!(code.len(), prefix_len as usize);
    code.extend(init.clone());
    ext.deploy(&FACTORY, code);

    let result = Ferrite::new(Fork::latest())
        .call(FACTORY, vec![])
        .with_sender(ALICE)
        .with_gas(1_000_000)
        .apply(&mut ext)
        .unwrap();
    assert!(result.is_success());

    let created = FACTORY.create(0);
    assert_eq!(result.output.0, Word::from(&created).into_bytes().to_vec());
    assert_eq!(ext.code(&created).raw(), &RUNTIME);
    // The factory's nonce moved.
    assert_eq!(ext.nonce(&FACTORY), 1);
}

#[test]
fn test_create2_address_is_salt_derived() {
    let mut ext = MemoryExt::new();
    let init = init_code();
    let salt = 0x42u8;
    // create2(value 0, offset 0, size, salt), return the address word.
    let prefix_len: u8 = 24;
    let mut code = vec![
        0x60, init.len() as u8, // size
        0x60, prefix_len, // init code offset
        0x60, 0x00, // dest
        0x39, // codecopy
        0x60, salt, // salt
        0x60, init.len() as u8, // size
        0x60, 0x00, // offset
        0x60, 0x00, // value
        0xf5, // create2
        0x60, 0x00, 0x52, // mstore(0, address)
        0x60, 0x20, 0x60, 0x00, 0xf3,
    ];
    assert_eq!(code.len(), prefix_len as usize);
    code.extend(init.clone());
    ext.deploy(&FACTORY, code);

    let result = Ferrite::new(Fork::latest())
        .call(FACTORY, vec![])
        .with_sender(ALICE)
        .with_gas(1_000_000)
        .apply(&mut ext)
        .unwrap();
    assert!(result.is_success());

    let hash = ferrite::common::hash::keccak256(&init);
    let expected = FACTORY.create2(&Word::from(salt), &hash);
    assert_eq!(result.output.0, Word::from(&expected).into_bytes().to_vec());
    assert_eq!(ext.code(&expected).raw(), &RUNTIME);
}

#[test]
fn test_failed_init_code_pushes_zero() {
    let mut ext = MemoryExt::new();
    // Init code that reverts immediately: factory stores the create result.
    let prefix_len: u8 = 22;
    let init = vec![0x60, 0x00, 0x60, 0x00, 0xfd];
    let mut code = vec![
        0x60, init.len() as u8,
        0x60, prefix_len,
        0x60, 0x00,
        0x39,
        0x60, init.len() as u8,
        0x60, 0x00,
        0x60, 0x00,
        0xf0,
        0x60, 0x00, 0x52,
        0x60, 0x20, 0x60, 0x00, 0xf3,
    ];
    assert_eq!(code.len(), prefix_len as usize);
    code.extend(init);
    ext.deploy(&FACTORY, code);

    let result = Ferrite::new(Fork::latest())
        .call(FACTORY, vec![])
        .with_sender(ALICE)
        .with_gas(1_000_000)
        .apply(&mut ext)
        .unwrap();
    assert!(result.is_success());
    assert_eq!(result.output.0, Word::zero().into_bytes().to_vec());
    // The nonce still moved, but no account was installed.
    assert_eq!(ext.nonce(&FACTORY), 1);
    assert!(ext.code(&FACTORY.create(0)).is_empty());
}

#[test]
fn test_deployed_code_size_ceiling() {
    let mut ext = MemoryExt::new();
    // Init code that returns 25000 bytes of zeros: over the 24576 cap.
    let init = vec![
        0x61, 0x61, 0xa8, // push2 25000
        0x60, 0x00, // offset
        0xf3, // return
    ];
    let result = Ferrite::new(Fork::latest())
        .create(init)
        .with_sender(ALICE)
        .with_gas(10_000_000)
        .apply(&mut ext)
        .unwrap();
    assert_eq!(
        result.status,
        ExecutionStatus::Halted(ExceptionalHalt::ContractCreationTooLarge(25000))
    );
    assert_eq!(result.gas_used, 10_000_000);
}

#[test]
fn test_create_code_starting_with_ef_is_invalid_after_london() {
    let mut ext = MemoryExt::new();
    // Init code returning a single 0xef byte.
    let init = vec![
        0x60, 0xef, 0x60, 0x00, 0x53, // mstore8(0, 0xef)
        0x60, 0x01, 0x60, 0x00, 0xf3, // return(0, 1)
    ];
    let result = Ferrite::new(Fork::London)
        .create(init.clone())
        .with_sender(ALICE)
        .with_gas(1_000_000)
        .apply(&mut ext)
        .unwrap();
    assert_eq!(
        result.status,
        ExecutionStatus::Halted(ExceptionalHalt::InvalidCode)
    );

    let mut ext = MemoryExt::new();
    let result = Ferrite::new(Fork::Berlin)
        .create(init)
        .with_sender(ALICE)
        .with_gas(1_000_000)
        .apply(&mut ext)
        .unwrap();
    assert!(result.is_success());
}
