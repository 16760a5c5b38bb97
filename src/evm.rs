use crate::{
    common::{Address, Word},
    fork::Fork,
    gas::GasSchedule,
    operation::Operation,
    operations,
};

/// Block-level inputs every frame in a transaction shares.
#[derive(Debug, Clone, Default)]
pub struct BlockEnv {
    pub number: u64,
    pub timestamp: u64,
    pub coinbase: Address,
    pub gas_limit: u64,
    /// Pre-merge difficulty, post-merge the prev-randao beacon value.
    pub difficulty: Word,
    pub base_fee: Word,
    pub chain_id: u64,
    pub blob_base_fee: Word,
}

/// Transaction-level inputs.
#[derive(Debug, Clone, Default)]
pub struct TxEnv {
    pub origin: Address,
    pub gas_price: Word,
    pub blob_hashes: Vec<Word>,
}

#[derive(Debug, Clone, Default)]
pub struct Env {
    pub block: BlockEnv,
    pub tx: TxEnv,
}

const PUSH_NAMES: [&str; 32] = [
    "PUSH1", "PUSH2", "PUSH3", "PUSH4", "PUSH5", "PUSH6", "PUSH7", "PUSH8", "PUSH9", "PUSH10",
    "PUSH11", "PUSH12", "PUSH13", "PUSH14", "PUSH15", "PUSH16", "PUSH17", "PUSH18", "PUSH19",
    "PUSH20", "PUSH21", "PUSH22", "PUSH23", "PUSH24", "PUSH25", "PUSH26", "PUSH27", "PUSH28",
    "PUSH29", "PUSH30", "PUSH31", "PUSH32",
];

const DUP_NAMES: [&str; 16] = [
    "DUP1", "DUP2", "DUP3", "DUP4", "DUP5", "DUP6", "DUP7", "DUP8", "DUP9", "DUP10", "DUP11",
    "DUP12", "DUP13", "DUP14", "DUP15", "DUP16",
];

const SWAP_NAMES: [&str; 16] = [
    "SWAP1", "SWAP2", "SWAP3", "SWAP4", "SWAP5", "SWAP6", "SWAP7", "SWAP8", "SWAP9", "SWAP10",
    "SWAP11", "SWAP12", "SWAP13", "SWAP14", "SWAP15", "SWAP16",
];

const LOG_NAMES: [&str; 5] = ["LOG0", "LOG1", "LOG2", "LOG3", "LOG4"];

/// The machine for one fork: an immutable opcode dispatch table plus the
/// fork's gas schedule. Built once, then only read — there is no global
/// registry, callers pass the instance into the interpreter explicitly.
pub struct Evm {
    fork: Fork,
    schedule: GasSchedule,
    table: [Option<Operation>; 256],
}

impl Evm {
    pub fn new(fork: Fork) -> Self {
        let mut table: [Option<Operation>; 256] = [None; 256];
        let mut op = |o: Operation| table[o.opcode as usize] = Some(o);

        // Frontier base set.
        op(Operation::new(0x00, "STOP", 0, 0, operations::stop));
        op(Operation::new(0x01, "ADD", 2, 1, operations::add));
        op(Operation::new(0x02, "MUL", 2, 1, operations::mul));
        op(Operation::new(0x03, "SUB", 2, 1, operations::sub));
        op(Operation::new(0x04, "DIV", 2, 1, operations::div));
        op(Operation::new(0x05, "SDIV", 2, 1, operations::sdiv));
        op(Operation::new(0x06, "MOD", 2, 1, operations::rem));
        op(Operation::new(0x07, "SMOD", 2, 1, operations::srem));
        op(Operation::new(0x08, "ADDMOD", 3, 1, operations::addmod));
        op(Operation::new(0x09, "MULMOD", 3, 1, operations::mulmod));
        op(Operation::new(0x0a, "EXP", 2, 1, operations::exp));
        op(Operation::new(0x0b, "SIGNEXTEND", 2, 1, operations::signextend));

        op(Operation::new(0x10, "LT", 2, 1, operations::lt));
        op(Operation::new(0x11, "GT", 2, 1, operations::gt));
        op(Operation::new(0x12, "SLT", 2, 1, operations::slt));
        op(Operation::new(0x13, "SGT", 2, 1, operations::sgt));
        op(Operation::new(0x14, "EQ", 2, 1, operations::eq));
        op(Operation::new(0x15, "ISZERO", 1, 1, operations::iszero));
        op(Operation::new(0x16, "AND", 2, 1, operations::and));
        op(Operation::new(0x17, "OR", 2, 1, operations::or));
        op(Operation::new(0x18, "XOR", 2, 1, operations::xor));
        op(Operation::new(0x19, "NOT", 1, 1, operations::not));
        op(Operation::new(0x1a, "BYTE", 2, 1, operations::byte));

        op(Operation::new(0x20, "KECCAK256", 2, 1, operations::keccak));

        op(Operation::new(0x30, "ADDRESS", 0, 1, operations::address));
        op(Operation::new(0x31, "BALANCE", 1, 1, operations::balance));
        op(Operation::new(0x32, "ORIGIN", 0, 1, operations::origin));
        op(Operation::new(0x33, "CALLER", 0, 1, operations::caller));
        op(Operation::new(0x34, "CALLVALUE", 0, 1, operations::callvalue));
        op(Operation::new(0x35, "CALLDATALOAD", 1, 1, operations::calldataload));
        op(Operation::new(0x36, "CALLDATASIZE", 0, 1, operations::calldatasize));
        op(Operation::new(0x37, "CALLDATACOPY", 3, 0, operations::calldatacopy));
        op(Operation::new(0x38, "CODESIZE", 0, 1, operations::codesize));
        op(Operation::new(0x39, "CODECOPY", 3, 0, operations::codecopy));
        op(Operation::new(0x3a, "GASPRICE", 0, 1, operations::gasprice));
        op(Operation::new(0x3b, "EXTCODESIZE", 1, 1, operations::extcodesize));
        op(Operation::new(0x3c, "EXTCODECOPY", 4, 0, operations::extcodecopy));

        op(Operation::new(0x40, "BLOCKHASH", 1, 1, operations::blockhash));
        op(Operation::new(0x41, "COINBASE", 0, 1, operations::coinbase));
        op(Operation::new(0x42, "TIMESTAMP", 0, 1, operations::timestamp));
        op(Operation::new(0x43, "NUMBER", 0, 1, operations::number));
        op(Operation::new(0x44, "DIFFICULTY", 0, 1, operations::difficulty));
        op(Operation::new(0x45, "GASLIMIT", 0, 1, operations::gaslimit));

        op(Operation::new(0x50, "POP", 1, 0, operations::pop));
        op(Operation::new(0x51, "MLOAD", 1, 1, operations::mload));
        op(Operation::new(0x52, "MSTORE", 2, 0, operations::mstore));
        op(Operation::new(0x53, "MSTORE8", 2, 0, operations::mstore8));
        op(Operation::new(0x54, "SLOAD", 1, 1, operations::sload));
        op(Operation::new(0x55, "SSTORE", 2, 0, operations::sstore));
        op(Operation::new(0x56, "JUMP", 1, 0, operations::jump));
        op(Operation::new(0x57, "JUMPI", 2, 0, operations::jumpi));
        op(Operation::new(0x58, "PC", 0, 1, operations::pc));
        op(Operation::new(0x59, "MSIZE", 0, 1, operations::msize));
        op(Operation::new(0x5a, "GAS", 0, 1, operations::gas));
        op(Operation::new(0x5b, "JUMPDEST", 0, 0, operations::jumpdest));

        for i in 0..32u8 {
            op(Operation::new(
                0x60 + i,
                PUSH_NAMES[i as usize],
                0,
                1,
                operations::push,
            ));
        }
        for i in 0..16u8 {
            op(Operation::new(
                0x80 + i,
                DUP_NAMES[i as usize],
                i as usize + 1,
                i as usize + 2,
                operations::dup,
            ));
        }
        for i in 0..16u8 {
            op(Operation::new(
                0x90 + i,
                SWAP_NAMES[i as usize],
                i as usize + 2,
                i as usize + 2,
                operations::swap,
            ));
        }
        for i in 0..5u8 {
            op(Operation::new(
                0xa0 + i,
                LOG_NAMES[i as usize],
                i as usize + 2,
                0,
                operations::log,
            ));
        }

        op(Operation::new(0xf0, "CREATE", 3, 1, operations::create));
        op(Operation::new(0xf1, "CALL", 7, 1, operations::call));
        op(Operation::new(0xf2, "CALLCODE", 7, 1, operations::callcode));
        op(Operation::new(0xf3, "RETURN", 2, 0, operations::ret));
        op(Operation::new(0xfe, "INVALID", 0, 0, operations::invalid));
        op(Operation::new(0xff, "SELFDESTRUCT", 1, 0, operations::selfdestruct));

        if fork.at_least(Fork::Homestead) {
            op(Operation::new(0xf4, "DELEGATECALL", 6, 1, operations::delegatecall));
        }
        if fork.at_least(Fork::Byzantium) {
            op(Operation::new(0x3d, "RETURNDATASIZE", 0, 1, operations::returndatasize));
            op(Operation::new(0x3e, "RETURNDATACOPY", 3, 0, operations::returndatacopy));
            op(Operation::new(0xfa, "STATICCALL", 6, 1, operations::staticcall));
            op(Operation::new(0xfd, "REVERT", 2, 0, operations::revert));
        }
        if fork.at_least(Fork::Constantinople) {
            op(Operation::new(0x1b, "SHL", 2, 1, operations::shl));
            op(Operation::new(0x1c, "SHR", 2, 1, operations::shr));
            op(Operation::new(0x1d, "SAR", 2, 1, operations::sar));
            op(Operation::new(0x3f, "EXTCODEHASH", 1, 1, operations::extcodehash));
            op(Operation::new(0xf5, "CREATE2", 4, 1, operations::create2));
        }
        if fork.at_least(Fork::Istanbul) {
            op(Operation::new(0x46, "CHAINID", 0, 1, operations::chainid));
            op(Operation::new(0x47, "SELFBALANCE", 0, 1, operations::selfbalance));
        }
        if fork.at_least(Fork::London) {
            op(Operation::new(0x48, "BASEFEE", 0, 1, operations::basefee));
        }
        if fork.at_least(Fork::Shanghai) {
            op(Operation::new(0x5f, "PUSH0", 0, 1, operations::push0));
        }
        if fork.at_least(Fork::Cancun) {
            op(Operation::new(0x49, "BLOBHASH", 1, 1, operations::blobhash));
            op(Operation::new(0x4a, "BLOBBASEFEE", 0, 1, operations::blobbasefee));
            op(Operation::new(0x5c, "TLOAD", 1, 1, operations::tload));
            op(Operation::new(0x5d, "TSTORE", 2, 0, operations::tstore));
            op(Operation::new(0x5e, "MCOPY", 3, 0, operations::mcopy));
        }

        Self {
            fork,
            schedule: GasSchedule::for_fork(fork),
            table,
        }
    }

    pub fn fork(&self) -> Fork {
        self.fork
    }

    pub fn schedule(&self) -> &GasSchedule {
        &self.schedule
    }

    pub fn operation(&self, opcode: u8) -> Option<&Operation> {
        self.table[opcode as usize].as_ref()
    }
}

impl std::fmt::Debug for Evm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evm").field("fork", &self.fork).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_entries_match_their_slot() {
        let evm = Evm::new(Fork::latest());
        for opcode in 0..=0xffu8 {
            if let Some(operation) = evm.operation(opcode) {
                assert_eq!(operation.opcode, opcode, "{}", operation.name);
            }
        }
    }

    #[test]
    fn test_fork_gating_adds_operations() {
        assert!(Evm::new(Fork::Frontier).operation(0xf4).is_none());
        assert!(Evm::new(Fork::Homestead).operation(0xf4).is_some());

        assert!(Evm::new(Fork::Homestead).operation(0xfd).is_none());
        assert!(Evm::new(Fork::Byzantium).operation(0xfd).is_some());

        assert!(Evm::new(Fork::Byzantium).operation(0x1b).is_none());
        assert!(Evm::new(Fork::Constantinople).operation(0x1b).is_some());

        assert!(Evm::new(Fork::London).operation(0x5f).is_none());
        assert!(Evm::new(Fork::Shanghai).operation(0x5f).is_some());

        assert!(Evm::new(Fork::Shanghai).operation(0x5e).is_none());
        assert!(Evm::new(Fork::Cancun).operation(0x5e).is_some());
    }

    #[test]
    fn test_latest_fork_coverage() {
        let evm = Evm::new(Fork::Cancun);
        let expected = 12 + 14 + 1 + 16 + 11 + 16 + 32 + 16 + 16 + 5 + 10;
        let count = (0..=0xffu8).filter(|op| evm.operation(*op).is_some()).count();
        assert_eq!(count, expected);
    }

    #[test]
    fn test_unassigned_slots_stay_empty() {
        let evm = Evm::new(Fork::latest());
        for opcode in [0x0c, 0x0d, 0x1e, 0x21, 0x4b, 0xa5, 0xef, 0xfb] {
            assert!(evm.operation(opcode).is_none(), "{opcode:#04x}");
        }
    }
}
