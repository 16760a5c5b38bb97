use once_cell::sync::OnceCell;

use crate::common::{Word, hash::keccak256};

pub const JUMPDEST: u8 = 0x5b;

const PUSH1: u8 = 0x60;
const PUSH32: u8 = 0x7f;

/// Immutable code view shared read-only across every frame executing the
/// same code, with a lazily computed valid-jump-destination bitmap.
#[derive(Debug, Default)]
pub struct Bytecode {
    code: Vec<u8>,
    jumpdests: OnceCell<Vec<u64>>,
    hash: OnceCell<[u8; 32]>,
}

impl Bytecode {
    pub fn new(code: Vec<u8>) -> Self {
        Self {
            code,
            jumpdests: OnceCell::new(),
            hash: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &[u8] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn hash(&self) -> [u8; 32] {
        *self.hash.get_or_init(|| keccak256(&self.code))
    }

    /// Opcode at `pc`, or `None` past code end (implicit STOP).
    pub fn opcode_at(&self, pc: usize) -> Option<u8> {
        self.code.get(pc).copied()
    }

    /// The `width` immediate bytes following the opcode at `pc`, zero-padded
    /// when they run past code end. The padding is a compatibility rule every
    /// node must share: truncated immediates are never rejected.
    pub fn immediate(&self, pc: usize, width: usize) -> Word {
        let start = (pc + 1).min(self.code.len());
        let end = (pc + 1 + width).min(self.code.len());
        let mut bytes = [0u8; 32];
        let available = end - start;
        bytes[32 - width..32 - width + available].copy_from_slice(&self.code[start..end]);
        Word::from_bytes(&bytes)
    }

    /// True when `pc` indexes a JUMPDEST byte that is not the immediate data
    /// of some PUSH instruction. Jumping into immediate data would make the
    /// interpreter read data bytes as instructions, so the bitmap is part of
    /// consensus and must match bit-for-bit across implementations.
    pub fn is_valid_jump_destination(&self, pc: usize) -> bool {
        if pc >= self.code.len() {
            return false;
        }
        let bitmap = self.jumpdests.get_or_init(|| self.scan_jump_destinations());
        bitmap[pc / 64] & (1 << (pc % 64)) != 0
    }

    /// Single left-to-right scan: PUSH-N immediates are skipped and never
    /// marked, whatever their byte values; only a JUMPDEST opcode byte
    /// outside immediate data sets its bit.
    fn scan_jump_destinations(&self) -> Vec<u64> {
        let mut bitmap = vec![0u64; self.code.len().div_ceil(64)];
        let mut pc = 0;
        while pc < self.code.len() {
            let opcode = self.code[pc];
            if opcode == JUMPDEST {
                bitmap[pc / 64] |= 1 << (pc % 64);
            }
            if (PUSH1..=PUSH32).contains(&opcode) {
                pc += (opcode - PUSH1) as usize + 1;
            }
            pc += 1;
        }
        bitmap
    }
}

impl From<Vec<u8>> for Bytecode {
    fn from(code: Vec<u8>) -> Self {
        Self::new(code)
    }
}

impl From<&[u8]> for Bytecode {
    fn from(code: &[u8]) -> Self {
        Self::new(code.to_vec())
    }
}
