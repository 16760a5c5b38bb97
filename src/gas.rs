use crate::{common::Word, halt::ExceptionalHalt};

/// Per-frame gas ledger. A cost is applied atomically: either it is fully
/// affordable and fully charged, or the charge drains the ledger to exactly
/// zero and the frame halts — partial charging is forbidden.
#[derive(Debug, Clone, Default)]
pub struct Gas {
    limit: u64,
    used: u64,
}

impl Gas {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn remaining(&self) -> u64 {
        self.limit - self.used
    }

    /// Affordability probe for operations that must not touch state when the
    /// charge would fail.
    pub fn check(&self, cost: u64) -> Result<(), ExceptionalHalt> {
        if cost > self.remaining() {
            return Err(ExceptionalHalt::InsufficientGas);
        }
        Ok(())
    }

    pub fn consume(&mut self, cost: u64) -> Result<(), ExceptionalHalt> {
        if cost > self.remaining() {
            self.used = self.limit;
            return Err(ExceptionalHalt::InsufficientGas);
        }
        self.used += cost;
        Ok(())
    }

    pub fn consume_all(&mut self) {
        self.used = self.limit;
    }

    /// Return unused gas handed back by a completed child frame.
    pub fn reclaim(&mut self, gas: u64) {
        self.used -= gas;
    }
}

/// Warm/cold classification of a first-or-repeat state access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Warm,
    Cold,
}

/// Fork-indexed cost model: fixed tiers plus the dynamic formulas (memory
/// growth, storage transitions, call forwarding, creation). Values are
/// configuration, constructed once per fork and never engine logic.
#[derive(Debug, Clone)]
pub struct GasSchedule {
    pub zero: u64,
    pub base: u64,
    pub very_low: u64,
    pub low: u64,
    pub mid: u64,
    pub high: u64,
    pub jumpdest: u64,
    pub exp: u64,
    pub exp_byte: u64,
    pub keccak: u64,
    pub keccak_word: u64,
    pub copy_word: u64,
    pub memory_word: u64,
    pub quad_divisor: u64,
    pub balance: u64,
    pub sload: u64,
    pub ext_code: u64,
    pub ext_code_hash: u64,
    pub blockhash: u64,
    pub call: u64,
    pub call_value: u64,
    pub call_stipend: u64,
    pub new_account: u64,
    pub selfdestruct: u64,
    pub selfdestruct_refund: u64,
    pub sstore_set: u64,
    pub sstore_reset: u64,
    pub sstore_dirty: u64,
    pub sstore_clear_refund: u64,
    pub cold_sload: u64,
    pub cold_account_access: u64,
    pub warm_access: u64,
    pub transient: u64,
    pub log: u64,
    pub log_topic: u64,
    pub log_data: u64,
    pub create: u64,
    pub code_deposit: u64,
    pub tx: u64,
    pub tx_create: u64,
    pub tx_data_zero: u64,
    pub tx_data_nonzero: u64,
    pub init_code_word: u64,
    pub max_code_size: usize,
    pub max_init_code_size: usize,
    /// From TangerineWhistle on, a parent forwards at most 63/64 of its
    /// remaining gas and keeps the rest.
    pub all_but_one_64th: bool,
    /// Berlin access lists: first touch of an account or slot is cold.
    pub warm_cold_access: bool,
    /// Istanbul net storage metering keyed on the slot's original value.
    pub net_sstore_metering: bool,
    pub refund_quotient: u64,
}

impl GasSchedule {
    pub fn frontier() -> Self {
        Self {
            zero: 0,
            base: 2,
            very_low: 3,
            low: 5,
            mid: 8,
            high: 10,
            jumpdest: 1,
            exp: 10,
            exp_byte: 10,
            keccak: 30,
            keccak_word: 6,
            copy_word: 3,
            memory_word: 3,
            quad_divisor: 512,
            balance: 20,
            sload: 50,
            ext_code: 20,
            ext_code_hash: 0,
            blockhash: 20,
            call: 40,
            call_value: 9000,
            call_stipend: 2300,
            new_account: 25000,
            selfdestruct: 0,
            selfdestruct_refund: 24000,
            sstore_set: 20000,
            sstore_reset: 5000,
            sstore_dirty: 0,
            sstore_clear_refund: 15000,
            cold_sload: 0,
            cold_account_access: 0,
            warm_access: 0,
            transient: 100,
            log: 375,
            log_topic: 375,
            log_data: 8,
            create: 32000,
            code_deposit: 200,
            tx: 21000,
            tx_create: 0,
            tx_data_zero: 4,
            tx_data_nonzero: 68,
            init_code_word: 0,
            max_code_size: usize::MAX,
            max_init_code_size: usize::MAX,
            all_but_one_64th: false,
            warm_cold_access: false,
            net_sstore_metering: false,
            refund_quotient: 2,
        }
    }

    pub fn homestead() -> Self {
        Self {
            tx_create: 32000,
            ..Self::frontier()
        }
    }

    pub fn tangerine_whistle() -> Self {
        Self {
            balance: 400,
            sload: 200,
            ext_code: 700,
            call: 700,
            selfdestruct: 5000,
            all_but_one_64th: true,
            ..Self::homestead()
        }
    }

    pub fn spurious_dragon() -> Self {
        Self {
            exp_byte: 50,
            max_code_size: 24576,
            ..Self::tangerine_whistle()
        }
    }

    pub fn byzantium() -> Self {
        Self::spurious_dragon()
    }

    pub fn constantinople() -> Self {
        Self {
            ext_code_hash: 400,
            ..Self::byzantium()
        }
    }

    pub fn istanbul() -> Self {
        Self {
            balance: 700,
            sload: 800,
            ext_code_hash: 700,
            tx_data_nonzero: 16,
            net_sstore_metering: true,
            sstore_dirty: 800,
            ..Self::constantinople()
        }
    }

    pub fn berlin() -> Self {
        Self {
            warm_cold_access: true,
            cold_sload: 2100,
            cold_account_access: 2600,
            warm_access: 100,
            sstore_dirty: 100,
            sstore_reset: 2900,
            ..Self::istanbul()
        }
    }

    pub fn london() -> Self {
        Self {
            sstore_clear_refund: 4800,
            selfdestruct_refund: 0,
            refund_quotient: 5,
            ..Self::berlin()
        }
    }

    pub fn shanghai() -> Self {
        Self {
            init_code_word: 2,
            max_init_code_size: 49152,
            ..Self::london()
        }
    }

    pub fn cancun() -> Self {
        Self::shanghai()
    }

    pub fn for_fork(fork: crate::fork::Fork) -> Self {
        use crate::fork::Fork;
        match fork {
            Fork::Frontier => Self::frontier(),
            Fork::Homestead => Self::homestead(),
            Fork::TangerineWhistle => Self::tangerine_whistle(),
            Fork::SpuriousDragon => Self::spurious_dragon(),
            Fork::Byzantium => Self::byzantium(),
            Fork::Constantinople => Self::constantinople(),
            Fork::Istanbul => Self::istanbul(),
            Fork::Berlin => Self::berlin(),
            Fork::London => Self::london(),
            Fork::Shanghai => Self::shanghai(),
            Fork::Cancun => Self::cancun(),
        }
    }

    fn memory_cost(&self, words: u64) -> u64 {
        self.memory_word
            .saturating_mul(words)
            .saturating_add(words.saturating_mul(words) / self.quad_divisor)
    }

    /// Charge for growing memory from `old` to `new` bytes; sizes round up
    /// to whole words, and shrinking never refunds.
    pub fn memory_expansion(&self, old: usize, new: usize) -> u64 {
        if new <= old {
            return 0;
        }
        let old_words = (old as u64).div_ceil(32);
        let new_words = (new as u64).div_ceil(32);
        self.memory_cost(new_words) - self.memory_cost(old_words)
    }

    pub fn keccak_cost(&self, len: usize) -> u64 {
        self.keccak
            .saturating_add(self.keccak_word.saturating_mul((len as u64).div_ceil(32)))
    }

    pub fn copy_cost(&self, len: usize) -> u64 {
        self.copy_word.saturating_mul((len as u64).div_ceil(32))
    }

    pub fn log_cost(&self, topics: usize, len: usize) -> u64 {
        self.log
            .saturating_add(self.log_topic.saturating_mul(topics as u64))
            .saturating_add(self.log_data.saturating_mul(len as u64))
    }

    pub fn exp_cost(&self, exponent: &Word) -> u64 {
        self.exp
            .saturating_add(self.exp_byte.saturating_mul(exponent.byte_len() as u64))
    }

    pub fn init_code_cost(&self, len: usize) -> u64 {
        self.init_code_word.saturating_mul((len as u64).div_ceil(32))
    }

    /// Upfront cost of a transaction before the first instruction runs.
    pub fn intrinsic_cost(&self, data: &[u8], is_create: bool) -> u64 {
        let nonzero = data.iter().filter(|byte| byte != &&0).count() as u64;
        let zero = data.len() as u64 - nonzero;
        let mut cost = self.tx + zero * self.tx_data_zero + nonzero * self.tx_data_nonzero;
        if is_create {
            cost += self.tx_create + self.init_code_cost(data.len());
        }
        cost
    }

    /// Most gas a parent may hand to a child out of `available`.
    pub fn call_gas_cap(&self, available: u64) -> u64 {
        if self.all_but_one_64th {
            available - available / 64
        } else {
            available
        }
    }

    pub fn account_access_cost(&self, access: Access, legacy_cost: u64) -> u64 {
        if self.warm_cold_access {
            match access {
                Access::Warm => self.warm_access,
                Access::Cold => self.cold_account_access,
            }
        } else {
            legacy_cost
        }
    }

    pub fn sload_cost(&self, access: Access) -> u64 {
        if self.warm_cold_access {
            match access {
                Access::Warm => self.warm_access,
                Access::Cold => self.cold_sload,
            }
        } else {
            self.sload
        }
    }

    /// Storage write cost from the slot's transition. `original` is the value
    /// at transaction start, `current` the value before this write.
    pub fn sstore_cost(&self, original: Word, current: Word, new: Word, access: Access) -> u64 {
        if !self.net_sstore_metering {
            return if current.is_zero() && !new.is_zero() {
                self.sstore_set
            } else {
                self.sstore_reset
            };
        }
        let cold_surcharge = if self.warm_cold_access && access == Access::Cold {
            self.cold_sload
        } else {
            0
        };
        let base = if current == new {
            self.sstore_dirty
        } else if current == original {
            if original.is_zero() {
                self.sstore_set
            } else {
                self.sstore_reset
            }
        } else {
            self.sstore_dirty
        };
        cold_surcharge + base
    }

    /// Signed refund-counter delta for a storage write.
    pub fn sstore_refund(&self, original: Word, current: Word, new: Word) -> i64 {
        if !self.net_sstore_metering {
            return if !current.is_zero() && new.is_zero() {
                self.sstore_clear_refund as i64
            } else {
                0
            };
        }
        if current == new {
            return 0;
        }
        let mut refund = 0i64;
        if current == original {
            if !original.is_zero() && new.is_zero() {
                refund += self.sstore_clear_refund as i64;
            }
        } else {
            if !original.is_zero() {
                if current.is_zero() {
                    refund -= self.sstore_clear_refund as i64;
                } else if new.is_zero() {
                    refund += self.sstore_clear_refund as i64;
                }
            }
            if new == original {
                if original.is_zero() {
                    refund += (self.sstore_set - self.sstore_dirty) as i64;
                } else {
                    refund += (self.sstore_reset - self.sstore_dirty) as i64;
                }
            }
        }
        refund
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_drains_on_shortfall() {
        let mut gas = Gas::new(100);
        gas.consume(60).unwrap();
        assert_eq!(gas.consume(50), Err(ExceptionalHalt::InsufficientGas));
        assert_eq!(gas.remaining(), 0);
    }

    #[test]
    fn test_reclaim() {
        let mut gas = Gas::new(100);
        gas.consume(80).unwrap();
        gas.reclaim(30);
        assert_eq!(gas.remaining(), 50);
    }

    #[test]
    fn test_call_gas_cap() {
        let pre = GasSchedule::homestead();
        let post = GasSchedule::tangerine_whistle();
        assert_eq!(pre.call_gas_cap(6400), 6400);
        assert_eq!(post.call_gas_cap(6400), 6400 - 100);
    }

    #[test]
    fn test_intrinsic_cost_istanbul_repricing() {
        let data = [0u8, 1, 2, 0];
        assert_eq!(
            GasSchedule::homestead().intrinsic_cost(&data, false),
            21000 + 2 * 4 + 2 * 68
        );
        assert_eq!(
            GasSchedule::istanbul().intrinsic_cost(&data, false),
            21000 + 2 * 4 + 2 * 16
        );
    }

    #[test]
    fn test_intrinsic_cost_create() {
        assert_eq!(GasSchedule::frontier().intrinsic_cost(&[], true), 21000);
        assert_eq!(GasSchedule::homestead().intrinsic_cost(&[], true), 53000);
        assert_eq!(
            GasSchedule::shanghai().intrinsic_cost(&[1u8; 33], true),
            21000 + 32000 + 33 * 16 + 2 * 2
        );
    }

    #[test]
    fn test_sstore_legacy() {
        let s = GasSchedule::homestead();
        let zero = Word::zero();
        let one = Word::one();
        assert_eq!(s.sstore_cost(zero, zero, one, Access::Warm), 20000);
        assert_eq!(s.sstore_cost(zero, one, zero, Access::Warm), 5000);
        assert_eq!(s.sstore_refund(zero, one, zero), 15000);
        assert_eq!(s.sstore_refund(zero, zero, one), 0);
    }

    #[test]
    fn test_sstore_net_metering_berlin() {
        let s = GasSchedule::berlin();
        let zero = Word::zero();
        let one = Word::one();
        let two = Word::from(2u64);
        // Fresh write to a clean zero slot.
        assert_eq!(s.sstore_cost(zero, zero, one, Access::Warm), 20000);
        // No-op write.
        assert_eq!(s.sstore_cost(one, one, one, Access::Warm), 100);
        // Clean nonzero overwrite, warm vs cold.
        assert_eq!(s.sstore_cost(one, one, two, Access::Warm), 2900);
        assert_eq!(s.sstore_cost(one, one, two, Access::Cold), 2900 + 2100);
        // Dirty slot.
        assert_eq!(s.sstore_cost(one, two, one, Access::Warm), 100);
        // Clearing a clean nonzero slot refunds.
        assert_eq!(s.sstore_refund(one, one, zero), 4800);
        // Restoring a dirty slot to its original value.
        assert_eq!(s.sstore_refund(one, two, one), 2800);
        assert_eq!(s.sstore_refund(zero, two, zero), 19900);
    }

    #[test]
    fn test_memory_expansion_monotonic_delta() {
        let s = GasSchedule::frontier();
        assert_eq!(s.memory_expansion(0, 32), 3);
        assert_eq!(s.memory_expansion(32, 32), 0);
        assert_eq!(s.memory_expansion(64, 32), 0);
        assert_eq!(s.memory_expansion(0, 22 * 1024 * 32), 22 * 1024 * 3 + 22 * 1024 * 22 * 1024 / 512);
    }
}
