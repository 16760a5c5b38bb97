use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{
    bytecode::Bytecode,
    common::{Address, Word, hash::keccak256},
    gas::Access,
};

/// Journal position; rolling back to a snapshot undoes everything recorded
/// after it.
pub type Snapshot = usize;

/// World state as the engine consumes it. The state itself is owned by the
/// surrounding transaction processor; the engine only ever touches it under
/// the snapshot/rollback discipline: every child frame's mutations are
/// tentative until that frame returns successfully.
///
/// Reads take `&mut self` so implementations can cache and record warmth.
pub trait Ext {
    fn balance(&mut self, address: &Address) -> Word;
    fn set_balance(&mut self, address: &Address, balance: Word);

    fn nonce(&mut self, address: &Address) -> u64;
    fn set_nonce(&mut self, address: &Address, nonce: u64);

    fn code(&mut self, address: &Address) -> Arc<Bytecode>;
    fn code_hash(&mut self, address: &Address) -> Word;
    fn set_code(&mut self, address: &Address, code: Vec<u8>);

    fn storage(&mut self, address: &Address, key: &Word) -> Word;
    /// Value of the slot at the start of the current transaction.
    fn original_storage(&mut self, address: &Address, key: &Word) -> Word;
    fn set_storage(&mut self, address: &Address, key: Word, value: Word);

    fn transient_storage(&mut self, address: &Address, key: &Word) -> Word;
    fn set_transient_storage(&mut self, address: &Address, key: Word, value: Word);

    fn exists(&mut self, address: &Address) -> bool;
    /// Empty per the state-clearing rules: no balance, no nonce, no code.
    fn is_empty(&mut self, address: &Address) -> bool;
    fn create_account(&mut self, address: &Address);

    /// Record the access and report whether it was the first in this
    /// transaction.
    fn access_account(&mut self, address: &Address) -> Access;
    fn access_storage(&mut self, address: &Address, key: &Word) -> Access;

    /// Accounts touched so far in this transaction, in a deterministic
    /// order. Backends that do not track this may return nothing.
    fn touched_accounts(&mut self) -> Vec<Address> {
        vec![]
    }

    fn block_hash(&mut self, number: u64) -> Word;

    fn snapshot(&mut self) -> Snapshot;
    fn rollback(&mut self, snapshot: Snapshot);
    fn commit(&mut self, snapshot: Snapshot);

    /// Reset per-transaction tracking (warmth, original values, transient
    /// storage). Called by the transaction layer, never mid-frame.
    fn begin_transaction(&mut self);
}

#[derive(Debug, Clone, Default)]
struct AccountState {
    balance: Word,
    nonce: u64,
    code: Arc<Bytecode>,
    storage: HashMap<Word, Word>,
}

#[derive(Debug)]
enum JournalEntry {
    Balance(Address, Word),
    Nonce(Address, u64),
    Storage(Address, Word, Word),
    Transient(Address, Word, Word),
    Code(Address, Arc<Bytecode>),
    Created(Address),
    AccountWarmed(Address),
    StorageWarmed(Address, Word),
}

/// In-memory journaled state for tests and embedders without a backing
/// store. Every mutation appends an undo entry; `rollback` replays the tail
/// in reverse, so sibling and parent views never observe a reverted write.
#[derive(Debug, Default)]
pub struct MemoryExt {
    accounts: HashMap<Address, AccountState>,
    transient: HashMap<(Address, Word), Word>,
    original: HashMap<(Address, Word), Word>,
    warm_accounts: HashSet<Address>,
    warm_slots: HashSet<(Address, Word)>,
    journal: Vec<JournalEntry>,
}

impl MemoryExt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/setup helper: fund an account outside any journal scope.
    pub fn credit(&mut self, address: &Address, amount: Word) {
        let account = self.accounts.entry(*address).or_default();
        account.balance += amount;
    }

    /// Test/setup helper: install code outside any journal scope.
    pub fn deploy(&mut self, address: &Address, code: Vec<u8>) {
        let account = self.accounts.entry(*address).or_default();
        account.code = Arc::new(Bytecode::new(code));
    }

    /// Test/setup helper: seed a storage slot outside any journal scope.
    pub fn seed_storage(&mut self, address: &Address, key: Word, value: Word) {
        let account = self.accounts.entry(*address).or_default();
        account.storage.insert(key, value);
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Balance(address, balance) => {
                self.accounts.entry(address).or_default().balance = balance;
            }
            JournalEntry::Nonce(address, nonce) => {
                self.accounts.entry(address).or_default().nonce = nonce;
            }
            JournalEntry::Storage(address, key, value) => {
                self.accounts
                    .entry(address)
                    .or_default()
                    .storage
                    .insert(key, value);
            }
            JournalEntry::Transient(address, key, value) => {
                self.transient.insert((address, key), value);
            }
            JournalEntry::Code(address, code) => {
                self.accounts.entry(address).or_default().code = code;
            }
            JournalEntry::Created(address) => {
                self.accounts.remove(&address);
            }
            JournalEntry::AccountWarmed(address) => {
                self.warm_accounts.remove(&address);
            }
            JournalEntry::StorageWarmed(address, key) => {
                self.warm_slots.remove(&(address, key));
            }
        }
    }
}

impl Ext for MemoryExt {
    fn balance(&mut self, address: &Address) -> Word {
        self.accounts
            .get(address)
            .map(|account| account.balance)
            .unwrap_or_default()
    }

    fn set_balance(&mut self, address: &Address, balance: Word) {
        let prior = self.balance(address);
        self.journal.push(JournalEntry::Balance(*address, prior));
        self.accounts.entry(*address).or_default().balance = balance;
    }

    fn nonce(&mut self, address: &Address) -> u64 {
        self.accounts
            .get(address)
            .map(|account| account.nonce)
            .unwrap_or_default()
    }

    fn set_nonce(&mut self, address: &Address, nonce: u64) {
        let prior = self.nonce(address);
        self.journal.push(JournalEntry::Nonce(*address, prior));
        self.accounts.entry(*address).or_default().nonce = nonce;
    }

    fn code(&mut self, address: &Address) -> Arc<Bytecode> {
        self.accounts
            .get(address)
            .map(|account| account.code.clone())
            .unwrap_or_default()
    }

    fn code_hash(&mut self, address: &Address) -> Word {
        if !self.exists(address) {
            return Word::zero();
        }
        Word::from_bytes(&self.code(address).hash())
    }

    fn set_code(&mut self, address: &Address, code: Vec<u8>) {
        let prior = self.code(address);
        self.journal.push(JournalEntry::Code(*address, prior));
        self.accounts.entry(*address).or_default().code = Arc::new(Bytecode::new(code));
    }

    fn storage(&mut self, address: &Address, key: &Word) -> Word {
        self.accounts
            .get(address)
            .and_then(|account| account.storage.get(key))
            .copied()
            .unwrap_or_default()
    }

    fn original_storage(&mut self, address: &Address, key: &Word) -> Word {
        if let Some(value) = self.original.get(&(*address, *key)) {
            return *value;
        }
        self.storage(address, key)
    }

    fn set_storage(&mut self, address: &Address, key: Word, value: Word) {
        let prior = self.storage(address, &key);
        self.original.entry((*address, key)).or_insert(prior);
        self.journal.push(JournalEntry::Storage(*address, key, prior));
        self.accounts
            .entry(*address)
            .or_default()
            .storage
            .insert(key, value);
    }

    fn transient_storage(&mut self, address: &Address, key: &Word) -> Word {
        self.transient
            .get(&(*address, *key))
            .copied()
            .unwrap_or_default()
    }

    fn set_transient_storage(&mut self, address: &Address, key: Word, value: Word) {
        let prior = self.transient_storage(address, &key);
        self.journal
            .push(JournalEntry::Transient(*address, key, prior));
        self.transient.insert((*address, key), value);
    }

    fn exists(&mut self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    fn is_empty(&mut self, address: &Address) -> bool {
        match self.accounts.get(address) {
            None => true,
            Some(account) => {
                account.balance.is_zero() && account.nonce == 0 && account.code.is_empty()
            }
        }
    }

    fn create_account(&mut self, address: &Address) {
        if !self.accounts.contains_key(address) {
            self.journal.push(JournalEntry::Created(*address));
            self.accounts.insert(*address, AccountState::default());
        }
    }

    fn access_account(&mut self, address: &Address) -> Access {
        if self.warm_accounts.insert(*address) {
            self.journal.push(JournalEntry::AccountWarmed(*address));
            Access::Cold
        } else {
            Access::Warm
        }
    }

    fn access_storage(&mut self, address: &Address, key: &Word) -> Access {
        if self.warm_slots.insert((*address, *key)) {
            self.journal.push(JournalEntry::StorageWarmed(*address, *key));
            Access::Cold
        } else {
            Access::Warm
        }
    }

    fn touched_accounts(&mut self) -> Vec<Address> {
        let mut touched: Vec<Address> = self.warm_accounts.iter().copied().collect();
        touched.sort();
        touched
    }

    fn block_hash(&mut self, number: u64) -> Word {
        Word::from_bytes(&keccak256(&number.to_be_bytes()))
    }

    fn snapshot(&mut self) -> Snapshot {
        self.journal.len()
    }

    fn rollback(&mut self, snapshot: Snapshot) {
        while self.journal.len() > snapshot {
            let Some(entry) = self.journal.pop() else {
                break;
            };
            self.undo(entry);
        }
    }

    fn commit(&mut self, _snapshot: Snapshot) {
        // Entries stay in the journal: an enclosing frame may still revert,
        // which must also undo this frame's committed-into-parent writes.
    }

    fn begin_transaction(&mut self) {
        self.journal.clear();
        self.original.clear();
        self.transient.clear();
        self.warm_accounts.clear();
        self.warm_slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::address::addr;

    const A: Address = addr("0x00000000000000000000000000000000000000aa");
    const B: Address = addr("0x00000000000000000000000000000000000000bb");

    #[test]
    fn test_rollback_undoes_storage() {
        let mut ext = MemoryExt::new();
        ext.set_storage(&A, Word::one(), Word::from(7u64));
        let snapshot = ext.snapshot();
        ext.set_storage(&A, Word::one(), Word::from(8u64));
        ext.set_storage(&A, Word::from(2u64), Word::from(9u64));
        ext.rollback(snapshot);
        assert_eq!(ext.storage(&A, &Word::one()), Word::from(7u64));
        assert_eq!(ext.storage(&A, &Word::from(2u64)), Word::zero());
    }

    #[test]
    fn test_rollback_undoes_balance_and_nonce() {
        let mut ext = MemoryExt::new();
        ext.credit(&A, Word::from(100u64));
        let snapshot = ext.snapshot();
        ext.set_balance(&A, Word::from(40u64));
        ext.set_balance(&B, Word::from(60u64));
        ext.set_nonce(&A, 3);
        ext.rollback(snapshot);
        assert_eq!(ext.balance(&A), Word::from(100u64));
        assert_eq!(ext.balance(&B), Word::zero());
        assert_eq!(ext.nonce(&A), 0);
    }

    #[test]
    fn test_rollback_undoes_warmth() {
        let mut ext = MemoryExt::new();
        let snapshot = ext.snapshot();
        assert_eq!(ext.access_account(&A), Access::Cold);
        assert_eq!(ext.access_account(&A), Access::Warm);
        ext.rollback(snapshot);
        assert_eq!(ext.access_account(&A), Access::Cold);
    }

    #[test]
    fn test_original_storage_survives_writes() {
        let mut ext = MemoryExt::new();
        ext.seed_storage(&A, Word::one(), Word::from(5u64));
        ext.begin_transaction();
        ext.set_storage(&A, Word::one(), Word::from(6u64));
        ext.set_storage(&A, Word::one(), Word::from(7u64));
        assert_eq!(ext.original_storage(&A, &Word::one()), Word::from(5u64));
        assert_eq!(ext.storage(&A, &Word::one()), Word::from(7u64));
    }

    #[test]
    fn test_created_account_removed_on_rollback() {
        let mut ext = MemoryExt::new();
        let snapshot = ext.snapshot();
        ext.create_account(&A);
        assert!(ext.exists(&A));
        ext.rollback(snapshot);
        assert!(!ext.exists(&A));
    }
}
