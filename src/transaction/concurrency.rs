use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{trace, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::common::{Result, SimpleDBError, TxNum};
use crate::storage::BlockId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    Shared,
    Exclusive,
}

#[derive(Debug)]
enum LockEntry {
    Shared(HashSet<TxNum>),
    Exclusive(TxNum),
}

impl LockEntry {
    fn blocks_shared(&self, txnum: TxNum) -> bool {
        matches!(self, LockEntry::Exclusive(holder) if *holder != txnum)
    }

    fn blocks_exclusive(&self, txnum: TxNum) -> bool {
        match self {
            LockEntry::Shared(holders) => holders.iter().any(|holder| *holder != txnum),
            LockEntry::Exclusive(holder) => *holder != txnum,
        }
    }
}

/// Block locks shared by all transactions.
///
/// A block has either a set of shared holders or one exclusive holder, and
/// has an entry only while someone holds it. Conflicting requests wait on a
/// single condition variable that is signalled on every release, and give up
/// with `LockAbort` after the configured timeout. The timeout is what breaks
/// deadlocks.
pub struct LockTable {
    locks: Mutex<HashMap<BlockId, LockEntry>>,
    released: Condvar,
    max_wait: Duration,
}

impl LockTable {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            max_wait,
        }
    }

    pub fn slock(&self, block: &BlockId, txnum: TxNum) -> Result<()> {
        let mut locks = self.locks.lock();
        self.wait_while(&mut locks, block, |entry| entry.blocks_shared(txnum))?;

        match locks.get_mut(block) {
            Some(LockEntry::Shared(holders)) => {
                holders.insert(txnum);
            }
            // Already exclusive; an x-lock covers reads
            Some(LockEntry::Exclusive(_)) => {}
            None => {
                locks.insert(block.clone(), LockEntry::Shared(HashSet::from([txnum])));
            }
        }
        trace!("transaction {} s-locked {}", txnum, block);
        Ok(())
    }

    pub fn xlock(&self, block: &BlockId, txnum: TxNum) -> Result<()> {
        let mut locks = self.locks.lock();
        self.wait_while(&mut locks, block, |entry| entry.blocks_exclusive(txnum))?;

        locks.insert(block.clone(), LockEntry::Exclusive(txnum));
        trace!("transaction {} x-locked {}", txnum, block);
        Ok(())
    }

    /// Drops every lock `txnum` holds on `blocks` in one step and wakes all
    /// waiters.
    pub fn unlock_all<'a>(&self, txnum: TxNum, blocks: impl IntoIterator<Item = &'a BlockId>) {
        let mut locks = self.locks.lock();
        for block in blocks {
            let now_free = match locks.get_mut(block) {
                Some(LockEntry::Shared(holders)) => {
                    holders.remove(&txnum);
                    holders.is_empty()
                }
                Some(LockEntry::Exclusive(holder)) => *holder == txnum,
                None => false,
            };
            if now_free {
                locks.remove(block);
            }
        }
        self.released.notify_all();
    }

    /// Current lock on `block`, if any.
    pub fn lock_type(&self, block: &BlockId) -> Option<LockType> {
        self.locks.lock().get(block).map(|entry| match entry {
            LockEntry::Shared(_) => LockType::Shared,
            LockEntry::Exclusive(_) => LockType::Exclusive,
        })
    }

    /// Transactions holding a lock on `block`, in ascending order.
    pub fn holders(&self, block: &BlockId) -> Vec<TxNum> {
        let mut holders: Vec<TxNum> = match self.locks.lock().get(block) {
            Some(LockEntry::Shared(holders)) => holders.iter().copied().collect(),
            Some(LockEntry::Exclusive(holder)) => vec![*holder],
            None => Vec::new(),
        };
        holders.sort();
        holders
    }

    /// Number of blocks with at least one lock.
    pub fn locked_blocks(&self) -> usize {
        self.locks.lock().len()
    }

    fn wait_while(
        &self,
        locks: &mut MutexGuard<'_, HashMap<BlockId, LockEntry>>,
        block: &BlockId,
        conflicts: impl Fn(&LockEntry) -> bool,
    ) -> Result<()> {
        let deadline = Instant::now() + self.max_wait;
        while locks.get(block).map_or(false, &conflicts) {
            if self.released.wait_until(locks, deadline).timed_out()
                && locks.get(block).map_or(false, &conflicts)
            {
                warn!("lock wait on {} timed out", block);
                return Err(SimpleDBError::LockAbort {
                    block: block.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Per-transaction view of the lock table. Locks are only ever released all
/// at once, at commit or rollback.
pub struct ConcurrencyManager {
    txnum: TxNum,
    lock_table: Arc<LockTable>,
    locks: HashMap<BlockId, LockType>,
}

impl ConcurrencyManager {
    pub fn new(txnum: TxNum, lock_table: Arc<LockTable>) -> Self {
        Self {
            txnum,
            lock_table,
            locks: HashMap::new(),
        }
    }

    pub fn request_shared_lock(&mut self, block: &BlockId) -> Result<()> {
        if !self.locks.contains_key(block) {
            self.lock_table.slock(block, self.txnum)?;
            self.locks.insert(block.clone(), LockType::Shared);
        }
        Ok(())
    }

    /// Acquires an exclusive lock, upgrading a shared one this transaction
    /// already holds.
    pub fn request_exclusive_lock(&mut self, block: &BlockId) -> Result<()> {
        if self.lock_type(block) != Some(LockType::Exclusive) {
            self.lock_table.xlock(block, self.txnum)?;
            self.locks.insert(block.clone(), LockType::Exclusive);
        }
        Ok(())
    }

    pub fn release_all(&mut self) {
        self.lock_table.unlock_all(self.txnum, self.locks.keys());
        self.locks.clear();
    }

    pub fn lock_type(&self, block: &BlockId) -> Option<LockType> {
        self.locks.get(block).copied()
    }
}
