//! Fixed-capacity byte ring buffer decoupling producer and consumer contexts.
//!
//! - Storage is handed over at construction and never grows; the ring does no
//!   allocation of its own after init.
//! - `put` is all-or-nothing: a write that does not fit fails with `Overflow`
//!   and leaves the cursors untouched.
//! - `get` performs short reads: it returns however many bytes are buffered,
//!   up to the caller's slice length, and that is a success.
//! - `index_of`/`find` scan oldest-to-newest without consuming anything.
//! - Synchronization is injected: `SharedRing<L>` takes a `RingLock` strategy
//!   and is only `Sync` for strategies that provide real mutual exclusion, so
//!   an unlocked ring cannot be shared across threads by construction.

use std::cell::UnsafeCell;
use std::error::Error;
use std::fmt;

use parking_lot::RawMutex;
use parking_lot::lock_api::RawMutex as _;

/// Outcome of a ring buffer operation that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// Zero-capacity storage, empty input, or empty search pattern.
    InvalidParameter,
    /// The write does not fit in the free space; nothing was written.
    Overflow,
    /// The searched byte or pattern is not in the buffered data.
    NotFound,
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::InvalidParameter => write!(f, "invalid parameter"),
            RingError::Overflow => write!(f, "write exceeds free space"),
            RingError::NotFound => write!(f, "value not found"),
        }
    }
}

impl Error for RingError {}

/// Single-context byte ring. Head is the next write slot, tail the next read
/// slot; `head == tail` means empty. At most `capacity - 1` bytes are kept
/// buffered so a full ring is never mistaken for an empty one.
#[derive(Debug)]
pub struct ByteRing {
    storage: Vec<u8>,
    head: usize,
    tail: usize,
}

impl ByteRing {
    /// Takes ownership of caller-provided storage. The usable capacity is
    /// `storage.len() - 1`; zero-sized storage is rejected.
    pub fn new(storage: Vec<u8>) -> Result<Self, RingError> {
        if storage.is_empty() {
            return Err(RingError::InvalidParameter);
        }
        Ok(Self {
            storage,
            head: 0,
            tail: 0,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of buffered (unread) bytes, handling cursor wraparound.
    pub fn peek(&self) -> usize {
        if self.head == self.tail {
            0
        } else if self.head > self.tail {
            self.head - self.tail
        } else {
            self.capacity() - (self.tail - self.head)
        }
    }

    #[inline]
    pub fn free(&self) -> usize {
        self.capacity() - 1 - self.peek()
    }

    /// Appends `data` in one piece. Fails with `Overflow` when the free space
    /// is insufficient, in which case no byte is written.
    pub fn put(&mut self, data: &[u8]) -> Result<(), RingError> {
        if data.is_empty() {
            return Err(RingError::InvalidParameter);
        }
        if data.len() > self.free() {
            return Err(RingError::Overflow);
        }

        for &byte in data {
            self.storage[self.head] = byte;
            self.head += 1;
            if self.head == self.capacity() {
                self.head = 0;
            }
        }
        Ok(())
    }

    /// Reads up to `out.len()` bytes into `out` and returns the count
    /// actually copied. Zero is a valid result on an empty ring.
    pub fn get(&mut self, out: &mut [u8]) -> Result<usize, RingError> {
        if out.is_empty() {
            return Err(RingError::InvalidParameter);
        }

        let count = out.len().min(self.peek());
        for slot in out[..count].iter_mut() {
            *slot = self.storage[self.tail];
            self.tail += 1;
            if self.tail == self.capacity() {
                self.tail = 0;
            }
        }
        Ok(count)
    }

    /// Logical offset (0 = oldest byte) of the first occurrence of `value`.
    pub fn index_of(&self, value: u8) -> Result<usize, RingError> {
        let mut pos = self.tail;
        let mut offset = 0;

        while pos != self.head {
            if self.storage[pos] == value {
                return Ok(offset);
            }
            pos += 1;
            if pos == self.capacity() {
                pos = 0;
            }
            offset += 1;
        }
        Err(RingError::NotFound)
    }

    /// Logical offset of the first contiguous occurrence of `pattern`,
    /// wrapping across the physical end of the storage. A match must lie
    /// entirely within the buffered bytes.
    pub fn find(&self, pattern: &[u8]) -> Result<usize, RingError> {
        if pattern.is_empty() {
            return Err(RingError::InvalidParameter);
        }

        let occupied = self.peek();
        if pattern.len() > occupied {
            return Err(RingError::NotFound);
        }

        for offset in 0..=(occupied - pattern.len()) {
            let start = (self.tail + offset) % self.capacity();
            let matched = pattern
                .iter()
                .enumerate()
                .all(|(i, &b)| self.storage[(start + i) % self.capacity()] == b);
            if matched {
                return Ok(offset);
            }
        }
        Err(RingError::NotFound)
    }
}

/// Mutual-exclusion strategy injected into `SharedRing`. `release` is only
/// ever called after a matching `acquire` on the same strategy instance.
pub trait RingLock {
    fn acquire(&self);
    fn release(&self);
}

/// Marker for strategies whose acquire/release really exclude other contexts.
///
/// # Safety
/// Implementors must guarantee that between `acquire` and `release` no other
/// thread can be inside the same critical section.
pub unsafe trait ExclusiveLock: RingLock {}

/// No-op strategy for single-context use. A `SharedRing<NoLock>` is not
/// `Sync`, so the compiler enforces the single-context restriction.
#[derive(Debug, Default)]
pub struct NoLock;

impl RingLock for NoLock {
    #[inline]
    fn acquire(&self) {}
    #[inline]
    fn release(&self) {}
}

/// Real mutual exclusion backed by a parking_lot raw mutex, for rings shared
/// between a producing and a consuming thread.
pub struct MutexLock {
    raw: RawMutex,
}

impl MutexLock {
    pub const fn new() -> Self {
        Self { raw: RawMutex::INIT }
    }
}

impl Default for MutexLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RingLock for MutexLock {
    #[inline]
    fn acquire(&self) {
        self.raw.lock();
    }

    #[inline]
    fn release(&self) {
        // SAFETY: SharedRing pairs every release with a preceding acquire on
        // this same mutex, on every exit path.
        unsafe { self.raw.unlock() }
    }
}

// SAFETY: a raw mutex excludes all other lockers between lock and unlock.
unsafe impl ExclusiveLock for MutexLock {}

/// A `ByteRing` behind an injectable lock strategy. Every operation acquires
/// the strategy for the duration of the cursor access and releases it on all
/// paths; parameter validation happens before the lock is taken.
pub struct SharedRing<L: RingLock> {
    ring: UnsafeCell<ByteRing>,
    lock: L,
}

// SAFETY: all access to the inner ring goes through acquire/release of an
// `ExclusiveLock`, which guarantees mutual exclusion across contexts.
unsafe impl<L: ExclusiveLock + Send> Sync for SharedRing<L> {}

impl SharedRing<MutexLock> {
    /// Thread-safe ring over caller-provided storage.
    pub fn thread_safe(storage: Vec<u8>) -> Result<Self, RingError> {
        Self::with_lock(storage, MutexLock::new())
    }
}

impl<L: RingLock> SharedRing<L> {
    pub fn with_lock(storage: Vec<u8>, lock: L) -> Result<Self, RingError> {
        Ok(Self {
            ring: UnsafeCell::new(ByteRing::new(storage)?),
            lock,
        })
    }

    /// Runs `op` with the lock held.
    #[inline]
    fn locked<R>(&self, op: impl FnOnce(&mut ByteRing) -> R) -> R {
        self.lock.acquire();
        // SAFETY: the lock strategy serializes access; for `NoLock` the type
        // is not `Sync`, so only one context can reach this cell.
        let result = op(unsafe { &mut *self.ring.get() });
        self.lock.release();
        result
    }

    pub fn put(&self, data: &[u8]) -> Result<(), RingError> {
        if data.is_empty() {
            return Err(RingError::InvalidParameter);
        }
        self.locked(|ring| ring.put(data))
    }

    pub fn get(&self, out: &mut [u8]) -> Result<usize, RingError> {
        if out.is_empty() {
            return Err(RingError::InvalidParameter);
        }
        self.locked(|ring| ring.get(out))
    }

    pub fn peek(&self) -> usize {
        self.locked(|ring| ring.peek())
    }

    pub fn index_of(&self, value: u8) -> Result<usize, RingError> {
        self.locked(|ring| ring.index_of(value))
    }

    pub fn find(&self, pattern: &[u8]) -> Result<usize, RingError> {
        if pattern.is_empty() {
            return Err(RingError::InvalidParameter);
        }
        self.locked(|ring| ring.find(pattern))
    }
}
