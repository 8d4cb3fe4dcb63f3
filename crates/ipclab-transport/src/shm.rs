//! Shared-memory buffer with a lock and a turn flag.
//!
//! The payload lives in an anonymous `MAP_SHARED` mapping laid out as:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────────┐
//! │ Length (4B)  │ Reserved (4B)│ Data (SHM_CAPACITY bytes) │
//! └──────────────┴──────────────┴──────────────────────────┘
//! ```
//!
//! The mapping is only touched through [`BufferGuard`], which holds the lock.
//! The turn flag and the completion flag are atomics: they may be read
//! without the lock, but are only written through the guard.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{Result, TransportError};

/// Fixed data capacity of the shared region in bytes.
pub const SHM_CAPACITY: usize = 1024;

const LEN_HEADER: usize = 8;
const REGION_SIZE: usize = LEN_HEADER + SHM_CAPACITY;

/// Identity of one of the two parties sharing a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerId {
    Zero,
    One,
}

impl WorkerId {
    pub fn index(self) -> u8 {
        match self {
            WorkerId::Zero => 0,
            WorkerId::One => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            WorkerId::Zero => WorkerId::One,
            WorkerId::One => WorkerId::Zero,
        }
    }

    fn from_index(index: u8) -> Self {
        if index == 0 {
            WorkerId::Zero
        } else {
            WorkerId::One
        }
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// How a worker waits for its turn or for the completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Poll the flag with a fixed sleep between checks.
    Busy,
    /// Sleep on a condition variable tied to the buffer lock.
    Condvar,
}

/// Wait parameters shared by turn and completion waits.
#[derive(Debug, Clone, Copy)]
pub struct TurnWait {
    pub strategy: WaitStrategy,
    /// Sleep between polls (busy) or maximum condvar sleep before re-checking
    /// cancellation (condvar).
    pub poll_interval: Duration,
    /// Give up with [`TransportError::LockOrWaitTimeout`] after this long.
    pub timeout: Option<Duration>,
}

impl Default for TurnWait {
    fn default() -> Self {
        Self {
            strategy: WaitStrategy::Busy,
            poll_interval: Duration::from_millis(50),
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

struct Region {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is owned exclusively by `Region` and only reached
// through the `Mutex` in `SharedBuffer`.
unsafe impl Send for Region {}

impl Region {
    fn map(len: usize) -> Result<Self> {
        // SAFETY: anonymous shared mapping with no fixed address; the result
        // is checked against MAP_FAILED before use.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(TransportError::Map(std::io::Error::last_os_error()));
        }
        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or_else(|| {
            TransportError::Map(std::io::Error::other("mmap returned a null pointer"))
        })?;
        debug!(len, "mapped shared region");
        Ok(Self { ptr, len })
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: `ptr` points to `len` readable bytes for the life of `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: `ptr` points to `len` writable bytes and `&mut self`
        // guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    fn payload_len(&self) -> usize {
        let b = self.bytes();
        (u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize).min(SHM_CAPACITY)
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: unmapping exactly the range returned by mmap in `map`.
        let rc = unsafe { libc::munmap(self.ptr.as_ptr().cast::<libc::c_void>(), self.len) };
        if rc != 0 {
            debug!(error = %std::io::Error::last_os_error(), "munmap failed");
        } else {
            debug!(len = self.len, "unmapped shared region");
        }
    }
}

/// Fixed-size shared byte region plus a lock, a turn flag and a one-shot
/// completion flag.
///
/// Construct once and hand an `Arc<SharedBuffer>` to exactly the two
/// workers that share it.
pub struct SharedBuffer {
    region: Mutex<Region>,
    turn: AtomicU8,
    complete: AtomicBool,
    changed: Condvar,
}

impl SharedBuffer {
    /// Map a new zeroed region. The turn starts with [`WorkerId::Zero`].
    pub fn new() -> Result<Self> {
        Ok(Self {
            region: Mutex::new(Region::map(REGION_SIZE)?),
            turn: AtomicU8::new(0),
            complete: AtomicBool::new(false),
            changed: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        SHM_CAPACITY
    }

    /// Acquire the lock (blocking).
    ///
    /// Fails with [`TransportError::LockPoisoned`] if a previous holder died
    /// while holding it.
    pub fn lock(&self) -> Result<BufferGuard<'_>> {
        let region = self
            .region
            .lock()
            .map_err(|_| TransportError::LockPoisoned)?;
        Ok(BufferGuard {
            buffer: self,
            region,
        })
    }

    /// Current turn. Unsynchronized with respect to the payload; only use it
    /// to gate progress.
    pub fn turn(&self) -> WorkerId {
        WorkerId::from_index(self.turn.load(Ordering::Acquire))
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Block until it is `id`'s turn.
    pub fn wait_for_turn(
        &self,
        id: WorkerId,
        wait: &TurnWait,
        is_cancelled: impl Fn() -> bool,
    ) -> Result<()> {
        self.wait_until(|| self.turn() == id, wait, is_cancelled)
    }

    /// Block until the writer has signalled completion.
    pub fn wait_for_completion(&self, wait: &TurnWait, is_cancelled: impl Fn() -> bool) -> Result<()> {
        self.wait_until(|| self.is_complete(), wait, is_cancelled)
    }

    /// Wake every condvar waiter so it can observe cancellation.
    pub fn wake_all(&self) {
        self.changed.notify_all();
    }

    fn wait_until(
        &self,
        ready: impl Fn() -> bool,
        wait: &TurnWait,
        is_cancelled: impl Fn() -> bool,
    ) -> Result<()> {
        let deadline = wait.timeout.map(|timeout| (Instant::now() + timeout, timeout));
        let remaining = || -> Result<Duration> {
            match deadline {
                Some((at, timeout)) => {
                    let now = Instant::now();
                    if now >= at {
                        Err(TransportError::LockOrWaitTimeout(timeout))
                    } else {
                        Ok((at - now).min(wait.poll_interval))
                    }
                }
                None => Ok(wait.poll_interval),
            }
        };

        match wait.strategy {
            WaitStrategy::Busy => {
                while !ready() {
                    if is_cancelled() {
                        return Err(TransportError::Cancelled);
                    }
                    std::thread::sleep(remaining()?);
                }
                Ok(())
            }
            WaitStrategy::Condvar => {
                let mut region = self
                    .region
                    .lock()
                    .map_err(|_| TransportError::LockPoisoned)?;
                while !ready() {
                    if is_cancelled() {
                        return Err(TransportError::Cancelled);
                    }
                    let (next, _) = self
                        .changed
                        .wait_timeout(region, remaining()?)
                        .map_err(|_| TransportError::LockPoisoned)?;
                    region = next;
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("capacity", &SHM_CAPACITY)
            .field("turn", &self.turn())
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// Exclusive access to the shared region. Dropping it releases the lock.
pub struct BufferGuard<'a> {
    buffer: &'a SharedBuffer,
    region: MutexGuard<'a, Region>,
}

impl BufferGuard<'_> {
    /// The bytes most recently written.
    pub fn read(&self) -> &[u8] {
        let len = self.region.payload_len();
        &self.region.bytes()[LEN_HEADER..LEN_HEADER + len]
    }

    /// Replace the buffer contents.
    ///
    /// A message larger than [`SHM_CAPACITY`] is rejected with
    /// [`TransportError::CapacityExceeded`] and nothing is written.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > SHM_CAPACITY {
            return Err(TransportError::CapacityExceeded {
                size: data.len(),
                capacity: SHM_CAPACITY,
            });
        }
        let bytes = self.region.bytes_mut();
        bytes[LEN_HEADER..LEN_HEADER + data.len()].copy_from_slice(data);
        bytes[0..4].copy_from_slice(&(data.len() as u32).to_le_bytes());
        trace!(len = data.len(), "wrote shared buffer");
        Ok(())
    }

    /// Hand the turn to `to` and release the lock.
    pub fn pass_turn(self, to: WorkerId) {
        self.buffer.turn.store(to.index(), Ordering::Release);
        self.buffer.changed.notify_all();
        trace!(turn = %to, "passed turn");
    }

    /// Raise the one-shot completion flag and release the lock.
    pub fn signal_complete(self) {
        self.buffer.complete.store(true, Ordering::Release);
        self.buffer.changed.notify_all();
        trace!("signalled completion");
    }
}
