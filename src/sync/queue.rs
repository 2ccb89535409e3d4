//! Bounded message queues.
//!
//! A queue is a ring of fixed-size slots allocated from the kernel
//! heap, with separate priority-sorted waiter lists for readers and
//! writers. The ring tracks an element count next to its indices, so
//! every slot is usable and "full" is distinguishable from "empty"
//! even when the indices coincide.

use crate::config::CFG_QUEUE_NUM;
use crate::core::list::WaitList;
use crate::core::time::{self, TIMEOUT_MAX};
use crate::critical::{critical_section, is_isr_context, CriticalSection, CsCell};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched;
use crate::types::{BlockKind, OsTick, PendStatus, WaitOrder};

/// Ring-buffer bookkeeping: indices plus an element count.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RingState {
    read: usize,
    write: usize,
    used: usize,
    capacity: usize,
}

impl RingState {
    const fn empty() -> Self {
        RingState {
            read: 0,
            write: 0,
            used: 0,
            capacity: 0,
        }
    }

    fn new(capacity: usize) -> Self {
        RingState {
            read: 0,
            write: 0,
            used: 0,
            capacity,
        }
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.used == 0
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.used == self.capacity
    }

    #[inline]
    #[allow(dead_code)]
    fn remaining(&self) -> usize {
        self.capacity - self.used
    }

    /// Claim the next write slot and advance.
    fn push_slot(&mut self) -> usize {
        debug_assert!(!self.is_full());
        let slot = self.write;
        self.write += 1;
        if self.write == self.capacity {
            self.write = 0;
        }
        self.used += 1;
        slot
    }

    /// Claim the next read slot and advance.
    fn pop_slot(&mut self) -> usize {
        debug_assert!(!self.is_empty());
        let slot = self.read;
        self.read += 1;
        if self.read == self.capacity {
            self.read = 0;
        }
        self.used -= 1;
        slot
    }
}

pub(crate) struct OsQueue {
    buffer: *mut u8,
    elem_size: usize,
    ring: RingState,
    readers: WaitList,
    writers: WaitList,
    in_use: bool,
}

impl OsQueue {
    const fn new() -> Self {
        OsQueue {
            buffer: core::ptr::null_mut(),
            elem_size: 0,
            ring: RingState::empty(),
            readers: WaitList::new(),
            writers: WaitList::new(),
            in_use: false,
        }
    }

    #[inline]
    fn slot_ptr(&self, index: usize) -> *mut u8 {
        unsafe { self.buffer.add(index * self.elem_size) }
    }
}

unsafe impl Send for OsQueue {}

const INIT: OsQueue = OsQueue::new();
static QUEUE_POOL: CsCell<[OsQueue; CFG_QUEUE_NUM]> = CsCell::new([INIT; CFG_QUEUE_NUM]);

pub(crate) fn init() {
    let pool = unsafe { QUEUE_POOL.get_unchecked() };
    for queue in pool.iter_mut() {
        *queue = OsQueue::new();
    }
}

/// Handle to a queue pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueHandle(usize);

/// Allocate a queue of `capacity` elements of `elem_size` bytes each.
/// The backing buffer comes from the kernel heap.
pub fn os_queue_create(elem_size: usize, capacity: usize) -> OsResult<QueueHandle> {
    if is_isr_context() {
        return Err(OsError::InIsr);
    }
    if elem_size == 0 || capacity == 0 {
        return Err(OsError::InvalidParam);
    }

    let bytes = elem_size.checked_mul(capacity).ok_or(OsError::InvalidParam)?;
    let buffer = crate::mem::os_mem_alloc(bytes);
    if buffer.is_null() {
        return Err(OsError::NoMemory);
    }

    let created = critical_section(|cs| {
        let pool = QUEUE_POOL.get(cs);
        let slot = pool
            .iter()
            .position(|q| !q.in_use)
            .ok_or(OsError::ResourceUnavailable)?;

        let queue = &mut pool[slot];
        queue.buffer = buffer;
        queue.elem_size = elem_size;
        queue.ring = RingState::new(capacity);
        queue.readers.init();
        queue.writers.init();
        queue.in_use = true;
        Ok(QueueHandle(slot))
    });

    if created.is_err() {
        crate::mem::os_mem_free(buffer);
    }
    created
}

impl QueueHandle {
    /// Copy a message into the queue, waiting forever for space.
    pub fn write(self, buf: &[u8]) -> OsResult<()> {
        write_internal(self, buf, BlockKind::Endless, 0)
    }

    /// Copy a message into the queue if space is available now.
    pub fn try_write(self, buf: &[u8]) -> OsResult<()> {
        write_internal(self, buf, BlockKind::Timeout, 0)
    }

    /// Copy a message into the queue, waiting at most `timeout` ticks
    /// for space.
    pub fn write_timeout(self, buf: &[u8], timeout: OsTick) -> OsResult<()> {
        if timeout >= TIMEOUT_MAX {
            return Err(OsError::OutOfRange);
        }
        write_internal(self, buf, BlockKind::Timeout, timeout)
    }

    /// Copy the oldest message out of the queue, waiting forever for
    /// data. `buf.len()` bytes are copied.
    pub fn read(self, buf: &mut [u8]) -> OsResult<()> {
        read_internal(self, buf, BlockKind::Endless, 0)
    }

    /// Copy the oldest message out of the queue if one is present.
    pub fn try_read(self, buf: &mut [u8]) -> OsResult<()> {
        read_internal(self, buf, BlockKind::Timeout, 0)
    }

    /// Copy the oldest message out of the queue, waiting at most
    /// `timeout` ticks for data.
    pub fn read_timeout(self, buf: &mut [u8], timeout: OsTick) -> OsResult<()> {
        if timeout >= TIMEOUT_MAX {
            return Err(OsError::OutOfRange);
        }
        read_internal(self, buf, BlockKind::Timeout, timeout)
    }

    /// Tear the queue down and release its buffer. Fails while any
    /// task waits on it or messages remain.
    pub fn destroy(self) -> OsResult<()> {
        if self.0 >= CFG_QUEUE_NUM {
            return Err(OsError::InvalidHandle);
        }
        if is_isr_context() {
            return Err(OsError::InIsr);
        }

        let buffer = critical_section(|cs| {
            let queue = &mut QUEUE_POOL.get(cs)[self.0];
            if !queue.in_use {
                return Err(OsError::InvalidState);
            }
            if !queue.readers.is_empty() || !queue.writers.is_empty() {
                return Err(OsError::InvalidState);
            }
            if !queue.ring.is_empty() {
                return Err(OsError::InvalidState);
            }

            let buffer = queue.buffer;
            *queue = OsQueue::new();
            Ok(buffer)
        })?;

        crate::mem::os_mem_free(buffer);
        Ok(())
    }

    /// Number of queued messages.
    pub fn len(self) -> OsResult<usize> {
        if self.0 >= CFG_QUEUE_NUM {
            return Err(OsError::InvalidHandle);
        }
        critical_section(|cs| {
            let queue = &QUEUE_POOL.get(cs)[self.0];
            if !queue.in_use {
                return Err(OsError::InvalidState);
            }
            Ok(queue.ring.used)
        })
    }

    /// Whether the queue currently holds no messages.
    pub fn is_empty(self) -> OsResult<bool> {
        Ok(self.len()? == 0)
    }
}

fn write_internal(
    handle: QueueHandle,
    buf: &[u8],
    kind: BlockKind,
    timeout: OsTick,
) -> OsResult<()> {
    if handle.0 >= CFG_QUEUE_NUM {
        return Err(OsError::InvalidHandle);
    }
    if is_isr_context() {
        return Err(OsError::InIsr);
    }
    if buf.is_empty() {
        return Err(OsError::InvalidParam);
    }

    let mut cs = CriticalSection::enter();

    let queue = unsafe { &mut QUEUE_POOL.get_unchecked()[handle.0] };
    if !queue.in_use {
        return Err(OsError::InvalidState);
    }
    if buf.len() > queue.elem_size {
        return Err(OsError::QueueSizeMismatch);
    }

    // Re-checked after every wakeup: another writer may have raced us
    // to the slot that just opened up.
    while queue.ring.is_full() {
        if kind == BlockKind::Timeout && timeout == 0 {
            return Err(OsError::Failed);
        }
        if !kernel::KERNEL.is_running() || sched::is_suspended() {
            return Err(OsError::InvalidState);
        }

        let cur = kernel::tcb_cur_ptr().ok_or(OsError::TaskInvalid)?;
        unsafe {
            let cur_ref = &mut *cur.as_ptr();
            cur_ref.pend_status = PendStatus::Ok;
            if kind == BlockKind::Timeout {
                cur_ref.wake_up_time = time::os_time_get().wrapping_add(timeout);
            }
            sched::ready_to_block(cur, &mut queue.writers, kind, WaitOrder::Prio);
        }
        sched::schedule();

        // Leaving the critical section lets the pended switch happen;
        // re-enter once this task is woken.
        drop(cs);
        cs = CriticalSection::enter();

        if unsafe { cur.as_ref().pend_status } == PendStatus::Timeout {
            return Err(OsError::Timeout);
        }
    }

    let slot = queue.ring.push_slot();
    unsafe {
        core::ptr::copy_nonoverlapping(buf.as_ptr(), queue.slot_ptr(slot), buf.len());
    }

    if let Some(reader) = queue.readers.head() {
        unsafe {
            (*reader.as_ptr()).pend_status = PendStatus::Ok;
            sched::block_to_ready(reader);
        }
        sched::schedule();
    }

    drop(cs);
    Ok(())
}

fn read_internal(
    handle: QueueHandle,
    buf: &mut [u8],
    kind: BlockKind,
    timeout: OsTick,
) -> OsResult<()> {
    if handle.0 >= CFG_QUEUE_NUM {
        return Err(OsError::InvalidHandle);
    }
    if is_isr_context() {
        return Err(OsError::InIsr);
    }
    if buf.is_empty() {
        return Err(OsError::InvalidParam);
    }

    let mut cs = CriticalSection::enter();

    let queue = unsafe { &mut QUEUE_POOL.get_unchecked()[handle.0] };
    if !queue.in_use {
        return Err(OsError::InvalidState);
    }
    if buf.len() > queue.elem_size {
        return Err(OsError::QueueSizeMismatch);
    }

    while queue.ring.is_empty() {
        if kind == BlockKind::Timeout && timeout == 0 {
            return Err(OsError::Failed);
        }
        if !kernel::KERNEL.is_running() || sched::is_suspended() {
            return Err(OsError::InvalidState);
        }

        let cur = kernel::tcb_cur_ptr().ok_or(OsError::TaskInvalid)?;
        unsafe {
            let cur_ref = &mut *cur.as_ptr();
            cur_ref.pend_status = PendStatus::Ok;
            if kind == BlockKind::Timeout {
                cur_ref.wake_up_time = time::os_time_get().wrapping_add(timeout);
            }
            sched::ready_to_block(cur, &mut queue.readers, kind, WaitOrder::Prio);
        }
        sched::schedule();

        drop(cs);
        cs = CriticalSection::enter();

        if unsafe { cur.as_ref().pend_status } == PendStatus::Timeout {
            return Err(OsError::Timeout);
        }
    }

    let slot = queue.ring.pop_slot();
    unsafe {
        core::ptr::copy_nonoverlapping(queue.slot_ptr(slot), buf.as_mut_ptr(), buf.len());
    }

    if let Some(writer) = queue.writers.head() {
        unsafe {
            (*writer.as_ptr()).pend_status = PendStatus::Ok;
            sched::block_to_ready(writer);
        }
        sched::schedule();
    }

    drop(cs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_full_and_empty_are_distinct() {
        let mut ring = RingState::new(4);
        assert!(ring.is_empty());
        assert!(!ring.is_full());

        for expect in 0..4 {
            assert_eq!(ring.push_slot(), expect);
        }
        assert!(ring.is_full());
        assert!(!ring.is_empty());
        assert_eq!(ring.remaining(), 0);
        // read == write here, yet the ring is full, not empty
        assert_eq!(ring.read, ring.write);
    }

    #[test]
    fn ring_wraps_in_fifo_order() {
        let mut ring = RingState::new(3);

        assert_eq!(ring.push_slot(), 0);
        assert_eq!(ring.push_slot(), 1);
        assert_eq!(ring.pop_slot(), 0);
        assert_eq!(ring.push_slot(), 2);
        assert_eq!(ring.push_slot(), 0); // wrapped
        assert!(ring.is_full());

        assert_eq!(ring.pop_slot(), 1);
        assert_eq!(ring.pop_slot(), 2);
        assert_eq!(ring.pop_slot(), 0);
        assert!(ring.is_empty());
    }
}
