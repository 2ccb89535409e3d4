//! Recursive mutexes with chained priority inheritance.
//!
//! A mutex records its owner, the recursion depth, and the owner's
//! priority as of acquisition. Mutexes held by one task form a singly
//! linked list threaded through `next_mutex`, headed by the TCB's
//! `holding_mutex` pointer; while a task is *blocked* on a mutex the
//! same pointer names that mutex instead, which is what lets the
//! inheritance walk follow owner → blocked-on mutex → owner chains.

use core::ptr::NonNull;

use crate::config::{CFG_MUTEX_NUM, CFG_PRIO_IDLE};
use crate::core::list::WaitList;
use crate::core::time::{self, TIMEOUT_MAX};
use crate::critical::{critical_section, is_isr_context, CriticalSection, CsCell};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched;
use crate::task::OsTcb;
use crate::types::{BlockKind, OsPrio, OsTick, PendStatus, WaitOrder};

/// Longest owner chain the inheritance walk will follow. Bounds
/// tick-time work and sidesteps cyclic ownership graphs.
const MAX_CHAIN_DEPTH: u8 = 8;

pub(crate) struct OsMutex {
    wait_list: WaitList,
    owner: Option<NonNull<OsTcb>>,
    hold_count: u32,
    /// Owner priority recorded at acquisition or at the latest boost;
    /// restored on release
    owner_prio: OsPrio,
    /// Next mutex in the owner's held list
    pub(crate) next_mutex: Option<NonNull<OsMutex>>,
    in_use: bool,
}

impl OsMutex {
    const fn new() -> Self {
        OsMutex {
            wait_list: WaitList::new(),
            owner: None,
            hold_count: 0,
            owner_prio: CFG_PRIO_IDLE,
            next_mutex: None,
            in_use: false,
        }
    }
}

unsafe impl Send for OsMutex {}

const INIT: OsMutex = OsMutex::new();
static MUTEX_POOL: CsCell<[OsMutex; CFG_MUTEX_NUM]> = CsCell::new([INIT; CFG_MUTEX_NUM]);

pub(crate) fn init() {
    let pool = unsafe { MUTEX_POOL.get_unchecked() };
    for mutex in pool.iter_mut() {
        *mutex = OsMutex::new();
    }
}

/// Handle to a mutex pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexHandle(usize);

/// Allocate a mutex from the pool.
pub fn os_mutex_create() -> OsResult<MutexHandle> {
    if is_isr_context() {
        return Err(OsError::InIsr);
    }

    critical_section(|cs| {
        let pool = MUTEX_POOL.get(cs);
        let slot = pool
            .iter()
            .position(|m| !m.in_use)
            .ok_or(OsError::ResourceUnavailable)?;

        let mutex = &mut pool[slot];
        *mutex = OsMutex::new();
        mutex.in_use = true;
        Ok(MutexHandle(slot))
    })
}

impl MutexHandle {
    /// Acquire the mutex, waiting forever. Recursive: the owner may
    /// lock again and must unlock as many times.
    pub fn lock(self) -> OsResult<()> {
        lock_internal(self, BlockKind::Endless, 0)
    }

    /// Acquire the mutex if it is free or already owned by the caller.
    pub fn try_lock(self) -> OsResult<()> {
        lock_internal(self, BlockKind::Timeout, 0)
    }

    /// Acquire the mutex, waiting at most `timeout` ticks.
    pub fn lock_timeout(self, timeout: OsTick) -> OsResult<()> {
        if timeout >= TIMEOUT_MAX {
            return Err(OsError::OutOfRange);
        }
        lock_internal(self, BlockKind::Timeout, timeout)
    }

    /// Release the mutex. On the final release the owner's priority
    /// boost is dropped and ownership passes to the highest-priority
    /// waiter, if any.
    pub fn unlock(self) -> OsResult<()> {
        if self.0 >= CFG_MUTEX_NUM {
            return Err(OsError::InvalidHandle);
        }
        if is_isr_context() {
            return Err(OsError::InIsr);
        }

        let _cs = CriticalSection::enter();

        if sched::is_suspended() {
            return Err(OsError::InvalidState);
        }

        let mutex = unsafe { &mut MUTEX_POOL.get_unchecked()[self.0] };
        if !mutex.in_use {
            return Err(OsError::InvalidState);
        }

        let cur = kernel::tcb_cur_ptr().ok_or(OsError::TaskInvalid)?;
        if mutex.hold_count == 0 || mutex.owner != Some(cur) {
            return Err(OsError::NotOwner);
        }

        mutex.hold_count -= 1;
        if mutex.hold_count != 0 {
            return Ok(());
        }

        if unsafe { release_ownership(cur, mutex) } {
            sched::schedule();
        }
        Ok(())
    }

    /// Return the mutex to the pool. Fails while held or contended.
    pub fn destroy(self) -> OsResult<()> {
        if self.0 >= CFG_MUTEX_NUM {
            return Err(OsError::InvalidHandle);
        }
        if is_isr_context() {
            return Err(OsError::InIsr);
        }

        critical_section(|cs| {
            let mutex = &mut MUTEX_POOL.get(cs)[self.0];
            if !mutex.in_use {
                return Err(OsError::InvalidState);
            }
            if mutex.hold_count > 0 || !mutex.wait_list.is_empty() {
                return Err(OsError::InvalidState);
            }
            *mutex = OsMutex::new();
            Ok(())
        })
    }

    /// Whether the mutex is currently held.
    pub fn is_owned(self) -> OsResult<bool> {
        if self.0 >= CFG_MUTEX_NUM {
            return Err(OsError::InvalidHandle);
        }
        critical_section(|cs| {
            let mutex = &MUTEX_POOL.get(cs)[self.0];
            if !mutex.in_use {
                return Err(OsError::InvalidState);
            }
            Ok(mutex.owner.is_some())
        })
    }
}

fn lock_internal(handle: MutexHandle, kind: BlockKind, timeout: OsTick) -> OsResult<()> {
    if handle.0 >= CFG_MUTEX_NUM {
        return Err(OsError::InvalidHandle);
    }
    if is_isr_context() {
        return Err(OsError::InIsr);
    }

    let cs = CriticalSection::enter();

    if sched::is_suspended() {
        return Err(OsError::InvalidState);
    }

    let mutex = unsafe { &mut MUTEX_POOL.get_unchecked()[handle.0] };
    if !mutex.in_use {
        return Err(OsError::InvalidState);
    }

    let cur = kernel::tcb_cur_ptr().ok_or(OsError::TaskInvalid)?;
    let mutex_ptr = NonNull::from(&mut *mutex);

    if mutex.hold_count == 0 {
        let cur_ref = unsafe { &mut *cur.as_ptr() };
        mutex.owner = Some(cur);
        mutex.hold_count = 1;
        mutex.owner_prio = cur_ref.prio;
        mutex.next_mutex = cur_ref.holding_mutex;
        cur_ref.holding_mutex = Some(mutex_ptr);
        return Ok(());
    }

    if mutex.owner == Some(cur) {
        mutex.hold_count = mutex.hold_count.checked_add(1).ok_or(OsError::SyncInvalid)?;
        return Ok(());
    }

    // Contended: a zero timeout means "would block".
    if kind == BlockKind::Timeout && timeout == 0 {
        return Err(OsError::Failed);
    }
    if !kernel::KERNEL.is_running() {
        return Err(OsError::InvalidState);
    }

    unsafe {
        let cur_ref = &mut *cur.as_ptr();
        cur_ref.pend_status = PendStatus::Ok;
        if kind == BlockKind::Timeout {
            cur_ref.wake_up_time = time::os_time_get().wrapping_add(timeout);
        }

        // While blocked, `holding_mutex` names the mutex we wait on so
        // a later waiter can continue the chain through this task.
        cur_ref.holding_mutex = Some(mutex_ptr);
        if cur_ref.prio < mutex.owner_prio {
            inherit_chain(cur_ref.prio, mutex_ptr);
        }

        sched::ready_to_block(cur, &mut mutex.wait_list, kind, WaitOrder::Prio);
    }
    sched::schedule();

    drop(cs);

    let _cs = CriticalSection::enter();
    match unsafe { cur.as_ref().pend_status } {
        PendStatus::Ok => Ok(()),
        PendStatus::Timeout => {
            unsafe { (*cur.as_ptr()).holding_mutex = None };
            Err(OsError::Timeout)
        }
    }
}

/// Raise the priority of a chain of owners to `required`. Starting at
/// `mutex`, boost its owner and follow the mutex that owner is itself
/// blocked on, up to [`MAX_CHAIN_DEPTH`] hops.
///
/// # Safety
/// Caller holds the critical section; `mutex` and every TCB reached
/// are pool/heap objects that stay alive for the kernel's lifetime.
unsafe fn inherit_chain(required: OsPrio, mutex: NonNull<OsMutex>) {
    let mut current = mutex;
    let mut depth = 0u8;

    while depth < MAX_CHAIN_DEPTH {
        let m = unsafe { &mut *current.as_ptr() };
        let Some(owner) = m.owner else {
            break;
        };
        let owner_ref = unsafe { &mut *owner.as_ptr() };

        if owner_ref.prio <= required {
            break;
        }

        unsafe { sched::change_prio(owner, required) };
        m.owner_prio = required;

        match owner_ref.holding_mutex {
            Some(next) if next != current => {
                current = next;
                depth += 1;
            }
            _ => break,
        }
    }
}

/// Complete a final unlock: unlink the mutex from the owner's held
/// list, drop any priority boost, and pass ownership to the highest
/// priority waiter. Returns whether a reschedule is warranted.
///
/// # Safety
/// Caller holds the critical section; `task` is the verified owner.
unsafe fn release_ownership(task: NonNull<OsTcb>, mutex: &mut OsMutex) -> bool {
    let task_ref = unsafe { &mut *task.as_ptr() };
    let mutex_ptr = NonNull::from(&mut *mutex);

    // The mutex may be anywhere on the held list, not only at the head.
    if task_ref.holding_mutex == Some(mutex_ptr) {
        task_ref.holding_mutex = mutex.next_mutex;
    } else {
        let mut cursor = task_ref.holding_mutex;
        while let Some(m) = cursor {
            let m_ref = unsafe { &mut *m.as_ptr() };
            if m_ref.next_mutex == Some(mutex_ptr) {
                m_ref.next_mutex = mutex.next_mutex;
                break;
            }
            cursor = m_ref.next_mutex;
        }
    }

    // Simple restore from the value recorded on the mutex; correct as
    // long as no other still-held mutex is boosting this task.
    if task_ref.base_prio != mutex.owner_prio {
        unsafe { sched::restore_base_prio(task) };
    }

    if let Some(waiter) = mutex.wait_list.head() {
        let waiter_ref = unsafe { &mut *waiter.as_ptr() };

        waiter_ref.holding_mutex = None;
        waiter_ref.pend_status = PendStatus::Ok;
        unsafe { sched::block_to_ready(waiter) };

        mutex.owner = Some(waiter);
        mutex.owner_prio = waiter_ref.prio;
        mutex.hold_count = 1;
        mutex.next_mutex = waiter_ref.holding_mutex;
        waiter_ref.holding_mutex = Some(mutex_ptr);
        true
    } else {
        mutex.owner = None;
        mutex.owner_prio = CFG_PRIO_IDLE;
        mutex.next_mutex = None;
        false
    }
}

/// Effective priority of the current owner, if any; useful when
/// diagnosing priority-inversion scenarios.
pub fn os_mutex_owner_prio(handle: MutexHandle) -> OsResult<Option<OsPrio>> {
    if handle.0 >= CFG_MUTEX_NUM {
        return Err(OsError::InvalidHandle);
    }
    critical_section(|cs| {
        let mutex = &MUTEX_POOL.get(cs)[handle.0];
        if !mutex.in_use {
            return Err(OsError::InvalidState);
        }
        Ok(mutex
            .owner
            .map(|o| unsafe { o.as_ref().prio }))
    })
}
