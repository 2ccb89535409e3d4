//! Counting semaphores.

use crate::config::{CFG_SEM_COUNT_MAX, CFG_SEM_NUM};
use crate::core::list::WaitList;
use crate::core::time::{self, TIMEOUT_MAX};
use crate::critical::{critical_section, is_isr_context, CriticalSection, CsCell};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched;
use crate::types::{BlockKind, OsTick, PendStatus, WaitOrder};

pub(crate) struct OsSem {
    wait_list: WaitList,
    count: u32,
    in_use: bool,
}

impl OsSem {
    const fn new() -> Self {
        OsSem {
            wait_list: WaitList::new(),
            count: 0,
            in_use: false,
        }
    }
}

const INIT: OsSem = OsSem::new();
static SEM_POOL: CsCell<[OsSem; CFG_SEM_NUM]> = CsCell::new([INIT; CFG_SEM_NUM]);

pub(crate) fn init() {
    let pool = unsafe { SEM_POOL.get_unchecked() };
    for sem in pool.iter_mut() {
        *sem = OsSem::new();
    }
}

/// Handle to a semaphore pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemHandle(usize);

/// Allocate a semaphore from the pool with the given initial count.
pub fn os_sem_create(initial: u32) -> OsResult<SemHandle> {
    if is_isr_context() {
        return Err(OsError::InIsr);
    }
    if initial > CFG_SEM_COUNT_MAX {
        return Err(OsError::SyncInvalid);
    }

    critical_section(|cs| {
        let pool = SEM_POOL.get(cs);
        let slot = pool
            .iter()
            .position(|s| !s.in_use)
            .ok_or(OsError::ResourceUnavailable)?;

        let sem = &mut pool[slot];
        sem.wait_list.init();
        sem.count = initial;
        sem.in_use = true;
        Ok(SemHandle(slot))
    })
}

impl SemHandle {
    /// Take the semaphore, waiting forever if necessary.
    pub fn pend(self) -> OsResult<()> {
        pend_internal(self, BlockKind::Endless, 0)
    }

    /// Take the semaphore if it is immediately available.
    pub fn try_pend(self) -> OsResult<()> {
        pend_internal(self, BlockKind::Timeout, 0)
    }

    /// Take the semaphore, waiting at most `timeout` ticks.
    pub fn pend_timeout(self, timeout: OsTick) -> OsResult<()> {
        if timeout >= TIMEOUT_MAX {
            return Err(OsError::OutOfRange);
        }
        pend_internal(self, BlockKind::Timeout, timeout)
    }

    /// Release the semaphore. A waiting task is handed the token
    /// directly (the count is not incremented); otherwise the count
    /// goes up, failing on overflow.
    pub fn post(self) -> OsResult<()> {
        if self.0 >= CFG_SEM_NUM {
            return Err(OsError::InvalidHandle);
        }
        if is_isr_context() {
            return Err(OsError::InIsr);
        }

        let _cs = CriticalSection::enter();

        let sem = unsafe { &mut SEM_POOL.get_unchecked()[self.0] };
        if !sem.in_use {
            return Err(OsError::InvalidState);
        }

        if let Some(waiter) = sem.wait_list.head() {
            unsafe {
                (*waiter.as_ptr()).pend_status = PendStatus::Ok;
                sched::block_to_ready(waiter);
            }
            sched::schedule();
        } else {
            if sem.count == CFG_SEM_COUNT_MAX {
                return Err(OsError::SyncInvalid);
            }
            sem.count += 1;
        }

        Ok(())
    }

    /// Tear the semaphore down. Every waiter is woken and observes a
    /// timeout, then the slot is returned to the pool.
    pub fn destroy(self) -> OsResult<()> {
        if self.0 >= CFG_SEM_NUM {
            return Err(OsError::InvalidHandle);
        }
        if is_isr_context() {
            return Err(OsError::InIsr);
        }

        let _cs = CriticalSection::enter();

        let sem = unsafe { &mut SEM_POOL.get_unchecked()[self.0] };
        if !sem.in_use {
            return Err(OsError::InvalidState);
        }

        while let Some(waiter) = sem.wait_list.head() {
            unsafe {
                (*waiter.as_ptr()).pend_status = PendStatus::Timeout;
                sched::block_to_ready(waiter);
            }
        }

        sem.count = 0;
        sem.in_use = false;

        sched::schedule();
        Ok(())
    }

    /// Current count.
    pub fn count(self) -> OsResult<u32> {
        if self.0 >= CFG_SEM_NUM {
            return Err(OsError::InvalidHandle);
        }
        critical_section(|cs| {
            let sem = &SEM_POOL.get(cs)[self.0];
            if !sem.in_use {
                return Err(OsError::InvalidState);
            }
            Ok(sem.count)
        })
    }
}

fn pend_internal(handle: SemHandle, kind: BlockKind, timeout: OsTick) -> OsResult<()> {
    if handle.0 >= CFG_SEM_NUM {
        return Err(OsError::InvalidHandle);
    }
    if is_isr_context() {
        return Err(OsError::InIsr);
    }

    let cs = CriticalSection::enter();

    let sem = unsafe { &mut SEM_POOL.get_unchecked()[handle.0] };
    if !sem.in_use {
        return Err(OsError::InvalidState);
    }

    if sem.count > 0 {
        sem.count -= 1;
        return Ok(());
    }

    // Nothing available: a zero timeout means "would block".
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
        sched::ready_to_block(cur, &mut sem.wait_list, kind, WaitOrder::Prio);
    }
    sched::schedule();

    // Leaving the critical section lets the pended switch happen; we
    // come back here once this task is woken.
    drop(cs);

    let _cs = CriticalSection::enter();
    match unsafe { cur.as_ref().pend_status } {
        PendStatus::Ok => Ok(()),
        PendStatus::Timeout => Err(OsError::Timeout),
    }
}
