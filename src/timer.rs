//! Software timers.
//!
//! Running timers sit on a single list sorted ascending by expiry, so
//! the per-tick service only inspects the head. Expired timers are
//! drained into a local list under the critical section and their
//! handlers run with the section *released*: callbacks must never
//! stretch kernel critical sections. After each handler the timer is
//! re-armed (auto-reload) or left stopped (one-shot) under a fresh
//! critical section.

use core::ptr::NonNull;

use crate::config::CFG_TIMER_NUM;
use crate::core::time::{self, TIMEOUT_MAX};
use crate::critical::{critical_section, is_isr_context, CriticalSection, CsCell};
use crate::error::{OsError, OsResult};
use crate::types::OsTick;

/// Timer callback. Runs outside the kernel critical section, in the
/// context that drives the tick.
pub type TimerFn = fn(*mut ());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TimerMode {
    /// Fire once, then stop
    OneShot = 0,
    /// Re-arm after every expiry
    AutoReload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum TimerStatus {
    Stopped = 0,
    Running,
}

pub(crate) struct OsTimer {
    next: Option<NonNull<OsTimer>>,
    prev: Option<NonNull<OsTimer>>,
    status: TimerStatus,
    mode: TimerMode,
    interval: OsTick,
    /// Absolute tick of the next expiry
    expiry: OsTick,
    handler: Option<TimerFn>,
    arg: *mut (),
    in_use: bool,
}

impl OsTimer {
    const fn new() -> Self {
        OsTimer {
            next: None,
            prev: None,
            status: TimerStatus::Stopped,
            mode: TimerMode::OneShot,
            interval: 0,
            expiry: 0,
            handler: None,
            arg: core::ptr::null_mut(),
            in_use: false,
        }
    }
}

unsafe impl Send for OsTimer {}

/// Intrusive timer list; kept sorted by expiry when used as the
/// running list, insertion-ordered when used as a drain list.
struct TimerList {
    head: Option<NonNull<OsTimer>>,
    tail: Option<NonNull<OsTimer>>,
}

impl TimerList {
    const fn new() -> Self {
        TimerList { head: None, tail: None }
    }

    #[inline]
    fn head(&self) -> Option<NonNull<OsTimer>> {
        self.head
    }

    fn insert_tail(&mut self, timer: NonNull<OsTimer>) {
        let t = unsafe { &mut *timer.as_ptr() };
        t.next = None;
        t.prev = self.tail;
        match self.tail {
            Some(tail) => unsafe { (*tail.as_ptr()).next = Some(timer) },
            None => self.head = Some(timer),
        }
        self.tail = Some(timer);
    }

    /// Insert sorted ascending by expiry, wrap-safe.
    fn insert_by_expiry(&mut self, timer: NonNull<OsTimer>) {
        let expiry = unsafe { timer.as_ref().expiry };

        let mut cursor = self.head;
        while let Some(cur) = cursor {
            let cur_ref = unsafe { cur.as_ref() };
            if time::before(expiry, cur_ref.expiry) {
                // insert before the first timer expiring later
                let t = unsafe { &mut *timer.as_ptr() };
                t.next = Some(cur);
                t.prev = cur_ref.prev;
                match cur_ref.prev {
                    Some(prev) => unsafe { (*prev.as_ptr()).next = Some(timer) },
                    None => self.head = Some(timer),
                }
                unsafe { (*cur.as_ptr()).prev = Some(timer) };
                return;
            }
            cursor = cur_ref.next;
        }
        self.insert_tail(timer);
    }

    fn remove(&mut self, timer: NonNull<OsTimer>) {
        let t = unsafe { &mut *timer.as_ptr() };
        match t.prev {
            Some(prev) => unsafe { (*prev.as_ptr()).next = t.next },
            None => self.head = t.next,
        }
        match t.next {
            Some(next) => unsafe { (*next.as_ptr()).prev = t.prev },
            None => self.tail = t.prev,
        }
        t.next = None;
        t.prev = None;
    }
}

struct TimerManager {
    running: TimerList,
    pool: [OsTimer; CFG_TIMER_NUM],
}

static TIMERS: CsCell<TimerManager> = CsCell::new(TimerManager {
    running: TimerList::new(),
    pool: [const { OsTimer::new() }; CFG_TIMER_NUM],
});

pub(crate) fn init() {
    let mgr = unsafe { TIMERS.get_unchecked() };
    mgr.running = TimerList::new();
    for timer in mgr.pool.iter_mut() {
        *timer = OsTimer::new();
    }
}

/// Handle to a timer pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(usize);

/// Allocate a timer. `interval` must be non-zero and below the
/// admissible timeout ceiling; the timer starts out stopped.
pub fn os_timer_create(
    mode: TimerMode,
    interval: OsTick,
    handler: TimerFn,
    arg: *mut (),
) -> OsResult<TimerHandle> {
    if is_isr_context() {
        return Err(OsError::InIsr);
    }
    if interval == 0 || interval >= TIMEOUT_MAX {
        return Err(OsError::OutOfRange);
    }

    critical_section(|cs| {
        let mgr = TIMERS.get(cs);
        let slot = mgr
            .pool
            .iter()
            .position(|t| !t.in_use)
            .ok_or(OsError::ResourceUnavailable)?;

        let timer = &mut mgr.pool[slot];
        *timer = OsTimer::new();
        timer.mode = mode;
        timer.interval = interval;
        timer.handler = Some(handler);
        timer.arg = arg;
        timer.in_use = true;
        Ok(TimerHandle(slot))
    })
}

impl TimerHandle {
    /// (Re)start the timer: the next expiry is `now + interval`.
    pub fn start(self) -> OsResult<()> {
        if self.0 >= CFG_TIMER_NUM {
            return Err(OsError::InvalidHandle);
        }
        if is_isr_context() {
            return Err(OsError::InIsr);
        }

        critical_section(|cs| {
            let mgr = TIMERS.get(cs);
            let timer_ptr = NonNull::from(&mut mgr.pool[self.0]);
            let timer = &mut mgr.pool[self.0];
            if !timer.in_use {
                return Err(OsError::InvalidState);
            }

            if timer.status == TimerStatus::Running {
                mgr.running.remove(timer_ptr);
            }

            timer.expiry = time::os_time_get().wrapping_add(timer.interval);
            timer.status = TimerStatus::Running;
            mgr.running.insert_by_expiry(timer_ptr);
            Ok(())
        })
    }

    /// Stop the timer without releasing its slot.
    pub fn stop(self) -> OsResult<()> {
        if self.0 >= CFG_TIMER_NUM {
            return Err(OsError::InvalidHandle);
        }
        if is_isr_context() {
            return Err(OsError::InIsr);
        }

        critical_section(|cs| {
            let mgr = TIMERS.get(cs);
            let timer_ptr = NonNull::from(&mut mgr.pool[self.0]);
            let timer = &mut mgr.pool[self.0];
            if !timer.in_use {
                return Err(OsError::InvalidState);
            }
            if timer.status == TimerStatus::Stopped {
                return Err(OsError::InvalidState);
            }

            mgr.running.remove(timer_ptr);
            timer.status = TimerStatus::Stopped;
            Ok(())
        })
    }

    /// Stop the timer and return its slot to the pool.
    pub fn delete(self) -> OsResult<()> {
        if self.0 >= CFG_TIMER_NUM {
            return Err(OsError::InvalidHandle);
        }
        if is_isr_context() {
            return Err(OsError::InIsr);
        }

        critical_section(|cs| {
            let mgr = TIMERS.get(cs);
            let timer_ptr = NonNull::from(&mut mgr.pool[self.0]);
            let timer = &mut mgr.pool[self.0];
            if !timer.in_use {
                return Err(OsError::InvalidState);
            }

            if timer.status == TimerStatus::Running {
                mgr.running.remove(timer_ptr);
                timer.status = TimerStatus::Stopped;
            }
            timer.in_use = false;
            Ok(())
        })
    }

    /// Change the interval, preserving the running state: a running
    /// timer is re-armed with the new interval from now.
    pub fn reset(self, new_interval: OsTick) -> OsResult<()> {
        if self.0 >= CFG_TIMER_NUM {
            return Err(OsError::InvalidHandle);
        }
        if is_isr_context() {
            return Err(OsError::InIsr);
        }
        if new_interval == 0 || new_interval >= TIMEOUT_MAX {
            return Err(OsError::OutOfRange);
        }

        critical_section(|cs| {
            let mgr = TIMERS.get(cs);
            let timer_ptr = NonNull::from(&mut mgr.pool[self.0]);
            let timer = &mut mgr.pool[self.0];
            if !timer.in_use {
                return Err(OsError::InvalidState);
            }

            let was_running = timer.status == TimerStatus::Running;
            if was_running {
                mgr.running.remove(timer_ptr);
            }

            timer.interval = new_interval;

            if was_running {
                timer.expiry = time::os_time_get().wrapping_add(new_interval);
                mgr.running.insert_by_expiry(timer_ptr);
            }
            Ok(())
        })
    }

    /// Ticks until the next expiry; zero once the expiry has passed.
    /// Fails on a stopped timer.
    pub fn remaining(self) -> OsResult<OsTick> {
        if self.0 >= CFG_TIMER_NUM {
            return Err(OsError::InvalidHandle);
        }

        critical_section(|cs| {
            let timer = &TIMERS.get(cs).pool[self.0];
            if !timer.in_use {
                return Err(OsError::InvalidState);
            }
            if timer.status != TimerStatus::Running {
                return Err(OsError::InvalidState);
            }

            let now = time::os_time_get();
            if time::before(now, timer.expiry) {
                Ok(timer.expiry.wrapping_sub(now))
            } else {
                Ok(0)
            }
        })
    }
}

/// Tick-driven timer service.
///
/// Drains every timer whose expiry has been reached into a local list
/// under the critical section, then runs the handlers with the section
/// released. Re-arming happens under a fresh critical section after
/// each handler; a handler that restarted or deleted its own timer is
/// left alone.
#[doc(hidden)]
pub fn service(now: OsTick) {
    let mut expired = TimerList::new();

    {
        let _cs = CriticalSection::enter();
        let mgr = unsafe { TIMERS.get_unchecked() };

        while let Some(head) = mgr.running.head() {
            let head_ref = unsafe { &mut *head.as_ptr() };
            if !time::reached(now, head_ref.expiry) {
                break;
            }
            mgr.running.remove(head);
            head_ref.status = TimerStatus::Stopped;
            expired.insert_tail(head);
        }
    }

    while let Some(timer_ptr) = expired.head() {
        expired.remove(timer_ptr);

        let (handler, arg) = {
            let timer = unsafe { timer_ptr.as_ref() };
            (timer.handler, timer.arg)
        };
        if let Some(handler) = handler {
            handler(arg);
        }

        let _cs = CriticalSection::enter();
        let mgr = unsafe { TIMERS.get_unchecked() };
        let timer = unsafe { &mut *timer_ptr.as_ptr() };
        if timer.in_use && timer.mode == TimerMode::AutoReload && timer.status == TimerStatus::Stopped
        {
            timer.expiry = time::os_time_get().wrapping_add(timer.interval);
            timer.status = TimerStatus::Running;
            mgr.running.insert_by_expiry(timer_ptr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static FIRED: AtomicU32 = AtomicU32::new(0);

    fn count_up(_arg: *mut ()) {
        FIRED.fetch_add(1, Ordering::SeqCst);
    }

    // Single test so the global manager and time base see one
    // deterministic sequence.
    #[test]
    fn timer_lifecycle_and_service() {
        init();
        FIRED.store(0, Ordering::SeqCst);
        let base = time::os_time_get();

        assert!(matches!(
            os_timer_create(TimerMode::OneShot, 0, count_up, core::ptr::null_mut()),
            Err(OsError::OutOfRange)
        ));

        let auto = os_timer_create(TimerMode::AutoReload, 10, count_up, core::ptr::null_mut())
            .expect("create auto-reload");
        let once = os_timer_create(TimerMode::OneShot, 25, count_up, core::ptr::null_mut())
            .expect("create one-shot");

        // Not started yet: remaining() refuses, service fires nothing.
        assert!(matches!(auto.remaining(), Err(OsError::InvalidState)));
        service(base.wrapping_add(100));
        assert_eq!(FIRED.load(Ordering::SeqCst), 0);

        auto.start().expect("start auto");
        once.start().expect("start once");
        assert!(auto.remaining().expect("remaining") <= 10);

        // Just before the first expiry nothing fires.
        service(base.wrapping_add(9));
        assert_eq!(FIRED.load(Ordering::SeqCst), 0);

        // First expiry: only the auto-reload timer fires and re-arms.
        service(base.wrapping_add(10));
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);

        // The one-shot fires once and stays stopped afterwards.
        // (Time has not advanced, so the reloaded auto timer fires
        // again too: expiry chains from the current tick counter.)
        service(base.wrapping_add(25));
        let after_both = FIRED.load(Ordering::SeqCst);
        assert!(after_both >= 2);
        assert!(matches!(once.remaining(), Err(OsError::InvalidState)));

        // Stopping the auto timer silences it.
        auto.stop().expect("stop auto");
        let settled = FIRED.load(Ordering::SeqCst);
        service(base.wrapping_add(200));
        assert_eq!(FIRED.load(Ordering::SeqCst), settled);

        // Double stop is a state error; delete releases the slots.
        assert!(matches!(auto.stop(), Err(OsError::InvalidState)));
        auto.delete().expect("delete auto");
        once.delete().expect("delete once");
        assert!(matches!(auto.start(), Err(OsError::InvalidState)));
    }
}
