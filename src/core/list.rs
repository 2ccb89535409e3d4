//! Intrusive task lists.
//!
//! Both list types thread through link fields embedded in the TCB, so
//! membership costs no allocation and insert/remove are O(1) pointer
//! surgery. A TCB carries two independent link pairs and can therefore
//! be on one state list and one event waiter list simultaneously, which
//! is exactly the shape of a timed blocking wait.

use core::ptr::NonNull;

use crate::core::time;
use crate::task::OsTcb;

/// State list: ready (per priority), delay, suspend, timeout-blocked.
///
/// Threads through `state_next`/`state_prev`. The delay and
/// timeout-blocked lists are kept sorted ascending by wake-up time so
/// the tick scanner only ever looks at the head.
#[derive(Clone, Copy)]
pub struct TaskList {
    head: Option<NonNull<OsTcb>>,
    tail: Option<NonNull<OsTcb>>,
}

impl TaskList {
    pub const fn new() -> Self {
        TaskList { head: None, tail: None }
    }

    pub fn init(&mut self) {
        self.head = None;
        self.tail = None;
    }

    #[inline]
    pub fn head(&self) -> Option<NonNull<OsTcb>> {
        self.head
    }

    #[inline]
    pub fn tail(&self) -> Option<NonNull<OsTcb>> {
        self.tail
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Append at the tail.
    ///
    /// The TCB must not be on any state list; callers hold the
    /// critical section.
    pub fn insert_tail(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        tcb_ref.state_next = None;
        tcb_ref.state_prev = self.tail;

        match self.tail {
            Some(tail) => unsafe { (*tail.as_ptr()).state_next = Some(tcb) },
            None => self.head = Some(tcb),
        }
        self.tail = Some(tcb);
    }

    /// Insert sorted ascending by `wake_up_time`, wrap-safe. Ties go
    /// after existing entries with the same deadline.
    pub fn insert_by_wake_time(&mut self, tcb: NonNull<OsTcb>) {
        let wake = unsafe { tcb.as_ref().wake_up_time };

        let mut cursor = self.head;
        while let Some(cur) = cursor {
            let cur_ref = unsafe { cur.as_ref() };
            if time::reached(cur_ref.wake_up_time, wake) {
                // cur wakes at or after the new entry: insert before it
                self.insert_before(tcb, cur);
                return;
            }
            cursor = cur_ref.state_next;
        }
        self.insert_tail(tcb);
    }

    fn insert_before(&mut self, tcb: NonNull<OsTcb>, at: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        let at_ref = unsafe { &mut *at.as_ptr() };

        tcb_ref.state_next = Some(at);
        tcb_ref.state_prev = at_ref.state_prev;

        match at_ref.state_prev {
            Some(prev) => unsafe { (*prev.as_ptr()).state_next = Some(tcb) },
            None => self.head = Some(tcb),
        }
        at_ref.state_prev = Some(tcb);
    }

    /// Unlink a TCB that is on this list.
    pub fn remove(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        match tcb_ref.state_prev {
            Some(prev) => unsafe { (*prev.as_ptr()).state_next = tcb_ref.state_next },
            None => self.head = tcb_ref.state_next,
        }
        match tcb_ref.state_next {
            Some(next) => unsafe { (*next.as_ptr()).state_prev = tcb_ref.state_prev },
            None => self.tail = tcb_ref.state_prev,
        }

        tcb_ref.state_next = None;
        tcb_ref.state_prev = None;
    }

    /// Rotate: unlink and re-append at the tail.
    pub fn move_to_tail(&mut self, tcb: NonNull<OsTcb>) {
        self.remove(tcb);
        self.insert_tail(tcb);
    }
}

impl Default for TaskList {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: lists are only mutated inside the critical section.
unsafe impl Send for TaskList {}
unsafe impl Sync for TaskList {}

/// Event waiter list for semaphores, mutexes and queues.
///
/// Threads through `event_next`/`event_prev` and records itself in the
/// TCB's `wait_list` back-reference so a timed-out waiter can be
/// unlinked by the tick scanner without knowing which object it was
/// parked on.
pub struct WaitList {
    head: Option<NonNull<OsTcb>>,
    tail: Option<NonNull<OsTcb>>,
}

impl WaitList {
    pub const fn new() -> Self {
        WaitList { head: None, tail: None }
    }

    pub fn init(&mut self) {
        self.head = None;
        self.tail = None;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub fn head(&self) -> Option<NonNull<OsTcb>> {
        self.head
    }

    /// FIFO discipline: append at the tail.
    pub fn insert_tail(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        tcb_ref.event_next = None;
        tcb_ref.event_prev = self.tail;
        tcb_ref.wait_list = self as *mut WaitList;

        match self.tail {
            Some(tail) => unsafe { (*tail.as_ptr()).event_next = Some(tcb) },
            None => self.head = Some(tcb),
        }
        self.tail = Some(tcb);
    }

    /// Priority discipline: highest priority (numerically lowest) at
    /// the head, FIFO among equals.
    pub fn insert_by_prio(&mut self, tcb: NonNull<OsTcb>) {
        let prio = unsafe { tcb.as_ref().prio };

        let mut cursor = self.head;
        let mut prev: Option<NonNull<OsTcb>> = None;
        while let Some(cur) = cursor {
            let cur_ref = unsafe { cur.as_ref() };
            if prio < cur_ref.prio {
                break;
            }
            prev = cursor;
            cursor = cur_ref.event_next;
        }

        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        tcb_ref.event_prev = prev;
        tcb_ref.event_next = cursor;
        tcb_ref.wait_list = self as *mut WaitList;

        match prev {
            Some(p) => unsafe { (*p.as_ptr()).event_next = Some(tcb) },
            None => self.head = Some(tcb),
        }
        match cursor {
            Some(c) => unsafe { (*c.as_ptr()).event_prev = Some(tcb) },
            None => self.tail = Some(tcb),
        }
    }

    /// Unlink a waiter and clear its back-reference.
    pub fn remove(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        match tcb_ref.event_prev {
            Some(prev) => unsafe { (*prev.as_ptr()).event_next = tcb_ref.event_next },
            None => self.head = tcb_ref.event_next,
        }
        match tcb_ref.event_next {
            Some(next) => unsafe { (*next.as_ptr()).event_prev = tcb_ref.event_prev },
            None => self.tail = tcb_ref.event_prev,
        }

        tcb_ref.event_next = None;
        tcb_ref.event_prev = None;
        tcb_ref.wait_list = core::ptr::null_mut();
    }
}

impl Default for WaitList {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for WaitList {}
unsafe impl Sync for WaitList {}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcb(prio: u8, wake: u32) -> OsTcb {
        let mut t = OsTcb::new();
        t.prio = prio;
        t.base_prio = prio;
        t.wake_up_time = wake;
        t
    }

    #[test]
    fn task_list_fifo_and_rotate() {
        let mut a = tcb(1, 0);
        let mut b = tcb(1, 0);
        let mut c = tcb(1, 0);
        let (pa, pb, pc) = (
            NonNull::from(&mut a),
            NonNull::from(&mut b),
            NonNull::from(&mut c),
        );

        let mut list = TaskList::new();
        assert!(list.is_empty());

        list.insert_tail(pa);
        list.insert_tail(pb);
        list.insert_tail(pc);
        assert_eq!(list.head(), Some(pa));
        assert_eq!(list.tail(), Some(pc));

        list.move_to_tail(pa);
        assert_eq!(list.head(), Some(pb));
        assert_eq!(list.tail(), Some(pa));

        list.remove(pb);
        assert_eq!(list.head(), Some(pc));
        list.remove(pc);
        list.remove(pa);
        assert!(list.is_empty());
    }

    #[test]
    fn task_list_sorted_by_wake_time() {
        let mut a = tcb(1, 30);
        let mut b = tcb(1, 10);
        let mut c = tcb(1, 20);
        let (pa, pb, pc) = (
            NonNull::from(&mut a),
            NonNull::from(&mut b),
            NonNull::from(&mut c),
        );

        let mut list = TaskList::new();
        list.insert_by_wake_time(pa);
        list.insert_by_wake_time(pb);
        list.insert_by_wake_time(pc);

        assert_eq!(list.head(), Some(pb));
        list.remove(pb);
        assert_eq!(list.head(), Some(pc));
        list.remove(pc);
        assert_eq!(list.head(), Some(pa));
    }

    #[test]
    fn task_list_sorted_handles_tick_wrap() {
        // 0xFFFF_FFF0 comes before 0x10 once the counter wraps
        let mut a = tcb(1, 0x10);
        let mut b = tcb(1, 0xFFFF_FFF0);
        let (pa, pb) = (NonNull::from(&mut a), NonNull::from(&mut b));

        let mut list = TaskList::new();
        list.insert_by_wake_time(pa);
        list.insert_by_wake_time(pb);

        assert_eq!(list.head(), Some(pb));
    }

    #[test]
    fn wait_list_priority_order_fifo_among_equals() {
        let mut a = tcb(5, 0);
        let mut b = tcb(3, 0);
        let mut c = tcb(5, 0);
        let mut d = tcb(7, 0);
        let (pa, pb, pc, pd) = (
            NonNull::from(&mut a),
            NonNull::from(&mut b),
            NonNull::from(&mut c),
            NonNull::from(&mut d),
        );

        let mut list = WaitList::new();
        list.insert_by_prio(pa);
        list.insert_by_prio(pb);
        list.insert_by_prio(pc);
        list.insert_by_prio(pd);

        // b(3), a(5), c(5), d(7)
        assert_eq!(list.head(), Some(pb));
        list.remove(pb);
        assert_eq!(list.head(), Some(pa));
        list.remove(pa);
        assert_eq!(list.head(), Some(pc));
        list.remove(pc);
        assert_eq!(list.head(), Some(pd));
        list.remove(pd);
        assert!(list.is_empty());
    }

    #[test]
    fn wait_list_back_reference() {
        let mut a = tcb(5, 0);
        let pa = NonNull::from(&mut a);

        let mut list = WaitList::new();
        list.insert_by_prio(pa);
        assert_eq!(a.wait_list, &mut list as *mut WaitList);

        list.remove(pa);
        assert!(a.wait_list.is_null());
    }
}
