//! Kernel time base.
//!
//! Two monotonically increasing 32-bit counters advance together on
//! every tick: `current_time` drives wake-up comparisons, while
//! `total_run_time` feeds the run-time statistics. Wrap-around is
//! handled by signed subtraction, which bounds every admissible
//! timeout to [`TIMEOUT_MAX`].

use core::sync::atomic::{AtomicU32, Ordering};

use crate::critical::{is_isr_context, CriticalSection};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched;
use crate::types::OsTick;

/// Largest admissible delay or timeout in ticks. Anything at or above
/// this cannot be distinguished from a wrapped deadline.
pub const TIMEOUT_MAX: OsTick = u32::MAX / 2;

static CURRENT_TIME: AtomicU32 = AtomicU32::new(0);
static TOTAL_RUN_TIME: AtomicU32 = AtomicU32::new(0);

pub(crate) fn init() {
    CURRENT_TIME.store(0, Ordering::SeqCst);
    TOTAL_RUN_TIME.store(0, Ordering::SeqCst);
}

/// Advance both counters by one tick.
#[inline]
pub(crate) fn advance() {
    CURRENT_TIME.fetch_add(1, Ordering::Relaxed);
    TOTAL_RUN_TIME.fetch_add(1, Ordering::Relaxed);
}

/// Current kernel time in ticks.
#[inline]
pub fn os_time_get() -> OsTick {
    CURRENT_TIME.load(Ordering::Relaxed)
}

/// Total run time in ticks, for statistics.
#[inline]
pub fn os_total_run_time() -> OsTick {
    TOTAL_RUN_TIME.load(Ordering::Relaxed)
}

/// `now` has reached (or passed) `target`, wrap-safe.
#[inline]
pub(crate) fn reached(now: OsTick, target: OsTick) -> bool {
    now.wrapping_sub(target) as i32 >= 0
}

/// `now` is strictly before `target`, wrap-safe.
#[inline]
pub(crate) fn before(now: OsTick, target: OsTick) -> bool {
    (now.wrapping_sub(target) as i32) < 0
}

/// Delay the calling task for `ticks` system ticks.
///
/// The task moves from its ready list to the delay list and another
/// task is scheduled; the tick handler moves it back once the wake-up
/// time is reached. A zero delay returns immediately.
pub fn os_time_dly(ticks: OsTick) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::InIsr);
    }
    if !kernel::KERNEL.is_running() {
        return Err(OsError::InvalidState);
    }
    if ticks == 0 {
        return Ok(());
    }
    if ticks >= TIMEOUT_MAX {
        return Err(OsError::OutOfRange);
    }

    let cs = CriticalSection::enter();

    if sched::is_suspended() {
        return Err(OsError::InvalidState);
    }

    let cur = kernel::tcb_cur_ptr().ok_or(OsError::TaskInvalid)?;
    unsafe {
        (*cur.as_ptr()).wake_up_time = os_time_get().wrapping_add(ticks);
        sched::ready_to_delay(cur);
    }
    sched::schedule();

    // The switch happens once the mask drops.
    drop(cs);
    Ok(())
}

/// Delay expressed as hours, minutes, seconds and milliseconds.
pub fn os_time_dly_hmsm(hours: u16, minutes: u8, seconds: u8, millis: u16) -> OsResult<()> {
    if minutes > 59 || seconds > 59 || millis > 999 {
        return Err(OsError::InvalidParam);
    }

    let total_ms = (hours as u32) * 3_600_000
        + (minutes as u32) * 60_000
        + (seconds as u32) * 1000
        + (millis as u32);

    os_time_dly((total_ms as u64 * crate::config::CFG_TICK_RATE_HZ as u64 / 1000) as OsTick)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reached_is_wrap_safe() {
        assert!(reached(0x0000_0002, 0xFFFF_FFFE)); // counter wrapped
        assert!(!reached(0xFFFF_FFFE, 0x0000_0002)); // target in the future
        assert!(reached(100, 100));
        assert!(reached(101, 100));
        assert!(!reached(99, 100));
    }

    #[test]
    fn before_mirrors_reached() {
        assert!(before(99, 100));
        assert!(!before(100, 100));
        assert!(before(0xFFFF_FFFE, 0x0000_0002));
    }
}
