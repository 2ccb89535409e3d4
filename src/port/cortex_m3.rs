//! Cortex-M3/M4 port.
//!
//! Context switches run in PendSV at the lowest exception priority, so
//! a switch requested from a higher-priority context (the tick, or a
//! task inside the critical section) is deferred until everything else
//! has unwound. The handler saves R4-R11 and the exception return code
//! on the outgoing process stack, lets [`os_switch_context`] swap the
//! TCB pointers and book run-time statistics, then restores the
//! incoming task.

#![allow(named_asm_labels)]

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;

use crate::config::CFG_KERNEL_INT_PRIO;
use crate::types::{OsStkElement, OsTaskFn};

/// Dedicated MSP region for exception handling once the first task has
/// taken over the process stack.
#[no_mangle]
static mut INTERRUPT_STACK: [u64; 256] = [0; 256];

/// Configure the SysTick timer to fire the kernel tick.
pub fn systick_init(reload: u32) {
    let mut p = unsafe { cortex_m::Peripherals::steal() };

    p.SYST.set_reload(reload - 1);
    p.SYST.clear_current();
    p.SYST.set_clock_source(SystClkSource::Core);
    p.SYST.enable_interrupt();
    p.SYST.enable_counter();
}

/// Raise the deferred context switch interrupt.
#[inline(always)]
pub fn trigger_context_switch() {
    cortex_m::peripheral::SCB::set_pendsv();
}

/// Hand the CPU to the task selected by the scheduler.
///
/// Drops PendSV and SysTick to the lowest priority, points MSP at the
/// dedicated interrupt stack, clears the current-task pointer so the
/// first PendSV skips the save phase, and pends the switch.
///
/// # Safety
/// Must be called exactly once, from `os_start`, with the scheduler
/// state fully initialized.
pub unsafe fn start_first_task() {
    unsafe {
        let mut scb = cortex_m::Peripherals::steal().SCB;
        scb.set_priority(SystemHandler::PendSV, CFG_KERNEL_INT_PRIO);
        scb.set_priority(SystemHandler::SysTick, CFG_KERNEL_INT_PRIO);

        let msp_top = (&raw const INTERRUPT_STACK) as u32
            + core::mem::size_of::<[u64; 256]>() as u32;
        asm!("msr msp, {0}", in(reg) msp_top);
        asm!("msr psp, {0}", in(reg) 0);

        (*(&raw mut crate::kernel::CPU_STATE)).tcb_cur = core::ptr::null_mut();

        cortex_m::interrupt::enable();
        cortex_m::peripheral::SCB::set_pendsv();
    }
}

/// Initial frame layout, low address first: the software-saved callee
/// registers and exception return code, then the hardware frame the
/// exception entry would have pushed.
#[repr(C, align(4))]
struct TaskFrame {
    r4: u32,
    r5: u32,
    r6: u32,
    r7: u32,
    r8: u32,
    r9: u32,
    r10: u32,
    r11: u32,
    exc_return: u32,
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
    r12: u32,
    lr: u32,
    pc: u32,
    xpsr: u32,
}

const FRAME_WORDS: usize = 17;

/// Build the initial exception frame so that returning from the first
/// PendSV starts `entry(arg)` in thread mode, with the exit trampoline
/// as return address.
///
/// # Safety
/// `stk_base` must point at a writable stack of `stk_size` bytes.
pub unsafe fn stack_init(
    stk_base: *mut u8,
    stk_size: usize,
    entry: OsTaskFn,
    arg: *mut (),
) -> *mut OsStkElement {
    unsafe {
        // AAPCS wants the stack 8-byte aligned at the call boundary.
        let top = ((stk_base as usize + stk_size) & !7) as *mut u32;
        let frame = top.sub(FRAME_WORDS) as *mut TaskFrame;

        frame.write(TaskFrame {
            r4: 0x0404_0404,
            r5: 0x0505_0505,
            r6: 0x0606_0606,
            r7: 0x0707_0707,
            r8: 0x0808_0808,
            r9: 0x0909_0909,
            r10: 0x1010_1010,
            r11: 0x1111_1111,
            exc_return: 0xFFFF_FFFD, // thread mode, PSP
            r0: arg as u32,
            r1: 0,
            r2: 0,
            r3: 0,
            r12: 0,
            lr: task_exit_trampoline as usize as u32,
            pc: (entry as usize as u32) | 1, // thumb bit
            xpsr: 0x0100_0000,
        });

        // One word below the frame, matching the handler's `add r0, #4`.
        (frame as *mut u32).sub(1) as *mut OsStkElement
    }
}

/// Swap the shared TCB pointers around a PendSV: store the outgoing
/// stack pointer, book run-time statistics and fire the task-switch
/// hook, return the incoming stack pointer.
#[inline(never)]
#[no_mangle]
unsafe extern "C" fn os_switch_context(cur_sp: *mut u32) -> *mut u32 {
    unsafe {
        let state = &raw mut crate::kernel::CPU_STATE;

        let old = (*state).tcb_cur;
        if !old.is_null() {
            (*old).stk_ptr = cur_sp;
        }

        let new = (*state).tcb_next;
        crate::task::update_runtime_stats(old, new);
        (*state).tcb_cur = new;

        if new.is_null() {
            core::ptr::null_mut()
        } else {
            (*new).stk_ptr
        }
    }
}

/// PendSV: the deferred context switch.
///
/// 1. Save R4-R11 and LR below the hardware frame on the outgoing PSP
///    (skipped for the very first switch, when no task is current).
/// 2. `os_switch_context` swaps the TCB pointers.
/// 3. Restore R4-R11 and LR from the incoming stack.
/// 4. Exception return resumes the incoming task.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    use crate::kernel::CPU_STATE;

    naked_asm!(
        "cpsid i",
        "dsb",
        "isb",

        "mrs r0, psp",

        "ldr r1, ={cpu_state}",
        "ldr r1, [r1]",
        "cbz r1, 1f",

        "stmdb r0!, {{r4-r11, lr}}",

        "sub r0, r0, #4",

        "1:",
        "bl os_switch_context",

        "cbz r0, 2f",
        "add r0, r0, #4",
        "ldmia r0!, {{r4-r11, lr}}",

        "msr psp, r0",

        "2:",
        "cpsie i",
        "dsb",
        "isb",

        "bx lr",

        cpu_state = sym CPU_STATE,
    );
}

/// SysTick: the kernel tick.
#[no_mangle]
pub extern "C" fn SysTick() {
    crate::sched::os_tick_handler();
}

/// Where a task lands if its entry function returns: interrupts are
/// masked and the core parks for good.
#[no_mangle]
fn task_exit_trampoline() -> ! {
    cortex_m::interrupt::disable();
    loop {
        cortex_m::asm::wfi();
    }
}
