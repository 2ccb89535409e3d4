//! User hook registry.
//!
//! Five optional callbacks the kernel fires at fixed points. Each is
//! registered (or cleared with `None`) under the critical section and
//! null-checked at the callsite. The tick and task-switch hooks run in
//! interrupt context and must stay short; the idle, stack-overflow and
//! malloc-failed hooks run in whatever context detected the condition.

use crate::critical::{critical_section, CsCell};
use crate::task::OsTcb;

/// Called by the idle task on every loop iteration
pub type IdleHook = fn();
/// Called from the tick ISR after scheduler bookkeeping
pub type TickHook = fn();
/// Called during every context switch with (outgoing, incoming)
pub type TaskSwitchHook = fn(*mut OsTcb, *mut OsTcb);
/// Called when a stack check finds the guard region overwritten
pub type StackOverflowHook = fn(*mut OsTcb);
/// Called when a heap allocation fails, with the requested size
pub type MallocFailedHook = fn(usize);

struct HookTable {
    idle: Option<IdleHook>,
    tick: Option<TickHook>,
    task_switch: Option<TaskSwitchHook>,
    stack_overflow: Option<StackOverflowHook>,
    malloc_failed: Option<MallocFailedHook>,
}

static HOOKS: CsCell<HookTable> = CsCell::new(HookTable {
    idle: None,
    tick: None,
    task_switch: None,
    stack_overflow: None,
    malloc_failed: None,
});

pub fn os_hook_set_idle(hook: Option<IdleHook>) {
    critical_section(|cs| HOOKS.get(cs).idle = hook);
}

pub fn os_hook_set_tick(hook: Option<TickHook>) {
    critical_section(|cs| HOOKS.get(cs).tick = hook);
}

pub fn os_hook_set_task_switch(hook: Option<TaskSwitchHook>) {
    critical_section(|cs| HOOKS.get(cs).task_switch = hook);
}

pub fn os_hook_set_stack_overflow(hook: Option<StackOverflowHook>) {
    critical_section(|cs| HOOKS.get(cs).stack_overflow = hook);
}

pub fn os_hook_set_malloc_failed(hook: Option<MallocFailedHook>) {
    critical_section(|cs| HOOKS.get(cs).malloc_failed = hook);
}

// Callsites read a single word; registration happens before the
// scheduler starts, so an unguarded read is sufficient.

#[inline]
pub(crate) fn call_idle() {
    if let Some(hook) = unsafe { HOOKS.get_unchecked().idle } {
        hook();
    }
}

#[inline]
pub(crate) fn call_tick() {
    if let Some(hook) = unsafe { HOOKS.get_unchecked().tick } {
        hook();
    }
}

#[inline]
pub(crate) fn call_task_switch(from: *mut OsTcb, to: *mut OsTcb) {
    if let Some(hook) = unsafe { HOOKS.get_unchecked().task_switch } {
        hook(from, to);
    }
}

#[inline]
pub(crate) fn call_stack_overflow(tcb: *mut OsTcb) {
    if let Some(hook) = unsafe { HOOKS.get_unchecked().stack_overflow } {
        hook(tcb);
    }
}

#[inline]
pub(crate) fn call_malloc_failed(size: usize) {
    if let Some(hook) = unsafe { HOOKS.get_unchecked().malloc_failed } {
        hook(size);
    }
}
