//! Compile-time kernel configuration
//!
//! All resource limits and scheduling parameters are fixed at build time.

/// Number of priority levels. Priority 0 is the most urgent.
pub const CFG_PRIO_NUM: usize = 32;

/// Priority reserved for the idle task (lowest).
pub const CFG_PRIO_IDLE: u8 = (CFG_PRIO_NUM - 1) as u8;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Core clock feeding the tick timer
pub const CFG_CPU_CLOCK_HZ: u32 = 16_000_000;

/// Round-robin time slice in ticks for equal-priority tasks
pub const CFG_TIME_SLICE: u32 = 5;

/// Heap alignment in bytes
pub const CFG_BYTE_ALIGNMENT: usize = 8;

/// Kernel heap size in bytes
pub const CFG_HEAP_SIZE: usize = 10 * 1024;

/// Fixed task name length in bytes
pub const CFG_TASK_NAME_LEN: usize = 10;

/// Minimum task stack size in bytes
pub const CFG_STACK_SIZE_MIN: usize = 128;

/// Idle task stack size in bytes
pub const CFG_IDLE_STACK_SIZE: usize = 512;

/// Byte used to seed task stacks for overflow and usage detection
pub const CFG_STACK_MAGIC: u8 = 0xA5;

/// Semaphore pool capacity
pub const CFG_SEM_NUM: usize = 8;

/// Mutex pool capacity
pub const CFG_MUTEX_NUM: usize = 8;

/// Message queue pool capacity
pub const CFG_QUEUE_NUM: usize = 8;

/// Software timer pool capacity
pub const CFG_TIMER_NUM: usize = 8;

/// Maximum counting semaphore value
pub const CFG_SEM_COUNT_MAX: u32 = 0xFFFE;

/// BASEPRI value used as the kernel critical-section ceiling.
/// Interrupts with a priority value below this keep firing inside
/// critical sections and must not call kernel APIs.
pub const CFG_SYSCALL_MASK_PRIO: u8 = 191;

/// Priority value assigned to PendSV and SysTick (lowest).
pub const CFG_KERNEL_INT_PRIO: u8 = 0xF0;

// Legal ranges, checked at compile time.
const _: () = assert!(
    CFG_PRIO_NUM == 8 || CFG_PRIO_NUM == 16 || CFG_PRIO_NUM == 32 || CFG_PRIO_NUM == 64,
    "CFG_PRIO_NUM must be 8, 16, 32, or 64"
);
const _: () = assert!(
    CFG_BYTE_ALIGNMENT == 4 || CFG_BYTE_ALIGNMENT == 8,
    "CFG_BYTE_ALIGNMENT must be 4 or 8"
);
const _: () = assert!(
    CFG_TASK_NAME_LEN >= 4 && CFG_TASK_NAME_LEN <= 32,
    "CFG_TASK_NAME_LEN must be between 4 and 32"
);
const _: () = assert!(CFG_TIME_SLICE > 0);
const _: () = assert!(CFG_IDLE_STACK_SIZE >= CFG_STACK_SIZE_MIN);
