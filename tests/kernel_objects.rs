//! Exercises the global kernel objects (heap, pools) end to end on the
//! host, without starting the scheduler.
//!
//! Everything shares the process-wide kernel singleton, so the whole
//! sequence lives in one test function.

use core::sync::atomic::{AtomicUsize, Ordering};

use kite::{
    os_init, os_mem_alloc, os_mem_free, os_mem_stats, os_queue_create, os_sem_create,
    os_task_create, os_task_current, os_task_resume, os_task_stack_check, os_task_stack_usage,
    os_task_suspend, OsError, TaskInit, TaskState, TIMEOUT_MAX,
};

static FAILED_ALLOC_SIZE: AtomicUsize = AtomicUsize::new(0);

fn note_failed_alloc(size: usize) {
    FAILED_ALLOC_SIZE.store(size, Ordering::SeqCst);
}

fn task_entry(_arg: *mut ()) {
    // Never run on the host; tasks exist only as scheduler records.
}

#[test]
fn kernel_objects_lifecycle() {
    os_init().expect("kernel init");

    heap_paths();
    semaphore_paths();
    mutex_paths();
    queue_paths();
    task_paths();
}

fn heap_paths() {
    let baseline = os_mem_stats();
    assert_eq!(baseline.used_size, 0);
    assert_eq!(baseline.free_blocks, 1);

    let a = os_mem_alloc(100);
    let b = os_mem_alloc(200);
    assert!(!a.is_null() && !b.is_null());

    let s = os_mem_stats();
    assert_eq!(s.used_blocks, 2);
    assert_eq!(s.alloc_count, 2);
    assert!(s.used_size > 300);

    os_mem_free(a);
    os_mem_free(b);
    let s = os_mem_stats();
    assert_eq!(s.used_size, 0);
    assert_eq!(s.free_blocks, 1);
    assert_eq!(kite::os_mem_fragmentation(), 0);

    // A hopeless request fails and reports through the hook.
    kite::os_hook_set_malloc_failed(Some(note_failed_alloc));
    let huge = kite::config::CFG_HEAP_SIZE * 2;
    assert!(os_mem_alloc(huge).is_null());
    assert_eq!(FAILED_ALLOC_SIZE.load(Ordering::SeqCst), huge);
    assert_eq!(os_mem_stats().fail_count, 1);
    kite::os_hook_set_malloc_failed(None);

    // Zero-size requests do not reach the hook.
    assert!(os_mem_alloc(0).is_null());
    os_mem_free(core::ptr::null_mut());
}

fn semaphore_paths() {
    assert_eq!(
        os_sem_create(kite::config::CFG_SEM_COUNT_MAX + 1).unwrap_err(),
        OsError::SyncInvalid
    );

    let sem = os_sem_create(1).expect("sem create");

    assert_eq!(sem.count().unwrap(), 1);
    sem.try_pend().expect("token available");
    assert_eq!(sem.count().unwrap(), 0);
    assert_eq!(sem.try_pend().unwrap_err(), OsError::Failed);

    sem.post().expect("post");
    assert_eq!(sem.count().unwrap(), 1);

    // Timeouts at or beyond the ceiling are rejected outright.
    assert_eq!(sem.pend_timeout(TIMEOUT_MAX).unwrap_err(), OsError::OutOfRange);

    sem.destroy().expect("destroy");
    assert_eq!(sem.try_pend().unwrap_err(), OsError::InvalidState);

    // The pool is bounded; slots recycle after destroy.
    let mut held = std::vec::Vec::new();
    for _ in 0..kite::config::CFG_SEM_NUM {
        held.push(os_sem_create(0).expect("fill pool"));
    }
    assert_eq!(os_sem_create(0).unwrap_err(), OsError::ResourceUnavailable);
    for h in held {
        h.destroy().expect("drain pool");
    }
    os_sem_create(0).expect("slot recycled").destroy().unwrap();
}

fn mutex_paths() {
    let mutex = kite::os_mutex_create().expect("mutex create");

    assert!(!mutex.is_owned().unwrap());
    assert_eq!(kite::os_mutex_owner_prio(mutex).unwrap(), None);

    // No current task exists before the scheduler starts.
    assert_eq!(mutex.try_lock().unwrap_err(), OsError::TaskInvalid);
    assert_eq!(mutex.unlock().unwrap_err(), OsError::TaskInvalid);

    mutex.destroy().expect("destroy");
    assert_eq!(mutex.destroy().unwrap_err(), OsError::InvalidState);
}

fn queue_paths() {
    let before = os_mem_stats().used_size;

    let queue = os_queue_create(8, 4).expect("queue create");
    assert!(queue.is_empty().unwrap());

    assert_eq!(queue.try_read(&mut [0u8; 8]).unwrap_err(), OsError::Failed);
    assert_eq!(
        queue.try_write(&[0u8; 9]).unwrap_err(),
        OsError::QueueSizeMismatch
    );

    // Fill every slot: nothing is sacrificed to tell full from empty.
    for i in 0..4u64 {
        queue.try_write(&i.to_le_bytes()).expect("write while space");
    }
    assert_eq!(queue.len().unwrap(), 4);
    assert_eq!(queue.try_write(&[0u8; 8]).unwrap_err(), OsError::Failed);

    // Destroy refuses while messages remain.
    assert_eq!(queue.destroy().unwrap_err(), OsError::InvalidState);

    // FIFO order, byte-exact round trip.
    for i in 0..4u64 {
        let mut buf = [0u8; 8];
        queue.try_read(&mut buf).expect("read while data");
        assert_eq!(u64::from_le_bytes(buf), i);
    }
    assert_eq!(queue.try_read(&mut [0u8; 8]).unwrap_err(), OsError::Failed);

    queue.destroy().expect("destroy");
    assert_eq!(os_mem_stats().used_size, before, "queue buffer returned");
}

fn task_paths() {
    assert!(os_task_current().is_none());

    assert_eq!(
        os_task_create(&TaskInit {
            entry: task_entry,
            priority: kite::config::CFG_PRIO_NUM as u8,
            name: "bad",
            stack_size: 1024,
            arg: core::ptr::null_mut(),
        })
        .unwrap_err(),
        OsError::InvalidParam
    );

    let worker = os_task_create(&TaskInit {
        entry: task_entry,
        priority: 7,
        name: "worker-with-a-very-long-name",
        stack_size: 1024,
        arg: core::ptr::null_mut(),
    })
    .expect("task create");

    assert_eq!(worker.state(), TaskState::Ready);
    assert_eq!(worker.priority(), 7);
    // Name is truncated to the configured fixed length.
    assert!(worker.name().len() < kite::config::CFG_TASK_NAME_LEN);
    assert!("worker-with-a-very-long-name".starts_with(worker.name()));

    // Untouched stack: fully magic, no overflow, zero usage.
    assert!(!os_task_stack_check(worker));
    assert_eq!(os_task_stack_usage(worker), 0);

    os_task_suspend(Some(worker)).expect("suspend");
    assert_eq!(worker.state(), TaskState::Suspended);
    assert_eq!(
        os_task_suspend(Some(worker)).unwrap_err(),
        OsError::InvalidState
    );

    os_task_resume(worker).expect("resume");
    assert_eq!(worker.state(), TaskState::Ready);

    // Blocking and scheduler control need a running scheduler.
    assert_eq!(kite::os_time_dly(10).unwrap_err(), OsError::InvalidState);
    assert_eq!(kite::os_sched_suspend().unwrap_err(), OsError::InvalidState);
}
