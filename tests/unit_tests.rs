//! Host-run unit tests for the hardware-independent kernel pieces.

mod prio_tests {
    use kite::config::CFG_PRIO_NUM;
    use kite::prio::PrioTable;

    #[test]
    fn empty_table_reports_lowest() {
        let table = PrioTable::new();
        assert!(table.is_empty());
        assert_eq!(table.highest(), (CFG_PRIO_NUM - 1) as u8);
    }

    #[test]
    fn single_priority() {
        let mut table = PrioTable::new();

        table.set(5);
        assert!(!table.is_empty());
        assert!(table.is_set(5));
        assert!(!table.is_set(4));
        assert_eq!(table.highest(), 5);

        table.clear(5);
        assert!(table.is_empty());
    }

    #[test]
    fn highest_wins_regardless_of_insertion_order() {
        let mut table = PrioTable::new();

        for p in [20u8, 5, 10, 0, 15] {
            table.set(p);
        }
        assert_eq!(table.highest(), 0);

        table.clear(0);
        assert_eq!(table.highest(), 5);
        table.clear(5);
        assert_eq!(table.highest(), 10);
    }

    #[test]
    fn word_boundary_priorities() {
        let mut table = PrioTable::new();

        table.set(0);
        table.set((CFG_PRIO_NUM - 1) as u8);
        assert_eq!(table.highest(), 0);

        table.clear(0);
        assert_eq!(table.highest(), (CFG_PRIO_NUM - 1) as u8);
    }
}

mod error_tests {
    use kite::OsError;

    #[test]
    fn errors_compare_and_format() {
        assert_eq!(OsError::Timeout, OsError::Timeout);
        assert_ne!(OsError::Timeout, OsError::Failed);

        let _ = std::format!("{:?}", OsError::NotOwner);
    }

    #[test]
    fn results_propagate() {
        fn fails() -> kite::OsResult<u32> {
            Err(OsError::OutOfRange)
        }
        fn chained() -> kite::OsResult<u32> {
            let v = fails()?;
            Ok(v + 1)
        }
        assert_eq!(chained(), Err(OsError::OutOfRange));
    }
}

mod types_tests {
    use kite::types::*;

    #[test]
    fn task_state_enum() {
        assert_eq!(TaskState::Ready, TaskState::Ready);
        assert_ne!(TaskState::Ready, TaskState::Delayed);
        assert_ne!(TaskState::Blocked, TaskState::BlockedTimeout);
    }

    #[test]
    fn pend_status_enum() {
        assert_eq!(PendStatus::Ok, PendStatus::Ok);
        assert_ne!(PendStatus::Ok, PendStatus::Timeout);
    }
}

mod config_tests {
    use kite::config::*;

    #[test]
    fn limits_are_sane() {
        assert!(CFG_PRIO_NUM == 8 || CFG_PRIO_NUM == 16 || CFG_PRIO_NUM == 32 || CFG_PRIO_NUM == 64);
        assert!(CFG_BYTE_ALIGNMENT == 4 || CFG_BYTE_ALIGNMENT == 8);
        assert!(CFG_TASK_NAME_LEN >= 4 && CFG_TASK_NAME_LEN <= 32);

        assert_eq!(CFG_PRIO_IDLE, (CFG_PRIO_NUM - 1) as u8);
        assert!(CFG_TIME_SLICE > 0);
        assert!(CFG_HEAP_SIZE >= 1024);
        assert!(CFG_IDLE_STACK_SIZE >= CFG_STACK_SIZE_MIN);
    }

    #[test]
    fn timeout_ceiling_leaves_headroom_for_wrap() {
        assert_eq!(kite::TIMEOUT_MAX, u32::MAX / 2);
    }
}
