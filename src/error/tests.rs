//! Tests for error types.

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("rescan interval too small");
        assert_eq!(
            err.to_string(),
            "configuration error: rescan interval too small"
        );
    }

    #[test]
    fn test_store_error_conversion() {
        let store_err = StoreError::Parse {
            path: "config.json".to_string(),
            reason: "expected value".to_string(),
        };
        let err: Error = store_err.into();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn test_watcher_error_conversion() {
        let watch_err = WatcherError::PathMissing {
            path: "/tmp/missing".to_string(),
        };
        let err: Error = watch_err.into();
        assert!(matches!(err, Error::Watcher(_)));
        assert_eq!(
            err.to_string(),
            "watcher error: input path '/tmp/missing' does not exist"
        );
    }

    #[test]
    fn test_control_error_conversion() {
        let control_err = ControlError::Busy {
            reason: "connect timed out".to_string(),
        };
        let err: Error = control_err.into();
        assert!(matches!(err, Error::Control(ControlError::Busy { .. })));
    }

    #[test]
    fn test_control_outcomes_are_distinct() {
        let not_running = ControlError::NotRunning {
            path: "/run/hotfolder.sock".to_string(),
            reason: "connection refused".to_string(),
        };
        let busy = ControlError::Busy {
            reason: "backlog full".to_string(),
        };
        let silent = ControlError::NoResponse {
            reason: "connection closed".to_string(),
        };

        assert!(not_running.to_string().starts_with("service not running"));
        assert!(busy.to_string().starts_with("service busy"));
        assert!(silent.to_string().starts_with("no response"));
    }

    #[test]
    fn test_control_protocol_display() {
        let err: Error = ControlError::Protocol("invalid frame: too long".to_string()).into();
        assert_eq!(
            err.to_string(),
            "control channel error: protocol error: invalid frame: too long"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_not_running_display() {
        assert_eq!(Error::NotRunning.to_string(), "manager is not running");
    }

    #[test]
    fn test_error_internal() {
        let err = Error::internal("tracker task panicked");
        assert_eq!(err.to_string(), "internal error: tracker task panicked");
    }

    #[test]
    fn test_watcher_error_path_in_use() {
        let err = WatcherError::PathInUse {
            path: "/in".to_string(),
            id: "a".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "input path '/in' is already watched by hotfolder 'a'"
        );
    }

    #[test]
    fn test_error_propagation_with_question_mark() {
        fn inner() -> Result<i32> {
            Err(Error::config("inner error"))
        }

        fn outer() -> Result<i32> {
            let _ = inner()?;
            Ok(0)
        }

        let result = outer();
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "configuration error: inner error"
        );
    }
}
