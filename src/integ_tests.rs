//! Integration tests for synchronized runs
//!
//! Every client gets its own board instance over a shared temp directory, the
//! way separate processes on a shared filesystem see each other.

#[cfg(test)]
mod tests {
    use crate::{
        coordination::{ClientState, ExperimentCoordinator, LocalSignalBoard},
        error::{SyncError, exit_code_for},
        runner::{CoordinateArgs, RunArgs, SyncArgs, coordinate, run_benchmark, status},
    };
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    // ============ Test Helpers ============

    /// Helper to create a coordinator with its own view of the shared directory
    async fn client_view(dir: &TempDir) -> ExperimentCoordinator {
        let board = LocalSignalBoard::open(dir.path()).await.unwrap();
        ExperimentCoordinator::new(Arc::new(board))
    }

    /// Helper to create a SPEC installation whose runcpu prints a line and exits
    #[cfg(unix)]
    fn fake_spec_root(exit_code: i32) -> TempDir {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let runcpu = bin.join("runcpu");
        std::fs::write(
            &runcpu,
            format!(
                "#!/bin/sh\necho \"Running 519.lbm_r refrate (ref) base\"\nexit {}\n",
                exit_code
            ),
        )
        .unwrap();
        std::fs::set_permissions(&runcpu, std::fs::Permissions::from_mode(0o755)).unwrap();
        dir
    }

    fn run_args(spec_root: &Path, sync: Option<SyncArgs>) -> RunArgs {
        RunArgs {
            benchmarks: vec!["lbm".to_string()],
            preference: Some(crate::suite::Preference::Rate),
            config: "test.cfg".to_string(),
            spec_root: Some(spec_root.to_path_buf()),
            sync,
            quiet: true,
            ..Default::default()
        }
    }

    fn sync_args(dir: &TempDir, experiment_id: &str, client_id: &str) -> SyncArgs {
        let mut sync = SyncArgs::new(experiment_id, client_id);
        sync.sync_dir = dir.path().to_path_buf();
        sync.start_timeout = Duration::from_secs(10);
        sync.stop_timeout = Duration::from_secs(10);
        sync
    }

    // ============ Rendezvous Scenarios ============

    #[tokio::test]
    async fn test_two_clients_start_within_a_second() {
        let dir = TempDir::new().unwrap();
        let c1 = client_view(&dir).await;
        let c2 = client_view(&dir).await;
        let controller = client_view(&dir).await;

        let h1 = c1.register("exp1", "c1").await.unwrap();
        let h2 = c2.register("exp1", "c2").await.unwrap();

        let signal_at = Instant::now();
        let (r1, r2, issued) = tokio::join!(
            c1.await_start(&h1, Duration::from_secs(5)),
            c2.await_start(&h2, Duration::from_secs(5)),
            controller.signal_start("exp1"),
        );

        assert!(issued.unwrap());
        r1.unwrap();
        r2.unwrap();
        assert!(signal_at.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_lone_client_times_out() {
        let dir = TempDir::new().unwrap();
        let c1 = client_view(&dir).await;
        let handle = c1.register("exp2", "c1").await.unwrap();

        let started = Instant::now();
        let err = c1
            .await_start(&handle, Duration::from_secs(2))
            .await
            .unwrap_err();

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(matches!(err, SyncError::TimedOut { .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_stop_before_await_is_still_observed() {
        let dir = TempDir::new().unwrap();
        let c1 = client_view(&dir).await;
        let c2 = client_view(&dir).await;
        let controller = client_view(&dir).await;

        let h1 = c1.register("exp3", "c1").await.unwrap();
        let h2 = c2.register("exp3", "c2").await.unwrap();
        controller.signal_start("exp3").await.unwrap();
        controller.signal_stop("exp3").await.unwrap();

        c1.await_start(&h1, Duration::from_secs(1)).await.unwrap();
        c2.await_start(&h2, Duration::from_secs(1)).await.unwrap();
        c1.await_stop(&h1, Duration::from_secs(1)).await.unwrap();
        c2.await_stop(&h2, Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_client_across_processes() {
        let dir = TempDir::new().unwrap();
        let first = client_view(&dir).await;
        let second = client_view(&dir).await;

        let handle = first.register("exp4", "c1").await.unwrap();
        let err = second.register("exp4", "c1").await.unwrap_err();
        assert!(matches!(err, SyncError::DuplicateClient { .. }));
        assert_eq!(exit_code_for(&anyhow::Error::from(err)), 4);

        first.deregister(&handle).await.unwrap();
        second.register("exp4", "c1").await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_medium() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let err = LocalSignalBoard::open(&blocker).await.unwrap_err();
        assert!(matches!(err, SyncError::SignalMediumUnavailable { .. }));
        assert_eq!(err.exit_code(), 5);
    }

    // ============ Runner Scenarios ============

    #[cfg(unix)]
    #[tokio::test]
    async fn test_synchronized_run_with_controller() {
        let dir = TempDir::new().unwrap();
        let spec_root = fake_spec_root(0);

        let mut coordinate_args = CoordinateArgs::new("exp5", 2);
        coordinate_args.sync_dir = dir.path().to_path_buf();
        coordinate_args.start_timeout = Duration::from_secs(10);
        coordinate_args.run_timeout = Duration::from_secs(10);

        let (report, first, second) = tokio::join!(
            coordinate(coordinate_args),
            run_benchmark(run_args(spec_root.path(), Some(sync_args(&dir, "exp5", "c1")))),
            run_benchmark(run_args(spec_root.path(), Some(sync_args(&dir, "exp5", "c2")))),
        );

        let report = report.unwrap();
        assert_eq!(report.started_clients.len(), 2);
        assert!(!report.stopped_early());

        for outcome in [first.unwrap(), second.unwrap()] {
            assert_eq!(outcome.exit_code, Some(0));
            assert_eq!(outcome.benchmarks_seen, vec!["519.lbm_r"]);
            assert!(outcome.command.contains(&"519.lbm_r".to_string()));
            assert!(outcome.timings.start_wait().is_some());
            assert!(outcome.timings.stop_wait().is_some());
        }

        // Teardown removed the experiment
        let snapshot = status("exp5", dir.path().to_path_buf()).await.unwrap();
        assert!(!snapshot.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_benchmark_exit_status_is_propagated() {
        let spec_root = fake_spec_root(3);
        let outcome = run_benchmark(run_args(spec_root.path(), None)).await.unwrap();

        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.succeeded());
        assert!(outcome.timings.start_wait().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_timeout_withdraws_client() {
        let dir = TempDir::new().unwrap();
        let spec_root = fake_spec_root(0);
        let mut sync = sync_args(&dir, "exp6", "c1");
        sync.start_timeout = Duration::from_millis(300);

        let err = run_benchmark(run_args(spec_root.path(), Some(sync)))
            .await
            .unwrap_err();
        assert_eq!(exit_code_for(&err), 3);

        let snapshot = status("exp6", dir.path().to_path_buf()).await.unwrap();
        assert!(snapshot.clients.is_empty());
        assert_eq!(snapshot.withdrawn.len(), 1);
        assert_eq!(snapshot.withdrawn[0].client_id, "c1");
        assert_eq!(snapshot.withdrawn[0].last_state, ClientState::WaitingForStart);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_duplicate_client_run_fails_fast() {
        let dir = TempDir::new().unwrap();
        let spec_root = fake_spec_root(0);
        let holder = client_view(&dir).await;
        let _handle = holder.register("exp7", "c1").await.unwrap();

        let err = run_benchmark(run_args(spec_root.path(), Some(sync_args(&dir, "exp7", "c1"))))
            .await
            .unwrap_err();
        assert_eq!(exit_code_for(&err), 4);
    }
}
