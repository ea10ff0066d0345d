use std::time::{Duration, Instant};

use codepad::{CancelToken, JobRequest, JobStatus};

use super::{TestRunner, fixture_source};

#[tokio::test]
async fn test_python_infinite_loop_times_out() {
    let test = TestRunner::with_config(|config| config.run_timeout_ms = 1000);
    if !test.installed("python") {
        return;
    }

    let start = Instant::now();
    let request = JobRequest::new("python", fixture_source("infinite_loop.py"));
    let report = test.runner.submit(request).await.expect("Job failed");

    assert_eq!(report.status, JobStatus::TimedOut);
    assert!(report.output.contains("timed out"), "output: {}", report.output);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(test.workspaces_left(), 0);
}

#[tokio::test]
async fn test_compiled_infinite_loop_times_out() {
    let test = TestRunner::with_config(|config| config.run_timeout_ms = 1000);
    if !test.installed("c") {
        return;
    }

    let request = JobRequest::new("c", fixture_source("infinite_loop.c"));
    let report = test.runner.submit(request).await.expect("Job failed");

    assert_eq!(report.status, JobStatus::TimedOut);
    assert_eq!(test.workspaces_left(), 0);
}

#[tokio::test]
async fn test_cancelled_job_stops_early() {
    let test = TestRunner::new();
    if !test.installed("python") {
        return;
    }

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let request = JobRequest::new("python", fixture_source("infinite_loop.py"));
    let report = test
        .runner
        .submit_with_cancel(request, Some(&cancel))
        .await
        .expect("Job failed");

    assert_eq!(report.status, JobStatus::Cancelled);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(test.workspaces_left(), 0);
}

#[tokio::test]
async fn test_background_child_does_not_hold_the_job() {
    let test = TestRunner::new();
    if !test.installed("python") {
        return;
    }

    let start = Instant::now();
    let request = JobRequest::new("python", fixture_source("spawns_child.py"));
    let report = test.runner.submit(request).await.expect("Job failed");

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.output, "started\n");
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_parallel_jobs_get_their_own_output() {
    let test = TestRunner::with_config(|config| config.max_concurrent_jobs = 4);
    if !test.installed("python") {
        return;
    }

    let jobs = (0..8).map(|i| {
        let runner = test.runner.clone();
        async move {
            let request = JobRequest::new("python", "print(input())").with_input(format!("job {i}"));
            (i, runner.submit(request).await)
        }
    });

    for (i, result) in spawn_all(jobs).await {
        let report = result.expect("Job failed");
        assert_eq!(report.output, format!("job {i}\n"));
    }
    assert_eq!(test.workspaces_left(), 0);
}

async fn spawn_all<F, T>(futures: impl IntoIterator<Item = F>) -> Vec<T>
where
    F: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = futures.into_iter().map(tokio::spawn).collect();
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.expect("task panicked"));
    }
    results
}
