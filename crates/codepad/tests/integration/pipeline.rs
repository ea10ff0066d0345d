use codepad::{JobRequest, JobResponse, JobStatus};

use super::{TestRunner, fixture_source};

#[tokio::test]
async fn test_c_compile_error_is_reported() {
    let test = TestRunner::new();
    if !test.installed("c") {
        return;
    }

    let request = JobRequest::new("c", fixture_source("compile_error.c"));
    let report = test.runner.submit(request).await.expect("Job failed");

    assert_eq!(report.status, JobStatus::CompileFailed);
    assert_eq!(report.exit_code, None);
    assert!(report.output.contains("error"), "output: {}", report.output);
    assert_eq!(test.workspaces_left(), 0);
}

#[tokio::test]
async fn test_cpp_compile_error_is_reported() {
    let test = TestRunner::new();
    if !test.installed("cpp") {
        return;
    }

    let request = JobRequest::new("cpp", fixture_source("compile_error.cpp"));
    let report = test.runner.submit(request).await.expect("Job failed");

    assert_eq!(report.status, JobStatus::CompileFailed);
    assert!(report.output.contains("undeclared_function"));
}

#[tokio::test]
async fn test_java_without_public_class_is_rejected() {
    let test = TestRunner::new();
    if !test.installed("java") {
        return;
    }

    let request = JobRequest::new("java", fixture_source("NoPublicClass.java"));
    let report = test.runner.submit(request).await.expect("Job failed");

    assert_eq!(report.status, JobStatus::SourceRejected);
    assert!(report.output.contains("public class Main"));
    assert_eq!(test.workspaces_left(), 0);
}

#[tokio::test]
async fn test_stderr_and_exit_code_are_reported() {
    let test = TestRunner::new();
    if !test.installed("python") {
        return;
    }

    let request = JobRequest::new("python", fixture_source("stderr_and_exit.py"));
    let report = test.runner.submit(request).await.expect("Job failed");

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.exit_code, Some(3));
    assert_eq!(report.output, "to stdout\nto stderr\n");
}

#[tokio::test]
async fn test_python_reading_past_input_fails_cleanly() {
    let test = TestRunner::new();
    if !test.installed("python") {
        return;
    }

    let request = JobRequest::new("python", fixture_source("greet.py")).with_input("Owner\n");
    let report = test.runner.submit(request).await.expect("Job failed");

    assert_eq!(report.status, JobStatus::Completed);
    assert_ne!(report.exit_code, Some(0));
    assert!(report.output.contains("EOFError"), "output: {}", report.output);
}

#[tokio::test]
async fn test_respond_serializes_output() {
    let test = TestRunner::new();
    if !test.installed("python") {
        return;
    }

    let request: JobRequest =
        serde_json::from_str(r#"{"language":"python","code":"print(6 * 7)"}"#).unwrap();
    let response = test.runner.respond(request).await;

    assert_eq!(
        serde_json::to_string(&response).unwrap(),
        r#"{"output":"42\n"}"#
    );
}

#[tokio::test]
async fn test_respond_unsupported_language() {
    let test = TestRunner::new();

    let response = test
        .runner
        .respond(JobRequest::new("cobol", "DISPLAY 'HI'."))
        .await;

    assert_eq!(
        response,
        JobResponse::Error {
            error: "Language not supported: 'cobol'".to_owned()
        }
    );
    assert_eq!(test.workspaces_left(), 0);
}

#[tokio::test]
async fn test_history_is_written_for_finished_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let history_path = dir.path().join("history.jsonl");
    let test = {
        let history_path = history_path.clone();
        TestRunner::with_config(move |config| config.history_path = Some(history_path))
    };
    if !test.installed("python") {
        return;
    }

    let request = JobRequest::new("python", "print(input())").with_input("echo me");
    test.runner.submit(request).await.expect("Job failed");
    test.runner.flush_history().await;

    let text = std::fs::read_to_string(&history_path).expect("history file missing");
    let record: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(record["language"], "python");
    assert_eq!(record["input"], "echo me");
    assert_eq!(record["output"], "echo me\n");
}
