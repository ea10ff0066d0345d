use codepad::{JobRequest, JobStatus};

use super::{GREETING_INPUT, GREETING_OUTPUT, TestRunner, fixture_source};

async fn assert_greets(language: &str, fixture: &str) {
    let test = TestRunner::new();
    if !test.installed(language) {
        return;
    }

    let request = JobRequest::new(language, fixture_source(fixture)).with_input(GREETING_INPUT);
    let report = test.runner.submit(request).await.expect("Job failed");

    assert_eq!(report.status, JobStatus::Completed, "output: {}", report.output);
    assert_eq!(report.exit_code, Some(0));
    assert_eq!(report.output, GREETING_OUTPUT);
    assert_eq!(test.workspaces_left(), 0);
}

#[tokio::test]
async fn test_javascript_greeting() {
    assert_greets("javascript", "greet.js").await;
}

#[tokio::test]
async fn test_python_greeting() {
    assert_greets("python", "greet.py").await;
}

#[tokio::test]
async fn test_c_greeting() {
    assert_greets("c", "greet.c").await;
}

#[tokio::test]
async fn test_cpp_greeting() {
    assert_greets("cpp", "greet.cpp").await;
}

#[tokio::test]
async fn test_java_greeting_with_any_public_class_name() {
    assert_greets("java", "Greeter.java").await;
}

#[tokio::test]
async fn test_go_greeting() {
    assert_greets("go", "greet.go").await;
}

#[tokio::test]
async fn test_php_greeting() {
    assert_greets("php", "greet.php").await;
}

#[tokio::test]
async fn test_ruby_greeting() {
    assert_greets("ruby", "greet.rb").await;
}
