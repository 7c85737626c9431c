//! Sandbox lifecycle integration tests.
//!
//! Tests the full pipeline: CommandExecutor → SandboxRegistry →
//! SandboxHandle → ContainerRuntime (MockRuntime). These tests do NOT
//! require Docker — they use MockRuntime for deterministic behavior.

use std::sync::Arc;

use helios_core::SandboxConfig;
use helios_sandbox::{
    CommandExecutor, ExecResult, InMemoryProjectStore, MockRuntime, ProjectRecord, RunOutcome,
    RunRequest, SandboxProvision, SandboxRegistry,
};

// =============================================================================
// Helpers
// =============================================================================

fn registry_in(
    dir: &std::path::Path,
    runtime: Arc<MockRuntime>,
) -> Arc<SandboxRegistry> {
    let config = SandboxConfig {
        workspace_root: dir.to_path_buf(),
        ..SandboxConfig::default()
    };
    Arc::new(SandboxRegistry::new(runtime, config))
}

fn exec_ok(output: &str) -> ExecResult {
    ExecResult {
        exit_code: 0,
        output: output.as_bytes().to_vec(),
        timed_out: false,
    }
}

// =============================================================================
// 1. Idempotent reuse and default port contract
// =============================================================================

#[tokio::test]
async fn repeated_get_or_start_reuses_handle_and_bindings() {
    let runtime = Arc::new(MockRuntime::default());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), runtime.clone());

    let first = registry.get_or_start("agent-1").await.unwrap();
    let second = registry.get_or_start("agent-1").await.unwrap();

    assert_eq!(first.id(), second.id());
    assert_eq!(first.ports(), second.ports());
    assert_eq!(first.host_workspace(), second.host_workspace());
    assert_eq!(runtime.run_count(), 1);

    // Stock image contract: all five declared ports are bound
    for port in [7788, 6080, 5901, 8000, 8080] {
        let url = first.preview_url(port).unwrap();
        assert!(url.starts_with("http://127.0.0.1:"));
    }
    assert!(first.preview_url(9999).unwrap_err().is_not_found());

    // Workspace directory is deterministic: {root}/{id}
    assert_eq!(first.host_workspace(), dir.path().join("agent-1"));
}

// =============================================================================
// 2. Self-healing after external container removal
// =============================================================================

#[tokio::test]
async fn externally_removed_container_is_rebuilt_transparently() {
    let runtime = Arc::new(MockRuntime::default());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), runtime.clone());

    let handle = registry.get_or_start("agent-1").await.unwrap();
    runtime.vanish(&handle.container_id().await.unwrap());

    // Caller never sees the staleness
    let healed = registry.get_or_start("agent-1").await.unwrap();
    assert_eq!(healed.id(), "agent-1");
    assert!(healed.status().await.unwrap().is_running());
}

// =============================================================================
// 3. Executor success/failure contract
// =============================================================================

#[tokio::test]
async fn executor_success_and_failure_shapes() {
    let runtime = Arc::new(MockRuntime::with_exec_responses(vec![
        exec_ok("hi\n"),
        ExecResult {
            exit_code: 3,
            output: Vec::new(),
            timed_out: false,
        },
        exec_ok("/workspace/data/pdfs\n"),
    ]));
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), runtime);
    let executor = CommandExecutor::new(registry, "agent-1");

    match executor.run(RunRequest::new("echo hi")).await {
        RunOutcome::Success {
            output,
            exit_code,
            cwd,
        } => {
            assert!(output.contains("hi"));
            assert_eq!(exit_code, 0);
            assert_eq!(cwd, "/workspace");
        }
        RunOutcome::Failure { message } => panic!("unexpected failure: {}", message),
    }

    let failure = executor.run(RunRequest::new("exit 3")).await;
    assert!(!failure.is_success());
    assert!(failure.text().contains('3'));

    let pwd = executor
        .run(RunRequest::new("pwd").in_folder("data/pdfs"))
        .await;
    assert!(pwd.is_success());
    assert!(pwd.text().contains("/workspace/data/pdfs"));
}

// =============================================================================
// 4. Executor is a terminal error boundary
// =============================================================================

#[tokio::test]
async fn executor_converts_transport_faults_into_failure_outcomes() {
    let runtime = Arc::new(MockRuntime::default());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), runtime.clone());
    let executor = CommandExecutor::new(registry, "agent-1");

    runtime.fail_next_run(helios_core::Error::transport("daemon unreachable"));
    let outcome = executor.run(RunRequest::new("echo hi")).await;
    assert!(!outcome.is_success());
    assert!(outcome.text().contains("Error executing command"));
}

// =============================================================================
// 5. Project resolution → executor wiring
// =============================================================================

#[tokio::test]
async fn project_resolution_feeds_the_executor() {
    let runtime = Arc::new(MockRuntime::with_exec_responses(vec![exec_ok("ok\n")]));
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), runtime);

    let store = InMemoryProjectStore::new();
    store.insert(ProjectRecord {
        project_id: "proj-1".into(),
        sandbox: Some(SandboxProvision {
            id: "sb-proj-1".into(),
            pass: None,
        }),
    });

    let executor = CommandExecutor::for_project(registry.clone(), &store, "proj-1")
        .await
        .unwrap();
    assert_eq!(executor.sandbox_id(), "sb-proj-1");

    let outcome = executor.run(RunRequest::new("true")).await;
    assert!(outcome.is_success());

    // Missing project is NotFound before any sandbox work happens
    match CommandExecutor::for_project(registry, &store, "ghost").await {
        Err(err) => assert!(err.is_not_found()),
        Ok(_) => panic!("resolution for an unknown project should fail"),
    }
}

// =============================================================================
// 6. Handle fs() round trip through the workspace mount directory
// =============================================================================

#[tokio::test]
async fn workspace_fs_reads_what_was_uploaded() {
    let runtime = Arc::new(MockRuntime::default());
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), runtime);

    let handle = registry.get_or_start("agent-1").await.unwrap();
    let fs = handle.fs().await.unwrap();

    fs.upload("src/main.py", b"print('hello')").await.unwrap();
    let bytes = fs.download("workspace/src/main.py").await.unwrap();
    assert_eq!(bytes, b"print('hello')");

    let info = fs.info("src/main.py").await.unwrap();
    assert_eq!(info.name, "main.py");
    assert!(!info.is_dir);

    assert!(fs.resolve("../../etc/passwd").is_err());
}
