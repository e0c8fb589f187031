//! End-to-end scenarios against the in-memory engine.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use berth_core::testing::{ExecScript, FakeEngine};
use berth_sdk::{
    CallContext, ContainerBuilder, ContainerLifecycleManager, ContainerState, ExecRunner,
    HealthMonitor, HealthStatus, ImageBuildPipeline, ImageGc, PollOptions,
};

fn poll() -> PollOptions {
    PollOptions {
        interval: Duration::from_millis(1),
        max_attempts: 10,
    }
}

fn curl() -> Vec<String> {
    vec!["curl".into(), "-f".into(), "localhost".into()]
}

#[test]
fn web_container_full_lifecycle() {
    let engine = FakeEngine::with_chunk_size(5);
    let ctx = CallContext::background();
    let lifecycle = ContainerLifecycleManager::new(&engine);

    let config = ContainerBuilder::new("web")
        .image("nginx")
        .healthcheck(["curl", "-f", "localhost"], Duration::from_secs(1))
        .build()
        .expect("config");
    let id = lifecycle.create(&ctx, &config).expect("create");
    lifecycle.start(&ctx, &id).expect("start");
    assert_eq!(engine.container_state("web"), Some(ContainerState::Running));

    engine.script_health("web", &["starting", "starting", "healthy"]);
    let report = HealthMonitor::new(&engine).wait_until_healthy(&ctx, &id, &poll());
    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(report.error.is_none());

    let page = "<html><body>Welcome to nginx!</body></html>\n";
    engine.script_exec(&["curl", "-f", "localhost"], ExecScript::new(page, "", 0));
    let body = ExecRunner::new(&engine)
        .exec(&ctx, &id, &curl())
        .expect("curl succeeds");
    assert_eq!(body, page);

    lifecycle.stop(&ctx, &id).expect("stop");
    assert_eq!(engine.container_state("web"), Some(ContainerState::Exited));
    lifecycle.purge(&ctx, &id).expect("purge after stop");
    assert_eq!(engine.container_state("web"), None);
    assert_eq!(engine.stream_drops(), 1);
}

#[test]
fn failing_probe_command_reports_exit_code() {
    let engine = FakeEngine::new();
    let ctx = CallContext::background();
    let lifecycle = ContainerLifecycleManager::new(&engine);
    let config = ContainerBuilder::new("web").image("nginx").build().expect("config");
    let id = lifecycle.run(&ctx, &config).expect("run");

    engine.script_exec(
        &["curl", "-f", "localhost"],
        ExecScript::new("", "curl: (7) Failed to connect to localhost port 80", 7),
    );
    let err = ExecRunner::new(&engine).exec(&ctx, &id, &curl()).unwrap_err();
    assert_eq!(err.exit_code(), Some(7));
    assert!(err.to_string().contains("Failed to connect"));

    lifecycle.purge(&ctx, &id).expect("purge without stop");
}

#[test]
fn build_then_delete_image_twice() {
    let engine = FakeEngine::new();
    let ctx = CallContext::background();
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    std::fs::write(dir.path().join("Dockerfile"), "FROM nginx\nCOPY site /usr/share/nginx/html\n")
        .expect("write");
    std::fs::create_dir(dir.path().join("site")).expect("mkdir");
    std::fs::write(dir.path().join("site/index.html"), "hello").expect("write");

    engine.script_build(&[
        r#"{"stream":"Step 1/2 : FROM nginx\n"}"#,
        r#"{"stream":"Step 2/2 : COPY site /usr/share/nginx/html\n"}"#,
        r#"{"aux":{"ID":"sha256:5eed"}}"#,
        r#"{"stream":"Successfully tagged site:1\n"}"#,
    ]);
    let summary = ImageBuildPipeline::new(&engine)
        .build(&ctx, dir.path(), "site:1")
        .expect("build");
    assert_eq!(summary.tag, "site:1");
    assert!(engine.has_image("site:1"));

    let gc = ImageGc::new(&engine);
    assert!(gc.delete_image(&ctx, "site:1").into_result().expect("first delete"));
    assert!(!gc.delete_image(&ctx, "site:1").into_result().expect("second delete"));
}

#[test]
fn prune_on_clean_store_is_empty() {
    let engine = FakeEngine::new();
    let _ = engine.add_image(Some("nginx:latest"), 1024);
    let report = ImageGc::new(&engine)
        .prune_dangling_images(&CallContext::background())
        .expect("prune");
    assert_eq!(report.space_reclaimed, 0);
    assert!(report.images_deleted.is_empty());
}

#[test]
fn components_share_one_client_across_threads() {
    let engine = FakeEngine::new();
    let ctx = CallContext::background();

    std::thread::scope(|scope| {
        for name in ["api", "worker", "cache"] {
            let engine = &engine;
            let _ = scope.spawn(move || {
                let lifecycle = ContainerLifecycleManager::new(engine);
                let config = ContainerBuilder::new(name).image("alpine").build().expect("config");
                let id = lifecycle.run(&ctx, &config).expect("run");
                lifecycle.stop(&ctx, &id).expect("stop");
                lifecycle.purge(&ctx, &id).expect("purge");
            });
        }
    });

    assert!(ContainerLifecycleManager::new(&engine)
        .list(&ctx, true)
        .expect("list")
        .is_empty());
}
