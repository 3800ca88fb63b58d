//! Loading, coalescing and gating behaviour of the template registry

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use stencil::{
    DirectorySource, DuplicateBlocks, EngineConfig, EntryState, ErrorKind, MemorySource, Registry,
    SourceError, TemplateError, TemplateSource, Value, Variables,
};

/// Give spawned load tasks a chance to run to their next suspension point
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Fails the test instead of hanging when a load never settles
async fn bounded<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("registry request should settle")
}

#[tokio::test]
async fn test_concurrent_requests_fetch_once() {
    let source = Arc::new(MemorySource::new().with_template("page", "hello {{ who }}"));
    let registry = Registry::from_shared(source.clone(), EngineConfig::default());

    let handles: Vec<_> = (0..8i64)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                let mut vars = Variables::new();
                vars.insert("who".to_string(), Value::from(i));
                registry.render("page", vars).await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let out = bounded(handle).await.expect("task should not panic");
        assert_eq!(out.expect("Should render"), format!("hello {i}"));
    }
    assert_eq!(source.fetch_count("page"), 1);
}

#[tokio::test]
async fn test_shared_ancestor_fetched_once() {
    let source = Arc::new(
        MemorySource::new()
            .with_template("base", "[{% block body %}{% endblock %}]")
            .with_template("a", "{% extends base %}{% block body %}a{% endblock %}")
            .with_template("b", "{% extends base %}{% block body %}b{% endblock %}"),
    );
    let registry = Registry::from_shared(source.clone(), EngineConfig::default());

    let (a, b) = bounded(async {
        tokio::join!(
            registry.render("a", Variables::new()),
            registry.render("b", Variables::new())
        )
    })
    .await;

    assert_eq!(a.expect("Should render"), "[a]");
    assert_eq!(b.expect("Should render"), "[b]");
    assert_eq!(source.fetch_count("base"), 1);
}

#[tokio::test]
async fn test_gate_holds_template_until_released() {
    let registry = Registry::new(MemorySource::new().with_template("page", "done"));

    let gate = registry.get_with_extra_gate("page");
    assert!(gate.is_armed());
    assert_eq!(gate.name(), "page");

    let handle = tokio::spawn({
        let registry = registry.clone();
        async move { registry.render("page", Variables::new()).await }
    });
    settle().await;

    assert_eq!(registry.state("page"), Some(EntryState::Loading));
    assert!(!handle.is_finished());

    gate.release();
    let out = bounded(handle).await.expect("task should not panic");
    assert_eq!(out.expect("Should render"), "done");
    assert_eq!(registry.state("page"), Some(EntryState::Ready));
}

#[tokio::test]
async fn test_dropping_gate_releases_it() {
    let registry = Registry::new(MemorySource::new().with_template("page", "done"));

    {
        let _gate = registry.get_with_extra_gate("page");
        settle().await;
        assert_eq!(registry.state("page"), Some(EntryState::Loading));
    }

    let out = bounded(registry.render("page", Variables::new())).await;
    assert_eq!(out.expect("Should render"), "done");
}

#[tokio::test]
async fn test_multiple_gates_all_required() {
    let registry = Registry::new(MemorySource::new().with_template("page", "done"));

    let first = registry.get_with_extra_gate("page");
    let second = registry.get_with_extra_gate("page");
    settle().await;

    first.release();
    settle().await;
    assert_eq!(registry.state("page"), Some(EntryState::Loading));

    second.release();
    let out = bounded(registry.render("page", Variables::new())).await;
    assert_eq!(out.expect("Should render"), "done");
}

#[tokio::test]
async fn test_gated_ancestor_holds_descendant() {
    let registry = Registry::new(
        MemorySource::new()
            .with_template("base", "<{% block x %}{% endblock %}>")
            .with_template("child", "{% extends base %}{% block x %}child{% endblock %}"),
    );

    let gate = registry.get_with_extra_gate("base");
    let handle = tokio::spawn({
        let registry = registry.clone();
        async move { registry.render("child", Variables::new()).await }
    });
    settle().await;

    assert_eq!(registry.state("base"), Some(EntryState::Loading));
    assert_eq!(registry.state("child"), Some(EntryState::Loading));
    assert!(!handle.is_finished());

    gate.release();
    let out = bounded(handle).await.expect("task should not panic");
    assert_eq!(out.expect("Should render"), "<child>");
}

#[tokio::test]
async fn test_waiters_complete_in_registration_order() {
    let registry = Registry::new(MemorySource::new().with_template("page", "done"));
    let order = Arc::new(Mutex::new(Vec::new()));

    let gate = registry.get_with_extra_gate("page");
    let mut handles = Vec::new();
    for i in 0..5 {
        let registry = registry.clone();
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            registry.get("page").await.expect("Should load");
            order.lock().unwrap().push(i);
        }));
        // Let this waiter register before the next one is spawned
        settle().await;
    }

    gate.release();
    for handle in handles {
        bounded(handle).await.expect("task should not panic");
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_mutual_extends_is_dependency_error() {
    let registry = Registry::new(
        MemorySource::new()
            .with_template("a", "{% extends b %}")
            .with_template("b", "{% extends a %}"),
    );

    let err = bounded(registry.get("a")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Dependency);
    assert!(matches!(
        err.root_cause(),
        TemplateError::CircularExtends { .. }
    ));
    assert_eq!(registry.state("a"), Some(EntryState::Failed));
    assert_eq!(registry.state("b"), Some(EntryState::Failed));
}

#[tokio::test]
async fn test_mutual_extends_requested_concurrently() {
    let registry = Registry::new(
        MemorySource::new()
            .with_template("a", "{% extends b %}")
            .with_template("b", "{% extends a %}"),
    );

    let (a, b) = bounded(async { tokio::join!(registry.get("a"), registry.get("b")) }).await;

    for result in [a, b] {
        let err = result.unwrap_err();
        assert!(err.is_dependency_error(), "unexpected error: {err}");
    }
}

#[tokio::test]
async fn test_self_extends_is_dependency_error() {
    let registry = Registry::new(MemorySource::new().with_template("loop", "{% extends loop %}x"));

    let err = bounded(registry.get("loop")).await.unwrap_err();
    assert_eq!(
        err,
        TemplateError::CircularExtends {
            chain: vec!["loop".to_string(), "loop".to_string()]
        }
    );
}

#[tokio::test]
async fn test_missing_ancestor_fails_descendant() {
    let registry = Registry::new(
        MemorySource::new().with_template("child", "{% extends ghost %}{% block a %}{% endblock %}"),
    );

    let err = bounded(registry.render("child", Variables::new())).await.unwrap_err();
    assert!(matches!(
        &err,
        TemplateError::Ancestor { name, ancestor, .. } if name == "child" && ancestor == "ghost"
    ));
    assert_eq!(
        err.root_cause(),
        &TemplateError::Source(SourceError::not_found("ghost"))
    );
    assert_eq!(registry.state("child"), Some(EntryState::Failed));
    assert_eq!(registry.state("ghost"), Some(EntryState::Failed));
}

#[tokio::test]
async fn test_missing_root_rejects_every_waiter_down_the_chain() {
    let source = Arc::new(
        MemorySource::new()
            .with_template("leaf", "{% extends mid %}{% block a %}leaf{% endblock %}")
            .with_template("mid", "{% extends root %}{% block a %}mid{% endblock %}"),
    );
    let registry = Registry::from_shared(source.clone(), EngineConfig::default());

    let (leaf_first, leaf_second, mid, root) = bounded(async {
        tokio::join!(
            registry.get("leaf"),
            registry.render("leaf", Variables::new()),
            registry.get("mid"),
            registry.get("root"),
        )
    })
    .await;

    let missing = TemplateError::Source(SourceError::not_found("root"));
    let errors = [
        leaf_first.unwrap_err(),
        leaf_second.unwrap_err(),
        mid.unwrap_err(),
        root.unwrap_err(),
    ];
    for err in &errors {
        assert_eq!(err.root_cause(), &missing);
        assert!(err.is_dependency_error());
    }
    assert!(matches!(
        &errors[0],
        TemplateError::Ancestor { name, ancestor, .. } if name == "leaf" && ancestor == "mid"
    ));
    assert_eq!(errors[0], errors[1]);
    assert_eq!(errors[3], missing);

    for name in ["leaf", "mid", "root"] {
        assert_eq!(registry.state(name), Some(EntryState::Failed));
        assert_eq!(source.fetch_count(name), 1);
    }
}

#[tokio::test]
async fn test_broken_ancestor_reports_underlying_kind() {
    let registry = Registry::new(
        MemorySource::new()
            .with_template("base", "{{ unterminated")
            .with_template("child", "{% extends base %}"),
    );

    let err = bounded(registry.get("child")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Dependency);
    assert_eq!(err.root_cause().kind(), ErrorKind::Syntax);
}

#[tokio::test]
async fn test_structure_error_kind() {
    let registry = Registry::new(MemorySource::new().with_template("page", "{% endif %}"));

    let err = bounded(registry.get("page")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structure);
}

struct StalledSource;

#[async_trait]
impl TemplateSource for StalledSource {
    async fn fetch(&self, _name: &str) -> Result<String, SourceError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_fetch_timeout() {
    let config = EngineConfig::new().with_fetch_timeout(Duration::from_millis(50));
    let registry = Registry::with_config(StalledSource, config);

    let err = bounded(registry.get("slow")).await.unwrap_err();
    assert!(matches!(
        err,
        TemplateError::Source(SourceError::Timeout { ref name, .. }) if name == "slow"
    ));
    assert_eq!(registry.state("slow"), Some(EntryState::Failed));
}

#[tokio::test]
async fn test_config_flows_into_compilation() {
    let config = EngineConfig::from_str(
        r#"
strict_directives = true
duplicate_blocks = "reject"
"#,
    )
    .expect("Should parse config");
    assert_eq!(config.duplicate_blocks, DuplicateBlocks::Reject);

    let registry = Registry::with_config(
        MemorySource::new()
            .with_template("dup", "{% block a %}{% endblock %}{% block a %}{% endblock %}")
            .with_template("odd", "{% include header %}"),
        config,
    );

    let dup = bounded(registry.get("dup")).await.unwrap_err();
    assert_eq!(dup.kind(), ErrorKind::Structure);

    let odd = bounded(registry.get("odd")).await.unwrap_err();
    assert_eq!(odd.kind(), ErrorKind::Syntax);
}

#[tokio::test]
async fn test_directory_source_end_to_end() {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    std::fs::create_dir(dir.path().join("layouts")).expect("Should create dir");
    std::fs::write(
        dir.path().join("layouts/base.html"),
        "<h1>{% block title %}{% endblock %}</h1>",
    )
    .expect("Should write base");
    std::fs::write(
        dir.path().join("index.html"),
        r#"{% extends "layouts/base.html" %}{% block title %}{{ title }}{% endblock %}"#,
    )
    .expect("Should write index");

    let registry = Registry::new(DirectorySource::new(dir.path()));
    let mut vars = Variables::new();
    vars.insert("title".to_string(), Value::from("Home"));

    let out = bounded(registry.render("index.html", vars)).await;
    insta::assert_snapshot!(out.expect("Should render"), @"<h1>Home</h1>");

    let missing = bounded(registry.get("nope.html")).await.unwrap_err();
    assert!(matches!(
        missing,
        TemplateError::Source(SourceError::NotFound { .. })
    ));
}
