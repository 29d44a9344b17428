//! End-to-end reconciliation of values files through the engine

use pretty_assertions::assert_eq;
use refpin_client::{
    CachingGitClient, CachingRegistryClient, PullRequest, PullRequestState, RegistryClient,
};
use refpin_core::prelude::*;
use refpin_core::{PromotionInfo, RefDecision};
use refpin_test_utils::{
    init_test_tracing, sha, FakeGitClient, FakeRegistryClient, IMAGE_REPO, REPO_URL,
};
use std::sync::Arc;
use std::time::Duration;

const T1: &str = "main---0000001-2024.05-gaaaa001";
const T2: &str = "main---0000002-2024.05-gbbbb002";
const PR_TAG: &str = "pr-7---0000003-2024.05-gcccc003";

fn values() -> String {
    format!(
        "\
# Service values
global:
  gitConfig:
    repoURL: {REPO_URL}
    path: services/api
  dockerImage:
    repository: {IMAGE_REPO}

dev:
  gitConfig:
    ref: main          # pinned by automation
    track: main
  dockerImage:
    tag: \"{T1}\"
    trackMutableTag: main

preview:
  gitConfig:
    ref: {preview}
    trackMutableRef: pr-7
  dockerImage:
    tag: {PR_TAG}
    track: pr-7

staging:
  promote:
    from: dev
  gitConfig:
    ref: {old}
  dockerImage:
    tag: '{T1}'

prod:
  promote:
    from: staging
  gitConfig:
    ref: {old}
  dockerImage:
    tag: '{T1}'
",
        old = sha("old"),
        preview = sha("pr-seven"),
    )
}

fn git() -> FakeGitClient {
    FakeGitClient::new()
        .with_ref(REPO_URL, "main", &sha("tracked"))
        .with_ref(REPO_URL, "pr-7", &sha("pr-seven"))
        .with_tree(REPO_URL, &sha("tracked"), "services/api", "tree-main")
        .with_tree(REPO_URL, &sha("pr-seven"), "services/api", "tree-pr")
        .with_pull_request(
            REPO_URL,
            PullRequest {
                number: 7,
                state: PullRequestState::Open,
                title: "Preview".to_string(),
                closed_at: None,
            },
        )
}

fn registry() -> FakeRegistryClient {
    FakeRegistryClient::new()
        .with_image(IMAGE_REPO, T1, "v1")
        .with_image(IMAGE_REPO, T2, "v2")
        .with_image(IMAGE_REPO, "main", "v2")
        .with_image(IMAGE_REPO, PR_TAG, "v3")
        .with_image(IMAGE_REPO, "pr-7", "v3")
}

fn engine(config: EngineConfig) -> Engine {
    Engine::new(Arc::new(git()), config).with_registry(Arc::new(registry()))
}

#[tokio::test]
async fn full_pass_updates_every_block() {
    init_test_tracing();
    let outcome = engine(EngineConfig::default())
        .reconcile("values.yaml", &values())
        .await
        .unwrap();

    let out = &outcome.output;
    assert!(out.starts_with("# Service values\n"));
    let dev_ref = format!("    ref: {}          # pinned by automation\n", sha("tracked"));
    assert!(out.contains(&dev_ref));
    assert!(out.contains(&format!("    tag: \"{T2}\"\n    trackMutableTag: main\n")));
    assert!(out.contains(&format!("    ref: {}\n    trackMutableRef: pr-7\n", sha("pr-seven"))));
    assert!(out.contains(&format!("    tag: {PR_TAG}\n    track: pr-7\n")));
    let prod_tail = format!("    ref: {}\n  dockerImage:\n    tag: '{T2}'\n", sha("tracked"));
    assert!(out.ends_with(&prod_tail));

    assert_eq!(outcome.changes.updates.len(), 2);
    let promoted: Vec<(&str, &str)> = outcome
        .changes
        .promotions
        .iter()
        .map(|p| (p.environment.as_str(), p.yaml_path[0].as_str()))
        .collect();
    assert_eq!(
        promoted,
        vec![
            ("staging", "gitConfig"),
            ("staging", "dockerImage"),
            ("prod", "gitConfig"),
            ("prod", "dockerImage"),
        ]
    );
    assert_eq!(
        outcome.changes.promotions[1].info,
        PromotionInfo::Commits(vec!["bbbb002".to_string()])
    );
}

#[tokio::test]
async fn second_pass_is_a_no_op() {
    let engine = engine(EngineConfig::default().with_cleanup_closed_prs(true));
    let first = engine.reconcile("values.yaml", &values()).await.unwrap();
    let second = engine.reconcile("values.yaml", &first.output).await.unwrap();
    assert_eq!(second.output, first.output);
    assert!(second.changes.is_empty());
}

#[tokio::test]
async fn files_without_trackables_round_trip() {
    let text = "\
# plain values
app:
  replicas: 3
  env: [a, b]
  annotations:
    note: >
      folded text
      stays put
  empty:
";
    let outcome = engine(EngineConfig::default()).reconcile("values.yaml", text).await.unwrap();
    assert_eq!(outcome.output, text);
    assert!(!outcome.is_modified(text));
}

#[tokio::test]
async fn frozen_blocks_are_never_written() {
    let config = EngineConfig::default()
        .with_frozen_environment("dev")
        .with_frozen_environment("prod");
    let outcome = engine(config).reconcile("values.yaml", &values()).await.unwrap();
    let out = &outcome.output;
    assert!(out.contains("    ref: main          # pinned by automation\n"));
    assert!(out.ends_with(&format!("    ref: {}\n  dockerImage:\n    tag: '{T1}'\n", sha("old"))));
    assert!(outcome.changes.promotions.iter().all(|p| p.environment == "staging"));
}

#[tokio::test]
async fn numeric_looking_values_are_quoted() {
    let git = FakeGitClient::new()
        .with_ref(REPO_URL, "main", &sha("2024"))
        .with_tree(REPO_URL, &sha("2024"), "svc", "tree");
    let text = format!(
        "dev:\n  gitConfig:\n    repoURL: {REPO_URL}\n    path: svc\n    ref: \
         main\n    track: main\n"
    );
    let outcome = Engine::new(Arc::new(git), EngineConfig::default())
        .reconcile("values.yaml", &text)
        .await
        .unwrap();
    assert!(outcome.output.contains(&format!("    ref: '{}'\n", sha("2024"))));
}

#[tokio::test]
async fn closed_pull_requests_are_retired() {
    let git = git().with_pull_request(
        REPO_URL,
        PullRequest {
            number: 7,
            state: PullRequestState::Closed,
            title: "Preview".to_string(),
            closed_at: None,
        },
    );
    let config = EngineConfig::default()
        .with_cleanup_closed_prs(true)
        .with_promote(false);
    let engine = Engine::new(Arc::new(git), config)
        .with_registry(Arc::new(registry()));
    let outcome = engine.reconcile("envs/api.yaml", &values()).await.unwrap();

    assert_eq!(outcome.changes.cleanups.len(), 1);
    let cleanup = &outcome.changes.cleanups[0];
    assert_eq!(cleanup.environment, "preview");
    assert_eq!(cleanup.file, "envs/api.yaml");
    assert_eq!(cleanup.url, "https://github.com/example/monorepo/pull/7");

    // Retired directives now follow main in the same pass.
    let out = &outcome.output;
    assert!(out.contains(&format!("    ref: {}\n    trackMutableRef: main\n", sha("tracked"))));
    assert!(out.contains(&format!("    tag: {T2}\n    track: main\n")));
}

#[tokio::test]
async fn tree_match_keeps_the_current_pin() {
    let git = git().with_tree(REPO_URL, &sha("old"), "services/api", "tree-main");
    let text = format!(
        "dev:\n  gitConfig:\n    repoURL: {REPO_URL}\n    path: \
         services/api\n    ref: {}\n    track: main\n",
        sha("old")
    );

    let trackables = Engine::new(Arc::new(FakeGitClient::new()), EngineConfig::default())
        .plan(&text)
        .unwrap();
    let Trackable::GitRef(t) = &trackables[0] else {
        panic!("expected a git ref trackable, got {:?}", trackables[0]);
    };
    let resolved = refpin_core::git_ref::resolve(&git, t).await.unwrap();
    assert_eq!(resolved.decision, RefDecision::PathUnchanged);

    let outcome = Engine::new(Arc::new(git), EngineConfig::default())
        .reconcile("values.yaml", &text)
        .await
        .unwrap();
    assert_eq!(outcome.output, text);
    assert!(outcome.changes.is_empty());
}

#[tokio::test]
async fn resolution_errors_point_at_the_directive() {
    let text = format!(
        "dev:\n  gitConfig:\n    repoURL: {REPO_URL}\n    path: svc\n    ref: x\n    track: gone\n"
    );
    let err = Engine::new(Arc::new(git()), EngineConfig::default())
        .reconcile("values.yaml", &text)
        .await
        .unwrap_err();
    let location = err.location().unwrap();
    assert_eq!((location.line, location.column), (6, 12));
    assert!(err.to_string().contains("line 6, column 12"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn caching_clients_coalesce_lookups() {
    let fake = Arc::new(git().with_latency(Duration::from_millis(20)));
    let mut text =
        format!("global:\n  gitConfig:\n    repoURL: {REPO_URL}\n    path: services/api\n");
    for env in ["a", "b", "c", "d", "e", "f"] {
        text.push_str(&format!("{env}:\n  gitConfig:\n    ref: {}\n    track: main\n", sha("old")));
    }

    let git = Arc::new(CachingGitClient::new(fake.clone()));
    let registry = Arc::new(CachingRegistryClient::new(registry()));
    let config = EngineConfig::default().with_max_concurrent_resolutions(6);
    let engine = Engine::new(git.clone(), config).with_registry(registry);
    let outcome = engine.reconcile("values.yaml", &text).await.unwrap();

    assert_eq!(outcome.changes.updates.len(), 6);
    assert_eq!(fake.calls("resolve_ref_to_sha"), 1);
    assert_eq!(fake.calls("get_tree_sha_for_path"), 2);

    let trees = git.tree_snapshot().await;
    assert_eq!(trees.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chart_versions_are_fetched_once() {
    let fake = Arc::new(
        FakeRegistryClient::new()
            .with_chart("oci://charts", "router", "1.52.0")
            .with_latency(Duration::from_millis(20)),
    );
    let registry = Arc::new(CachingRegistryClient::new(fake.clone()));

    let lookups = (0..8).map(|_| {
        let registry = registry.clone();
        tokio::spawn(async move {
            registry.get_latest_chart_version("oci://charts", "router").await
        })
    });
    for version in futures::future::join_all(lookups).await {
        assert_eq!(version.unwrap().unwrap(), "1.52.0");
    }
    let missing = registry.get_latest_chart_version("oci://charts", "gateway").await;
    assert!(missing.is_err());

    assert_eq!(fake.calls("get_latest_chart_version"), 2);
}
