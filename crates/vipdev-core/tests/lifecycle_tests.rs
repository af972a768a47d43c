use pretty_assertions::assert_eq;
use serde_json::json;
use vipdev_core::prelude::*;
use vipdev_core::render::ENVIRONMENT_FILE;
use vipdev_core::RenderError;
use vipdev_test_utils::{
    site_record, web_allocation, RecordingCloner, RunnerAction, ScriptedInventory, TestEnv,
};

fn create(slug: &str) -> CreateRequest {
    CreateRequest {
        slug: slug.to_string(),
        start: true,
        ..CreateRequest::default()
    }
}

#[tokio::test]
async fn test_create_with_defaults() {
    let env = TestEnv::new();
    env.lifecycle().create(create("app1")).await.unwrap();

    assert_eq!(
        env.descriptor_json("app1"),
        json!({
            "siteSlug": "app1",
            "wpTitle": "VIP Dev",
            "multisite": false,
            "phpVersion": "7.3",
            "wordpress": {"mode": "image", "image": "wpvipdev/wordpress", "tag": "5.6"},
            "muplugins": {"mode": "image", "image": "wpvipdev/mu-plugins", "tag": "auto"},
            "jetpack": {"mode": "inherit"},
            "clientcode": {
                "mode": "image",
                "image": "wpvipdev/skeleton",
                "tag": "181a17d9aedf7da73730d65ccef3d8dbf172a5c5"
            },
        })
    );
    assert!(env.instance_dir("app1").join(ENVIRONMENT_FILE).is_file());
    assert_eq!(
        env.runner.actions(),
        vec![(RunnerAction::Start, env.instance_dir("app1"))]
    );
    assert!(env.cloner.calls().is_empty());
}

#[tokio::test]
async fn test_create_with_version_and_local_jetpack() {
    let env = TestEnv::new();
    let outcome = env
        .lifecycle()
        .create(CreateRequest {
            selectors: SelectorArgs {
                wordpress: Some("6.0".into()),
                jetpack: Some("/local/jp".into()),
                ..SelectorArgs::default()
            },
            ..create("app2")
        })
        .await
        .unwrap();

    assert_eq!(
        outcome.descriptor.wordpress,
        Some(WordPressSelector::Image {
            image: "wpvipdev/wordpress".into(),
            tag: "6.0".into()
        })
    );
    assert_eq!(
        outcome.descriptor.jetpack,
        Some(JetpackSelector::Local {
            dir: "/local/jp".into()
        })
    );
}

#[tokio::test]
async fn test_upgrade_php_only_changes_php() {
    let env = TestEnv::new();
    let lifecycle = env.lifecycle();
    let created = lifecycle.create(create("app1")).await.unwrap();

    let upgraded = lifecycle
        .upgrade(UpgradeRequest {
            slug: "app1".into(),
            selectors: SelectorArgs {
                php: Some("8.0".into()),
                ..SelectorArgs::default()
            },
        })
        .await
        .unwrap();

    let mut expected = created.descriptor;
    expected.php_version = Some("8.0".into());
    assert_eq!(upgraded.descriptor, expected);
    assert_eq!(lifecycle.store().load("app1").unwrap(), expected);
    assert_eq!(upgraded.stage, Stage::Rebuilt);
    assert_eq!(
        env.runner.actions().last(),
        Some(&(RunnerAction::Rebuild, env.instance_dir("app1")))
    );
}

#[tokio::test]
async fn test_create_with_git_client_code() {
    let env = TestEnv::new();
    let checkout = env.instance_dir("app3").join("clientcode");

    let outcome = env
        .lifecycle()
        .create(CreateRequest {
            selectors: SelectorArgs {
                clientcode: Some("git@host:org/repo#main".into()),
                ..SelectorArgs::default()
            },
            ..create("app3")
        })
        .await
        .unwrap();

    let calls = env.cloner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].repo, "git@host:org/repo");
    assert_eq!(calls[0].branch.as_deref(), Some("main"));
    assert_eq!(calls[0].dest, checkout);
    assert!(!calls[0].dest_existed);

    assert_eq!(
        env.descriptor_json("app3")["clientcode"],
        json!({
            "mode": "git",
            "repo": "git@host:org/repo",
            "branch": "main",
            "fetched": true,
            "dir": "./clientcode"
        })
    );
    assert!(matches!(
        outcome.descriptor.clientcode,
        Some(ClientCodeSelector::Git(GitSource { fetched: true, .. }))
    ));
}

#[tokio::test]
async fn test_upgrade_refetches_new_repo_and_clears_checkout() {
    let env = TestEnv::new();
    let lifecycle = env.lifecycle();
    lifecycle
        .create(CreateRequest {
            selectors: SelectorArgs {
                clientcode: Some("git@github.com:org/one".into()),
                ..SelectorArgs::default()
            },
            ..create("app4")
        })
        .await
        .unwrap();
    let checkout = env.instance_dir("app4").join("clientcode");
    std::fs::write(checkout.join("stale.php"), b"<?php").unwrap();

    // untouched git selector is not fetched again
    lifecycle
        .upgrade(UpgradeRequest {
            slug: "app4".into(),
            ..UpgradeRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(env.cloner.calls().len(), 1);

    lifecycle
        .upgrade(UpgradeRequest {
            slug: "app4".into(),
            selectors: SelectorArgs {
                clientcode: Some("git@github.com:org/two#release".into()),
                ..SelectorArgs::default()
            },
        })
        .await
        .unwrap();
    let calls = env.cloner.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].repo, "git@github.com:org/two");
    assert!(!calls[1].dest_existed);
    assert!(!checkout.join("stale.php").exists());
}

#[tokio::test]
async fn test_failed_clone_persists_nothing() {
    let env = TestEnv::with_tools(RecordingCloner::failing(), ScriptedInventory::new());
    let err = env
        .lifecycle()
        .create(CreateRequest {
            selectors: SelectorArgs {
                clientcode: Some("git@github.com:org/repo".into()),
                ..SelectorArgs::default()
            },
            ..create("app5")
        })
        .await
        .unwrap_err();

    assert!(matches!(err, VipdevError::Acquisition(_)));
    assert!(!env.instance_dir("app5").join("instanceData.json").exists());
    assert!(!env.instance_dir("app5").join(ENVIRONMENT_FILE).exists());
    assert!(env.runner.actions().is_empty());
}

#[tokio::test]
async fn test_create_existing_instance_fails() {
    let env = TestEnv::new();
    std::fs::create_dir(env.instance_dir("app1")).unwrap();

    let err = env.lifecycle().create(create("app1")).await.unwrap_err();
    assert!(matches!(err, VipdevError::AlreadyExists { .. }));
    assert_eq!(err.exit_code(), 3);
    assert!(std::fs::read_dir(env.instance_dir("app1")).unwrap().next().is_none());
}

#[tokio::test]
async fn test_upgrade_missing_instance_fails() {
    let env = TestEnv::new();
    let err = env
        .lifecycle()
        .upgrade(UpgradeRequest {
            slug: "missing-instance".into(),
            ..UpgradeRequest::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, VipdevError::NotFound { .. }));
    assert!(!env.instance_dir("missing-instance").exists());
    assert!(env.runner.actions().is_empty());
}

#[tokio::test]
async fn test_create_from_site_inventory() {
    let inventory = ScriptedInventory::new().with_site(
        "1234",
        site_record("Acme", "wpcomvip/acme", "production", true),
        vec![web_allocation("5.7.2", "7.4")],
    );
    let env = TestEnv::with_tools(RecordingCloner::new(), inventory);

    let outcome = env
        .lifecycle()
        .create(CreateRequest {
            site: Some("1234".into()),
            start: false,
            ..create("acme")
        })
        .await
        .unwrap();

    assert_eq!(
        env.inventory.queries(),
        vec!["/sites/1234".to_string(), "/sites/1234/allocations".to_string()]
    );
    let d = outcome.descriptor;
    assert_eq!(d.wp_title, "Acme (1234)");
    assert!(d.multisite);
    assert_eq!(d.php_version.as_deref(), Some("7.4"));
    assert_eq!(
        d.wordpress,
        Some(WordPressSelector::Image {
            image: "wpvipdev/wordpress".into(),
            tag: "5.7.2".into()
        })
    );
    let calls = env.cloner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].repo, "git@github.com:wpcomvip/acme");
    assert_eq!(calls[0].branch.as_deref(), Some("production"));
    assert_eq!(outcome.stage, Stage::Ready);
    assert!(env.runner.actions().is_empty());
}

#[tokio::test]
async fn test_unknown_site_aborts_before_resolution() {
    let env = TestEnv::new();
    let err = env
        .lifecycle()
        .create(CreateRequest {
            site: Some("999".into()),
            ..create("ghost")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, VipdevError::Inventory(_)));
    assert!(!env.instance_dir("ghost").join("instanceData.json").exists());
}

#[tokio::test]
async fn test_render_failure_after_persist_is_recoverable() {
    let env = TestEnv::new();
    let template = env.root.path().join("broken.tmpl");
    std::fs::write(&template, "wp: {{ wordpress.dir }}\n").unwrap();
    let broken = env.lifecycle_with(&env.config().with_template(&template));

    let err = broken.create(create("app6")).await.unwrap_err();
    assert!(matches!(err, VipdevError::Render(RenderError::MissingBinding(_))));
    // descriptor was saved before rendering
    assert!(broken.store().load("app6").is_ok());

    std::fs::write(&template, "php: {{ phpVersion }}\n").unwrap();
    broken
        .upgrade(UpgradeRequest {
            slug: "app6".into(),
            ..UpgradeRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(env.instance_dir("app6").join(ENVIRONMENT_FILE)).unwrap(),
        "php: 7.3\n"
    );
}

#[tokio::test]
async fn test_corrupt_descriptor_is_reported() {
    let env = TestEnv::new();
    std::fs::create_dir(env.instance_dir("bad")).unwrap();
    std::fs::write(env.instance_dir("bad").join("instanceData.json"), b"[1, 2").unwrap();

    let err = env
        .lifecycle()
        .upgrade(UpgradeRequest {
            slug: "bad".into(),
            ..UpgradeRequest::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, VipdevError::CorruptData { .. }));
}

#[tokio::test]
async fn test_upgrade_of_copied_instance_leaves_source_alone() {
    let env = TestEnv::new();
    let lifecycle = env.lifecycle();
    lifecycle.create(create("app1")).await.unwrap();

    std::fs::create_dir(env.instance_dir("app2")).unwrap();
    std::fs::copy(
        env.instance_dir("app1").join("instanceData.json"),
        env.instance_dir("app2").join("instanceData.json"),
    )
    .unwrap();

    let outcome = lifecycle
        .upgrade(UpgradeRequest {
            slug: "app2".into(),
            selectors: SelectorArgs {
                php: Some("8.0".into()),
                ..SelectorArgs::default()
            },
        })
        .await
        .unwrap();

    assert_eq!(outcome.instance_dir, env.instance_dir("app2"));
    assert_eq!(env.descriptor_json("app1")["phpVersion"], json!("7.3"));
    assert_eq!(env.descriptor_json("app1")["siteSlug"], json!("app1"));
    assert_eq!(env.descriptor_json("app2")["phpVersion"], json!("8.0"));
    assert_eq!(env.descriptor_json("app2")["siteSlug"], json!("app2"));
    assert!(env.instance_dir("app2").join(ENVIRONMENT_FILE).is_file());
}

#[tokio::test]
async fn test_upgrade_clones_inline_branch_of_older_descriptor() {
    let env = TestEnv::new();
    std::fs::create_dir(env.instance_dir("legacy")).unwrap();
    let stored = json!({
        "siteSlug": "legacy",
        "wpTitle": "VIP Dev",
        "multisite": false,
        "wordpress": {},
        "muplugins": {},
        "jetpack": {},
        "clientcode": {"mode": "git", "repo": "git@github.com:org/site#production", "fetched": false},
    });
    std::fs::write(
        env.instance_dir("legacy").join("instanceData.json"),
        serde_json::to_vec(&stored).unwrap(),
    )
    .unwrap();

    env.lifecycle()
        .upgrade(UpgradeRequest {
            slug: "legacy".into(),
            ..UpgradeRequest::default()
        })
        .await
        .unwrap();

    let calls = env.cloner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].repo, "git@github.com:org/site");
    assert_eq!(calls[0].branch.as_deref(), Some("production"));
    assert_eq!(
        env.descriptor_json("legacy")["clientcode"],
        json!({
            "mode": "git",
            "repo": "git@github.com:org/site",
            "branch": "production",
            "fetched": true,
            "dir": "./clientcode"
        })
    );
}
