//! Update-ladder behaviour against a mocked custom REST surface.

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use amc_rs::queue::task::{CoreUpdateArgs, PluginUpdateArgs, UpdateAllArgs};
use amc_rs::wp::tasks::{wp_update_all_task, wp_update_core_task, wp_update_plugins_task};
use amc_rs::wp::{UpdaterConfig, WpUpdater};

fn updater() -> WpUpdater {
    WpUpdater::new(
        reqwest::Client::new(),
        UpdaterConfig {
            status_timeout: Duration::from_secs(5),
            update_timeout: Duration::from_secs(5),
            settle: Duration::from_millis(10),
        },
    )
}

fn stale_status() -> Value {
    json!({
        "plugins": [{
            "name": "Akismet",
            "slug": "akismet",
            "plugin_file": "akismet/akismet.php",
            "version": "5.0",
            "latest_version": "5.3",
            "update_available": true
        }],
        "themes": [],
        "core": {"current_version": "6.6", "latest_version": "6.6", "update_available": false}
    })
}

fn updated_status() -> Value {
    json!({
        "plugins": [{
            "name": "Akismet",
            "slug": "akismet",
            "plugin_file": "akismet/akismet.php",
            "version": "5.3",
            "latest_version": "5.3",
            "update_available": false
        }],
        "themes": [],
        "core": {"current_version": "6.6", "latest_version": "6.6", "update_available": false}
    })
}

#[tokio::test]
async fn ladder_terminates_after_batch_form_when_verification_passes() {
    let server = MockServer::start().await;

    // one status read to normalise "akismet", one before-snapshot; both
    // stale, then the post-settle read reports the bump
    Mock::given(method("GET"))
        .and(path("/wp-json/custom/v1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stale_status()))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/custom/v1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(updated_status()))
        .mount(&server)
        .await;

    // exactly one batch form POST; the ladder must not fall through
    Mock::given(method("POST"))
        .and(path("/wp-json/custom/v1/update-plugins"))
        .and(body_string_contains("plugins=akismet%2Fakismet.php"))
        .and(body_string_contains("mode=single"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let args = PluginUpdateArgs {
        base_url: server.uri(),
        plugins: Some(vec!["akismet".to_string()]),
        auto_select_outdated: true,
        blocklist: None,
        headers: None,
        auth: None,
    };
    let result = wp_update_plugins_task(&updater(), &args).await;

    assert_eq!(result["ok"], json!(true));
    assert_eq!(
        result["plugins"]["selected"],
        json!(["akismet/akismet.php"])
    );
    let inner = &result["plugins"]["result"];
    assert_eq!(inner["mode"], json!("single"));
    assert_eq!(inner["result"]["per_plugin"], json!([]));
    assert_eq!(
        inner["result"]["batch"][0]["mode"],
        json!("batch_form")
    );

    server.verify().await;
}

#[tokio::test]
async fn core_precheck_skips_when_already_fresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/custom/v1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(updated_status()))
        .mount(&server)
        .await;
    // the update endpoint must never be hit
    Mock::given(method("POST"))
        .and(path("/wp-json/custom/v1/update-core"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let args = CoreUpdateArgs {
        base_url: server.uri(),
        precheck: true,
        headers: None,
        auth: None,
    };
    let result = wp_update_core_task(&updater(), &args).await.unwrap();

    assert_eq!(result["ok"], json!(true));
    assert_eq!(result["skipped"], json!(true));
    assert_eq!(result["reason"], json!("core is already up-to-date"));
    assert_eq!(result["current"], json!("6.6"));
    assert_eq!(result["latest"], json!("6.6"));
    assert!(result.get("status_snapshot").is_some());

    server.verify().await;
}

#[tokio::test]
async fn update_all_prechecks_skip_noops() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/custom/v1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(updated_status()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/custom/v1/update-plugins"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/custom/v1/update-core"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let args = UpdateAllArgs {
        base_url: server.uri(),
        include_plugins: true,
        include_core: true,
        precheck_core: true,
        blocklist: None,
        headers: None,
        auth: None,
    };
    let result = wp_update_all_task(&updater(), &args).await.unwrap();

    assert_eq!(result["ok"], json!(true));
    assert_eq!(result["plugins"]["skipped"], json!(true));
    assert_eq!(result["core"]["skipped"], json!(true));
    assert_eq!(result["core"]["reason"], json!("core already up to date"));

    server.verify().await;
}

#[tokio::test]
async fn blocklist_filters_auto_selection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/custom/v1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stale_status()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/custom/v1/update-plugins"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let args = PluginUpdateArgs {
        base_url: server.uri(),
        plugins: None,
        auto_select_outdated: true,
        blocklist: Some(vec!["akismet/akismet.php".to_string()]),
        headers: None,
        auth: None,
    };
    let result = wp_update_plugins_task(&updater(), &args).await;

    assert_eq!(result["ok"], json!(true));
    assert_eq!(result["plugins"]["skipped"], json!(true));
    assert_eq!(result["plugins"]["selected"], json!([]));

    server.verify().await;
}

#[tokio::test]
async fn status_fetch_failure_is_a_structured_result() {
    // nothing listening on a closed port
    let args = PluginUpdateArgs {
        base_url: "http://127.0.0.1:1".to_string(),
        plugins: None,
        auto_select_outdated: true,
        blocklist: None,
        headers: None,
        auth: None,
    };
    let result = wp_update_plugins_task(&updater(), &args).await;

    assert_eq!(result["ok"], json!(false));
    assert!(result["error"]
        .as_str()
        .unwrap()
        .starts_with("Status fetch failed:"));
}
