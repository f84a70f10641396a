//! Outdated-fetch behaviour against both status schemas, served over HTTP.

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use amc_rs::wp::outdated::fetch_outdated;
use amc_rs::wp::{coerce_status, select_outdated_plugins};

fn legacy_status_body() -> Value {
    json!({
        "plugins": [{
            "name": "Hello Dolly",
            "plugin_file": "hello.php",
            "version": "1.7.2",
            "latest_version": "1.7.3",
            "update_available": true
        }],
        "themes": [],
        "core": {
            "current_version": "6.5.2",
            "latest_version": "6.6",
            "update_available": true
        },
        "php_mysql": {"php_version": "8.1.0", "mysql_version": "8.0.30"}
    })
}

fn new_status_body() -> Value {
    json!({
        "core": {"installed": "6.5.2", "updates": [{"version": "6.6", "response": "upgrade"}]},
        "plugins": {"list": [{
            "name": "Akismet",
            "slug": "akismet",
            "file": "akismet/akismet.php",
            "installed": "5.0",
            "available": "5.3",
            "has_update": true
        }]},
        "themes": {"list": []}
    })
}

#[tokio::test]
async fn outdated_fetch_with_legacy_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/custom/v1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(legacy_status_body()))
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let result = fetch_outdated(&client, &server.uri(), None, None, Duration::from_secs(15))
        .await
        .unwrap();

    assert_eq!(result["ok"], json!(true));
    assert_eq!(
        result["summary"]["plugins_outdated"],
        json!([{"name": "Hello Dolly", "current": "1.7.2", "latest": "1.7.3", "active": false}])
    );
    assert_eq!(result["summary"]["core_update_available"], json!(true));
    assert_eq!(result["summary"]["core_current"], json!("6.5.2"));
    assert_eq!(result["summary"]["core_latest"], json!("6.6"));
    assert_eq!(result["summary"]["php_version"], json!("8.1.0"));
    assert_eq!(result["summary"]["mysql_version"], json!("8.0.30"));
}

#[tokio::test]
async fn outdated_fetch_with_new_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/custom/v1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(new_status_body()))
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let result = fetch_outdated(&client, &server.uri(), None, None, Duration::from_secs(15))
        .await
        .unwrap();

    assert_eq!(result["ok"], json!(true));
    assert_eq!(result["summary"]["core_update_available"], json!(true));

    let outdated = result["summary"]["plugins_outdated"].as_array().unwrap();
    assert_eq!(outdated.len(), 1);
    assert_eq!(outdated[0]["name"], json!("Akismet"));
    assert_eq!(outdated[0]["current"], json!("5.0"));
    assert_eq!(outdated[0]["latest"], json!("5.3"));

    // the selectable plugin file is the unified one
    let selected = select_outdated_plugins(&coerce_status(&result["raw"]), None);
    assert_eq!(selected, vec!["akismet/akismet.php"]);
}

#[tokio::test]
async fn both_shapes_agree_on_core_freshness() {
    let legacy = coerce_status(&legacy_status_body());
    let new = coerce_status(&new_status_body());
    assert_eq!(legacy.core.update_available, new.core.update_available);
    assert_eq!(legacy.core.current_version, new.core.current_version);
    assert_eq!(legacy.core.latest_version, new.core.latest_version);
}

#[tokio::test]
async fn non_json_body_is_refused_structurally() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/custom/v1/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>maintenance</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let result = fetch_outdated(&client, &server.uri(), None, None, Duration::from_secs(15))
        .await
        .unwrap();

    assert_eq!(result["ok"], json!(false));
    assert_eq!(result["error"], json!("Response is not JSON"));
    assert_eq!(result["content_type"], json!("text/html"));
    assert!(result["body_preview"].as_str().unwrap().contains("maintenance"));
}

#[tokio::test]
async fn bom_prefixed_json_is_accepted() {
    let server = MockServer::start().await;
    let body = format!("\u{feff}{}", legacy_status_body());
    Mock::given(method("GET"))
        .and(path("/wp-json/custom/v1/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "application/json; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let result = fetch_outdated(&client, &server.uri(), None, None, Duration::from_secs(15))
        .await
        .unwrap();
    assert_eq!(result["ok"], json!(true));
}

#[tokio::test]
async fn explicit_wp_json_paths_are_not_rewritten() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/site/v1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(legacy_status_body()))
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let url = format!("{}/wp-json/site/v1/status", server.uri());
    let result = fetch_outdated(&client, &url, None, None, Duration::from_secs(15))
        .await
        .unwrap();
    assert_eq!(result["ok"], json!(true));
    assert!(result["url"].as_str().unwrap().ends_with("/wp-json/site/v1/status"));
}
