use brand_command_center_lib::config::{ApiEndpoints, AppConfig};
use brand_command_center_lib::models::{
    IntegrationConfig, NewClient, Provider, RefreshOutcome, SyncOutcome, SyncStatus,
};
use brand_command_center_lib::orchestrator::SyncOrchestrator;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "8f2c4a6e0b1d3f5a7c9e1b3d5f7a9c0e2b4d6f8a0c2e4b6d8f0a2c4e6b8d0f2a";

fn config_for(server: &MockServer, dir: &tempfile::TempDir) -> AppConfig {
    AppConfig {
        database_path: dir.path().join("bcc.sqlite"),
        encryption_key: Some(KEY.to_string()),
        yelp_api_key: Some("yelp-test-key".to_string()),
        provider_timeout_secs: 5,
        http_timeout_secs: 5,
        endpoints: ApiEndpoints {
            clickup: server.uri(),
            yelp: server.uri(),
            ..ApiEndpoints::default()
        },
        ..AppConfig::default()
    }
}

async fn mount_clickup_requests(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/list/REQ/task"))
        .and(header("authorization", "pk_live_token_123456"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tasks": [
                {
                    "id": "t1",
                    "name": "New patio photos",
                    "status": { "status": "in progress" },
                    "priority": { "id": "2" },
                    "url": "https://app.clickup.com/t/t1",
                    "tags": [{ "name": "photo" }],
                    "custom_fields": []
                },
                {
                    "id": "t2",
                    "name": "Old menu update",
                    "status": { "status": "complete" },
                    "url": "https://app.clickup.com/t/t2",
                    "tags": [],
                    "custom_fields": []
                }
            ],
            "last_page": true
        })))
        .mount(server)
        .await;
}

async fn mount_yelp(server: &MockServer, status: u16) {
    if status != 200 {
        Mock::given(method("GET"))
            .and(path("/businesses/harbor-cafe"))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_string("invalid key yelp-test-key for Bearer yelp-test-key"),
            )
            .mount(server)
            .await;
        return;
    }
    Mock::given(method("GET"))
        .and(path("/businesses/harbor-cafe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rating": 4.5, "review_count": 318, "url": "https://www.yelp.com/biz/harbor-cafe"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/businesses/harbor-cafe/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reviews": [
                { "id": "y1", "rating": 5, "text": "Fresh pastries and friendly staff",
                  "time_created": "2025-03-02 09:15:00", "user": { "name": "Sam K." } },
                { "id": "y2", "rating": 2, "text": "Slow service and cold coffee",
                  "time_created": "2025-03-01 08:00:00", "user": { "name": "Riley" } }
            ]
        })))
        .mount(server)
        .await;
}

fn seed(orchestrator: &SyncOrchestrator) -> (i64, String) {
    let client = orchestrator
        .db()
        .create_client(&NewClient {
            name: "Harbor Cafe".to_string(),
            slug: "harbor-cafe".to_string(),
            location: "Portland, ME".to_string(),
            ..NewClient::default()
        })
        .expect("client");

    orchestrator
        .upsert_integration(
            client.id,
            "clickup",
            &IntegrationConfig::from([
                ("api_token".to_string(), "pk_live_token_123456".to_string()),
                ("requests_list_id".to_string(), "REQ".to_string()),
            ]),
            true,
        )
        .expect("clickup integration");
    orchestrator
        .upsert_integration(
            client.id,
            "yelp",
            &IntegrationConfig::from([("business_id".to_string(), "harbor-cafe".to_string())]),
            true,
        )
        .expect("yelp integration");
    (client.id, client.portal_token)
}

#[tokio::test]
async fn full_sync_writes_sections_reviews_and_status() {
    let server = MockServer::start().await;
    mount_clickup_requests(&server).await;
    mount_yelp(&server, 200).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let orchestrator = SyncOrchestrator::from_config(&config_for(&server, &dir)).expect("orchestrator");
    let (client_id, _) = seed(&orchestrator);

    let result = orchestrator.sync_client(client_id).await.expect("sync");
    assert_eq!(result.outcome(), SyncOutcome::Succeeded);
    assert_eq!(
        result.providers.iter().map(|outcome| outcome.provider).collect::<Vec<_>>(),
        vec![Provider::Clickup, Provider::Yelp]
    );

    let client = orchestrator.db().require_client(client_id).expect("client");
    assert_eq!(client.sync_status, SyncStatus::Success);
    assert!(client.last_sync_at.is_some());
    assert_eq!(client.requests.len(), 1);
    assert_eq!(client.requests[0].title, "New patio photos");
    assert_eq!(client.reviews.len(), 1);
    assert_eq!(client.reviews[0].platform, "Yelp");
    assert_eq!(client.reviews[0].response_rate, "N/A");
    assert_eq!(client.recent_reviews[0].author_name, "Sam K.");
    assert!(client.positive_themes.contains(&"Fresh".to_string()));
    assert!(client.negative_themes.contains(&"Slow".to_string()));
    assert!(!client.weekly_vibe.is_empty());
}

#[tokio::test]
async fn provider_failure_is_isolated_and_redacted() {
    let server = MockServer::start().await;
    mount_clickup_requests(&server).await;
    mount_yelp(&server, 401).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let orchestrator = SyncOrchestrator::from_config(&config_for(&server, &dir)).expect("orchestrator");
    let (client_id, _) = seed(&orchestrator);

    let result = orchestrator.sync_client(client_id).await.expect("sync");
    assert_eq!(result.outcome(), SyncOutcome::PartiallyFailed);
    assert!(result.provider(Provider::Clickup).expect("clickup").success);
    let error = result
        .provider(Provider::Yelp)
        .and_then(|outcome| outcome.error.clone())
        .expect("yelp error");
    assert!(error.starts_with("Yelp API 401"));
    assert!(!error.contains("yelp-test-key"));

    let client = orchestrator.db().require_client(client_id).expect("client");
    assert_eq!(client.sync_status, SyncStatus::Error);
    assert!(client.last_sync_at.is_none());
    assert_eq!(client.requests.len(), 1);

    let views = orchestrator.list_integrations(client_id).expect("views");
    let clickup = views
        .iter()
        .find(|view| view.provider == Provider::Clickup)
        .expect("clickup view");
    assert_eq!(clickup.config["api_token"], "pk_l••••3456");
    let yelp = views.iter().find(|view| view.provider == Provider::Yelp).expect("yelp view");
    assert_eq!(yelp.sync_error.as_deref(), Some(error.as_str()));
}

#[tokio::test]
async fn portal_refresh_only_syncs_when_stale() {
    let server = MockServer::start().await;
    mount_clickup_requests(&server).await;
    mount_yelp(&server, 200).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let orchestrator = SyncOrchestrator::from_config(&config_for(&server, &dir)).expect("orchestrator");
    let (_, token) = seed(&orchestrator);

    let first = orchestrator.refresh_if_stale(&token).await.expect("first refresh");
    assert!(matches!(first, RefreshOutcome::Synced(ref result) if result.success));
    let second = orchestrator.refresh_if_stale(&token).await.expect("second refresh");
    assert!(matches!(second, RefreshOutcome::Fresh { .. }));

    let summary = orchestrator.sync_all_clients().await.expect("cron");
    assert_eq!(summary.synced, 1);
    assert_eq!(summary.successful, 1);
}

#[tokio::test]
async fn malformed_google_key_fails_only_google_integrations() {
    let server = MockServer::start().await;
    mount_clickup_requests(&server).await;
    mount_yelp(&server, 200).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config_for(&server, &dir);
    config.google_service_account_json = Some("{not json".to_string());
    let orchestrator = SyncOrchestrator::from_config(&config).expect("orchestrator");
    let (client_id, _) = seed(&orchestrator);
    orchestrator
        .upsert_integration(
            client_id,
            "google_analytics",
            &IntegrationConfig::from([("property_id".to_string(), "123456".to_string())]),
            true,
        )
        .expect("analytics integration");

    let result = orchestrator.sync_client(client_id).await.expect("sync");
    assert_eq!(result.outcome(), SyncOutcome::PartiallyFailed);
    assert!(result.provider(Provider::Clickup).expect("clickup").success);
    assert!(result.provider(Provider::Yelp).expect("yelp").success);
    let analytics = result.provider(Provider::GoogleAnalytics).expect("analytics");
    assert!(!analytics.success);
    assert!(analytics
        .error
        .as_deref()
        .is_some_and(|error| error.contains("invalid service account JSON")));

    let client = orchestrator.db().require_client(client_id).expect("client");
    assert_eq!(client.requests.len(), 1);
}
