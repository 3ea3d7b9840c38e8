use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use bulktag::relay::credential::{Credential, CredentialGate};
use bulktag::relay::executor::{ReqwestTransport, RetryingExecutor};
use bulktag::relay::{self, Relay, RelayClient};
use bulktag::tagging::{BulkTagger, GalleryRefresher, ItemStatus, TagValueType};
use bulktag::TagError;

fn relay_for(server: &MockServer) -> Relay {
    let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
    Relay::new(RetryingExecutor::new(Arc::new(transport)), server.base_url())
}

#[derive(Default)]
struct CountingRefresher(AtomicUsize);

impl GalleryRefresher for CountingRefresher {
    fn refresh(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn tags_file_end_to_end_over_http() {
    let server = MockServer::start_async().await;
    let search = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/files/search")
                .query_param("query", "Site Photo Nor...")
                .query_param("limit", "10")
                .header("Authorization", "Bearer tok");
            then.status(200).json_body(json!({
                "data": [
                    {"id": 7, "filename": "Other.jpg", "title": "Other"},
                    {
                        "id": 42,
                        "filename": "Site Photo North.jpg",
                        "title": "Site Photo North",
                        "storageId": 2,
                        "storageLocation": "s3://bucket/42",
                        "tags": [
                            {"key": "JobFolder.Number", "source": "user", "stringValue": "JF1"},
                            {"key": "Camera", "source": "exif", "stringValue": "X100"}
                        ]
                    }
                ]
            }));
        })
        .await;
    let update = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/v1/files/42")
                .header("Authorization", "Bearer tok")
                .header_exists("Content-Type")
                .body_contains("name=\"Tags[0][key]\"\r\n\r\nCamera\r\n")
                .body_contains("name=\"Tags[1][stringValue]\"\r\n\r\nJF10042\r\n")
                .body_contains("name=\"StorageId\"\r\n\r\n2\r\n");
            then.status(200);
        })
        .await;

    let (handle, _task) = relay::channel::spawn(relay_for(&server));
    let refresher = Arc::new(CountingRefresher::default());
    let mut tagger = BulkTagger::new(
        Arc::new(handle),
        CredentialGate::fixed(Credential::parse("tok")),
        refresher.clone(),
    )
    .with_refresh_delay(Duration::from_millis(10));

    tagger.toggle("Site Photo Nor...", "card-0", "abc123");
    let report = tagger
        .apply_tag("JobFolder.Number", "JF10042", TagValueType::String)
        .await
        .unwrap();

    assert_eq!(report.summary(), "1 succeeded, 0 failed");
    assert_eq!(report.items[0].status, ItemStatus::Success);
    update.assert_async().await;
    // initial resolution plus the post-update refresh
    assert_eq!(search.hits_async().await, 2);

    tagger.wait_for_refresh().await;
    assert_eq!(refresher.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unauthorized_search_reports_expiry() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/files/search");
            then.status(401);
        })
        .await;

    let relay = relay_for(&server);
    let err = relay
        .search_files("a.pdf", &Credential::parse("stale").unwrap())
        .await
        .unwrap_err();

    assert_eq!(err, TagError::CredentialExpired);
}

#[tokio::test]
async fn update_error_body_is_captured() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/v1/files/9");
            then.status(422).body("Tags[0][key] is required");
        })
        .await;

    let relay = relay_for(&server);
    let record = serde_json::from_value(json!({"id": "9", "filename": "a.pdf"})).unwrap();
    let tag = bulktag::tagging::build_tag("Flag", "1", TagValueType::Boolean).unwrap();
    let err = relay
        .update_file(&record, &tag, &Credential::parse("tok").unwrap())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TagError::UpdateFailed {
            status: 422,
            body: "Tags[0][key] is required".into()
        }
    );
}

#[tokio::test]
async fn unreachable_server_is_a_relay_error() {
    let transport = ReqwestTransport::new(Duration::from_secs(1)).unwrap();
    let relay = Relay::new(
        RetryingExecutor::new(Arc::new(transport)),
        "http://127.0.0.1:9",
    );

    let err = relay
        .search_files("a.pdf", &Credential::parse("tok").unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, TagError::Relay(_)));
}
