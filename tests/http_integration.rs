//! Integration tests for the batch HTTP client using wiremock
//!
//! These tests drive the real `GcpClient` transport against a mocked batch
//! endpoint, covering the multipart round trip and whole-batch failures.

use gcpbatch::gcp::auth::GcpCredentials;
use gcpbatch::gcp::client::GcpClient;
use gcpbatch::requests::{list_json, MakeRequests, PollSettings};
use gcpbatch::resource::{ApiRequest, Catalog, Method};
use serde_json::{json, Value};
use wiremock::matchers::{bearer_token, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REPLY_BOUNDARY: &str = "batch_reply_boundary";

/// Build a multipart/mixed batch reply from `(status, json)` parts
fn batch_reply(parts: &[(u16, Value)]) -> ResponseTemplate {
    let mut body = String::new();
    for (n, (status, json)) in parts.iter().enumerate() {
        let json = json.to_string();
        body.push_str(&format!("--{}\r\n", REPLY_BOUNDARY));
        body.push_str("Content-Type: application/http\r\n");
        body.push_str(&format!("Content-ID: <response-test+{}>\r\n\r\n", n + 1));
        body.push_str(&format!("HTTP/1.1 {} Status\r\n", status));
        body.push_str("Content-Type: application/json; charset=UTF-8\r\n");
        body.push_str(&format!("Content-Length: {}\r\n\r\n", json.len()));
        body.push_str(&json);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", REPLY_BOUNDARY));

    ResponseTemplate::new(200).set_body_raw(
        body.into_bytes(),
        &format!("multipart/mixed; boundary={}", REPLY_BOUNDARY),
    )
}

fn client() -> GcpClient {
    GcpClient::with_credentials("test-project", GcpCredentials::from_static_token("test-token"))
        .expect("client should build")
}

fn request(catalog: &Catalog, service: &str, method: Method, payload: Value) -> ApiRequest {
    catalog
        .request("compute", service, method, payload.as_object().cloned().unwrap())
        .unwrap()
}

/// Test module for batch transport integration tests
mod batch_transport_tests {
    use super::*;

    /// Test a list request travels inside the batch and its items come back
    #[tokio::test]
    async fn test_list_through_batch_endpoint() {
        let server = MockServer::start().await;
        let catalog = Catalog::builtin_with_root_url(&server.uri()).unwrap();
        let batch_url = catalog.api("compute").unwrap().batch_url();

        Mock::given(method("POST"))
            .and(path("/batch/compute/v1"))
            .and(bearer_token("test-token"))
            .and(body_string_contains(
                "GET /compute/v1/projects/test-project/zones/us-central1-a/instances HTTP/1.1",
            ))
            .respond_with(batch_reply(&[(
                200,
                json!({"items": [
                    {"name": "instance-1", "status": "RUNNING"},
                    {"name": "instance-2", "status": "STOPPED"}
                ]}),
            )]))
            .expect(1)
            .mount(&server)
            .await;

        let client = client();
        let list = request(
            &catalog,
            "instances",
            Method::List,
            json!({"project": "test-project", "zone": "us-central1-a"}),
        );
        let (items, diagnostics) = list_json(&client, &batch_url, vec![list])
            .unwrap()
            .collect()
            .await;

        assert!(diagnostics.is_empty(), "{}", diagnostics.summary("unexpected:"));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["name"], "instance-1");
    }

    /// Test per-part errors are recorded while sibling parts succeed
    #[tokio::test]
    async fn test_part_level_404_keeps_siblings() {
        let server = MockServer::start().await;
        let catalog = Catalog::builtin_with_root_url(&server.uri()).unwrap();
        let batch_url = catalog.api("compute").unwrap().batch_url();

        Mock::given(method("POST"))
            .and(path("/batch/compute/v1"))
            .respond_with(batch_reply(&[
                (
                    404,
                    json!({"error": {
                        "code": 404,
                        "message": "The resource 'projects/test-project/zones/z/instances/gone' was not found",
                        "errors": [{"reason": "notFound"}]
                    }}),
                ),
                (200, json!({"kind": "compute#instance", "name": "here"})),
            ]))
            .mount(&server)
            .await;

        let client = client();
        let requests = vec![
            request(
                &catalog,
                "instances",
                Method::Get,
                json!({"project": "test-project", "zone": "z", "instance": "gone"}),
            ),
            request(
                &catalog,
                "instances",
                Method::Get,
                json!({"project": "test-project", "zone": "z", "instance": "here"}),
            ),
        ];
        let (items, diagnostics) = MakeRequests::new(&client, &catalog, batch_url)
            .run(requests)
            .unwrap()
            .collect()
            .await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], "here");
        assert_eq!(diagnostics.len(), 1);
        let error = diagnostics.iter().next().unwrap();
        assert_eq!(error.code.as_deref(), Some("notFound"));
        assert!(error.message.contains("was not found"));
    }

    /// Test 401 on the batch endpoint fails every request in the batch
    #[tokio::test]
    async fn test_401_fails_whole_batch() {
        let server = MockServer::start().await;
        let catalog = Catalog::builtin_with_root_url(&server.uri()).unwrap();
        let batch_url = catalog.api("compute").unwrap().batch_url();

        Mock::given(method("POST"))
            .and(path("/batch/compute/v1"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": 401, "message": "Invalid credentials"}
            })))
            .mount(&server)
            .await;

        let client = client();
        let requests = vec![
            request(
                &catalog,
                "firewalls",
                Method::Get,
                json!({"project": "test-project", "firewall": "a"}),
            ),
            request(
                &catalog,
                "firewalls",
                Method::Get,
                json!({"project": "test-project", "firewall": "b"}),
            ),
        ];
        let (items, diagnostics) = MakeRequests::new(&client, &catalog, batch_url)
            .run(requests)
            .unwrap()
            .collect()
            .await;

        assert!(items.is_empty());
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.has_errors());
        assert!(diagnostics.iter().all(|d| d.message.contains("401")));
    }

    /// Test a reply that is not multipart is reported, not panicked on
    #[tokio::test]
    async fn test_non_multipart_reply() {
        let server = MockServer::start().await;
        let catalog = Catalog::builtin_with_root_url(&server.uri()).unwrap();
        let batch_url = catalog.api("compute").unwrap().batch_url();

        Mock::given(method("POST"))
            .and(path("/batch/compute/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let client = client();
        let get = request(
            &catalog,
            "networks",
            Method::Get,
            json!({"project": "test-project", "network": "default"}),
        );
        let (items, diagnostics) = MakeRequests::new(&client, &catalog, batch_url)
            .run(vec![get])
            .unwrap()
            .collect()
            .await;

        assert!(items.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics
            .iter()
            .next()
            .unwrap()
            .message
            .contains("Failed to decode batch response"));
    }

    /// Test an insert operation is polled and its resource fetched
    #[tokio::test]
    async fn test_insert_is_polled_to_completion() {
        let server = MockServer::start().await;
        let catalog = Catalog::builtin_with_root_url(&server.uri()).unwrap();
        let batch_url = catalog.api("compute").unwrap().batch_url();
        let base = format!("{}/compute/v1/projects/test-project", server.uri());
        let operation = |status: &str| {
            json!({
                "kind": "compute#operation",
                "name": "op-1",
                "status": status,
                "operationType": "insert",
                "targetLink": format!("{}/global/firewalls/allow-ssh", base),
                "selfLink": format!("{}/global/operations/op-1", base),
            })
        };

        Mock::given(method("POST"))
            .and(path("/batch/compute/v1"))
            .and(body_string_contains("POST /compute/v1/projects/test-project/global/firewalls HTTP/1.1"))
            .respond_with(batch_reply(&[(200, operation("RUNNING"))]))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/batch/compute/v1"))
            .and(body_string_contains("GET /compute/v1/projects/test-project/global/operations/op-1 HTTP/1.1"))
            .respond_with(batch_reply(&[(200, operation("DONE"))]))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/batch/compute/v1"))
            .and(body_string_contains("GET /compute/v1/projects/test-project/global/firewalls/allow-ssh HTTP/1.1"))
            .respond_with(batch_reply(&[(
                200,
                json!({"kind": "compute#firewall", "name": "allow-ssh"}),
            )]))
            .expect(1)
            .mount(&server)
            .await;

        let client = client();
        let insert = request(
            &catalog,
            "firewalls",
            Method::Insert,
            json!({"project": "test-project", "firewallResource": {"name": "allow-ssh"}}),
        );
        let (items, diagnostics) = MakeRequests::new(&client, &catalog, batch_url)
            .poll_settings(PollSettings::immediate())
            .run(vec![insert])
            .unwrap()
            .collect()
            .await;

        assert!(diagnostics.is_empty(), "{}", diagnostics.summary("unexpected:"));
        assert_eq!(items, vec![json!({"kind": "compute#firewall", "name": "allow-ssh"})]);
    }
}
