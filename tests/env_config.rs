//! Environment-variable fallbacks. Kept in its own test binary, as a single
//! test, so nothing else reads the environment while it is being changed.

use serde_json::json;
use twelvelabs::{ClientBuilder, ErrorKind};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn builder_falls_back_to_environment() {
    std::env::remove_var("TWELVE_LABS_API_KEY");
    std::env::remove_var("TWELVELABS_BASE_URL");

    let err = ClientBuilder::new().build().err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(err.to_string().contains("TWELVE_LABS_API_KEY"), "{err}");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/multipart-uploads/up_1"))
        .and(header("x-api-key", "env-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "index": 1, "status": "completed" }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    std::env::set_var("TWELVE_LABS_API_KEY", "env-key");
    std::env::set_var("TWELVELABS_BASE_URL", format!("{}/", server.uri()));
    let client = ClientBuilder::new().max_retries(0).build().unwrap();
    std::env::remove_var("TWELVE_LABS_API_KEY");
    std::env::remove_var("TWELVELABS_BASE_URL");

    let chunks = client.get_upload_status("up_1").await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].is_completed());
}
