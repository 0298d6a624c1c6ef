//! End-to-end tests of the HTTP surface with mocked fetcher and model

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use common::{FetchBehavior, HalfRemover, MockFetcher, PanickingRemover, Site};
use serde_json::{json, Value};
use tower::ServiceExt;

fn rembg_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/rembg")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_success_returns_png_of_same_size() {
    let site = Site::new();
    let fetcher = MockFetcher::serving_png(40, 24);
    let app = site.app(fetcher.clone(), HalfRemover);

    let response = app
        .oneshot(rembg_request(r#"{"image_url": "https://example.com/cat.png"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert!(body.get("message").is_none());

    let png = STANDARD
        .decode(body["image_base64"].as_str().unwrap())
        .unwrap();
    let image = image::load_from_memory(&png).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (40, 24));
    assert_eq!(image.get_pixel(0, 0).0[3], 0);
    assert_eq!(image.get_pixel(39, 23).0[3], 255);

    assert_eq!(fetcher.calls().len(), 1);
    assert_eq!(fetcher.calls()[0].as_str(), "https://example.com/cat.png");
}

#[tokio::test]
async fn test_body_over_default_limit_gets_status_envelope() {
    let site = Site::new();
    let fetcher = MockFetcher::serving_png(16, 16);
    let app = site.app(fetcher.clone(), HalfRemover);

    let body = format!(
        r#"{{"image_url": "https://example.com/cat.png", "pad": "{}"}}"#,
        "x".repeat(3 * 1024 * 1024)
    );
    assert!(body.len() > 2 * 1024 * 1024);

    let response = app.oneshot(rembg_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(fetcher.calls().len(), 1);
}

#[tokio::test]
async fn test_missing_image_url_does_no_network_io() {
    let site = Site::new();
    let fetcher = MockFetcher::serving_png(8, 8);

    for body in [r#"{}"#, r#"{"image_url": null}"#, r#"{"image_url": 7}"#] {
        let app = site.app(fetcher.clone(), HalfRemover);
        let response = app.oneshot(rembg_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"status": "error", "message": "image_url is required"})
        );
    }

    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_url_is_reported_without_fetching() {
    let site = Site::new();
    let fetcher = MockFetcher::serving_png(8, 8);
    let app = site.app(fetcher.clone(), HalfRemover);

    let response = app
        .oneshot(rembg_request(r#"{"image_url": "not-a-url"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("not-a-url"));
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_malformed_json_is_a_client_error() {
    let site = Site::new();
    let app = site.app(MockFetcher::serving_png(8, 8), HalfRemover);

    let response = app.oneshot(rembg_request("{image_url:")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "error");
}

#[tokio::test]
async fn test_fetch_failure_is_reported_with_200() {
    let site = Site::new();
    let fetcher = MockFetcher::new(FetchBehavior::Fail("HTTP 404 Not Found".to_string()));
    let app = site.app(fetcher, HalfRemover);

    let response = app
        .oneshot(rembg_request(r#"{"image_url": "https://example.com/gone.png"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("Failed to fetch image"));
    assert!(message.contains("404"));
}

#[tokio::test]
async fn test_undecodable_bytes_are_reported_with_200() {
    let site = Site::new();
    let fetcher = MockFetcher::new(FetchBehavior::Bytes(b"<html>not an image</html>".to_vec()));
    let app = site.app(fetcher, HalfRemover);

    let response = app
        .oneshot(rembg_request(r#"{"image_url": "https://example.com/page"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Failed to decode image"));
}

#[tokio::test]
async fn test_same_url_gives_identical_output() {
    let site = Site::new();
    let fetcher = MockFetcher::serving_png(16, 16);
    let body = r#"{"image_url": "https://example.com/same.png"}"#;

    let first = site
        .app(fetcher.clone(), HalfRemover)
        .oneshot(rembg_request(body))
        .await
        .unwrap();
    let second = site
        .app(fetcher.clone(), HalfRemover)
        .oneshot(rembg_request(body))
        .await
        .unwrap();

    let first = body_json(first).await;
    let second = body_json(second).await;
    assert_eq!(first["status"], "success");
    assert_eq!(first["image_base64"], second["image_base64"]);
    assert_eq!(fetcher.calls().len(), 2);
}

#[tokio::test]
async fn test_worker_panic_becomes_500_detail() {
    let site = Site::new();
    let app = site.app(MockFetcher::serving_png(8, 8), PanickingRemover);

    let response = app
        .oneshot(rembg_request(r#"{"image_url": "https://example.com/a.png"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    let object = body.as_object().unwrap();
    assert_eq!(object.len(), 1);
    assert!(object["detail"].as_str().unwrap().starts_with("Internal error"));
}

#[tokio::test]
async fn test_handler_panic_becomes_500_detail() {
    let site = Site::new();
    let fetcher = MockFetcher::new(FetchBehavior::Panic("fetcher exploded".to_string()));
    let app = site.app(fetcher, HalfRemover);

    let response = app
        .oneshot(rembg_request(r#"{"image_url": "https://example.com/a.png"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await, json!({"detail": "fetcher exploded"}));
}

#[tokio::test]
async fn test_index_page_renders() {
    let site = Site::new();
    let app = site.app(MockFetcher::serving_png(8, 8), HalfRemover);

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("<h1>rembg</h1>"));
    assert!(html.contains("model half-mock"));
}

#[tokio::test]
async fn test_missing_template_is_500() {
    let site = Site::new();
    std::fs::remove_file(site.templates_dir().join("index.html")).unwrap();
    let app = site.app(MockFetcher::serving_png(8, 8), HalfRemover);

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await["detail"].is_string());
}

#[tokio::test]
async fn test_static_files() {
    let site = Site::new();

    let response = site
        .app(MockFetcher::serving_png(8, 8), HalfRemover)
        .oneshot(get("/static/app.js"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"console.log('rembg');");

    let response = site
        .app(MockFetcher::serving_png(8, 8), HalfRemover)
        .oneshot(get("/static/missing.css"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health() {
    let site = Site::new();
    let app = site.app(MockFetcher::serving_png(8, 8), HalfRemover);

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "ok", "model": "half-mock"})
    );
}

#[tokio::test]
async fn test_rembg_rejects_get() {
    let site = Site::new();
    let app = site.app(MockFetcher::serving_png(8, 8), HalfRemover);

    let response = app.oneshot(get("/rembg")).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
