//! Functional tests for the backend clients against mock HTTP servers

use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use prompt_image_gateway::backend::midjourney::{MidjourneyBackend, ProxySession};
use prompt_image_gateway::backend::replicate::ReplicateBackend;
use prompt_image_gateway::backend::traits::{ImageBackend, ImageRef, PollStatus, SubmissionRef};
use prompt_image_gateway::backend::unsplash::UnsplashBackend;
use prompt_image_gateway::config::{MidjourneyConfig, ReplicateConfig, UnsplashConfig};
use prompt_image_gateway::AppError;

fn replicate_config(base_url: String) -> ReplicateConfig {
    ReplicateConfig {
        enabled: true,
        api_token: "r8_test".to_string(),
        base_url,
        model_version: "v1".to_string(),
        timeout_ms: 5000,
        max_concurrent: None,
    }
}

fn unsplash_config(base_url: String) -> UnsplashConfig {
    UnsplashConfig {
        enabled: true,
        access_key: "access".to_string(),
        base_url,
        timeout_ms: 5000,
    }
}

fn midjourney_config(base_url: String) -> MidjourneyConfig {
    MidjourneyConfig {
        enabled: true,
        base_url,
        api_secret: "secret".to_string(),
        timeout_ms: 5000,
        max_concurrent: 2,
        upscale_index: 1,
    }
}

#[tokio::test]
async fn test_replicate_submit_poll_fetch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/predictions"))
        .and(header("authorization", "Token r8_test"))
        .and(body_json(json!({"version": "v1", "input": {"prompt": "a red cat"}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "pred-1", "status": "starting"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/predictions/pred-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pred-1",
            "status": "succeeded",
            "output": [format!("{}/files/out.png", server.uri())]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/out.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-bytes".to_vec()))
        .mount(&server)
        .await;

    let backend = ReplicateBackend::new(&replicate_config(server.uri())).unwrap();

    let submission = backend.submit("a red cat").await.unwrap();
    assert_eq!(submission, SubmissionRef::Job("pred-1".to_string()));

    let status = backend.poll(&submission).await.unwrap();
    let PollStatus::Ready(image) = status else {
        panic!("expected ready, got {:?}", status);
    };
    assert_eq!(backend.fetch(&image).await.unwrap().as_ref(), b"png-bytes");
}

#[tokio::test]
async fn test_replicate_error_status_is_upstream() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/predictions"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid version"))
        .mount(&server)
        .await;

    let backend = ReplicateBackend::new(&replicate_config(server.uri())).unwrap();
    let err = backend.submit("a red cat").await.unwrap_err();
    assert!(matches!(err, AppError::Upstream(ref msg) if msg.contains("invalid version")));
}

#[tokio::test]
async fn test_replicate_failed_prediction() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/predictions/pred-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pred-2", "status": "failed", "error": "CUDA out of memory"
        })))
        .mount(&server)
        .await;

    let backend = ReplicateBackend::new(&replicate_config(server.uri())).unwrap();
    let status = backend
        .poll(&SubmissionRef::Job("pred-2".to_string()))
        .await
        .unwrap();
    assert_eq!(status, PollStatus::Failed("CUDA out of memory".to_string()));
}

#[tokio::test]
async fn test_unsplash_search_returns_first_photo() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/photos"))
        .and(query_param("query", "mountain lake"))
        .and(header("authorization", "Client-ID access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 2,
            "results": [
                {"urls": {"regular": "https://images.unsplash.com/photo-1", "full": "x"}},
                {"urls": {"regular": "https://images.unsplash.com/photo-2", "full": "y"}}
            ]
        })))
        .mount(&server)
        .await;

    let backend = UnsplashBackend::new(&unsplash_config(server.uri())).unwrap();
    let submission = backend.submit("mountain lake").await.unwrap();
    assert_eq!(
        submission,
        SubmissionRef::Ready(ImageRef("https://images.unsplash.com/photo-1".to_string()))
    );
    assert_eq!(
        backend.poll(&submission).await.unwrap(),
        PollStatus::Ready(ImageRef("https://images.unsplash.com/photo-1".to_string()))
    );
}

#[tokio::test]
async fn test_unsplash_no_results_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/photos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 0, "results": []})))
        .mount(&server)
        .await;

    let backend = UnsplashBackend::new(&unsplash_config(server.uri())).unwrap();
    assert!(matches!(
        backend.submit("qwzxv").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_midjourney_imagine_then_upscale() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mj/submit/imagine"))
        .and(header("mj-api-secret", "secret"))
        .and(body_json(json!({"prompt": "a castle"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 1, "description": "Submitted", "result": "grid-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/mj/task/grid-1/fetch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "grid-1",
            "status": "SUCCESS",
            "imageUrl": "https://cdn.example/grid.png",
            "buttons": [
                {"customId": "MJ::JOB::upsample::1::abc", "label": "U1"},
                {"customId": "MJ::JOB::upsample::2::abc", "label": "U2"}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mj/submit/action"))
        .and(body_json(json!({"taskId": "grid-1", "customId": "MJ::JOB::upsample::1::abc"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 1, "description": "Submitted", "result": "upscale-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/mj/task/upscale-1/fetch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "upscale-1",
            "status": "SUCCESS",
            "imageUrl": format!("{}/assets/final.png", server.uri())
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/assets/final.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"final".to_vec()))
        .mount(&server)
        .await;

    let backend = MidjourneyBackend::new(&midjourney_config(server.uri())).unwrap();
    assert_eq!(backend.max_concurrent(), Some(2));

    let submission = backend.submit("a castle").await.unwrap();
    assert_eq!(submission, SubmissionRef::Job("grid-1".to_string()));

    // Grid done: upscale requested, still pending
    assert_eq!(backend.poll(&submission).await.unwrap(), PollStatus::Pending);
    assert_eq!(backend.pending_upscales(), 1);

    let status = backend.poll(&submission).await.unwrap();
    let PollStatus::Ready(image) = status else {
        panic!("expected ready, got {:?}", status);
    };
    assert_eq!(backend.pending_upscales(), 0);
    assert_eq!(backend.fetch(&image).await.unwrap().as_ref(), b"final");
}

#[tokio::test]
async fn test_midjourney_rejected_command() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mj/submit/imagine"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 24, "description": "banned prompt"
        })))
        .mount(&server)
        .await;

    let session = Arc::new(ProxySession::new(&midjourney_config(server.uri())).unwrap());
    let backend = MidjourneyBackend::with_session(session, 2, 1);
    let err = backend.submit("forbidden").await.unwrap_err();
    assert!(matches!(err, AppError::Upstream(ref msg) if msg.contains("banned prompt")));
}

#[tokio::test]
async fn test_midjourney_failed_grid() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/mj/task/grid-9/fetch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "grid-9", "status": "FAILURE", "failReason": "queue full"
        })))
        .mount(&server)
        .await;

    let backend = MidjourneyBackend::new(&midjourney_config(server.uri())).unwrap();
    let status = backend
        .poll(&SubmissionRef::Job("grid-9".to_string()))
        .await
        .unwrap();
    assert_eq!(status, PollStatus::Failed("queue full".to_string()));
}
