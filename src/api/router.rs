//! API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Admin routes live under `/admin`, student routes under `/student`.
//!
//! Layers (outermost → innermost): Extension → CORS → Cache-Control → Audit.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Multipart framing overhead allowed on top of the configured file limit.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the API router.
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    let upload_limit = ctx.core.config.server.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let admin = Router::new()
        .route("/past-papers", get(endpoints::papers::list))
        .route(
            "/past-papers/upload",
            post(endpoints::papers::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/past-papers/:paper_id", get(endpoints::papers::detail))
        .route("/past-papers/:paper_id/ingest", post(endpoints::papers::ingest))
        .route(
            "/taxonomies/:subject",
            get(endpoints::taxonomy::get).put(endpoints::taxonomy::put),
        )
        .route("/blueprints", get(endpoints::blueprints::current));

    let student = Router::new()
        .route(
            "/practice/papers",
            get(endpoints::practice::list).post(endpoints::practice::generate),
        )
        .route("/practice/papers/:generated_id", get(endpoints::practice::detail))
        .route("/practice/papers/:generated_id/pdf", get(endpoints::practice::pdf))
        .route("/practice/sessions", post(endpoints::sessions::start))
        .route("/practice/sessions/:session_id", get(endpoints::sessions::detail))
        .route(
            "/practice/sessions/:session_id/responses",
            post(endpoints::sessions::respond),
        )
        .route(
            "/practice/sessions/:session_id/finalize",
            post(endpoints::sessions::finalize),
        )
        .route("/analytics/:student_id", get(endpoints::analytics::student));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(endpoints::health::check))
        .nest("/admin", admin)
        .nest("/student", student)
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors)
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::pipeline::extraction::fixtures::simple_pdf;
    use crate::pipeline_config::PipelineConfig;

    const BOUNDARY: &str = "paperloom-test-boundary";

    struct TestApp {
        _dir: tempfile::TempDir,
        core: Arc<CoreState>,
    }

    impl TestApp {
        fn new() -> Self {
            Self::with_config(PipelineConfig::default())
        }

        fn with_config(config: PipelineConfig) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let core = CoreState::open(&dir.path().join("paperloom.db"), &dir.path().join("blobs"), config)
                .unwrap();
            Self {
                _dir: dir,
                core: Arc::new(core),
            }
        }

        async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
            let response = api_router(Arc::clone(&self.core)).oneshot(req).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, json)
        }

        async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        async fn post_json(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
            let req = Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            self.send(req).await
        }

        async fn upload(&self, fields: &[(&str, &str)], file: Option<&[u8]>) -> (StatusCode, Value) {
            let mut body: Vec<u8> = Vec::new();
            for (name, value) in fields {
                body.extend_from_slice(
                    format!(
                        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                    )
                    .as_bytes(),
                );
            }
            if let Some(bytes) = file {
                body.extend_from_slice(
                    format!(
                        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"paper.pdf\"\r\nContent-Type: application/pdf\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
            body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

            let req = Request::post("/admin/past-papers/upload")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap();
            self.send(req).await
        }

        async fn upload_year(&self, year: i32) -> String {
            let pdf = simple_pdf(&[&[
                "1. Which lens converges parallel light rays to a point? [1]",
                "(a) convex lens (b) concave lens (c) plane glass (d) prism",
                "2. The SI unit of force acting on a body is [1]",
                "(a) joule (b) newton (c) watt (d) pascal",
                "3. Explain how a refracting telescope forms an image of a distant star. [5]",
                "Answer Key",
                "1. a   2. b",
            ]]);
            let year = year.to_string();
            let (status, body) = self
                .upload(
                    &[("exam_name", "JEE"), ("subject", "Physics"), ("year", &year)],
                    Some(&pdf),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            body["paper_id"].as_str().unwrap().to_string()
        }
    }

    #[tokio::test]
    async fn health_reports_snapshot() {
        let app = TestApp::new();
        let response = api_router(Arc::clone(&app.core))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["snapshot_id"], 0);
        assert!(!app.core.audit_entries().is_empty());
    }

    #[tokio::test]
    async fn upload_validation() {
        let app = TestApp::new();
        let pdf = simple_pdf(&[&["1. What is light? [1]"]]);

        let (status, body) = app.upload(&[("subject", "Physics"), ("year", "2021")], Some(&pdf)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");

        let (status, _) = app
            .upload(&[("exam_name", "JEE"), ("subject", "Physics"), ("year", "20x1")], Some(&pdf))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .upload(
                &[("exam_name", "JEE"), ("subject", "Physics"), ("year", "2021")],
                Some(b"just some text"),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .upload(&[("exam_name", "JEE"), ("subject", "Physics"), ("year", "2021")], Some(&pdf))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "UPLOADED");
    }

    #[tokio::test]
    async fn oversized_upload_is_413() {
        let mut config = PipelineConfig::default();
        config.server.max_upload_bytes = 512;
        let app = TestApp::with_config(config);
        let mut big = b"%PDF-1.4\n".to_vec();
        big.resize(4096, b'x');

        let (status, body) = app
            .upload(&[("exam_name", "JEE"), ("subject", "Physics"), ("year", "2021")], Some(&big))
            .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn corrupt_pdf_fails_ingest_with_reason() {
        let app = TestApp::new();
        let broken = b"%PDF-1.4\nthis is not really a pdf body".to_vec();
        let (status, body) = app
            .upload(&[("exam_name", "JEE"), ("subject", "Physics"), ("year", "2021")], Some(&broken))
            .await;
        assert_eq!(status, StatusCode::OK);
        let paper_id = body["paper_id"].as_str().unwrap().to_string();

        let (status, body) = app
            .post_json("POST", &format!("/admin/past-papers/{paper_id}/ingest"), json!({}))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["status"], "FAILED");
        assert_eq!(body["paper_id"], paper_id);
        assert!(!body["reason"].as_str().unwrap().is_empty());

        let (_, paper) = app.get(&format!("/admin/past-papers/{paper_id}")).await;
        assert_eq!(paper["status"], "FAILED");
    }

    #[tokio::test]
    async fn unknown_ids() {
        let app = TestApp::new();
        let (status, _) = app.get("/admin/past-papers/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app.get(&format!("/admin/past-papers/{}", uuid::Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app
            .post_json(
                "POST",
                &format!("/student/practice/sessions/{}/finalize", uuid::Uuid::new_v4()),
                json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blueprint_needs_two_years() {
        let app = TestApp::new();
        let paper_id = app.upload_year(2020).await;
        let (status, _) = app
            .post_json("POST", &format!("/admin/past-papers/{paper_id}/ingest"), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.get("/admin/blueprints?exam_name=JEE&subject=Physics").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "INSUFFICIENT_HISTORY");
    }

    #[tokio::test]
    async fn full_practice_flow() {
        let app = TestApp::new();

        let (status, _) = app
            .post_json(
                "PUT",
                "/admin/taxonomies/Physics",
                json!({"chapters": [
                    {"tag": "Optics", "keywords": ["lens", "telescope", "light"]},
                    {"tag": "Mechanics", "keywords": ["force", "newton"]}
                ]}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        for year in [2020, 2021] {
            let paper_id = app.upload_year(year).await;
            let (status, body) = app
                .post_json("POST", &format!("/admin/past-papers/{paper_id}/ingest"), json!({}))
                .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            assert_eq!(body["question_count"], 3);
            assert_eq!(body["status"], "INGESTED");
            assert_eq!(body["degraded"], false);
        }

        let (status, blueprint) = app.get("/admin/blueprints?exam_name=JEE&subject=Physics").await;
        assert_eq!(status, StatusCode::OK, "{blueprint}");
        assert_eq!(blueprint["sections"].as_array().unwrap().len(), 2);
        assert_eq!(blueprint["total_marks"], 7);

        let (status, listed) = app.get("/student/practice/papers?exam_name=JEE&subject=Physics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);
        let (_, again) = app.get("/student/practice/papers?exam_name=JEE&subject=Physics").await;
        assert_eq!(again[0]["generated_id"], listed[0]["generated_id"]);

        let (status, paper) = app
            .post_json(
                "POST",
                "/student/practice/papers",
                json!({"exam_name": "JEE", "subject": "Physics", "seed": 42}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{paper}");
        assert_eq!(paper["seed"], 42);
        assert_eq!(paper["total_marks"], 7);
        let generated_id = paper["generated_id"].as_str().unwrap().to_string();
        assert!(paper["sections"][0]["questions"][0].get("answer_key").is_none());

        let pdf = api_router(Arc::clone(&app.core))
            .oneshot(
                Request::get(format!("/student/practice/papers/{generated_id}/pdf?answer_key=true"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(pdf.status(), StatusCode::OK);
        assert_eq!(pdf.headers().get(header::CONTENT_TYPE).unwrap(), "application/pdf");

        let (status, session) = app
            .post_json(
                "POST",
                "/student/practice/sessions",
                json!({"student_id": "stu-1", "generated_id": generated_id, "duration_limit": 600}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{session}");
        assert_eq!(session["status"], "RUNNING");
        let session_id = session["session_id"].as_str().unwrap().to_string();

        let (status, body) = app
            .post_json(
                "POST",
                "/student/practice/sessions",
                json!({"student_id": "stu-1", "generated_id": generated_id, "duration_limit": 600}),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "SESSION_ACTIVE");

        let mcqs: Vec<String> = paper["sections"]
            .as_array()
            .unwrap()
            .iter()
            .flat_map(|s| s["questions"].as_array().unwrap().clone())
            .filter(|q| q["question_type"] == "MCQ")
            .map(|q| q["question_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(mcqs.len(), 2);
        for question_id in &mcqs {
            let (status, _) = app
                .post_json(
                    "POST",
                    &format!("/student/practice/sessions/{session_id}/responses"),
                    json!({"question_id": question_id, "answer": "a"}),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, _) = app
            .post_json(
                "POST",
                &format!("/student/practice/sessions/{session_id}/responses"),
                json!({"question_id": uuid::Uuid::new_v4(), "answer": "a"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, result) = app
            .post_json("POST", &format!("/student/practice/sessions/{session_id}/finalize"), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK, "{result}");
        assert_eq!(result["status"], "SUBMITTED");
        assert_eq!(result["max_score"], 2);
        assert_eq!(result["answered"], 2);

        let (status, body) = app
            .post_json(
                "POST",
                &format!("/student/practice/sessions/{session_id}/responses"),
                json!({"question_id": mcqs[0], "answer": "b"}),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "SESSION_CLOSED");

        let (status, analytics) = app.get("/student/analytics/stu-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(analytics["tests_attempted"], 1);
    }
}
