//! Router assembly: HTTP endpoints, WebSocket upgrade, CORS, upload limit and HTTP tracing.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod error;
pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws?token=…&session=…`
/// - REST API under `/api/v1/...` (bearer auth except health/signup/login/refresh)
/// - CORS (allow any origin/method/headers); adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Multipart framing needs a little room on top of the file itself.
    let body_limit = state.config.max_upload_bytes + 64 * 1024;

    let api = Router::new()
        .route("/health", get(http::http_health))
        // Auth
        .route("/auth/signup", post(http::http_signup))
        .route("/auth/login", post(http::http_login))
        .route("/auth/refresh", post(http::http_refresh))
        .route("/auth/me", get(http::http_me))
        // Documents
        .route("/pdfs", post(http::http_upload_pdf).get(http::http_list_pdfs))
        .route(
            "/pdfs/:id",
            get(http::http_get_pdf).patch(http::http_rename_pdf).delete(http::http_delete_pdf),
        )
        // Sessions
        .route("/sessions", post(http::http_create_session).get(http::http_list_sessions))
        .route("/sessions/:id", get(http::http_get_session).patch(http::http_update_session))
        .route("/sessions/:id/messages", post(http::http_append_message))
        // Dialogue
        .route("/sessions/:id/dialogue", get(http::http_dialogue_view))
        .route("/sessions/:id/dialogue/start", post(http::http_dialogue_start))
        .route("/sessions/:id/dialogue/question", post(http::http_dialogue_question))
        .route("/sessions/:id/dialogue/answer", post(http::http_dialogue_answer))
        .route("/sessions/:id/dialogue/hint", post(http::http_dialogue_hint))
        .route("/sessions/:id/dialogue/retry", post(http::http_dialogue_retry))
        .route("/sessions/:id/dialogue/reset", post(http::http_dialogue_reset))
        // Progress
        .route("/progress/stats", get(http::http_stats))
        .route("/progress/pdfs/:id", get(http::http_pdf_stats));

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .nest("/api/v1", api)
        // State + upload limit + CORS + HTTP tracing
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::AppConfig;
    use crate::testing::ScriptedOracle;

    const BOUNDARY: &str = "tutor-test-boundary";

    fn app() -> Router {
        let config = AppConfig { bcrypt_cost: 4, ..AppConfig::default() };
        build_router(Arc::new(AppState::with_oracle(config, Arc::new(ScriptedOracle::new()))))
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn json_req(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut b = Request::builder().method(method).uri(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            b = b.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        b.body(Body::from(body.to_string())).unwrap()
    }

    fn get_req(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    fn upload_req(token: &str, text: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"thermo.txt\"\r\nContent-Type: text/plain\r\n\r\n{text}\r\n--{BOUNDARY}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri("/api/v1/pdfs")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn signup(app: &Router) -> String {
        let (status, body) = call(
            app,
            json_req("POST", "/api/v1/auth/signup", None, json!({ "email": "ada@example.com", "password": "s3cret-pass", "name": "Ada" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["tokens"]["accessToken"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (status, body) = call(&app(), Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["oracle"], "scripted");
    }

    #[tokio::test]
    async fn protected_routes_need_a_bearer_token() {
        let (status, body) = call(&app(), Request::builder().uri("/api/v1/pdfs").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn signup_login_and_me() {
        let app = app();
        signup(&app).await;

        let (status, _) = call(
            &app,
            json_req("POST", "/api/v1/auth/login", None, json!({ "email": "ada@example.com", "password": "wrong-pass" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(
            &app,
            json_req("POST", "/api/v1/auth/login", None, json!({ "email": "ADA@example.com", "password": "s3cret-pass" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["data"]["tokens"]["accessToken"].as_str().unwrap().to_string();
        let refresh = body["data"]["tokens"]["refreshToken"].as_str().unwrap().to_string();

        let (status, me) = call(&app, get_req("/api/v1/auth/me", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["data"]["email"], "ada@example.com");
        assert!(me["data"].get("passwordHash").is_none());

        // A refresh token is not accepted as an access token.
        let (status, _) = call(&app, get_req("/api/v1/auth/me", &refresh)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) =
            call(&app, json_req("POST", "/api/v1/auth/refresh", None, json!({ "refreshToken": refresh }))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["tokens"]["accessToken"].is_string());
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts() {
        let app = app();
        signup(&app).await;
        let (status, _) = call(
            &app,
            json_req("POST", "/api/v1/auth/signup", None, json!({ "email": "ada@example.com", "password": "another-pass", "name": "Ada" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn upload_session_and_dialogue_flow() {
        let app = app();
        let token = signup(&app).await;

        let (status, pdf) = call(&app, upload_req(&token, "Heat flows from hot bodies to cold bodies.")).await;
        assert_eq!(status, StatusCode::CREATED);
        let pdf_id = pdf["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(pdf["data"]["topics"].as_array().unwrap().len(), 3);

        let (status, session) =
            call(&app, json_req("POST", "/api/v1/sessions", Some(&token), json!({ "pdfId": pdf_id }))).await;
        assert_eq!(status, StatusCode::CREATED);
        let sid = session["data"]["id"].as_str().unwrap().to_string();

        let (status, out) =
            call(&app, json_req("POST", &format!("/api/v1/sessions/{sid}/dialogue/start"), Some(&token), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(out["data"]["events"][0]["type"], "intro");

        let (_, out) =
            call(&app, json_req("POST", &format!("/api/v1/sessions/{sid}/dialogue/question"), Some(&token), json!({}))).await;
        assert_eq!(out["data"]["events"][0]["type"], "question");
        assert_eq!(out["data"]["dialogue"]["phase"], "awaiting_answer");

        // Asking again while a question is pending is a client error.
        let (status, _) =
            call(&app, json_req("POST", &format!("/api/v1/sessions/{sid}/dialogue/question"), Some(&token), json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, out) = call(
            &app,
            json_req(
                "POST",
                &format!("/api/v1/sessions/{sid}/dialogue/answer"),
                Some(&token),
                json!({ "answer": "Heat moves toward the colder body until both match." }),
            ),
        )
        .await;
        assert_eq!(out["data"]["events"][0]["type"], "evaluated");
        assert_eq!(out["data"]["events"][1]["type"], "feedback");

        let (_, detail) = call(&app, get_req(&format!("/api/v1/sessions/{sid}"), &token)).await;
        let kinds: Vec<&str> =
            detail["data"]["messages"].as_array().unwrap().iter().map(|m| m["type"].as_str().unwrap()).collect();
        assert_eq!(kinds, vec!["intro", "ai-question", "user-answer", "ai-explanation"]);
        assert_eq!(detail["data"]["progress"]["questionsAsked"], 1);

        let (_, stats) = call(&app, get_req("/api/v1/progress/stats", &token)).await;
        assert_eq!(stats["data"]["totalSessions"], 1);
        assert_eq!(stats["data"]["totalQuestions"], 1);
    }

    #[tokio::test]
    async fn deleting_a_pdf_removes_its_sessions() {
        let app = app();
        let token = signup(&app).await;
        let (_, pdf) = call(&app, upload_req(&token, "Some lecture text about entropy.")).await;
        let pdf_id = pdf["data"]["id"].as_str().unwrap().to_string();
        let (_, session) =
            call(&app, json_req("POST", "/api/v1/sessions", Some(&token), json!({ "pdfId": pdf_id }))).await;
        let sid = session["data"]["id"].as_str().unwrap().to_string();

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/pdfs/{pdf_id}"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, get_req(&format!("/api/v1/sessions/{sid}"), &token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
