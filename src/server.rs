//! HTTP upload endpoint.
//!
//! `POST /api/ocr` takes a multipart form with one or more `files` fields and
//! answers with the combined Markdown:
//!
//! ```json
//! { "success": true, "markdown": "...", "pages": 3 }
//! { "success": false, "error": "Unsupported file type: 'a.docx' ..." }
//! ```
//!
//! Input problems answer 400; OCR and internal failures answer 500.

use crate::config::ConversionConfig;
use crate::convert::convert_from_bytes;
use crate::error::Ocr2MdError;
use crate::pipeline::input::SourceDocument;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Upper bound on files per request, used to size the body limit.
pub const MAX_FILES_PER_REQUEST: u64 = 20;

/// Multipart field carrying the uploads.
pub const FILES_FIELD: &str = "files";

/// Shared state for the web server.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<ConversionConfig>,
}

impl AppState {
    pub fn new(config: ConversionConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

/// JSON body of every `/api/ocr` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    fn ok(markdown: String, pages: usize) -> Self {
        Self {
            success: true,
            markdown: Some(markdown),
            pages: Some(pages),
            error: None,
        }
    }

    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Status code for a conversion error.
pub fn status_for(err: &Ocr2MdError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let body_limit = usize::try_from(
        state
            .config
            .max_file_size_bytes
            .saturating_mul(MAX_FILES_PER_REQUEST),
    )
    .unwrap_or(usize::MAX);

    Router::new()
        .route("/api/ocr", post(ocr_upload))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server.
pub async fn serve(config: ConversionConfig, host: &str, port: u16) -> std::io::Result<()> {
    let app = create_router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("Starting server at http://{}", listener.local_addr()?);
    axum::serve(listener, app).await
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn ocr_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> (StatusCode, Json<ApiResponse>) {
    let mut files = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Rejected upload: {}", e.body_text());
                return (e.status(), Json(ApiResponse::failure(e.body_text())));
            }
        };
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or("upload").to_string();
        match field.bytes().await {
            Ok(bytes) => files.push(SourceDocument::new(name, bytes.to_vec())),
            Err(e) => {
                warn!("Rejected upload of '{}': {}", name, e.body_text());
                return (e.status(), Json(ApiResponse::failure(e.body_text())));
            }
        }
    }

    info!("Processing {} uploaded file(s)", files.len());
    match convert_from_bytes(files, &state.config).await {
        Ok(output) => {
            let pages = output.stats.total_pages;
            (
                StatusCode::OK,
                Json(ApiResponse::ok(output.document.markdown, pages)),
            )
        }
        Err(e) => {
            let status = status_for(&e);
            warn!("OCR request failed ({}): {}", status, e);
            (status, Json(ApiResponse::failure(e.to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Page, SourceResult};
    use crate::pipeline::ocr::OcrProvider;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const BOUNDARY: &str = "ocr2md-test-boundary";

    struct TableProvider;

    #[async_trait]
    impl OcrProvider for TableProvider {
        fn name(&self) -> &str {
            "table"
        }

        async fn process(&self, doc: &SourceDocument) -> Result<SourceResult, Ocr2MdError> {
            if doc.name.starts_with("boom") {
                return Err(Ocr2MdError::OcrFailed {
                    file: doc.name.clone(),
                    reason: "HTTP 500".into(),
                });
            }
            Ok(SourceResult {
                pages: vec![Page::new(0, "|x|y|\n|1|2|"), Page::new(1, "end")],
                ..Default::default()
            })
        }
    }

    fn app() -> Router {
        let config = ConversionConfig::builder()
            .provider(Arc::new(TableProvider))
            .build()
            .unwrap();
        create_router(AppState::new(config))
    }

    fn multipart_body(files: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (field, name, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
                     filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post_files(files: &[(&str, &str, &[u8])]) -> (StatusCode, ApiResponse) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/ocr")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(files)))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn upload_returns_markdown_and_page_count() {
        let (status, body) = post_files(&[
            ("files", "a.pdf", &b"%PDF-1.7"[..]),
            ("files", "b.png", &b"\x89PNG"[..]),
        ])
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.success);
        assert_eq!(body.pages, Some(4));
        let md = body.markdown.unwrap();
        assert!(md.starts_with("**表1**\n\n|x|y|\n|1|2|"));
        assert!(md.contains("**表2**"));
    }

    #[tokio::test]
    async fn no_files_is_bad_request() {
        let (status, body) = post_files(&[("other", "a.pdf", &b"%PDF"[..])]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
        assert!(body.error.unwrap().contains("No files"));
    }

    #[tokio::test]
    async fn unsupported_type_is_bad_request() {
        let (status, body) = post_files(&[("files", "notes.docx", &b"PK"[..])]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.unwrap().contains("notes.docx"));
        assert!(body.markdown.is_none());
    }

    #[tokio::test]
    async fn ocr_failure_is_server_error() {
        let (status, body) = post_files(&[("files", "boom.pdf", &b"%PDF-1.7"[..])]).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.error.unwrap().contains("boom.pdf"));
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn page_limit_is_bad_request() {
        let err = Ocr2MdError::TooManyPages {
            name: "long.pdf".into(),
            pages: 1200,
            limit: 1000,
        };
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&Ocr2MdError::AuthError { detail: "401".into() }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn failure_response_omits_empty_fields() {
        let json = serde_json::to_value(ApiResponse::failure("bad")).unwrap();
        assert_eq!(json, serde_json::json!({ "success": false, "error": "bad" }));
    }
}
