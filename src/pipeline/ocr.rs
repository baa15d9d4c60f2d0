//! OCR service interaction: upload a document, obtain a signed URL, and run
//! OCR on it.
//!
//! The provider is a trait so the conversion pipeline and the HTTP endpoint
//! can be exercised without network access. [`MistralOcrClient`] is the real
//! implementation; it is constructed explicitly per conversion with the API
//! key resolved at that moment, never from a process-wide singleton.
//!
//! ## Request sequence (per document)
//!
//! ```text
//! POST /v1/files            multipart purpose=ocr, file=<bytes>  → { id }
//! GET  /v1/files/{id}/url   ?expiry=<hours>                       → { url }
//! POST /v1/ocr              { model, document, include_image_base64 }
//! ```
//!
//! ## Retry Strategy
//!
//! Off by default: the first failure aborts the batch. With
//! `max_retries > 0`, HTTP 429/5xx and timeouts are retried with exponential
//! backoff (`retry_backoff_ms * 2^(attempt - 1)`). Authentication errors and other
//! 4xx responses are never retried.

use crate::config::ConversionConfig;
use crate::error::Ocr2MdError;
use crate::model::SourceResult;
use crate::pipeline::input::SourceDocument;
use async_trait::async_trait;
use reqwest::{multipart, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// A backend that turns one document into an OCR result.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Run OCR over a single, already validated document.
    async fn process(&self, doc: &SourceDocument) -> Result<SourceResult, Ocr2MdError>;
}

/// Mistral OCR over its REST API.
#[derive(Clone)]
pub struct MistralOcrClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    signed_url_expiry_hours: u32,
    timeout_secs: u64,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl std::fmt::Debug for MistralOcrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MistralOcrClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct UploadedFile {
    id: String,
}

#[derive(Deserialize)]
struct SignedUrl {
    url: String,
}

/// A failed call, tagged with whether a retry could help.
struct CallError {
    error: Ocr2MdError,
    retryable: bool,
}

impl CallError {
    fn fatal(error: Ocr2MdError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

impl MistralOcrClient {
    /// Build a client from the conversion config.
    ///
    /// # Errors
    /// [`Ocr2MdError::ApiKeyMissing`] if no key is configured or set in the
    /// environment.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Ocr2MdError> {
        let api_key = config.resolve_api_key()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| Ocr2MdError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            signed_url_expiry_hours: config.signed_url_expiry_hours,
            timeout_secs: config.api_timeout_secs,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a transport error to an OCR error.
    fn transport_error(&self, doc: &SourceDocument, e: reqwest::Error, upload: bool) -> CallError {
        if e.is_timeout() {
            return CallError {
                error: Ocr2MdError::ApiTimeout {
                    file: doc.name.clone(),
                    secs: self.timeout_secs,
                },
                retryable: true,
            };
        }
        let reason = e.to_string();
        let error = if upload {
            Ocr2MdError::UploadFailed {
                file: doc.name.clone(),
                reason,
            }
        } else {
            Ocr2MdError::OcrFailed {
                file: doc.name.clone(),
                reason,
            }
        };
        CallError {
            error,
            retryable: e.is_connect(),
        }
    }

    /// Turn a non-success response into an error.
    async fn status_error(doc: &SourceDocument, response: Response, upload: bool) -> CallError {
        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        let detail = truncate(body.trim(), 300);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                CallError::fatal(Ocr2MdError::AuthError {
                    detail: format!("HTTP {status}: {detail}"),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => CallError {
                error: Ocr2MdError::RateLimitExceeded {
                    file: doc.name.clone(),
                    retry_after_secs,
                },
                retryable: true,
            },
            _ => {
                let reason = format!("HTTP {status}: {detail}");
                let error = if upload {
                    Ocr2MdError::UploadFailed {
                        file: doc.name.clone(),
                        reason,
                    }
                } else {
                    Ocr2MdError::OcrFailed {
                        file: doc.name.clone(),
                        reason,
                    }
                };
                CallError {
                    error,
                    retryable: status.is_server_error(),
                }
            }
        }
    }

    async fn upload(&self, doc: &SourceDocument) -> Result<String, CallError> {
        let part = multipart::Part::bytes(doc.bytes.clone())
            .file_name(doc.name.clone())
            .mime_str(&doc.mime_type)
            .map_err(|e| {
                CallError::fatal(Ocr2MdError::UploadFailed {
                    file: doc.name.clone(),
                    reason: e.to_string(),
                })
            })?;
        let form = multipart::Form::new().text("purpose", "ocr").part("file", part);

        let response = self
            .http
            .post(self.url("/v1/files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(doc, e, true))?;
        if !response.status().is_success() {
            return Err(Self::status_error(doc, response, true).await);
        }

        let uploaded: UploadedFile = response.json().await.map_err(|e| {
            CallError::fatal(Ocr2MdError::UploadFailed {
                file: doc.name.clone(),
                reason: format!("unexpected upload response: {e}"),
            })
        })?;
        Ok(uploaded.id)
    }

    async fn signed_url(&self, doc: &SourceDocument, file_id: &str) -> Result<String, CallError> {
        let response = self
            .http
            .get(self.url(&format!("/v1/files/{file_id}/url")))
            .query(&[("expiry", self.signed_url_expiry_hours)])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| self.transport_error(doc, e, true))?;
        if !response.status().is_success() {
            return Err(Self::status_error(doc, response, true).await);
        }

        let signed: SignedUrl = response.json().await.map_err(|e| {
            CallError::fatal(Ocr2MdError::UploadFailed {
                file: doc.name.clone(),
                reason: format!("unexpected signed-URL response: {e}"),
            })
        })?;
        Ok(signed.url)
    }

    async fn run_ocr(&self, doc: &SourceDocument, url: &str) -> Result<SourceResult, CallError> {
        let response = self
            .http
            .post(self.url("/v1/ocr"))
            .bearer_auth(&self.api_key)
            .json(&ocr_request_body(&self.model, doc, url))
            .send()
            .await
            .map_err(|e| self.transport_error(doc, e, false))?;
        if !response.status().is_success() {
            return Err(Self::status_error(doc, response, false).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(doc, e, false))?;
        SourceResult::from_json(&body).map_err(CallError::fatal)
    }

    async fn process_once(&self, doc: &SourceDocument) -> Result<SourceResult, CallError> {
        let file_id = self.upload(doc).await?;
        debug!("{}: uploaded as {}", doc.name, file_id);
        let url = self.signed_url(doc, &file_id).await?;
        self.run_ocr(doc, &url).await
    }
}

/// JSON body for the OCR call. PDFs go in as `document_url`, images as
/// `image_url`.
fn ocr_request_body(model: &str, doc: &SourceDocument, url: &str) -> serde_json::Value {
    let document = if doc.is_image() {
        json!({ "type": "image_url", "image_url": url })
    } else {
        json!({ "type": "document_url", "document_url": url })
    };
    json!({
        "model": model,
        "document": document,
        "include_image_base64": true,
    })
}

/// Delay before retry number `attempt` (1-based), saturating at `u64::MAX`.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}\u{2026}")
    }
}

#[async_trait]
impl OcrProvider for MistralOcrClient {
    fn name(&self) -> &str {
        "mistral"
    }

    async fn process(&self, doc: &SourceDocument) -> Result<SourceResult, Ocr2MdError> {
        let start = Instant::now();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    doc.name, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.process_once(doc).await {
                Ok(result) => {
                    info!(
                        "{}: {} pages via {} in {:?}",
                        doc.name,
                        result.page_count(),
                        if result.model.is_empty() { &self.model } else { &result.model },
                        start.elapsed()
                    );
                    return Ok(result);
                }
                Err(CallError { error, retryable }) => {
                    warn!("{}: attempt {} failed: {}", doc.name, attempt + 1, error);
                    if !retryable || attempt == self.max_retries {
                        return Err(error);
                    }
                }
            }
        }

        Err(Ocr2MdError::Internal(format!(
            "{}: retry loop exited without a result",
            doc.name
        )))
    }
}
