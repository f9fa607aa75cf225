use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::confidence::normalize_confidence;
use super::types::{OcrEngine, OcrPageResult};
use super::ExtractError;

/// OCR engine reached over HTTP.
///
/// POSTs `{"image_base64": "..."}` (PNG) to the endpoint and expects
/// `{"text": "...", "confidence": 0.0..1.0 | 0..100}` back.
pub struct HttpOcrEngine {
    endpoint: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct OcrRequest<'a> {
    image_base64: &'a str,
}

#[derive(Deserialize)]
struct OcrResponse {
    text: String,
    #[serde(default)]
    confidence: Option<f32>,
}

impl HttpOcrEngine {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl OcrEngine for HttpOcrEngine {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractError> {
        // Built per call: the blocking client must not live on an async thread.
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ExtractError::OcrProcessing(format!("HTTP client: {e}")))?;

        let encoded = STANDARD.encode(image_bytes);
        let response = client
            .post(&self.endpoint)
            .json(&OcrRequest {
                image_base64: &encoded,
            })
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractError::OcrTimeout(self.timeout.as_secs())
                } else {
                    ExtractError::OcrProcessing(format!("OCR request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::OcrProcessing(format!(
                "OCR service returned {status}"
            )));
        }

        let body: OcrResponse = response
            .json()
            .map_err(|e| ExtractError::OcrProcessing(format!("bad OCR response: {e}")))?;

        Ok(OcrPageResult {
            text: body.text,
            confidence: normalize_confidence(body.confidence.unwrap_or(0.0)),
        })
    }
}

/// Scripted OCR engine for tests.
#[cfg(test)]
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
    pub delay: Option<Duration>,
    pub fail: bool,
}

#[cfg(test)]
impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            delay: None,
            fail: false,
        }
    }

    pub fn slow(text: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(text, 0.9)
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("", 0.0)
        }
    }
}

#[cfg(test)]
impl OcrEngine for MockOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            return Err(ExtractError::OcrProcessing("mock failure".into()));
        }
        Ok(OcrPageResult {
            text: self.text.clone(),
            confidence: self.confidence,
        })
    }
}
