use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::confidence::{normalize_confidence, overall_confidence, thresholds};
use super::ocr::HttpOcrEngine;
use super::pdf::LopdfTextLayer;
use super::pdf_renderer::ScanImageRenderer;
use super::sanitize::sanitize_extracted_text;
use super::types::{OcrEngine, OcrPageResult, PageText, PdfPageRenderer, PdfTextLayer};
use super::ExtractError;
use crate::blob_store::DocumentStore;
use crate::models::enums::BlockSource;
use crate::models::{BoundingRegion, ExtractedBlock};
use crate::pipeline::outcome::{Degradation, Outcome};
use crate::pipeline_config::ExtractionConfig;

/// Turns a question-paper PDF into reading-ordered blocks.
///
/// Each page is read from its text layer when that layer is dense enough,
/// otherwise rasterized and sent to OCR. Pages neither path can read become
/// a zero-confidence placeholder so later stages keep page alignment.
pub struct PaperExtractor {
    text_layer: Box<dyn PdfTextLayer + Send + Sync>,
    renderer: Box<dyn PdfPageRenderer + Send + Sync>,
    ocr: Option<Arc<dyn OcrEngine + Send + Sync>>,
    config: ExtractionConfig,
    ocr_timeout: Duration,
}

/// How one page ended up being read.
enum PageRead {
    Blocks(Vec<ExtractedBlock>),
    LowConfidence(Vec<ExtractedBlock>),
    Failed(ExtractedBlock),
}

impl PaperExtractor {
    pub fn new(
        text_layer: Box<dyn PdfTextLayer + Send + Sync>,
        renderer: Box<dyn PdfPageRenderer + Send + Sync>,
        config: ExtractionConfig,
    ) -> Self {
        let ocr_timeout = Duration::from_secs(config.ocr_timeout_secs);
        Self {
            text_layer,
            renderer,
            ocr: None,
            config,
            ocr_timeout,
        }
    }

    /// lopdf text layer and scan renderer, plus the HTTP OCR engine when configured.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let extractor = Self::new(
            Box::new(LopdfTextLayer),
            Box::new(ScanImageRenderer),
            config.clone(),
        );
        match &config.ocr_endpoint {
            Some(endpoint) => extractor.with_ocr(Arc::new(HttpOcrEngine::new(
                endpoint,
                config.ocr_timeout_secs,
            ))),
            None => extractor,
        }
    }

    pub fn with_ocr(mut self, engine: Arc<dyn OcrEngine + Send + Sync>) -> Self {
        self.ocr = Some(engine);
        self
    }

    pub fn with_ocr_timeout(mut self, timeout: Duration) -> Self {
        self.ocr_timeout = timeout;
        self
    }

    pub fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    /// Load the paper bytes from the blob store and extract them.
    pub fn extract_blob(
        &self,
        store: &dyn DocumentStore,
        blob_ref: &str,
        paper_id: &Uuid,
    ) -> Result<Outcome<Vec<ExtractedBlock>>, ExtractError> {
        let bytes = store.get(blob_ref)?;
        self.extract(paper_id, &bytes)
    }

    pub fn extract(
        &self,
        paper_id: &Uuid,
        pdf_bytes: &[u8],
    ) -> Result<Outcome<Vec<ExtractedBlock>>, ExtractError> {
        let pages = self.text_layer.extract_pages(pdf_bytes)?;
        let total = pages.len();
        tracing::info!(paper_id = %paper_id, pages = total, "Starting extraction");

        let mut blocks = Vec::new();
        let mut failed_pages = Vec::new();
        let mut low_confidence_pages = Vec::new();

        for (index, page) in pages.iter().enumerate() {
            match self.read_page(paper_id, pdf_bytes, index, page) {
                PageRead::Blocks(page_blocks) => blocks.extend(page_blocks),
                PageRead::LowConfidence(page_blocks) => {
                    low_confidence_pages.push(page.page_no);
                    blocks.extend(page_blocks);
                }
                PageRead::Failed(placeholder) => {
                    failed_pages.push(page.page_no);
                    blocks.push(placeholder);
                }
            }
        }

        if total > 0 && failed_pages.len() as f32 / total as f32 > self.config.max_failed_page_fraction
        {
            tracing::warn!(
                paper_id = %paper_id,
                failed = failed_pages.len(),
                total,
                "Too many unreadable pages"
            );
            return Err(ExtractError::TooManyFailedPages {
                pages: failed_pages,
                total,
            });
        }

        blocks.sort_by(|a, b| {
            a.page_no
                .cmp(&b.page_no)
                .then(a.region.y.total_cmp(&b.region.y))
                .then(a.region.x.total_cmp(&b.region.x))
        });
        for (i, block) in blocks.iter_mut().enumerate() {
            block.order_index = i as u32;
        }

        let mut degradations = Vec::new();
        if !failed_pages.is_empty() {
            tracing::warn!(paper_id = %paper_id, pages = ?failed_pages, "Pages replaced by placeholders");
            degradations.push(Degradation::FailedPages {
                pages: failed_pages,
            });
        }
        if !low_confidence_pages.is_empty() {
            degradations.push(Degradation::LowConfidencePages {
                pages: low_confidence_pages,
            });
        }

        tracing::info!(
            paper_id = %paper_id,
            blocks = blocks.len(),
            confidence = overall_confidence(&blocks),
            degraded = !degradations.is_empty(),
            "Extraction complete"
        );

        Ok(Outcome::with_degradations(blocks, degradations))
    }

    fn read_page(
        &self,
        paper_id: &Uuid,
        pdf_bytes: &[u8],
        index: usize,
        page: &PageText,
    ) -> PageRead {
        let native = native_blocks(paper_id, page);
        if !native.is_empty() && page.density() >= self.config.density_threshold {
            return PageRead::Blocks(native);
        }

        match self.ocr_page(pdf_bytes, index) {
            Ok(result) => {
                let text = sanitize_extracted_text(&result.text);
                if text.is_empty() {
                    tracing::debug!(page = page.page_no, "OCR returned no text");
                } else {
                    let confidence = normalize_confidence(result.confidence);
                    let blocks = ocr_blocks(paper_id, page, &text, confidence);
                    if confidence < self.config.low_confidence_threshold {
                        return PageRead::LowConfidence(blocks);
                    }
                    return PageRead::Blocks(blocks);
                }
            }
            Err(e) => {
                tracing::warn!(page = page.page_no, error = %e, "OCR failed");
            }
        }

        // Sparse text layer still beats nothing.
        if !native.is_empty() {
            return PageRead::Blocks(native);
        }
        PageRead::Failed(placeholder_block(paper_id, page))
    }

    /// Rasterize one page and OCR it on a worker thread, bounded by the timeout.
    fn ocr_page(&self, pdf_bytes: &[u8], index: usize) -> Result<OcrPageResult, ExtractError> {
        let engine = self.ocr.clone().ok_or(ExtractError::OcrUnavailable)?;
        let image = self.renderer.render_page(pdf_bytes, index)?;

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            // Receiver may have given up already.
            let _ = tx.send(engine.ocr_image(&image));
        });

        match rx.recv_timeout(self.ocr_timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(ExtractError::OcrTimeout(self.ocr_timeout.as_secs()))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ExtractError::OcrProcessing(
                "OCR worker exited without a result".into(),
            )),
        }
    }
}

fn native_blocks(paper_id: &Uuid, page: &PageText) -> Vec<ExtractedBlock> {
    page.lines
        .iter()
        .filter(|line| !line.text.trim().is_empty())
        .map(|line| ExtractedBlock {
            paper_id: *paper_id,
            page_no: page.page_no,
            order_index: 0,
            text: line.text.clone(),
            region: BoundingRegion {
                x: line.x,
                y: line.top,
                width: line.width,
                height: line.height,
            },
            confidence: thresholds::NATIVE,
            source: BlockSource::Native,
        })
        .collect()
}

/// OCR yields plain lines; they are stacked evenly down the page at the left edge.
fn ocr_blocks(paper_id: &Uuid, page: &PageText, text: &str, confidence: f32) -> Vec<ExtractedBlock> {
    let lines: Vec<&str> = text.lines().collect();
    let line_height = page.height / lines.len().max(1) as f32;
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| ExtractedBlock {
            paper_id: *paper_id,
            page_no: page.page_no,
            order_index: 0,
            text: (*line).to_string(),
            region: BoundingRegion {
                x: 0.0,
                y: i as f32 * line_height,
                width: page.width,
                height: line_height,
            },
            confidence,
            source: BlockSource::Ocr,
        })
        .collect()
}

fn placeholder_block(paper_id: &Uuid, page: &PageText) -> ExtractedBlock {
    ExtractedBlock {
        paper_id: *paper_id,
        page_no: page.page_no,
        order_index: 0,
        text: String::new(),
        region: BoundingRegion {
            x: 0.0,
            y: 0.0,
            width: page.width,
            height: page.height,
        },
        confidence: 0.0,
        source: BlockSource::Failed,
    }
}
