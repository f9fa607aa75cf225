pub mod confidence;
pub mod ocr;
pub mod orchestrator;
pub mod pdf;
pub mod pdf_renderer;
pub mod sanitize;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use confidence::*;
pub use ocr::*;
pub use orchestrator::*;
pub use pdf::*;
pub use pdf_renderer::*;
pub use sanitize::*;
pub use types::*;

use thiserror::Error;

use crate::blob_store::BlobError;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// The bytes are not a PDF container lopdf can open.
    #[error("Not a readable PDF: {0}")]
    InvalidFormat(String),

    #[error("{} of {total} pages could not be read (pages {pages:?})", .pages.len())]
    TooManyFailedPages { pages: Vec<u32>, total: usize },

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("OCR timed out after {0}s")]
    OcrTimeout(u64),

    #[error("No OCR engine configured")]
    OcrUnavailable,

    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),
}
