//! PDF page rasterization.
//!
//! The PDF provider's schedule is a scanned-looking table the vision model
//! reads from page images. This module turns the downloaded document into
//! one PNG per page at 200 DPI. Rasterization is CPU-bound and pdfium is
//! not async-safe, so callers run [`render_pages`] inside
//! `tokio::task::spawn_blocking`.

use crate::error::ScrapeError;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::io::Cursor;
use tracing::debug;

/// Render resolution for the vision model's page images.
const RENDER_DPI: f32 = 200.0;

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Rasterize every page of a PDF to a PNG image.
///
/// # Errors
///
/// All failures — pdfium missing, document unparseable, a page that will not
/// render, PNG encoding — are [`ScrapeError::Extraction`]: the document was
/// fetched fine but cannot be turned into model input.
pub fn render_pages(bytes: &[u8]) -> Result<Vec<Vec<u8>>, ScrapeError> {
    let pdfium = Pdfium::new(
        Pdfium::bind_to_system_library()
            .map_err(|e| ScrapeError::Extraction(format!("pdfium unavailable: {e}")))?,
    );
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ScrapeError::Extraction(format!("unreadable PDF document: {e}")))?;

    let config = PdfRenderConfig::new().scale_page_by_factor(RENDER_DPI / POINTS_PER_INCH);

    let mut pages = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| ScrapeError::Extraction(format!("failed to render page {index}: {e}")))?;
        let mut png = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut png, ImageFormat::Png)
            .map_err(|e| ScrapeError::Extraction(format!("failed to encode page {index}: {e}")))?;
        pages.push(png.into_inner());
    }

    if pages.is_empty() {
        return Err(ScrapeError::Extraction(
            "PDF document has no pages".to_string(),
        ));
    }

    debug!(pages = pages.len(), "Rendered PDF pages");
    Ok(pages)
}
