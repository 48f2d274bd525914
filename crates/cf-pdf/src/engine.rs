use base64::Engine;
use cf_core::{CfError, CfResult, ErrorKind};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;

use crate::BoundingBox;

fn center_of(bbox: &BoundingBox) -> (f64, f64) {
    (bbox.x + bbox.width / 2.0, bbox.y + bbox.height / 2.0)
}

/// One embedded raster image recovered from a page's object list.
pub struct ExtractedImage {
    pub bytes: Vec<u8>,
    pub base64: String,
    pub width: u32,
    pub height: u32,
    pub index: u32,
    /// Page-space bounding box, stored on the artefact and used to find the
    /// text nearest this image for "surrounding text" (spec §3/§4.7).
    pub bbox: BoundingBox,
}

/// A span of page text with its bounding box, used to find the text nearest
/// an image for the "surrounding text" context passed to C8.
pub struct TextBlock {
    pub text: String,
    pub bbox: BoundingBox,
}

/// Thin wrapper around pdfium, grounded on the teacher's `PdfEngine`.
pub struct PdfEngine {
    pdfium: Pdfium,
}

impl PdfEngine {
    pub fn new() -> CfResult<Self> {
        let bindings = Pdfium::bind_to_system_library()
            .or_else(|_| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(".")))
            .map_err(|e| {
                CfError::new(
                    ErrorKind::PdfUnreadable,
                    format!("failed to load pdfium library: {e}"),
                )
            })?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    pub fn open_document<'a>(&'a self, path: &Path) -> CfResult<PdfDocument<'a>> {
        self.pdfium.load_pdf_from_file(path, None).map_err(|e| {
            CfError::new(
                ErrorKind::PdfUnreadable,
                format!("failed to open PDF '{}': {e}", path.display()),
            )
        })
    }

    pub fn page_count(doc: &PdfDocument) -> u32 {
        doc.pages().len() as u32
    }

    /// Fraction of page area covered by image/vector objects, used as the
    /// `auto` raster-mode trigger (coverage >= 0.45 and < 40 chars of text).
    pub fn get_image_coverage(page: &PdfPage) -> f64 {
        let page_area = page.width().value as f64 * page.height().value as f64;
        if page_area == 0.0 {
            return 0.0;
        }
        let mut covered = 0.0;
        for object in page.objects().iter() {
            if matches!(
                object.object_type(),
                PdfPageObjectType::Image | PdfPageObjectType::Path
            ) {
                if let Ok(bounds) = object.bounds() {
                    let w = (bounds.right().value - bounds.left().value).abs() as f64;
                    let h = (bounds.top().value - bounds.bottom().value).abs() as f64;
                    covered += w * h;
                }
            }
        }
        (covered / page_area).min(1.0)
    }

    pub fn render_page_as_image(page: &PdfPage, dpi: u32) -> CfResult<(String, Vec<u8>)> {
        let scale = dpi as f32 / 72.0;
        let width = (page.width().value * scale) as i32;
        let height = (page.height().value * scale) as i32;

        let config = PdfRenderConfig::new()
            .set_target_width(width)
            .set_target_height(height);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| CfError::new(ErrorKind::PdfUnreadable, format!("failed to render page: {e}")))?;
        let img: DynamicImage = bitmap.as_image();

        let mut png_bytes = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut png_bytes);
        img.write_to(&mut cursor, image::ImageFormat::Png)
            .map_err(|e| CfError::new(ErrorKind::PdfUnreadable, format!("failed to encode PNG: {e}")))?;
        let b64 = base64::engine::general_purpose::STANDARD.encode(&png_bytes);
        Ok((b64, png_bytes))
    }

    pub fn extract_page_text(page: &PdfPage) -> String {
        page.text().map(|t| t.all()).unwrap_or_default().trim().to_string()
    }

    /// Text blocks with page-space centers, used to rank nearby text for an
    /// extracted image (spec §4.7 step 4: sort by Euclidean distance).
    pub fn extract_text_blocks(page: &PdfPage) -> Vec<TextBlock> {
        let Ok(text) = page.text() else {
            return Vec::new();
        };
        let mut blocks = Vec::new();
        for segment in text.segments().iter() {
            let s = segment.text();
            if s.trim().is_empty() {
                continue;
            }
            let bounds = segment.bounds();
            let bbox = BoundingBox {
                x: bounds.left().value as f64,
                y: bounds.bottom().value as f64,
                width: (bounds.right().value - bounds.left().value).abs() as f64,
                height: (bounds.top().value - bounds.bottom().value).abs() as f64,
            };
            blocks.push(TextBlock { text: s, bbox });
        }
        blocks
    }

    pub fn extract_page_images(page: &PdfPage, min_size: u32) -> CfResult<Vec<ExtractedImage>> {
        let mut images = Vec::new();
        let mut idx: u32 = 0;

        for object in page.objects().iter() {
            if object.object_type() != PdfPageObjectType::Image {
                continue;
            }
            let Some(image_object) = object.as_image_object() else {
                continue;
            };
            let Ok(raw_image) = image_object.get_raw_image() else {
                continue;
            };
            let (w, h) = (raw_image.width(), raw_image.height());
            if w < min_size || h < min_size {
                continue;
            }
            idx += 1;

            let mut png_bytes = Vec::new();
            let mut cursor = std::io::Cursor::new(&mut png_bytes);
            if raw_image.write_to(&mut cursor, image::ImageFormat::Png).is_err() {
                continue;
            }
            let b64 = base64::engine::general_purpose::STANDARD.encode(&png_bytes);

            let bbox = object
                .bounds()
                .map(|b| BoundingBox {
                    x: b.left().value as f64,
                    y: b.bottom().value as f64,
                    width: (b.right().value - b.left().value).abs() as f64,
                    height: (b.top().value - b.bottom().value).abs() as f64,
                })
                .unwrap_or_default();

            images.push(ExtractedImage {
                bytes: png_bytes,
                base64: b64,
                width: w,
                height: h,
                index: idx,
                bbox,
            });
        }

        Ok(images)
    }
}

const SURROUNDING_TEXT_MAX_CHARS: usize = 500;

/// All text blocks on the page, concatenated closest-to-`center` first and
/// truncated to [`SURROUNDING_TEXT_MAX_CHARS`] (spec §4.7 step 4: distance
/// order, not a fixed block count).
pub fn surrounding_text(blocks: &[TextBlock], center: (f64, f64)) -> String {
    let mut scored: Vec<(f64, &str)> = blocks
        .iter()
        .map(|b| {
            let (bx, by) = center_of(&b.bbox);
            let dx = bx - center.0;
            let dy = by - center.1;
            ((dx * dx + dy * dy).sqrt(), b.text.as_str())
        })
        .collect();
    scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let joined = scored.into_iter().map(|(_, t)| t).collect::<Vec<_>>().join(" ");
    crate::cleanup::truncate_str(&joined, SURROUNDING_TEXT_MAX_CHARS).to_string()
}
