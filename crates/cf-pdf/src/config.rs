use serde::{Deserialize, Serialize};

/// How page rasterization is chosen per spec §4.7 (wire values `auto` /
/// `manual` / `off`, see `ExtractionConfig::raster_pages` for `Manual`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RasterMode {
    /// Rasterize only when the page looks image/vector-dominated and has
    /// little extractable text (coverage >= 0.45 and < 40 chars of text).
    Auto,
    /// Rasterize exactly the pages listed in `ExtractionConfig::raster_pages`,
    /// regardless of the auto heuristic.
    Manual,
    Always,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub dpi: u32,
    pub min_image_size: u32,
    pub raster_coverage_threshold: f64,
    pub raster_text_char_threshold: usize,
    pub raster_mode: RasterMode,
    /// Explicit 1-based page list to rasterize when `raster_mode` is `Manual`.
    pub raster_pages: Option<Vec<u32>>,
    pub table_extraction: bool,
    pub text_only: bool,
    pub max_concurrent_pages: usize,
    pub max_concurrent_images: usize,
    /// Cap on described images per document; remaining images are still
    /// recorded (index, dimensions) but left without a description.
    pub max_images_per_document: Option<usize>,
    pub start_page: Option<u32>,
    pub end_page: Option<u32>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            min_image_size: 100,
            raster_coverage_threshold: 0.45,
            raster_text_char_threshold: 40,
            raster_mode: RasterMode::Auto,
            raster_pages: None,
            table_extraction: true,
            text_only: false,
            max_concurrent_pages: 4,
            max_concurrent_images: 5,
            max_images_per_document: None,
            start_page: None,
            end_page: None,
        }
    }
}
