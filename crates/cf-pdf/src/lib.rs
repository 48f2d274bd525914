pub mod cleanup;
pub mod config;
pub mod engine;
pub mod table;

pub use config::{ExtractionConfig, RasterMode};
pub use engine::{ExtractedImage, PdfEngine, TextBlock};

use cf_core::{CfError, CfResult, ErrorKind};
use cf_llm::LlmGateway;
use cf_vision::ImageDescription;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A page-space bounding box, shared by every element of the PDF Artefact
/// (spec §3): `{x, y, width, height}` in PDF user-space units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One element of a page's content stream, in document order (spec §3 tagged
/// union `{text: {bbox, content}} | {image: {bbox, width, height, blob_key,
/// description?, surrounding_text?}}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageElement {
    Text {
        bbox: BoundingBox,
        content: String,
    },
    Image {
        bbox: BoundingBox,
        width: u32,
        height: u32,
        /// Key of this image within the artefact's blob bundle, e.g.
        /// `<stem>_p2_i1.png` — resolved to a full storage key by the caller.
        blob_key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<ImageDescription>,
        /// Present iff `description` is present — spec §8: "every image
        /// element either has both `description` and `surrounding_text` or
        /// neither".
        #[serde(skip_serializing_if = "Option::is_none")]
        surrounding_text: Option<String>,
    },
}

/// One page of the PDF Artefact (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfPageArtefact {
    pub page_number: u32,
    pub raw_text: String,
    pub elements: Vec<PageElement>,
}

/// Document-level metadata (spec §3 `meta{filename, created_at, language, vision_model}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtefactMeta {
    pub filename: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub language: Option<String>,
    pub vision_model: Option<String>,
}

/// Document-level counters (spec §3 `stats{page_count, images_detected,
/// images_analysed, raster_pages[]}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtefactStats {
    pub page_count: u32,
    pub images_detected: u32,
    pub images_analysed: u32,
    pub raster_pages: Vec<u32>,
}

/// The PDF Artefact (spec §3): everything `result/<stem>_unified.json` holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub meta: ArtefactMeta,
    pub pages: Vec<PdfPageArtefact>,
    pub stats: ArtefactStats,
    /// Raw image bytes keyed by `blob_key`, stripped before the artefact is
    /// serialized — storage is the caller's concern, not this crate's. The
    /// caller persists each `(blob_key, bytes)` pair under `result/images/`.
    #[serde(skip)]
    pub image_blobs: Vec<(String, Vec<u8>)>,
}

/// Text extracted synchronously (pdfium is not `Send` across an await point
/// the way this crate needs, so all pdfium work happens inside one
/// `spawn_blocking`, mirroring the teacher's `process_pdf`).
struct PageSyncData {
    page_num: u32,
    text: String,
    is_table: bool,
    should_rasterize: bool,
    raster: Option<(BoundingBox, Vec<u8>)>,
    images: Vec<PendingImage>,
}

struct PendingImage {
    index: u32,
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    bbox: BoundingBox,
    surrounding_text: String,
}

fn extract_pages_sync(path: &Path, config: &ExtractionConfig) -> CfResult<Vec<PageSyncData>> {
    let engine = PdfEngine::new()?;
    let doc = engine.open_document(path)?;
    let total_pages = PdfEngine::page_count(&doc);

    let start = config.start_page.unwrap_or(1).max(1);
    let end = config.end_page.unwrap_or(total_pages).min(total_pages);

    let mut pages = Vec::new();
    let mut raw_texts: Vec<(u32, String)> = Vec::new();

    for page_num in start..=end {
        let page = doc
            .pages()
            .get((page_num - 1) as u16)
            .map_err(|e| CfError::new(ErrorKind::PdfUnreadable, format!("page {page_num}: {e}")))?;

        let text = cleanup::cleanup_extracted_text(&PdfEngine::extract_page_text(&page));
        let coverage = PdfEngine::get_image_coverage(&page);
        let should_rasterize = match config.raster_mode {
            RasterMode::Always => true,
            RasterMode::Never => false,
            RasterMode::Manual => config.raster_pages.as_ref().is_some_and(|pages| pages.contains(&page_num)),
            RasterMode::Auto => {
                coverage >= config.raster_coverage_threshold && text.len() < config.raster_text_char_threshold
            }
        };
        let is_table = config.table_extraction && table::looks_like_table(&text);

        let raster = if should_rasterize || is_table {
            let (_, bytes) = PdfEngine::render_page_as_image(&page, config.dpi)?;
            let bbox = BoundingBox { x: 0.0, y: 0.0, width: page.width().value as f64, height: page.height().value as f64 };
            Some((bbox, bytes))
        } else {
            None
        };

        let text_blocks = PdfEngine::extract_text_blocks(&page);
        let mut pending_images = Vec::new();
        if !should_rasterize {
            for img in PdfEngine::extract_page_images(&page, config.min_image_size)? {
                let center = (img.bbox.x + img.bbox.width / 2.0, img.bbox.y + img.bbox.height / 2.0);
                let surrounding = engine::surrounding_text(&text_blocks, center);
                pending_images.push(PendingImage {
                    index: img.index,
                    bytes: img.bytes,
                    width: img.width,
                    height: img.height,
                    bbox: img.bbox,
                    surrounding_text: surrounding,
                });
            }
        }

        raw_texts.push((page_num, text.clone()));
        pages.push(PageSyncData {
            page_num,
            text,
            is_table,
            should_rasterize,
            raster,
            images: pending_images,
        });
    }

    cleanup::strip_headers_footers(&mut raw_texts);
    for (page, (_, stripped)) in pages.iter_mut().zip(raw_texts.into_iter()) {
        page.text = stripped;
    }

    Ok(pages)
}

/// Extract a PDF into the PDF Artefact (spec §3/§4.7).
///
/// `stem` is the document's filename stem, used to name every recovered
/// image `<stem>_p<page>_i<idx>.png` per spec §6. All pdfium work runs
/// inside `spawn_blocking`; page-level enrichment then fans out with a
/// `Semaphore`-bounded `JoinSet`, grounded on the teacher's `process_pdf`
/// concurrency pattern in `processor.rs`.
pub async fn extract_pdf(
    path: &Path,
    stem: &str,
    config: ExtractionConfig,
    gateway: Option<Arc<LlmGateway>>,
) -> CfResult<ExtractionOutcome> {
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or(stem).to_string();
    let path_owned = path.to_path_buf();
    let config_for_blocking = config.clone();
    let pages = tokio::task::spawn_blocking(move || extract_pages_sync(&path_owned, &config_for_blocking))
        .await
        .map_err(|e| CfError::with_source(ErrorKind::PdfUnreadable, "pdf extraction task panicked", e))??;

    let page_count = pages.len() as u32;
    let page_semaphore = Arc::new(Semaphore::new(config.max_concurrent_pages.max(1)));
    let image_semaphore = Arc::new(Semaphore::new(config.max_concurrent_images.max(1)));
    let max_images = config.max_images_per_document;
    let described_so_far = Arc::new(std::sync::atomic::AtomicU32::new(0));

    let mut joins = JoinSet::new();
    for page in pages {
        let page_sem = page_semaphore.clone();
        let image_sem = image_semaphore.clone();
        let gateway = gateway.clone();
        let described_so_far = described_so_far.clone();
        let text_only = config.text_only;
        let stem = stem.to_string();

        joins.spawn(async move {
            let _permit = page_sem.acquire_owned().await.expect("page semaphore never closes");
            process_page(page, &stem, gateway, image_sem, max_images, described_so_far, text_only).await
        });
    }

    let mut page_outputs = Vec::with_capacity(page_count as usize);
    while let Some(result) = joins.join_next().await {
        let page_result = result
            .map_err(|e| CfError::with_source(ErrorKind::PdfUnreadable, "page task panicked", e))??;
        page_outputs.push(page_result);
    }
    page_outputs.sort_by_key(|p| p.page_number);

    let mut pages = Vec::with_capacity(page_outputs.len());
    let mut image_blobs = Vec::new();
    let mut raster_pages = Vec::new();
    let mut images_detected = 0u32;
    let mut images_analysed = 0u32;

    for output in page_outputs {
        if output.rasterized {
            raster_pages.push(output.page_number);
        }
        for (key, bytes) in output.image_blobs {
            image_blobs.push((key, bytes));
        }
        for element in &output.artefact.elements {
            if let PageElement::Image { description, .. } = element {
                images_detected += 1;
                if description.is_some() {
                    images_analysed += 1;
                }
            }
        }
        pages.push(output.artefact);
    }

    Ok(ExtractionOutcome {
        meta: ArtefactMeta {
            filename,
            created_at: chrono::Utc::now(),
            language: None,
            vision_model: gateway.as_ref().map(|g| g.model_name().to_string()),
        },
        pages,
        stats: ArtefactStats { page_count, images_detected, images_analysed, raster_pages },
        image_blobs,
    })
}

struct PageOutput {
    page_number: u32,
    artefact: PdfPageArtefact,
    image_blobs: Vec<(String, Vec<u8>)>,
    rasterized: bool,
}

async fn process_page(
    page: PageSyncData,
    stem: &str,
    gateway: Option<Arc<LlmGateway>>,
    image_semaphore: Arc<Semaphore>,
    max_images: Option<usize>,
    described_so_far: Arc<std::sync::atomic::AtomicU32>,
    text_only: bool,
) -> CfResult<PageOutput> {
    let page_num = page.page_num;

    if page.should_rasterize {
        let (bbox, bytes) = page.raster.expect("should_rasterize implies a render was produced");
        let blob_key = format!("{stem}_p{page_num}_i0.png");
        let description = if text_only || gateway.is_none() {
            None
        } else {
            let _permit = image_semaphore.acquire().await.expect("image semaphore never closes");
            Some(cf_vision::describe_image(gateway.as_ref().unwrap(), &bytes, "image/png", &page.text).await)
        };
        let surrounding_text = description.as_ref().map(|_| page.text.clone());
        if description.is_some() {
            described_so_far.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }

        let elements = vec![
            PageElement::Text { bbox: BoundingBox::default(), content: page.text.clone() },
            PageElement::Image {
                bbox,
                width: 0,
                height: 0,
                blob_key: blob_key.clone(),
                description,
                surrounding_text,
            },
        ];

        return Ok(PageOutput {
            page_number: page_num,
            artefact: PdfPageArtefact { page_number: page_num, raw_text: page.text, elements },
            image_blobs: vec![(blob_key, bytes)],
            rasterized: true,
        });
    }

    let mut elements = vec![PageElement::Text { bbox: BoundingBox::default(), content: page.text.clone() }];
    let mut image_blobs = Vec::with_capacity(page.images.len());

    for img in page.images {
        let over_cap = max_images.is_some_and(|cap| described_so_far.load(std::sync::atomic::Ordering::Relaxed) as usize >= cap);
        let blob_key = format!("{stem}_p{page_num}_i{}.png", img.index);

        let description = if text_only || gateway.is_none() || over_cap {
            None
        } else {
            let _permit = image_semaphore.acquire().await.expect("image semaphore never closes");
            let d = cf_vision::describe_image(gateway.as_ref().unwrap(), &img.bytes, "image/png", &img.surrounding_text).await;
            described_so_far.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Some(d)
        };
        let surrounding_text = description.as_ref().map(|_| img.surrounding_text.clone());

        elements.push(PageElement::Image {
            bbox: img.bbox,
            width: img.width,
            height: img.height,
            blob_key: blob_key.clone(),
            description,
            surrounding_text,
        });
        image_blobs.push((blob_key, img.bytes));
    }

    if page.is_table && !page.should_rasterize {
        tracing::debug!(page = page_num, "table-formatted content detected");
    }

    Ok(PageOutput {
        page_number: page_num,
        artefact: PdfPageArtefact { page_number: page_num, raw_text: page.text, elements },
        image_blobs,
        rasterized: false,
    })
}
