//! PDF Image Extractor Library
//!
//! Core logic for pulling embedded images out of PDFs. Shared between CLI and
//! WASM targets.
//!
//! Every Image XObject stream in the object table is collected, soft masks are
//! paired with the images that use them, and each remaining image is written
//! out either as its original JPEG bytes or as a PNG rebuilt from the
//! decompressed samples (with the soft mask merged in as alpha).

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub mod pixels;
pub mod scan;

use lopdf::{Document, ObjectId};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

pub use pixels::{ColorMode, PixelError};
pub use scan::{find_image_objects, scan_document, ImageKind, ImageRecord, ImageSet};

/// Options for image extraction
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Write images into this directory (takes precedence over `in_memory`)
    pub output_directory: Option<PathBuf>,
    /// Return image bytes instead of writing files
    pub in_memory: bool,
    /// Log and skip images that fail to decode instead of aborting
    pub skip_failed: bool,
}

impl ExtractOptions {
    pub fn in_memory() -> Self {
        Self {
            in_memory: true,
            ..Self::default()
        }
    }

    pub fn to_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            output_directory: Some(dir.into()),
            ..Self::default()
        }
    }
}

/// Error type for image extraction
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to load PDF: {0}")]
    Load(String),
    #[error("Failed to create output directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to clean output directory {path:?}: {source}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Image {name} ({} {}): {source}", .object_id.0, .object_id.1)]
    Image {
        name: String,
        object_id: ObjectId,
        source: PixelError,
    },
    #[error("No output selected: set an output directory or in-memory mode")]
    NoOutput,
    #[error("Directory output is not available on this target")]
    DirectoryUnsupported,
}

/// An image ready to be saved
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    /// Object ID of the source stream
    pub object_id: ObjectId,
    pub name: String,
    pub kind: ImageKind,
    /// Complete JPEG or PNG file contents
    pub data: Vec<u8>,
}

impl ExtractedImage {
    pub fn extension(&self) -> &'static str {
        self.kind.extension()
    }

    pub fn mime_type(&self) -> &'static str {
        self.kind.mime_type()
    }
}

/// Summary of one image stream, without decoding it
#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    /// Object ID (number, generation)
    pub object_id: (u32, u16),
    pub name: String,
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    pub color_space: Option<String>,
    pub bits_per_component: u32,
    /// Filter chain, space separated ("raw" when unfiltered)
    pub filter: String,
    /// Compressed size in bytes
    pub size_bytes: usize,
    pub soft_mask: Option<(u32, u16)>,
    /// True when another image uses this stream as its soft mask
    pub is_soft_mask: bool,
}

impl From<&ImageRecord> for ImageInfo {
    fn from(record: &ImageRecord) -> Self {
        ImageInfo {
            object_id: record.reference,
            name: record.name.clone(),
            kind: record.kind,
            width: record.width,
            height: record.height,
            color_space: record.color_space.clone(),
            bits_per_component: record.bits_per_component,
            filter: if record.filters.is_empty() {
                "raw".to_string()
            } else {
                record.filters.join(" ")
            },
            size_bytes: record.raw_data.len(),
            soft_mask: record.soft_mask,
            is_soft_mask: record.is_alpha_layer,
        }
    }
}

/// What a run produced
#[derive(Debug)]
pub enum Extraction {
    InMemory(Vec<ExtractedImage>),
    Written(Vec<PathBuf>),
}

/// Produce output bytes for every non-mask image of an already scanned set,
/// handing each one to `sink` in discovery order.
fn for_each_image<F>(
    images: &ImageSet,
    options: &ExtractOptions,
    mut sink: F,
) -> Result<usize, ExtractError>
where
    F: FnMut(ExtractedImage) -> Result<(), ExtractError>,
{
    let mut emitted = 0;

    for record in images.emitted() {
        let mask = images.alpha_of(record);
        match pixels::image_bytes(record, mask) {
            Ok(data) => {
                sink(ExtractedImage {
                    object_id: record.reference,
                    name: record.name.clone(),
                    kind: record.kind,
                    data,
                })?;
                emitted += 1;
            }
            Err(source) if options.skip_failed => {
                log::warn!(
                    "Skipping image {} {:?}: {}",
                    record.name,
                    record.reference,
                    source
                );
            }
            Err(source) => {
                return Err(ExtractError::Image {
                    name: record.name.clone(),
                    object_id: record.reference,
                    source,
                })
            }
        }
    }

    Ok(emitted)
}

/// Extract every image of a loaded document into memory
pub fn extract_images(
    doc: &Document,
    options: &ExtractOptions,
) -> Result<Vec<ExtractedImage>, ExtractError> {
    let images = scan_document(doc);
    log::debug!(
        "Found {} image streams, {} to extract",
        images.len(),
        images.emitted().count()
    );

    let mut extracted = Vec::new();
    for_each_image(&images, options, |image| {
        extracted.push(image);
        Ok(())
    })?;

    Ok(extracted)
}

/// Extract every image of a PDF held in memory
pub fn extract_images_from_bytes(
    pdf_bytes: &[u8],
    options: &ExtractOptions,
) -> Result<Vec<ExtractedImage>, ExtractError> {
    let doc = Document::load_mem(pdf_bytes).map_err(|e| ExtractError::Load(e.to_string()))?;
    extract_images(&doc, options)
}

/// Describe every image stream of a loaded document, masks included
pub fn list_images(doc: &Document) -> Vec<ImageInfo> {
    scan_document(doc).records().iter().map(ImageInfo::from).collect()
}

/// Describe every image stream of a PDF held in memory
pub fn list_images_from_bytes(pdf_bytes: &[u8]) -> Result<Vec<ImageInfo>, ExtractError> {
    let doc = Document::load_mem(pdf_bytes).map_err(|e| ExtractError::Load(e.to_string()))?;
    Ok(list_images(&doc))
}

/// Where a run sends its images
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    InMemory,
    Directory(PathBuf),
}

impl OutputMode {
    /// Pick the output mode for `options`.
    ///
    /// A configured output directory wins over in-memory mode. Without
    /// filesystem support a directory request falls back to in-memory when
    /// that is also enabled.
    pub fn select(options: &ExtractOptions, directories: bool) -> Result<Self, ExtractError> {
        match (&options.output_directory, options.in_memory) {
            (Some(dir), _) if directories => Ok(OutputMode::Directory(dir.clone())),
            (Some(_), true) | (None, true) => Ok(OutputMode::InMemory),
            (Some(_), false) => Err(ExtractError::DirectoryUnsupported),
            (None, false) => Err(ExtractError::NoOutput),
        }
    }
}

/// Run an extraction in the mode selected by `options`.
pub fn run(pdf_bytes: &[u8], options: &ExtractOptions) -> Result<Extraction, ExtractError> {
    let mode = OutputMode::select(options, cfg!(not(target_arch = "wasm32")))?;
    let doc = Document::load_mem(pdf_bytes).map_err(|e| ExtractError::Load(e.to_string()))?;

    match mode {
        #[cfg(not(target_arch = "wasm32"))]
        OutputMode::Directory(dir) => {
            file_ops::write_images_to_dir(&doc, &dir, options).map(Extraction::Written)
        }
        #[cfg(target_arch = "wasm32")]
        OutputMode::Directory(_) => Err(ExtractError::DirectoryUnsupported),
        OutputMode::InMemory => extract_images(&doc, options).map(Extraction::InMemory),
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub mod file_ops {
    use super::*;
    use std::fs;
    use std::path::Path;

    /// Delete every `*.jpg` / `*.png` file directly inside `dir`
    pub fn clear_output_dir(dir: &Path) -> Result<usize, ExtractError> {
        let cleanup_err = |source| ExtractError::Cleanup {
            path: dir.to_path_buf(),
            source,
        };

        let mut removed = 0;
        for entry in fs::read_dir(dir).map_err(cleanup_err)? {
            let path = entry.map_err(cleanup_err)?.path();
            let is_image = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("jpg") | Some("png")
            );
            if is_image && path.is_file() {
                fs::remove_file(&path).map_err(|source| ExtractError::Cleanup {
                    path: path.clone(),
                    source,
                })?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Write the images of a loaded document as `out<N>.<ext>` into `dir`.
    ///
    /// The directory is created if needed and emptied of earlier `.jpg` /
    /// `.png` files before anything is written.
    pub fn write_images_to_dir(
        doc: &Document,
        dir: &Path,
        options: &ExtractOptions,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        fs::create_dir_all(dir).map_err(|source| ExtractError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let removed = clear_output_dir(dir)?;
        if removed > 0 {
            log::debug!("Removed {} old images from {:?}", removed, dir);
        }

        let images = scan_document(doc);
        let mut written = Vec::new();

        for_each_image(&images, options, |image| {
            let path = dir.join(format!("out{}.{}", written.len() + 1, image.extension()));
            fs::write(&path, &image.data).map_err(|source| ExtractError::Write {
                path: path.clone(),
                source,
            })?;
            log::info!("Wrote {} ({} bytes) to {:?}", image.name, image.data.len(), path);
            written.push(path);
            Ok(())
        })?;

        Ok(written)
    }

    /// Extract images from a PDF file into the configured output directory
    pub fn extract_images_to_dir(
        input_path: &Path,
        options: &ExtractOptions,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        let dir = options.output_directory.as_deref().ok_or(ExtractError::NoOutput)?;
        let doc = Document::load(input_path)
            .map_err(|e| ExtractError::Load(format!("{:?}: {}", input_path, e)))?;
        write_images_to_dir(&doc, dir, options)
    }
}
