//! WebAssembly bindings for PDF Image Extractor

use wasm_bindgen::prelude::*;
use crate::{extract_images_from_bytes, list_images_from_bytes, ExtractOptions, ExtractedImage};

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Extract every image in a PDF
///
/// # Arguments
/// * `pdf_bytes` - The input PDF file as a byte array
/// * `skip_failed` - Skip images that fail to decode instead of throwing (default: false)
///
/// # Returns
/// An array of `ExtractedImageJs`, in document order
#[wasm_bindgen]
pub fn extract_images(
    pdf_bytes: &[u8],
    skip_failed: Option<bool>,
) -> Result<Vec<ExtractedImageJs>, JsError> {
    let options = ExtractOptions {
        skip_failed: skip_failed.unwrap_or(false),
        ..ExtractOptions::in_memory()
    };

    let images = extract_images_from_bytes(pdf_bytes, &options)
        .map_err(|e| JsError::new(&e.to_string()))?;

    Ok(images.into_iter().map(ExtractedImageJs::from).collect())
}

/// Describe the image streams of a PDF as a JSON string
#[wasm_bindgen]
pub fn list_images_json(pdf_bytes: &[u8]) -> Result<String, JsError> {
    let images = list_images_from_bytes(pdf_bytes).map_err(|e| JsError::new(&e.to_string()))?;
    serde_json::to_string(&images).map_err(|e| JsError::new(&e.to_string()))
}

/// One extracted image file
#[wasm_bindgen]
pub struct ExtractedImageJs {
    name: String,
    object_id: String,
    format: String,
    mime_type: String,
    data: Vec<u8>,
}

impl From<ExtractedImage> for ExtractedImageJs {
    fn from(image: ExtractedImage) -> Self {
        ExtractedImageJs {
            name: image.name.clone(),
            object_id: format!("{} {}", image.object_id.0, image.object_id.1),
            format: image.extension().to_string(),
            mime_type: image.mime_type().to_string(),
            data: image.data,
        }
    }
}

#[wasm_bindgen]
impl ExtractedImageJs {
    /// Get the image name
    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.name.clone()
    }

    /// Get the source object ID ("num gen")
    #[wasm_bindgen(getter, js_name = objectId)]
    pub fn object_id(&self) -> String {
        self.object_id.clone()
    }

    /// Get the file format ("jpg" or "png")
    #[wasm_bindgen(getter)]
    pub fn format(&self) -> String {
        self.format.clone()
    }

    /// Get the MIME type
    #[wasm_bindgen(getter, js_name = mimeType)]
    pub fn mime_type(&self) -> String {
        self.mime_type.clone()
    }

    /// Get the file bytes
    #[wasm_bindgen(getter)]
    pub fn data(&self) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(self.data.as_slice())
    }
}
