//! Image discovery and soft-mask pairing.
//!
//! Walks the document's object table, collects every Image XObject stream as
//! an [`ImageRecord`], then links each image to the record that supplies its
//! alpha channel.

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;

/// How an image's bytes become an output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// DCT-compressed stream, written out unchanged
    Jpeg,
    /// Anything else, reassembled into a PNG
    Png,
}

impl ImageKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }
}

/// One image stream found in the document
#[derive(Debug, Clone)]
pub struct ImageRecord {
    /// Object ID of the stream
    pub reference: ObjectId,
    pub kind: ImageKind,
    /// Unresolved /SMask reference, if the stream declares one
    pub soft_mask: Option<ObjectId>,
    /// Color space family name (DeviceGray, DeviceRGB, ICCBased, ...)
    pub color_space: Option<String>,
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u32,
    /// /Name entry, or `Object<N>` from the object's table position
    pub name: String,
    /// Filter chain as written in the dictionary
    pub filters: Vec<String>,
    /// Stream payload, still compressed
    pub raw_data: Vec<u8>,
    /// Set once another image claims this one as its soft mask
    pub is_alpha_layer: bool,
    /// Index of the paired mask record in the owning [`ImageSet`]
    pub alpha_layer: Option<usize>,
}

impl ImageRecord {
    pub fn is_grayscale(&self) -> bool {
        self.color_space.as_deref() == Some("DeviceGray")
    }
}

/// Image records in discovery order, addressed by index.
#[derive(Debug, Clone, Default)]
pub struct ImageSet {
    records: Vec<ImageRecord>,
}

impl ImageSet {
    pub fn new(records: Vec<ImageRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ImageRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    /// Index of the record whose stream is `id`
    pub fn position(&self, id: ObjectId) -> Option<usize> {
        self.records.iter().position(|r| r.reference == id)
    }

    /// The paired mask record of `record`, if pairing found one
    pub fn alpha_of(&self, record: &ImageRecord) -> Option<&ImageRecord> {
        record.alpha_layer.and_then(|idx| self.records.get(idx))
    }

    /// Records that produce an output file, in discovery order
    pub fn emitted(&self) -> impl Iterator<Item = &ImageRecord> {
        self.records.iter().filter(|r| !r.is_alpha_layer)
    }

    /// Pair every PNG-kind image with the record named by its /SMask.
    ///
    /// Dangling and self-referencing masks leave the owner without alpha.
    pub fn mark_soft_masks(&mut self) {
        for owner in 0..self.records.len() {
            let (kind, smask) = {
                let record = &self.records[owner];
                (record.kind, record.soft_mask)
            };
            let smask_id = match (kind, smask) {
                (ImageKind::Png, Some(id)) => id,
                _ => continue,
            };

            match self.position(smask_id) {
                Some(mask) if mask != owner => {
                    self.records[mask].is_alpha_layer = true;
                    self.records[owner].alpha_layer = Some(mask);
                    log::debug!(
                        "Paired {} with soft mask {:?}",
                        self.records[owner].name,
                        smask_id
                    );
                }
                _ => {
                    log::warn!(
                        "Soft mask {:?} of {} does not name another image, ignoring",
                        smask_id,
                        self.records[owner].name
                    );
                }
            }
        }
    }
}

/// Follow a single level of indirection.
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        _ => Some(obj),
    }
}

fn lookup<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok().and_then(|obj| resolve(doc, obj))
}

fn lookup_integer(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<i64> {
    match lookup(doc, dict, key)? {
        Object::Integer(n) => Some(*n),
        Object::Real(n) => Some(*n as i64),
        _ => None,
    }
}

fn lookup_name(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    match lookup(doc, dict, key)? {
        Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
        _ => None,
    }
}

/// Color space family: a bare name, or the first name of an array form.
fn color_space_name(doc: &Document, dict: &Dictionary) -> Option<String> {
    match lookup(doc, dict, b"ColorSpace")? {
        Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
        Object::Array(arr) => match arr.first().and_then(|o| resolve(doc, o)) {
            Some(Object::Name(n)) => Some(String::from_utf8_lossy(n).to_string()),
            _ => None,
        },
        _ => None,
    }
}

fn filter_names(doc: &Document, dict: &Dictionary) -> Vec<String> {
    match lookup(doc, dict, b"Filter") {
        Some(Object::Name(n)) => vec![String::from_utf8_lossy(n).to_string()],
        Some(Object::Array(arr)) => arr
            .iter()
            .filter_map(|f| match resolve(doc, f) {
                Some(Object::Name(n)) => Some(String::from_utf8_lossy(n).to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Only a lone DCTDecode filter leaves the payload as a complete JPEG file.
fn classify(filters: &[String]) -> ImageKind {
    match filters {
        [only] if only == "DCTDecode" => ImageKind::Jpeg,
        _ => ImageKind::Png,
    }
}

/// Collect every Image XObject stream in object-table order.
///
/// Soft masks are not paired yet; see [`ImageSet::mark_soft_masks`].
pub fn find_image_objects(doc: &Document) -> ImageSet {
    let mut records = Vec::new();

    for (position, (id, object)) in doc.objects.iter().enumerate() {
        let stream = match object {
            Object::Stream(stream) => stream,
            _ => continue,
        };
        let dict = &stream.dict;

        if lookup_name(doc, dict, b"Subtype").as_deref() != Some("Image") {
            continue;
        }

        let filters = filter_names(doc, dict);
        let soft_mask = match dict.get(b"SMask") {
            Ok(Object::Reference(smask_id)) => Some(*smask_id),
            _ => None,
        };
        let dimension = |key: &[u8]| {
            lookup_integer(doc, dict, key)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0)
        };

        let record = ImageRecord {
            reference: *id,
            kind: classify(&filters),
            soft_mask,
            color_space: color_space_name(doc, dict),
            width: dimension(b"Width"),
            height: dimension(b"Height"),
            bits_per_component: lookup_integer(doc, dict, b"BitsPerComponent")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(8),
            name: lookup_name(doc, dict, b"Name")
                .unwrap_or_else(|| format!("Object{}", position + 1)),
            filters,
            raw_data: stream.content.clone(),
            is_alpha_layer: false,
            alpha_layer: None,
        };

        log::debug!(
            "Found image {} {:?}: {}x{} {:?} {:?}",
            record.name,
            record.reference,
            record.width,
            record.height,
            record.color_space,
            record.kind
        );
        records.push(record);
    }

    ImageSet::new(records)
}

/// Scan and pair in one step.
pub fn scan_document(doc: &Document) -> ImageSet {
    let mut images = find_image_objects(doc);
    images.mark_soft_masks();
    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    fn image_stream(extra: Dictionary, content: Vec<u8>) -> Object {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 2i64,
            "Height" => 1i64,
            "BitsPerComponent" => 8i64,
        };
        for (key, value) in extra.iter() {
            dict.set(key.clone(), value.clone());
        }
        Object::Stream(Stream::new(dict, content))
    }

    #[test]
    fn test_skips_non_image_objects() {
        let mut doc = Document::with_version("1.5");
        doc.add_object(dictionary! { "Type" => "Catalog" });
        doc.add_object(Stream::new(dictionary! { "Subtype" => "Form" }, vec![1, 2]));
        let img = doc.add_object(image_stream(dictionary! {}, vec![9]));

        let images = find_image_objects(&doc);
        assert_eq!(images.len(), 1);
        assert_eq!(images.records()[0].reference, img);
    }

    #[test]
    fn test_placeholder_name_uses_table_position() {
        let mut doc = Document::with_version("1.5");
        doc.add_object(dictionary! { "Type" => "Catalog" });
        doc.add_object(image_stream(dictionary! {}, vec![]));
        doc.add_object(image_stream(dictionary! { "Name" => "Im7" }, vec![]));

        let images = find_image_objects(&doc);
        assert_eq!(images.records()[0].name, "Object2");
        assert_eq!(images.records()[1].name, "Im7");
    }

    #[test]
    fn test_resolves_indirect_entries_once() {
        let mut doc = Document::with_version("1.5");
        let width = doc.add_object(Object::Integer(640));
        let gray = doc.add_object(Object::Name(b"DeviceGray".to_vec()));
        doc.add_object(image_stream(
            dictionary! { "Width" => width, "ColorSpace" => gray },
            vec![],
        ));

        let images = find_image_objects(&doc);
        let record = &images.records()[0];
        assert_eq!(record.width, 640);
        assert!(record.is_grayscale());
    }

    #[test]
    fn test_classify_filters() {
        assert_eq!(classify(&["DCTDecode".to_string()]), ImageKind::Jpeg);
        assert_eq!(classify(&["FlateDecode".to_string()]), ImageKind::Png);
        assert_eq!(classify(&[]), ImageKind::Png);
        assert_eq!(
            classify(&["FlateDecode".to_string(), "DCTDecode".to_string()]),
            ImageKind::Png
        );
    }

    #[test]
    fn test_array_filter_with_single_dct_is_jpeg() {
        let mut doc = Document::with_version("1.5");
        doc.add_object(image_stream(
            dictionary! { "Filter" => vec![Object::Name(b"DCTDecode".to_vec())] },
            vec![0xFF, 0xD8],
        ));
        let images = find_image_objects(&doc);
        assert_eq!(images.records()[0].kind, ImageKind::Jpeg);
    }

    #[test]
    fn test_mark_soft_masks_links_owner_to_mask() {
        let mut doc = Document::with_version("1.5");
        let mask = doc.new_object_id();
        let owner = doc.add_object(image_stream(
            dictionary! { "Filter" => "FlateDecode", "SMask" => mask },
            vec![],
        ));
        doc.objects.insert(
            mask,
            image_stream(dictionary! { "ColorSpace" => "DeviceGray" }, vec![]),
        );

        let images = scan_document(&doc);
        let owner_idx = images.position(owner).unwrap();
        let mask_idx = images.position(mask).unwrap();

        assert_eq!(images.records()[owner_idx].alpha_layer, Some(mask_idx));
        assert!(images.records()[mask_idx].is_alpha_layer);
        assert!(!images.records()[owner_idx].is_alpha_layer);

        let emitted: Vec<_> = images.emitted().map(|r| r.reference).collect();
        assert_eq!(emitted, vec![owner]);
    }

    #[test]
    fn test_dangling_soft_mask_is_ignored() {
        let mut doc = Document::with_version("1.5");
        doc.add_object(image_stream(dictionary! { "SMask" => Object::Reference((99, 0)) }, vec![]));

        let images = scan_document(&doc);
        assert_eq!(images.records()[0].soft_mask, Some((99, 0)));
        assert_eq!(images.records()[0].alpha_layer, None);
        assert_eq!(images.emitted().count(), 1);
    }

    #[test]
    fn test_jpeg_owner_is_not_paired() {
        let mut doc = Document::with_version("1.5");
        let mask = doc.new_object_id();
        doc.add_object(image_stream(
            dictionary! { "Filter" => "DCTDecode", "SMask" => mask },
            vec![],
        ));
        doc.objects.insert(mask, image_stream(dictionary! {}, vec![]));

        let images = scan_document(&doc);
        assert_eq!(images.emitted().count(), 2);
        assert!(images.records().iter().all(|r| r.alpha_layer.is_none()));
    }

    #[test]
    fn test_shared_mask_is_claimed_by_every_owner() {
        let mut doc = Document::with_version("1.5");
        let mask = doc.new_object_id();
        doc.add_object(image_stream(dictionary! { "SMask" => mask }, vec![]));
        doc.add_object(image_stream(dictionary! { "SMask" => mask }, vec![]));
        doc.objects.insert(mask, image_stream(dictionary! {}, vec![]));

        let images = scan_document(&doc);
        let mask_idx = images.position(mask).unwrap();
        assert_eq!(images.emitted().count(), 2);
        assert!(images
            .emitted()
            .all(|r| r.alpha_layer == Some(mask_idx)));
    }
}
