//! In-memory document builders for tests.

use crate::DecoderError;
use lopdf::{dictionary, Document, Object, Stream};

/// Builds a minimal PDF with one blank page per `(width_pt, height_pt)` entry.
pub fn blank_pdf(page_sizes: &[(f32, f32)]) -> Result<Vec<u8>, DecoderError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(page_sizes.len());

    for &(width, height) in page_sizes {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let media_box: Vec<Object> = vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(width),
            Object::Real(height),
        ];
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => media_box,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|err| DecoderError::Backend(err.to_string()))?;
    Ok(bytes)
}

/// A letter-sized document with `page_count` pages.
pub fn letter_pdf(page_count: usize) -> Result<Vec<u8>, DecoderError> {
    blank_pdf(&vec![(612.0, 792.0); page_count])
}
