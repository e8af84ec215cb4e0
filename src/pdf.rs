use crate::error::{FolioError, Result};
use crate::surface::PageBitmap;
use crate::types::Size;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, StringFormat, dictionary};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::io::Write;

pub const PRODUCER: &str = "folio";

#[derive(Debug, Clone, Default)]
pub struct PdfMetadata {
    pub title: String,
}

/// Builds a PDF with one page per bitmap. Each page is a single RGB image
/// XObject stretched over a MediaBox of `page_size` points, so the PDF shows
/// exactly what was rasterized.
pub fn assemble_pdf(
    bitmaps: &[PageBitmap],
    page_size: Size,
    metadata: &PdfMetadata,
) -> Result<Vec<u8>> {
    if bitmaps.is_empty() {
        return Err(FolioError::InvalidDocument(
            "cannot assemble a PDF without pages".to_string(),
        ));
    }

    let compressed: Vec<Vec<u8>> = bitmaps
        .par_iter()
        .map(|bitmap| flate_compress(&bitmap.rgb))
        .collect::<std::io::Result<_>>()?;

    let width = page_size.width.to_f32();
    let height = page_size.height.to_f32();
    let mut doc = LoDocument::with_version("1.7");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<LoObject> = Vec::with_capacity(bitmaps.len());

    for (bitmap, data) in bitmaps.iter().zip(compressed) {
        let image_id = doc.add_object(
            LoStream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => bitmap.width as i64,
                    "Height" => bitmap.height as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "FlateDecode",
                },
                data,
            )
            .with_compression(false),
        );
        let content = format!("q {width:.3} 0 0 {height:.3} 0 0 cm /Im1 Do Q\n").into_bytes();
        let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im1" => image_id,
                },
            },
            "MediaBox" => LoObject::Array(vec![
                LoObject::Integer(0),
                LoObject::Integer(0),
                width.into(),
                height.into(),
            ]),
        });
        kids.push(LoObject::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => bitmaps.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let creation_date = chrono::Local::now().format("D:%Y%m%d%H%M%S").to_string();
    let info_id = doc.add_object(dictionary! {
        "Title" => LoObject::string_literal(metadata.title.as_str()),
        "Producer" => LoObject::string_literal(PRODUCER),
        "CreationDate" => LoObject::string_literal(creation_date),
    });
    let fingerprint = fingerprint(bitmaps);
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.trailer.set(
        "ID",
        LoObject::Array(vec![
            LoObject::String(fingerprint.clone(), StringFormat::Hexadecimal),
            LoObject::String(fingerprint, StringFormat::Hexadecimal),
        ]),
    );

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    log::debug!("assembled {} page PDF ({} bytes)", bitmaps.len(), out.len());
    Ok(out)
}

fn flate_compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// First 16 bytes of a SHA-256 over every page raster.
fn fingerprint(bitmaps: &[PageBitmap]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for bitmap in bitmaps {
        hasher.update(bitmap.width.to_be_bytes());
        hasher.update(bitmap.height.to_be_bytes());
        hasher.update(&bitmap.rgb);
    }
    hasher.finalize()[..16].to_vec()
}
