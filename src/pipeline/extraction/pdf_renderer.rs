//! Page rasterization for OCR.
//!
//! Scanned question papers carry each page as one embedded image XObject.
//! The largest image on the page is pulled out and re-encoded as PNG.

use image::ImageOutputFormat;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::pdf::load_document;
use super::types::PdfPageRenderer;
use super::ExtractError;

/// Renders a page by extracting its dominant embedded scan.
pub struct ScanImageRenderer;

impl PdfPageRenderer for ScanImageRenderer {
    fn render_page(&self, pdf_bytes: &[u8], page_index: usize) -> Result<Vec<u8>, ExtractError> {
        let doc = load_document(pdf_bytes)?;
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        let page_id = *pages.get(page_index).ok_or_else(|| {
            ExtractError::PdfParsing(format!(
                "page index {page_index} out of range ({} pages)",
                pages.len()
            ))
        })?;

        let raw = largest_page_image(&doc, page_id)?;
        let img = image::load_from_memory(&raw)
            .map_err(|e| ExtractError::ImageProcessing(format!("cannot decode page image: {e}")))?;
        let png = encode_png(&img)?;

        tracing::debug!(page_index, raw_size = raw.len(), png_size = png.len(), "Rendered page");
        Ok(png)
    }
}

fn encode_png(img: &image::DynamicImage) -> Result<Vec<u8>, ExtractError> {
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageOutputFormat::Png)
        .map_err(|e| ExtractError::ImageProcessing(format!("PNG encode failed: {e}")))?;
    Ok(buf.into_inner())
}

fn largest_page_image(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, ExtractError> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| ExtractError::PdfParsing(format!("page object: {e}")))?;
    let resources = resolve_dict_entry(doc, page, b"Resources")?;
    let xobjects = resolve_dict_entry(doc, resources, b"XObject")?;

    let mut largest: Option<Vec<u8>> = None;
    for (_, entry) in xobjects.iter() {
        let Object::Stream(stream) = resolve_object(doc, entry) else {
            continue;
        };
        if !is_image(&stream.dict) {
            continue;
        }
        let bytes = image_bytes(doc, stream)?;
        if largest.as_ref().map_or(true, |prev| bytes.len() > prev.len()) {
            largest = Some(bytes);
        }
    }

    largest.ok_or_else(|| ExtractError::PdfParsing("no image on page".into()))
}

fn is_image(dict: &Dictionary) -> bool {
    matches!(dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image")
}

fn has_filter(dict: &Dictionary, name: &[u8]) -> bool {
    match dict.get(b"Filter") {
        Ok(Object::Name(n)) => n == name,
        Ok(Object::Array(items)) => items
            .iter()
            .any(|o| matches!(o, Object::Name(n) if n == name)),
        _ => false,
    }
}

fn image_bytes(doc: &Document, stream: &Stream) -> Result<Vec<u8>, ExtractError> {
    // JPEG payloads are complete files already.
    if has_filter(&stream.dict, b"DCTDecode") {
        return Ok(stream.content.clone());
    }

    let content = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    if image::load_from_memory(&content).is_ok() {
        return Ok(content);
    }
    raw_pixels_to_png(doc, &stream.dict, &content)
}

fn raw_pixels_to_png(
    doc: &Document,
    dict: &Dictionary,
    pixels: &[u8],
) -> Result<Vec<u8>, ExtractError> {
    let width = dimension(dict, b"Width")?;
    let height = dimension(dict, b"Height")?;
    let bpc = get_int(dict, b"BitsPerComponent").unwrap_or(8);
    if bpc != 8 {
        return Err(ExtractError::ImageProcessing(format!(
            "unsupported bits per component: {bpc}"
        )));
    }

    let channels = color_channels(doc, dict);
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(channels as usize))
        .ok_or_else(|| {
            ExtractError::ImageProcessing(format!("image too large: {width}x{height}x{channels}"))
        })?;
    if pixels.len() < expected {
        return Err(ExtractError::ImageProcessing(format!(
            "pixel buffer {} bytes, expected {expected}",
            pixels.len()
        )));
    }
    let data = pixels[..expected].to_vec();

    let img = match channels {
        1 => image::GrayImage::from_raw(width, height, data).map(image::DynamicImage::ImageLuma8),
        3 => image::RgbImage::from_raw(width, height, data).map(image::DynamicImage::ImageRgb8),
        // CMYK read as RGBA; OCR only needs contrast.
        4 => image::RgbaImage::from_raw(width, height, data).map(image::DynamicImage::ImageRgba8),
        n => {
            return Err(ExtractError::ImageProcessing(format!(
                "unsupported channel count: {n}"
            )))
        }
    }
    .ok_or_else(|| ExtractError::ImageProcessing("pixel buffer does not fit image".into()))?;

    encode_png(&img)
}

fn color_channels(doc: &Document, dict: &Dictionary) -> u32 {
    let Ok(cs) = dict.get(b"ColorSpace") else {
        return 3;
    };
    match resolve_object(doc, cs) {
        Object::Name(n) => match n.as_slice() {
            b"DeviceGray" | b"CalGray" => 1,
            b"DeviceCMYK" => 4,
            _ => 3,
        },
        Object::Array(items) => match items.first() {
            Some(Object::Name(n)) if n == b"ICCBased" => items
                .get(1)
                .map(|o| resolve_object(doc, o))
                .and_then(|o| match o {
                    Object::Stream(s) => get_int(&s.dict, b"N").ok(),
                    _ => None,
                })
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(3),
            Some(Object::Name(n)) if n == b"Indexed" => 1,
            _ => 3,
        },
        _ => 3,
    }
}

fn resolve_object<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn resolve_dict_entry<'a>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Result<&'a Dictionary, ExtractError> {
    let name = String::from_utf8_lossy(key);
    let obj = dict
        .get(key)
        .map_err(|_| ExtractError::PdfParsing(format!("missing /{name}")))?;
    resolve_object(doc, obj)
        .as_dict()
        .map_err(|_| ExtractError::PdfParsing(format!("/{name} is not a dictionary")))
}

/// Positive image dimension that fits `u32`.
fn dimension(dict: &Dictionary, key: &[u8]) -> Result<u32, ExtractError> {
    let raw = get_int(dict, key)?;
    u32::try_from(raw)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| {
            ExtractError::ImageProcessing(format!(
                "invalid /{} {raw}",
                String::from_utf8_lossy(key)
            ))
        })
}

fn get_int(dict: &Dictionary, key: &[u8]) -> Result<i64, ExtractError> {
    let name = String::from_utf8_lossy(key);
    dict.get(key)
        .map_err(|_| ExtractError::PdfParsing(format!("missing /{name}")))?
        .as_i64()
        .map_err(|_| ExtractError::PdfParsing(format!("/{name} is not an integer")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::fixtures::{scanned_pdf, simple_pdf};
    use image::GenericImageView;
    use lopdf::dictionary;

    #[test]
    fn renderer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ScanImageRenderer>();
    }

    #[test]
    fn renders_scanned_page_as_png() {
        let pdf = scanned_pdf(2);
        let png = ScanImageRenderer.render_page(&pdf, 1).unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!(img.dimensions(), (40, 60));
    }

    #[test]
    fn out_of_range_page_is_error() {
        let pdf = scanned_pdf(1);
        assert!(matches!(
            ScanImageRenderer.render_page(&pdf, 3),
            Err(ExtractError::PdfParsing(_))
        ));
    }

    #[test]
    fn text_page_without_images_is_error() {
        let pdf = simple_pdf(&[&["1. Define work."]]);
        assert!(ScanImageRenderer.render_page(&pdf, 0).is_err());
    }

    #[test]
    fn raw_gray_pixels_reconstructed() {
        let doc = Document::with_version("1.4");
        let dict = lopdf::dictionary! {
            "Width" => 2,
            "Height" => 2,
            "BitsPerComponent" => 8,
            "ColorSpace" => "DeviceGray",
        };
        let png = raw_pixels_to_png(&doc, &dict, &[0, 64, 128, 255]).unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
    }

    #[test]
    fn short_pixel_buffer_rejected() {
        let doc = Document::with_version("1.4");
        let dict = lopdf::dictionary! {
            "Width" => 10,
            "Height" => 10,
            "ColorSpace" => "DeviceRGB",
        };
        assert!(matches!(
            raw_pixels_to_png(&doc, &dict, &[0; 12]),
            Err(ExtractError::ImageProcessing(_))
        ));
    }

    #[test]
    fn hostile_dimensions_rejected() {
        let doc = Document::with_version("1.4");
        let negative = lopdf::dictionary! {
            "Width" => -1,
            "Height" => 4,
            "ColorSpace" => "DeviceGray",
        };
        assert!(matches!(
            raw_pixels_to_png(&doc, &negative, &[0; 16]),
            Err(ExtractError::ImageProcessing(_))
        ));

        let huge = lopdf::dictionary! {
            "Width" => u32::MAX as i64,
            "Height" => u32::MAX as i64,
            "ColorSpace" => "DeviceRGB",
        };
        assert!(matches!(
            raw_pixels_to_png(&doc, &huge, &[0; 16]),
            Err(ExtractError::ImageProcessing(_))
        ));

        let wider_than_u32 = lopdf::dictionary! {
            "Width" => u32::MAX as i64 + 1,
            "Height" => 1,
            "ColorSpace" => "DeviceGray",
        };
        assert!(matches!(
            raw_pixels_to_png(&doc, &wider_than_u32, &[0; 16]),
            Err(ExtractError::ImageProcessing(_))
        ));
    }
}
