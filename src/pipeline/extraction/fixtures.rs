//! In-memory PDF builders shared by extraction and pipeline tests.

use image::ImageOutputFormat;
use lopdf::{dictionary, Document, Object, Stream};

/// One line of text placed at PDF user-space coordinates (y up).
#[derive(Debug, Clone)]
pub struct FixtureLine {
    pub x: f32,
    pub y: f32,
    pub text: String,
}

impl FixtureLine {
    pub fn new(x: f32, y: f32, text: &str) -> Self {
        Self {
            x,
            y,
            text: text.to_string(),
        }
    }
}

/// Lay out plain lines top-down from y=740 at the left margin, one page per slice.
pub fn simple_pdf(pages: &[&[&str]]) -> Vec<u8> {
    let laid_out: Vec<Vec<FixtureLine>> = pages
        .iter()
        .map(|lines| {
            lines
                .iter()
                .enumerate()
                .map(|(i, text)| FixtureLine::new(72.0, 740.0 - 16.0 * i as f32, text))
                .collect()
        })
        .collect();
    text_pdf(&laid_out)
}

fn escape_pdf_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// A text PDF, one Helvetica line per `BT..ET` block.
pub fn text_pdf(pages: &[Vec<FixtureLine>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for lines in pages {
        let mut content = String::new();
        for line in lines {
            content.push_str(&format!(
                "BT /F1 11 Tf {} {} Td ({}) Tj ET\n",
                line.x,
                line.y,
                escape_pdf_string(&line.text)
            ));
        }
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(Object::Reference(page_id));
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

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("save fixture pdf");
    buf
}

pub fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([128u8, 128, 128]));
    let mut jpeg = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut jpeg, ImageOutputFormat::Jpeg(85))
        .expect("encode fixture jpeg");
    jpeg.into_inner()
}

/// A PDF whose pages are each a full-page JPEG with no text layer.
pub fn scanned_pdf(page_count: usize) -> Vec<u8> {
    let jpeg = test_jpeg(40, 60);
    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for _ in 0..page_count {
        let mut img_stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 40,
                "Height" => 60,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
                "Length" => jpeg.len() as i64,
            },
            jpeg.clone(),
        );
        img_stream.allows_compression = false;
        let img_id = doc.add_object(img_stream);

        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            b"q 612 0 0 792 0 0 cm /Img1 Do Q".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Img1" => img_id },
            },
        });
        kids.push(Object::Reference(page_id));
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

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("save fixture pdf");
    buf
}

/// Pages of scanned images followed by pages of text, in that order.
pub fn mixed_pdf(scanned_pages: usize, text_pages: &[Vec<FixtureLine>]) -> Vec<u8> {
    let scanned = Document::load_mem(&scanned_pdf(scanned_pages)).expect("load scanned");
    let text = Document::load_mem(&text_pdf(text_pages)).expect("load text");
    merge_documents(vec![scanned, text])
}

fn merge_documents(docs: Vec<Document>) -> Vec<u8> {
    let mut merged = Document::with_version("1.4");
    let pages_id = merged.new_object_id();
    let mut kids = Vec::new();

    for mut doc in docs {
        doc.renumber_objects_with(merged.max_id + 1);
        merged.max_id = doc.max_id;
        let page_ids: Vec<_> = doc.get_pages().into_values().collect();
        for (id, object) in doc.objects {
            merged.objects.insert(id, object);
        }
        for page_id in page_ids {
            if let Ok(Object::Dictionary(dict)) = merged.get_object_mut(page_id) {
                dict.set("Parent", pages_id);
            }
            kids.push(Object::Reference(page_id));
        }
    }

    let count = kids.len() as i64;
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    merged.save_to(&mut buf).expect("save merged pdf");
    buf
}
