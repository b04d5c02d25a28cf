//! Stamping issued receipts onto the printable template
use super::error::{ReceiptError, Result};
use super::receipt::Receipt;
use super::utils::receipt_suffix;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use std::path::Path;
use tracing::warn;

pub const FONT_NAME: &str = "Helvetica-Bold";
pub const FONT_SIZE: f32 = 12.0;

// resource key for our font, unlikely to clash with the template's own
const FONT_KEY: &str = "RcptStampBold";

/// Horizontal position and distance below the top edge of the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub below_top: f32,
}

pub const NUMBER_AT: Placement = Placement { x: 110.0, below_top: 92.0 };
pub const DATE_AT: Placement = Placement { x: 485.0, below_top: 92.0 };
pub const NAME_AT: Placement = Placement { x: 295.0, below_top: 127.0 };
pub const SECTION_AT: Placement = Placement { x: 525.0, below_top: 127.0 };

/// Produces a printable document for an issued or used receipt.
pub trait ReceiptRenderer {
    fn render(&self, receipt: &Receipt) -> Result<Vec<u8>>;
}

/// The four values written onto the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampedFields {
    pub number_suffix: String,
    pub issued_on: String,
    pub student_name: String,
    pub section: String,
}

impl StampedFields {
    pub fn from_receipt(receipt: &Receipt) -> Result<Self> {
        let issuance = receipt
            .issuance()
            .ok_or(ReceiptError::NotIssued(receipt.number()))?;

        Ok(Self {
            number_suffix: receipt_suffix(receipt.number()),
            issued_on: issuance.issued_at.format_day(),
            student_name: issuance.student_name.to_uppercase(),
            section: issuance.section.to_uppercase(),
        })
    }

    fn placed(&self) -> [(&str, Placement); 4] {
        [
            (&self.number_suffix, NUMBER_AT),
            (&self.issued_on, DATE_AT),
            (&self.student_name, NAME_AT),
            (&self.section, SECTION_AT),
        ]
    }
}

/// Overlays [`StampedFields`] on the first page of a PDF template.
pub struct PdfTemplateRenderer {
    template: Vec<u8>,
}

impl PdfTemplateRenderer {
    pub fn from_bytes(template: Vec<u8>) -> Self {
        Self { template }
    }

    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self::from_bytes(std::fs::read(path)?))
    }

    fn stamp(&self, fields: &StampedFields) -> Result<Vec<u8>> {
        let mut doc = Document::load_mem(&self.template)?;
        let page_id = doc
            .get_pages()
            .get(&1)
            .copied()
            .ok_or(ReceiptError::Template("template has no pages"))?;

        let height = page_height(&doc, page_id)?;
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => FONT_NAME,
            "Encoding" => "WinAnsiEncoding",
        });
        attach_font(&mut doc, page_id, font_id)?;

        let mut operations = vec![
            Operation::new("q", vec![]),
            Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
        ];
        for (text, at) in fields.placed() {
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![FONT_KEY.into(), FONT_SIZE.into()]),
                Operation::new("Td", vec![at.x.into(), (height - at.below_top).into()]),
                Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]),
                Operation::new("ET", vec![]),
            ]);
        }
        operations.push(Operation::new("Q", vec![]));

        let stamp = Content { operations }.encode()?;
        let stream_id = doc.add_object(Stream::new(Dictionary::new(), stamp));
        append_contents(&mut doc, page_id, stream_id)?;

        let mut out = Vec::new();
        doc.save_to(&mut out)?;
        Ok(out)
    }
}

impl ReceiptRenderer for PdfTemplateRenderer {
    fn render(&self, receipt: &Receipt) -> Result<Vec<u8>> {
        let fields = StampedFields::from_receipt(receipt)?;
        self.stamp(&fields)
    }
}

/// Encodes `text` for a standard font under WinAnsiEncoding. Characters the
/// encoding lacks are printed as `?`.
pub fn win_ansi(text: &str) -> Vec<u8> {
    let mut unprintable = 0;
    let bytes = text
        .chars()
        .map(|c| {
            win_ansi_byte(c).unwrap_or_else(|| {
                unprintable += 1;
                b'?'
            })
        })
        .collect();
    if unprintable > 0 {
        warn!(text, unprintable, "text has characters the receipt font cannot print");
    }
    bytes
}

fn win_ansi_byte(c: char) -> Option<u8> {
    let byte = match c {
        '\u{20}'..='\u{7e}' | '\u{a0}'..='\u{ff}' => c as u8,
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8a,
        '‹' => 0x8b,
        'Œ' => 0x8c,
        'Ž' => 0x8e,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9a,
        '›' => 0x9b,
        'œ' => 0x9c,
        'ž' => 0x9e,
        'Ÿ' => 0x9f,
        _ => return None,
    };
    Some(byte)
}

// page attributes like MediaBox and Resources may live on an ancestor Pages node
fn inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> lopdf::Result<Option<Object>> {
    let mut node = doc.get_dictionary(page_id)?;
    loop {
        if let Ok(value) = node.get(key) {
            return Ok(Some(value.clone()));
        }
        match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => node = doc.get_dictionary(parent)?,
            Err(_) => return Ok(None),
        }
    }
}

fn resolve_dictionary(doc: &Document, object: Option<&Object>) -> lopdf::Result<Dictionary> {
    match object {
        Some(Object::Reference(id)) => Ok(doc.get_dictionary(*id)?.clone()),
        Some(Object::Dictionary(dict)) => Ok(dict.clone()),
        _ => Ok(Dictionary::new()),
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn page_height(doc: &Document, page_id: ObjectId) -> Result<f32> {
    const MALFORMED: ReceiptError = ReceiptError::Template("page has no usable MediaBox");

    let media_box = match inherited(doc, page_id, b"MediaBox")? {
        Some(Object::Reference(id)) => doc.get_object(id)?.clone(),
        Some(object) => object,
        None => return Err(MALFORMED),
    };
    match media_box.as_array()?.as_slice() {
        [_, lower, _, upper] => match (number(lower), number(upper)) {
            (Some(lower), Some(upper)) => Ok(upper - lower),
            _ => Err(MALFORMED),
        },
        _ => Err(MALFORMED),
    }
}

// writes a page-local copy of the effective resources so shared ones stay untouched
fn attach_font(doc: &mut Document, page_id: ObjectId, font_id: ObjectId) -> lopdf::Result<()> {
    let current = inherited(doc, page_id, b"Resources")?;
    let mut resources = resolve_dictionary(doc, current.as_ref())?;
    let mut fonts = resolve_dictionary(doc, resources.get(b"Font").ok())?;

    fonts.set(FONT_KEY, font_id);
    resources.set("Font", fonts);
    doc.get_dictionary_mut(page_id)?.set("Resources", resources);

    Ok(())
}

fn append_contents(doc: &mut Document, page_id: ObjectId, stream_id: ObjectId) -> lopdf::Result<()> {
    let page = doc.get_dictionary_mut(page_id)?;
    let contents = match page.get(b"Contents") {
        Ok(Object::Array(existing)) => {
            let mut existing = existing.clone();
            existing.push(stream_id.into());
            existing
        }
        Ok(existing @ Object::Reference(_)) => vec![existing.clone(), stream_id.into()],
        _ => vec![stream_id.into()],
    };
    page.set("Contents", contents);

    Ok(())
}
