use image::{imageops, ImageBuffer, Rgba};
use lopdf::Document;
use std::fmt;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

const DEFAULT_PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };
const PAGE_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const PAGE_BORDER: Rgba<u8> = Rgba([220, 220, 220, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    pub fn clockwise(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg90,
            Self::Deg90 => Self::Deg180,
            Self::Deg180 => Self::Deg270,
            Self::Deg270 => Self::Deg0,
        }
    }

    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    pub fn rotated(self, rotation: Rotation) -> Self {
        if rotation.is_quarter_turn() {
            Self { width_pt: self.height_pt, height_pt: self.width_pt }
        } else {
            self
        }
    }

    pub fn pixel_dimensions(self, scale: f32) -> (u32, u32) {
        let width = (self.width_pt * scale).round().max(1.0) as u32;
        let height = (self.height_pt * scale).round().max(1.0) as u32;
        (width, height)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("document parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("page index {page_index} out of range (page_count={page_count})")]
    PageOutOfRange { page_index: u32, page_count: u32 },
    #[error("encrypted documents are not supported by this decoder")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    Empty,
    #[error("invalid render scale {0}")]
    InvalidScale(f32),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Turns a decrypted byte buffer into a [`DecodedDocument`].
///
/// Implementations are black boxes to the viewer; any backend that can count
/// pages and rasterize one page at a time can be substituted.
pub trait DocumentDecoder: Send + Sync {
    fn decode(&self, bytes: Vec<u8>) -> Result<Box<dyn DecodedDocument>, DecoderError>;
}

/// A decoded, multi-page document. Page indices are zero-based.
pub trait DecodedDocument: Send + Sync {
    fn page_count(&self) -> u32;

    fn page_size(&self, page_index: u32) -> Result<PageSize, DecoderError>;

    fn render_page(
        &self,
        page_index: u32,
        scale: f32,
        rotation: Rotation,
    ) -> Result<RgbaImage, DecoderError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfDecoder;

impl LopdfDecoder {
    pub fn new() -> Self {
        Self
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, DecoderError> {
        let doc = Document::load_mem(bytes)?;
        ensure_unencrypted(&doc)?;

        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            let dict = doc.get_dictionary(object_id)?;
            let size = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| {
                    if array.len() != 4 {
                        return None;
                    }
                    let x0 = array[0].as_float().ok()?;
                    let y0 = array[1].as_float().ok()?;
                    let x1 = array[2].as_float().ok()?;
                    let y1 = array[3].as_float().ok()?;
                    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
                })
                .unwrap_or(DEFAULT_PAGE_SIZE);

            sizes.push(size);
        }

        if sizes.is_empty() {
            return Err(DecoderError::Empty);
        }

        Ok(sizes)
    }
}

/// Fails when the trailer still declares an encryption dictionary.
fn ensure_unencrypted(doc: &Document) -> Result<(), DecoderError> {
    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(DecoderError::EncryptedUnsupported);
    }
    Ok(())
}

impl DocumentDecoder for LopdfDecoder {
    fn decode(&self, bytes: Vec<u8>) -> Result<Box<dyn DecodedDocument>, DecoderError> {
        // Only the page geometry outlives this call; the decrypted bytes are dropped here.
        let page_sizes = Self::parse_sizes(&bytes)?;
        Ok(Box::new(LopdfDocument { page_sizes }))
    }
}

#[derive(Debug, Clone)]
struct LopdfDocument {
    page_sizes: Vec<PageSize>,
}

impl DecodedDocument for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    fn page_size(&self, page_index: u32) -> Result<PageSize, DecoderError> {
        self.page_sizes.get(page_index as usize).copied().ok_or(DecoderError::PageOutOfRange {
            page_index,
            page_count: self.page_count(),
        })
    }

    fn render_page(
        &self,
        page_index: u32,
        scale: f32,
        rotation: Rotation,
    ) -> Result<RgbaImage, DecoderError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(DecoderError::InvalidScale(scale));
        }

        let page_size = self.page_size(page_index)?;
        let (width, height) = page_size.pixel_dimensions(scale);
        let mut image = RgbaImage::from_pixel(width, height, PAGE_BACKGROUND);

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, PAGE_BORDER);
                image.put_pixel(x, height - 1, PAGE_BORDER);
            }
            for y in 0..height {
                image.put_pixel(0, y, PAGE_BORDER);
                image.put_pixel(width - 1, y, PAGE_BORDER);
            }
        }

        Ok(match rotation {
            Rotation::Deg0 => image,
            Rotation::Deg90 => imageops::rotate90(&image),
            Rotation::Deg180 => imageops::rotate180(&image),
            Rotation::Deg270 => imageops::rotate270(&image),
        })
    }
}

pub fn default_decoder() -> LopdfDecoder {
    LopdfDecoder::new()
}
