//! Container-image decoding for the format normalizer.
//!
//! Landing objects are multi-page container images (TIFF) or single-page
//! raster images; every page is re-rendered as PNG so downstream stages
//! handle exactly one format. Decode failures on a validly-typed object are
//! permanent: retrying cannot fix a malformed document.

use std::io::Cursor;

use bytes::Bytes;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;

use crate::domain::{PipelineError, Result};

/// Content types the normalizer accepts.
pub const ACCEPTED_CONTENT_TYPES: &[&str] = &["image/tiff", "image/tif", "image/png", "image/jpeg"];

pub fn is_accepted_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or(content_type).trim();
    ACCEPTED_CONTENT_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(essence))
}

/// Decodes a container image into PNG-encoded pages.
pub trait PageDecoder: Send + Sync {
    fn decode_pages(&self, data: &[u8], content_type: &str) -> Result<Vec<Bytes>>;
}

/// Production decoder: multi-page TIFF via the tiff crate, single-page
/// PNG/JPEG via the image crate.
#[derive(Clone, Default)]
pub struct ImagePageDecoder;

impl ImagePageDecoder {
    pub fn new() -> Self {
        Self
    }

    fn decode_tiff(&self, data: &[u8]) -> Result<Vec<Bytes>> {
        let mut decoder = Decoder::new(Cursor::new(data))
            .map_err(|e| PipelineError::decode(format!("tiff header: {}", e)))?;

        let mut pages = Vec::new();
        loop {
            let color = decoder
                .colortype()
                .map_err(|e| PipelineError::decode(format!("tiff colortype: {}", e)))?;
            let (width, height) = decoder
                .dimensions()
                .map_err(|e| PipelineError::decode(format!("tiff dimensions: {}", e)))?;
            let decoded = decoder
                .read_image()
                .map_err(|e| PipelineError::decode(format!("tiff page {}: {}", pages.len(), e)))?;

            let page = frame_to_image(decoded, color, width, height)?;
            pages.push(encode_png(&page)?);

            if !decoder.more_images() {
                break;
            }
            decoder
                .next_image()
                .map_err(|e| PipelineError::decode(format!("tiff page advance: {}", e)))?;
        }

        Ok(pages)
    }

    fn decode_single(&self, data: &[u8]) -> Result<Vec<Bytes>> {
        let img = image::load_from_memory(data)
            .map_err(|e| PipelineError::decode(format!("image decode: {}", e)))?;
        Ok(vec![encode_png(&img)?])
    }
}

impl PageDecoder for ImagePageDecoder {
    fn decode_pages(&self, data: &[u8], content_type: &str) -> Result<Vec<Bytes>> {
        if !is_accepted_content_type(content_type) {
            return Err(PipelineError::UnsupportedContentType(
                content_type.to_string(),
            ));
        }

        let essence = content_type.split(';').next().unwrap_or(content_type).trim();
        let pages = if essence.eq_ignore_ascii_case("image/tiff")
            || essence.eq_ignore_ascii_case("image/tif")
        {
            self.decode_tiff(data)?
        } else {
            self.decode_single(data)?
        };

        if pages.is_empty() {
            return Err(PipelineError::decode("document contains zero pages"));
        }

        Ok(pages)
    }
}

fn frame_to_image(
    decoded: DecodingResult,
    color: ColorType,
    width: u32,
    height: u32,
) -> Result<DynamicImage> {
    let buf = match decoded {
        DecodingResult::U8(buf) => buf,
        other => {
            return Err(PipelineError::decode(format!(
                "unsupported tiff sample format: {:?}",
                sample_name(&other)
            )))
        }
    };

    let img = match color {
        ColorType::Gray(8) => GrayImage::from_raw(width, height, buf).map(DynamicImage::ImageLuma8),
        ColorType::RGB(8) => RgbImage::from_raw(width, height, buf).map(DynamicImage::ImageRgb8),
        ColorType::RGBA(8) => RgbaImage::from_raw(width, height, buf).map(DynamicImage::ImageRgba8),
        other => {
            return Err(PipelineError::decode(format!(
                "unsupported tiff color type: {:?}",
                other
            )))
        }
    };

    img.ok_or_else(|| PipelineError::decode("tiff frame buffer does not match dimensions"))
}

fn sample_name(result: &DecodingResult) -> &'static str {
    match result {
        DecodingResult::U8(_) => "u8",
        DecodingResult::U16(_) => "u16",
        DecodingResult::U32(_) => "u32",
        DecodingResult::U64(_) => "u64",
        DecodingResult::I8(_) => "i8",
        DecodingResult::I16(_) => "i16",
        DecodingResult::I32(_) => "i32",
        DecodingResult::I64(_) => "i64",
        DecodingResult::F32(_) => "f32",
        DecodingResult::F64(_) => "f64",
    }
}

fn encode_png(img: &DynamicImage) -> Result<Bytes> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| PipelineError::decode(format!("png encode: {}", e)))?;
    Ok(Bytes::from(out.into_inner()))
}
