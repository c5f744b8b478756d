//! Image fixtures generated in-memory.

use std::io::Cursor;

use bytes::Bytes;
use tiff::encoder::{colortype, TiffEncoder};

/// A gray multi-page TIFF, each page a different shade so pages are
/// distinguishable after conversion.
pub fn tiff_bytes(pages: usize) -> Bytes {
    let mut out = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut out).unwrap();
        for page in 0..pages {
            let shade = 40u8.saturating_mul(page as u8 + 1);
            let data = vec![shade; 8 * 6];
            encoder
                .write_image::<colortype::Gray8>(8, 6, &data)
                .unwrap();
        }
    }
    Bytes::from(out.into_inner())
}

/// A tiny single-page PNG.
pub fn png_bytes() -> Bytes {
    let img = image::DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
        8,
        6,
        image::Luma([200u8]),
    ));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    Bytes::from(out.into_inner())
}
