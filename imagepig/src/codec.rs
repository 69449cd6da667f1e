//! Image decoding, available when the `image` feature is enabled.

use crate::Result;

#[cfg(feature = "image")]
pub use image::DynamicImage;

/// Whether this build can decode images.
pub const AVAILABLE: bool = cfg!(feature = "image");

/// Decode encoded image bytes, guessing the format from their content.
#[cfg(feature = "image")]
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| crate::Error::Image(Box::new(e)))
}

/// Check that `bytes` decode as an image.
#[cfg(feature = "image")]
pub fn validate(bytes: &[u8]) -> Result<()> {
    decode(bytes).map(|_| ())
}

/// Placeholder for `image::DynamicImage` in builds without the `image` feature.
#[cfg(not(feature = "image"))]
#[derive(Debug)]
pub enum DynamicImage {}

#[cfg(not(feature = "image"))]
pub fn decode(_bytes: &[u8]) -> Result<DynamicImage> {
    Err(crate::Error::CapabilityMissing("image codec"))
}

#[cfg(not(feature = "image"))]
pub fn validate(_bytes: &[u8]) -> Result<()> {
    Err(crate::Error::CapabilityMissing("image codec"))
}

#[cfg(all(test, feature = "image"))]
pub(crate) mod tests {
    use std::io::Cursor;
    use tokio_test::{assert_err, assert_ok};

    pub(crate) fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::new_rgb8(width, height)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn decode() {
        let decoded = assert_ok!(super::decode(&png(3, 2)));
        assert_eq!(image::GenericImageView::dimensions(&decoded), (3, 2));
        assert_err!(super::decode(b"PIGDATA"));
    }
}
