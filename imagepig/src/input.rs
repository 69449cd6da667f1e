use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;

use crate::{codec, Error, Result};

const URL_SCHEMES: [&str; 2] = ["http://", "https://"];

/// Turn an image argument into the single payload field describing it.
///
/// Text starting with `http://` or `https://` becomes `<name>_url`. Anything
/// else must decode as an image and is sent inline as `<name>_data`.
pub fn prepare_image(name: &str, image: impl AsRef<[u8]>) -> Result<(String, Value)> {
    let bytes = image.as_ref();
    if let Some(url) = as_url(bytes) {
        return Ok((format!("{}_url", name), Value::from(url)));
    }
    match codec::validate(bytes) {
        Ok(()) => Ok((format!("{}_data", name), Value::from(STANDARD.encode(bytes)))),
        Err(Error::CapabilityMissing(what)) => Err(Error::CapabilityMissing(what)),
        Err(e) => {
            log::debug!("Rejecting {} ({} bytes): {}", name, bytes.len(), e);
            Err(Error::InvalidArgument(format!(
                "{} is not a valid URL or image data",
                name
            )))
        }
    }
}

fn as_url(bytes: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(bytes).ok()?;
    URL_SCHEMES
        .iter()
        .any(|scheme| text.starts_with(scheme))
        .then(|| text)
}
