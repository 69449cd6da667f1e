use serde_json::{Map, Value};
use std::{fmt, str::FromStr, sync::Arc};

use crate::{
    config::Config,
    input::prepare_image,
    result::ApiResult,
    transport::{HttpRequest, HttpTransport, Transport},
    Error, Result,
};

/// Extra request parameters, sent along with the ones each operation sets.
pub type Options = Map<String, Value>;

const UPSCALE_FACTORS: [u32; 3] = [2, 4, 8];

/// Aspect ratio of a FLUX image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Proportion {
    #[default]
    Landscape,
    Portrait,
    Square,
    Wide,
}

impl Proportion {
    pub fn as_str(self) -> &'static str {
        match self {
            Proportion::Landscape => "landscape",
            Proportion::Portrait => "portrait",
            Proportion::Square => "square",
            Proportion::Wide => "wide",
        }
    }
}

impl AsRef<str> for Proportion {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Proportion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Proportion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "landscape" => Ok(Proportion::Landscape),
            "portrait" => Ok(Proportion::Portrait),
            "square" => Ok(Proportion::Square),
            "wide" => Ok(Proportion::Wide),
            _ => Err(Error::InvalidArgument(format!(
                "unknown proportion value: {}",
                s
            ))),
        }
    }
}

/// Pixels to add on each side of an outpainted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Padding {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

/// Client for the ImagePig API.
///
/// Every operation sends one request and returns the response as an
/// [`ApiResult`]; the image itself is fetched from there on demand.
#[derive(Clone)]
pub struct Client {
    config: Config,
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(Config::new(api_key))
    }

    /// Fails with [`Error::CapabilityMissing`] if no HTTP client can be built.
    pub fn with_config(config: Config) -> Result<Self> {
        let transport = HttpTransport::new()?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Generate an image with the default model.
    ///
    /// `negative_prompt` may be empty.
    pub fn generate_default(
        &self,
        prompt: &str,
        negative_prompt: &str,
        mut options: Options,
    ) -> Result<ApiResult> {
        options.insert("positive_prompt".into(), prompt.into());
        options.insert("negative_prompt".into(), negative_prompt.into());
        self.call_api("", options)
    }

    /// Generate an image with Stable Diffusion XL.
    pub fn generate_xl(
        &self,
        prompt: &str,
        negative_prompt: &str,
        mut options: Options,
    ) -> Result<ApiResult> {
        options.insert("positive_prompt".into(), prompt.into());
        options.insert("negative_prompt".into(), negative_prompt.into());
        self.call_api("xl", options)
    }

    /// Generate an image with FLUX.
    ///
    /// `proportion` is a [`Proportion`] or its name; anything else is
    /// rejected before a request is made.
    pub fn generate_flux(
        &self,
        prompt: &str,
        proportion: impl AsRef<str>,
        mut options: Options,
    ) -> Result<ApiResult> {
        let proportion: Proportion = proportion.as_ref().parse()?;
        options.insert("positive_prompt".into(), prompt.into());
        options.insert("proportion".into(), proportion.as_str().into());
        self.call_api("flux", options)
    }

    /// Put the face from `source_image` onto `target_image`.
    ///
    /// Images are URLs or encoded image bytes.
    pub fn faceswap(
        &self,
        source_image: impl AsRef<[u8]>,
        target_image: impl AsRef<[u8]>,
        mut options: Options,
    ) -> Result<ApiResult> {
        insert_image(&mut options, "source_image", source_image)?;
        insert_image(&mut options, "target_image", target_image)?;
        self.call_api("faceswap", options)
    }

    /// Enlarge `image` by `factor`, which must be 2, 4 or 8.
    pub fn upscale(
        &self,
        image: impl AsRef<[u8]>,
        factor: u32,
        mut options: Options,
    ) -> Result<ApiResult> {
        if !UPSCALE_FACTORS.contains(&factor) {
            return Err(Error::InvalidArgument(format!(
                "unknown upscaling factor: {}",
                factor
            )));
        }
        insert_image(&mut options, "image", image)?;
        options.insert("upscaling_factor".into(), factor.into());
        self.call_api("upscale", options)
    }

    /// Remove the background of `image`.
    pub fn cutout(&self, image: impl AsRef<[u8]>, mut options: Options) -> Result<ApiResult> {
        insert_image(&mut options, "image", image)?;
        self.call_api("cutout", options)
    }

    /// Replace what `select_prompt` describes with what `positive_prompt` does.
    pub fn replace(
        &self,
        image: impl AsRef<[u8]>,
        select_prompt: &str,
        positive_prompt: &str,
        negative_prompt: &str,
        mut options: Options,
    ) -> Result<ApiResult> {
        insert_image(&mut options, "image", image)?;
        options.insert("select_prompt".into(), select_prompt.into());
        options.insert("positive_prompt".into(), positive_prompt.into());
        options.insert("negative_prompt".into(), negative_prompt.into());
        self.call_api("replace", options)
    }

    /// Extend `image` beyond its borders.
    pub fn outpaint(
        &self,
        image: impl AsRef<[u8]>,
        positive_prompt: &str,
        padding: Padding,
        negative_prompt: &str,
        mut options: Options,
    ) -> Result<ApiResult> {
        insert_image(&mut options, "image", image)?;
        options.insert("positive_prompt".into(), positive_prompt.into());
        options.insert("top".into(), padding.top.into());
        options.insert("right".into(), padding.right.into());
        options.insert("bottom".into(), padding.bottom.into());
        options.insert("left".into(), padding.left.into());
        options.insert("negative_prompt".into(), negative_prompt.into());
        self.call_api("outpaint", options)
    }

    fn call_api(&self, endpoint: &str, payload: Options) -> Result<ApiResult> {
        let url = format!("{}/{}", self.config.api_url.trim_end_matches('/'), endpoint);
        log::info!("Calling {}", url);
        let request = HttpRequest::post(url, serde_json::to_vec(&payload)?)
            .header("Content-Type", "application/json")
            .header("Api-Key", self.config.api_key.as_str());
        let response = self.transport.send(request)?;
        log::debug!("HTTP {} ({} bytes)", response.status, response.body.len());
        if self.config.raise_on_http_error && response.status != 200 {
            return Err(Error::HttpStatus {
                status: response.status,
            });
        }
        let content: Value = serde_json::from_slice(&response.body)?;
        Ok(ApiResult::with_config(
            content,
            Arc::clone(&self.transport),
            &self.config,
        ))
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("api_url", &self.config.api_url)
            .field("raise_on_http_error", &self.config.raise_on_http_error)
            .finish_non_exhaustive()
    }
}

fn insert_image(options: &mut Options, name: &str, image: impl AsRef<[u8]>) -> Result<()> {
    let (key, value) = prepare_image(name, image)?;
    options.insert(key, value);
    Ok(())
}
