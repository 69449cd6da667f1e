//! Client for the [ImagePig](https://imagepig.com) image generation API.
//!
//! ```no_run
//! use imagepig::{Client, Options, Proportion};
//!
//! # fn main() -> imagepig::Result<()> {
//! let client = Client::new(std::env::var("IMAGEPIG_API_KEY").unwrap_or_default())?;
//!
//! let result = client.generate_flux("pig", Proportion::Wide, Options::new())?;
//! println!("seed: {:?}", result.seed());
//! result.save("pig.jpeg")?;
//!
//! client
//!     .upscale("https://imagepig.com/static/jane.jpeg", 2, Options::new())?
//!     .save("jane.jpeg")?;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod codec;
pub mod config;
mod error;
mod input;
mod result;
pub mod transport;

pub use crate::client::{Client, Options, Padding, Proportion};
pub use crate::config::Config;
pub use crate::error::{ApiError as Error, Result};
pub use crate::input::prepare_image;
pub use crate::result::ApiResult;
