use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use imagepig::{ApiResult, Client, Config, Options, Padding};
use serde_json::Value;
use simplelog::{LevelFilter, SimpleLogger};
use std::{
    fs,
    path::{Path, PathBuf},
};

const JANE: &str = "https://imagepig.com/static/jane.jpeg";
const MONA_LISA: &str = "https://imagepig.com/static/mona_lisa.jpeg";

#[derive(Parser, Debug)]
#[command(name = "imagepig", version, about = "Generate and edit images with ImagePig.")]
struct Opt {
    /// API key. Takes precedence over the one in the configuration file.
    #[arg(long, env = "IMAGEPIG_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Keep going when the API answers with an error status.
    #[arg(long)]
    no_raise: bool,
    /// Where to save the image.
    #[arg(short, long, global = true, default_value = "imagepig.jpeg")]
    output: PathBuf,
    /// Extra request parameter as KEY=VALUE; VALUE is parsed as JSON if possible.
    #[arg(short, long = "param", global = true, value_parser = parse_param)]
    params: Vec<(String, Value)>,
    /// Log requests and downloads.
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an image with the default model.
    Default {
        prompt: String,
        #[arg(long, default_value = "")]
        negative_prompt: String,
    },
    /// Generate an image with Stable Diffusion XL.
    Xl {
        prompt: String,
        #[arg(long, default_value = "")]
        negative_prompt: String,
    },
    /// Generate an image with FLUX.
    Flux {
        prompt: String,
        /// One of landscape, portrait, square, wide.
        #[arg(long, default_value = "landscape")]
        proportion: String,
    },
    /// Swap the face of TARGET with the one in SOURCE.
    Faceswap { source: String, target: String },
    /// Enlarge an image.
    Upscale {
        image: String,
        /// One of 2, 4, 8.
        #[arg(long, default_value_t = 2)]
        factor: u32,
    },
    /// Remove the background of an image.
    Cutout { image: String },
    /// Replace part of an image.
    Replace {
        image: String,
        /// What to replace.
        select_prompt: String,
        /// What to replace it with.
        positive_prompt: String,
        #[arg(long, default_value = "")]
        negative_prompt: String,
    },
    /// Extend an image beyond its borders.
    Outpaint {
        image: String,
        prompt: String,
        #[arg(long, default_value_t = 0)]
        top: u32,
        #[arg(long, default_value_t = 0)]
        right: u32,
        #[arg(long, default_value_t = 0)]
        bottom: u32,
        #[arg(long, default_value_t = 0)]
        left: u32,
        #[arg(long, default_value = "")]
        negative_prompt: String,
    },
    /// Run every operation on sample images and save the results in DIR.
    Showcase {
        #[arg(default_value = "output")]
        dir: PathBuf,
    },
}

pub fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    let level = if opt.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::init(level, Default::default())?;

    let client = Client::with_config(config(&opt)?)?;
    let options: Options = opt.params.iter().cloned().collect();

    let result = match opt.command {
        Command::Default {
            prompt,
            negative_prompt,
        } => client.generate_default(&prompt, &negative_prompt, options),
        Command::Xl {
            prompt,
            negative_prompt,
        } => client.generate_xl(&prompt, &negative_prompt, options),
        Command::Flux { prompt, proportion } => client.generate_flux(&prompt, proportion, options),
        Command::Faceswap { source, target } => {
            client.faceswap(image(&source)?, image(&target)?, options)
        }
        Command::Upscale { image: path, factor } => client.upscale(image(&path)?, factor, options),
        Command::Cutout { image: path } => client.cutout(image(&path)?, options),
        Command::Replace {
            image: path,
            select_prompt,
            positive_prompt,
            negative_prompt,
        } => client.replace(
            image(&path)?,
            &select_prompt,
            &positive_prompt,
            &negative_prompt,
            options,
        ),
        Command::Outpaint {
            image: path,
            prompt,
            top,
            right,
            bottom,
            left,
            negative_prompt,
        } => client.outpaint(
            image(&path)?,
            &prompt,
            Padding {
                top,
                right,
                bottom,
                left,
            },
            &negative_prompt,
            options,
        ),
        Command::Showcase { dir } => return showcase(&client, &dir),
    }?;
    save(&result, &opt.output)
}

fn config(opt: &Opt) -> anyhow::Result<Config> {
    let mut config = match (&opt.config, &opt.api_key) {
        (Some(path), _) => imagepig::config::load(path)
            .with_context(|| format!("Cannot load {}", path.display()))?,
        (None, Some(api_key)) => Config::new(api_key.as_str()),
        (None, None) => bail!("No API key: pass --api-key or set IMAGEPIG_API_KEY"),
    };
    if let Some(api_key) = &opt.api_key {
        config.api_key = api_key.clone();
    }
    if opt.no_raise {
        config.raise_on_http_error = false;
    }
    Ok(config)
}

fn parse_param(s: &str) -> anyhow::Result<(String, Value)> {
    let (key, value) = match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => (key, value),
        _ => bail!("expected KEY=VALUE, got {:?}", s),
    };
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
    Ok((key.to_owned(), value))
}

/// URLs are passed through, anything else is read from disk.
fn image(arg: &str) -> anyhow::Result<Vec<u8>> {
    if arg.starts_with("http://") || arg.starts_with("https://") {
        return Ok(arg.as_bytes().to_vec());
    }
    fs::read(arg).with_context(|| format!("Cannot read image {}", arg))
}

fn save(result: &ApiResult, path: &Path) -> anyhow::Result<()> {
    result
        .save(path)
        .with_context(|| format!("Cannot save {}", path.display()))?;
    log::info!("Saved {}", path.display());
    if let Some(seed) = result.seed() {
        log::info!("Seed: {}", seed);
    }
    if let Some(mime_type) = result.mime_type() {
        log::info!("MIME type: {}", mime_type);
    }
    if let Some(duration) = result.duration() {
        log::info!("Generated in {:.2}s", duration);
    }
    if let Some(url) = result.url() {
        log::info!("URL: {}", url);
    }
    Ok(())
}

fn showcase(client: &Client, dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    save(
        &client.generate_default("pig", "", Options::new())?,
        &dir.join("pig1.jpeg"),
    )?;
    save(
        &client.generate_xl("pig", "", Options::new())?,
        &dir.join("pig2.jpeg"),
    )?;
    save(
        &client.generate_flux("pig", "landscape", Options::new())?,
        &dir.join("pig3.jpeg"),
    )?;
    save(
        &client.faceswap(JANE, MONA_LISA, Options::new())?,
        &dir.join("faceswap.jpeg"),
    )?;
    save(
        &client.upscale(JANE, 2, Options::new())?,
        &dir.join("upscale.jpeg"),
    )?;
    save(&client.cutout(JANE, Options::new())?, &dir.join("cutout.png"))?;
    save(
        &client.replace(JANE, "woman", "robot", "", Options::new())?,
        &dir.join("replace.jpeg"),
    )?;
    let padding = Padding {
        top: 500,
        right: 500,
        bottom: 500,
        left: 500,
    };
    save(
        &client.outpaint(JANE, "dark forest", padding, "", Options::new())?,
        &dir.join("outpaint.jpeg"),
    )?;
    Ok(())
}
