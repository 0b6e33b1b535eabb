use crate::progress::Progress;
use anyhow::{Context, Result, bail};
use bioscope_dl::{
    CONTENT_BASE, CancellationToken, Downloader, Options, REFERER, Resume, USER_AGENT, manifest,
    reqwest::{Proxy, Url},
};
use clap::{ColorChoice, Parser};
use kdam::term::Colorizer;
use log::{info, warn};
use m3u8_rs::VariantStream;
use std::{
    collections::HashSet,
    io::{IsTerminal, stdin},
    path::PathBuf,
    time::Duration,
};
use tokio::fs::{self, OpenOptions};

/// Download and decrypt bioscope video on demand streams.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Args {
    /// Item id of the video, e.g. the `abc123` of `abc123.m3u8`.
    #[arg(required = true)]
    pub item_id: String,

    /// Output file. Existing files are resumed by appending to them.
    /// Defaults to `<ITEM_ID>_<HEIGHT>p.mp4`.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// List available variants and exit.
    #[arg(long)]
    pub list: bool,

    /// Parse the media playlist of the selected variant and print it in json format.
    /// Note that `--output` flag is ignored when this flag is used.
    #[arg(long)]
    pub parse: bool,

    /// Variant to download, as numbered by `--list`.
    /// Without it a prompt asks for one, or the variant with highest resolution
    /// and bandwidth is used when prompts are skipped or stdin is not a terminal.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub variant: Option<u64>,

    /// When to output colored text.
    #[arg(long, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Increase logging verbosity, can be used multiple times.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Skip user input prompts and proceed with defaults.
    #[arg(long)]
    pub skip_prompts: bool,

    /// Base url under which items are stored.
    #[arg(long, help_heading = "Client Options", default_value = CONTENT_BASE)]
    pub content_base: Url,

    /// Set http(s) / socks proxy address for requests.
    #[arg(long, help_heading = "Client Options", value_parser = proxy_address_parser)]
    pub proxy: Option<Proxy>,

    /// Referer header sent with every request.
    #[arg(long, help_heading = "Client Options", default_value = REFERER)]
    pub referer: String,

    /// Timeout in seconds for a single request.
    #[arg(long, help_heading = "Client Options")]
    pub timeout: Option<u64>,

    /// Update and set user agent header for requests.
    #[arg(long, help_heading = "Client Options", default_value = USER_AGENT)]
    pub user_agent: String,

    /// File holding a raw 16, 24 or 32 byte AES key.
    /// It is used for every key referenced by the playlist instead of fetching them.
    #[arg(long, help_heading = "Decrypt Options")]
    pub key_file: Option<PathBuf>,
}

impl Args {
    fn options(&self) -> Options {
        let mut options = Options::default()
            .content_base(self.content_base.clone())
            .referer(&self.referer)
            .user_agent(&self.user_agent);

        if let Some(timeout) = self.timeout {
            options = options.timeout(Duration::from_secs(timeout));
        }

        if let Some(proxy) = &self.proxy {
            options = options.proxy(proxy.clone());
        }

        options
    }

    pub async fn execute(self) -> Result<()> {
        let options = self.options();
        let client = options.client()?;

        let master = manifest::fetch_master_playlist(&client, &options, &self.item_id)
            .await
            .with_context(|| format!("could not fetch master playlist of {}", self.item_id))?;
        let variants = master
            .variants
            .iter()
            .filter(|x| !x.is_i_frame)
            .collect::<Vec<_>>();

        if variants.is_empty() {
            bail!("no variants found in master playlist of {}", self.item_id);
        }

        if self.list || log::log_enabled!(log::Level::Debug) {
            for (i, variant) in variants.iter().enumerate() {
                info!("{:>2}) {}", i + 1, display_variant(variant));
            }

            if self.list {
                return Ok(());
            }
        }

        let default = best_variant(&variants);
        let index = match self.variant {
            Some(n) if n as usize > variants.len() => {
                bail!("variant {} not found, {} available", n, variants.len())
            }
            Some(n) => n as usize - 1,
            None if !self.skip_prompts && !self.quiet && stdin().is_terminal() => {
                prompt_variant(&variants, default)?
            }
            None => default,
        };
        let variant = variants[index];
        info!(
            "{} {}",
            "Selected".colorize("bold green"),
            display_variant(variant)
        );

        let playlist = manifest::fetch_media_playlist(&client, &options, &variant.uri)
            .await
            .with_context(|| format!("could not fetch media playlist {}", variant.uri))?;

        if self.parse {
            serde_json::to_writer(std::io::stdout(), &playlist)?;
            return Ok(());
        }

        let downloader = Downloader::new(&options)?;

        if let Some(path) = &self.key_file {
            let key = fs::read(path)
                .await
                .with_context(|| format!("could not read key file {}", path.display()))?;

            check_key_length(&key)
                .with_context(|| format!("invalid key file {}", path.display()))?;

            let uris = playlist
                .segments
                .iter()
                .flatten()
                .filter_map(|x| x.key.as_ref())
                .map(|x| x.uri.as_str())
                .collect::<HashSet<_>>();

            for uri in uris {
                downloader.key_store().insert(uri, key.clone());
            }
        }

        let output = self.output.clone().unwrap_or_else(|| {
            let height = variant.resolution.as_ref().map(|x| x.height).unwrap_or(0);
            PathBuf::from(format!("{}_{}p.mp4", self.item_id, height))
        });

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&output)
            .await
            .with_context(|| format!("could not open {}", output.display()))?;
        let written = file.metadata().await?.len();
        let total = playlist.content_length();

        let start = match playlist
            .start_index_for_byte_count(written)
            .with_context(|| format!("{} is larger than the stream ({} bytes)", output.display(), total))?
        {
            Resume::Complete => {
                info!("{} is already complete", output.display());
                return Ok(());
            }
            Resume::From(start) => start,
        };

        let position = playlist.content_length_before(start);

        if position < written {
            warn!(
                "Discarding {} bytes of a partially written segment",
                written - position
            );
            file.set_len(position).await?;
        }

        if position > 0 {
            info!(
                "Resuming {} ({} of {} bytes written)",
                output.display(),
                position,
                total
            );
        } else {
            info!("Downloading to {}", output.display());
        }

        let token = CancellationToken::new();
        let ctrl_c = tokio::spawn({
            let token = token.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Stopping, run the same command again to resume");
                    token.cancel();
                }
            }
        });

        let mut sink = Progress::new(file, total, position)?;
        let result = downloader
            .with_cancellation(token)
            .download_from(&mut sink, &playlist, start)
            .await;
        ctrl_c.abort();
        sink.finish()?;

        result.with_context(|| format!("could not download {}", output.display()))?;
        info!("Saved {}", output.display());
        Ok(())
    }
}

/// Index of the variant with the largest resolution, then bandwidth.
fn best_variant(variants: &[&VariantStream]) -> usize {
    variants
        .iter()
        .enumerate()
        .max_by_key(|(_, x)| {
            (
                x.resolution.as_ref().map(|x| x.width.saturating_mul(x.height)).unwrap_or(0),
                x.bandwidth,
            )
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn prompt_variant(variants: &[&VariantStream], default: usize) -> Result<usize> {
    let question = requestty::Question::select("variant")
        .message("Select a variant")
        .should_loop(false)
        .choices(variants.iter().map(|x| display_variant(x)))
        .default(default)
        .build();
    let answer = tokio::task::block_in_place(|| requestty::prompt_one(question))?;
    Ok(answer.as_list_item().context("no variant selected")?.index)
}

fn check_key_length(key: &[u8]) -> Result<()> {
    match key.len() {
        16 | 24 | 32 => Ok(()),
        x => bail!("holds {} bytes, expected 16, 24 or 32", x),
    }
}

fn display_variant(variant: &VariantStream) -> String {
    let mut parts = Vec::new();

    if let Some(resolution) = &variant.resolution {
        parts.push(format!("{}x{}", resolution.width, resolution.height));
    }

    if let Some(frame_rate) = variant.frame_rate {
        parts.push(format!("{} fps", frame_rate));
    }

    parts.push(format!("{} kbps", variant.bandwidth / 1000));

    if let Some(codecs) = &variant.codecs {
        parts.push(codecs.to_owned());
    }

    format!("{} ({})", parts.join(", "), variant.uri)
}

fn proxy_address_parser(s: &str) -> Result<Proxy, String> {
    Proxy::all(s).map_err(|x| x.to_string())
}
