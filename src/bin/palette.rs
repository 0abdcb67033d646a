use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use image_to_palette_wasm::color::canonical_hex;
use image_to_palette_wasm::config::Config;
use image_to_palette_wasm::logging::init_logging;
use image_to_palette_wasm::storage::FileStorage;
use image_to_palette_wasm::{
    ColorFormat, Extractor, HistoryEntry, HistoryStore, HslChannel, ImageSource, Palette,
    convert_color, hex_to_hsl, palette_from_url, share_qr_png, share_url,
};

/// Extract dominant color palettes from images and manage their history.
#[derive(Parser, Debug)]
#[command(name = "palette-cli", author, version, about)]
struct Args {
    /// Config file (TOML). Defaults to <config dir>/image-to-palette/config.toml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the history file (overrides config)
    #[arg(long, global = true)]
    history_dir: Option<PathBuf>,

    /// Log level filter (overrides config; RUST_LOG wins over both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the dominant colors of one or more images
    Extract {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long, value_enum, default_value_t = Format::Hex)]
        format: Format,

        /// Name stored with the history entry
        #[arg(short, long)]
        name: Option<String>,

        /// Do not record the palette in history
        #[arg(long)]
        no_save: bool,

        /// Maximum number of colors (overrides config)
        #[arg(short = 'k', long)]
        max_colors: Option<usize>,
    },
    /// Show a color in another format
    Convert {
        color: String,

        #[arg(short, long, value_enum)]
        format: Format,
    },
    /// Change hue, saturation or lightness of a color
    Adjust {
        color: String,

        /// Hue in degrees [0, 360)
        #[arg(long)]
        hue: Option<f64>,

        /// Saturation in percent [0, 100]
        #[arg(long)]
        saturation: Option<f64>,

        /// Lightness in percent [0, 100]
        #[arg(long)]
        lightness: Option<f64>,
    },
    /// Inspect or edit the palette history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Build a share link (and optionally a QR code PNG) for a palette
    Share {
        /// Colors to share; ignored when --entry is given
        colors: Vec<String>,

        /// Share the history entry with this timestamp
        #[arg(short, long)]
        entry: Option<i64>,

        #[arg(long)]
        base_url: Option<String>,

        /// Write a QR code of the link to this PNG file
        #[arg(long)]
        qr: Option<PathBuf>,
    },
    /// Read the palette carried by a share link
    Open { url: String },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// List saved palettes, newest first
    List,
    /// Delete every saved palette
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Rename the entry with the given timestamp
    Rename { timestamp: i64, name: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Hex,
    Rgb,
    Hsl,
}

impl From<Format> for ColorFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Hex => ColorFormat::Hex,
            Format::Rgb => ColorFormat::Rgb,
            Format::Hsl => ColorFormat::Hsl,
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => {
            let default = dirs::config_dir().map(|d| d.join("image-to-palette/config.toml"));
            match default {
                Some(path) if path.exists() => Config::from_file(&path)?,
                _ => Config::default(),
            }
        }
    };
    if let Some(dir) = &args.history_dir {
        config.history.dir = Some(dir.clone());
    }
    if let Some(level) = &args.log_level {
        config.log.level = level.clone();
    }
    Ok(config)
}

fn open_history(config: &Config) -> Result<HistoryStore<FileStorage>> {
    let dir = match &config.history.dir {
        Some(dir) => dir.clone(),
        None => dirs::data_dir()
            .context("no data directory on this platform; pass --history-dir")?
            .join("image-to-palette"),
    };
    let history = HistoryStore::new(FileStorage::new(dir)).configure(&config.history);
    tracing::debug!(dir = %history.storage().dir().display(), "opened history");
    Ok(history)
}

fn render(palette: &Palette, format: ColorFormat) -> Result<Vec<String>> {
    palette
        .iter()
        .map(|c| convert_color(c, format).map_err(Into::into))
        .collect()
}

fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt} [y/N] ");
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_entry(entry: &HistoryEntry) {
    let name = entry.name.as_deref().unwrap_or("Unnamed palette");
    println!(
        "{}  {}  {name}\n    {}",
        entry.timestamp,
        format_timestamp(entry.timestamp),
        entry.colors
    );
}

async fn extract(
    config: &Config,
    json: bool,
    inputs: &[PathBuf],
    format: ColorFormat,
    name: Option<String>,
    no_save: bool,
    max_colors: Option<usize>,
) -> Result<()> {
    let extractor =
        Extractor::new(ImageSource).with_max_colors(max_colors.unwrap_or(config.extract.max_colors));
    let mut history = if no_save { None } else { Some(open_history(config)?) };
    let mut results = Vec::new();

    for input in inputs {
        let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
        let palette = extractor
            .extract(&bytes)
            .await
            .with_context(|| format!("extracting colors from {}", input.display()))?;
        let rendered = render(&palette, format)?;

        let timestamp = match history.as_mut() {
            Some(history) => Some(history.save(palette, name.clone())?.timestamp),
            None => None,
        };

        if json {
            results.push(serde_json::json!({
                "input": input.display().to_string(),
                "colors": rendered,
                "timestamp": timestamp,
            }));
        } else {
            println!("{}:", input.display());
            for color in &rendered {
                println!("  {color}");
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}

fn adjust_color(
    color: &str,
    hue: Option<f64>,
    saturation: Option<f64>,
    lightness: Option<f64>,
) -> Result<String> {
    let changes = [
        (HslChannel::Hue, hue),
        (HslChannel::Saturation, saturation),
        (HslChannel::Lightness, lightness),
    ];
    if changes.iter().all(|(_, value)| value.is_none()) {
        return Ok(canonical_hex(color)?);
    }
    let mut hsl = hex_to_hsl(color)?;
    for (channel, value) in changes {
        if let Some(value) = value {
            hsl = hsl.with(channel, value)?;
        }
    }
    Ok(hsl.to_hex()?)
}

fn share(
    config: &Config,
    json: bool,
    colors: &[String],
    entry: Option<i64>,
    base_url: Option<&str>,
    qr: Option<&Path>,
) -> Result<()> {
    let palette = match entry {
        Some(timestamp) => {
            open_history(config)?
                .get(timestamp)
                .with_context(|| format!("no history entry with timestamp {timestamp}"))?
                .colors
        }
        None if colors.is_empty() => bail!("give colors to share or --entry <timestamp>"),
        None => Palette::from_hex(colors)?,
    };
    let url = share_url(base_url.unwrap_or(&config.share.base_url), &palette)?;

    if let Some(path) = qr {
        let png = share_qr_png(&url, config.share.qr_size)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, png).with_context(|| format!("writing {}", path.display()))?;
        if !json {
            eprintln!("Saved QR code → {}", path.display());
        }
    }

    if json {
        let info = serde_json::json!({ "url": url, "colors": palette });
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{url}");
    }
    Ok(())
}

fn history(config: &Config, json: bool, action: HistoryAction) -> Result<()> {
    let mut history = open_history(config)?;
    match action {
        HistoryAction::List => {
            let log = history.load();
            if json {
                println!("{}", serde_json::to_string_pretty(&log)?);
            } else if log.is_empty() {
                println!("No palettes in history");
            } else {
                log.iter().for_each(print_entry);
            }
        }
        HistoryAction::Clear { yes } => {
            if yes || confirm("Clear the whole palette history?")? {
                history.clear()?;
                eprintln!("History cleared");
            } else {
                eprintln!("Aborted");
            }
        }
        HistoryAction::Rename { timestamp, name } => {
            if !history.rename(timestamp, &name)? {
                bail!("no history entry with timestamp {timestamp}");
            }
            eprintln!("Renamed {timestamp} → {name}");
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&config.log).context("initializing logging")?;
    tracing::debug!(?config, "loaded configuration");

    let json = args.json;
    match args.command {
        Command::Extract {
            inputs,
            format,
            name,
            no_save,
            max_colors,
        } => extract(&config, json, &inputs, format.into(), name, no_save, max_colors).await?,
        Command::Convert { color, format } => {
            println!("{}", convert_color(&color, format.into())?);
        }
        Command::Adjust {
            color,
            hue,
            saturation,
            lightness,
        } => {
            println!("{}", adjust_color(&color, hue, saturation, lightness)?);
        }
        Command::History { action } => history(&config, json, action)?,
        Command::Share {
            colors,
            entry,
            base_url,
            qr,
        } => share(&config, json, &colors, entry, base_url.as_deref(), qr.as_deref())?,
        Command::Open { url } => match palette_from_url(&url)? {
            Some(palette) if json => println!("{}", serde_json::to_string_pretty(&palette)?),
            Some(palette) => palette.iter().for_each(|c| println!("{c}")),
            None => bail!("link carries no palette"),
        },
    }

    Ok(())
}
