use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cardsmith::{
    CardController, CropRect, DirectoryDownloader, ExportPipeline, SelectedFile, StudioConfig,
};

#[derive(Parser)]
#[command(name = "cardsmith", version, about = "Fill-in card templates exported as PNG")]
struct Cli {
    /// Studio config JSON (defaults to the built-in carousel)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct CardArgs {
    /// Card id
    #[arg(long, default_value = "card-1")]
    card: String,

    /// Heading text; `[...]` marks accent spans
    #[arg(long)]
    heading: Option<String>,

    #[arg(long)]
    content: Option<String>,

    #[arg(long = "content-2")]
    content_2: Option<String>,

    /// Image file for the card (PNG, JPEG or GIF)
    #[arg(long)]
    image: Option<PathBuf>,

    /// Crop box in source pixels: x,y,width,height
    #[arg(long, value_parser = parse_crop)]
    crop: Option<CropRect>,

    /// Override the viewport width
    #[arg(long)]
    viewport: Option<f32>,

    /// Extra font files (TTF/OTF)
    #[arg(long)]
    font: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured cards
    Cards,
    /// Render a card to SVG
    Preview {
        #[command(flatten)]
        args: CardArgs,

        /// Output SVG file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Export a card to PNG
    Export {
        #[command(flatten)]
        args: CardArgs,

        /// Directory the PNG is written to
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Print version info
    Version,
}

fn parse_crop(value: &str) -> Result<CropRect, String> {
    let parts: Vec<f32> = value
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid crop `{value}`: {e}"))?;
    if parts.iter().any(|p| !p.is_finite()) {
        return Err(format!("crop values must be finite, got `{value}`"));
    }
    match parts.as_slice() {
        [x, y, width, height] => Ok(CropRect {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
        }),
        _ => Err(format!("expected x,y,width,height, got `{value}`")),
    }
}

fn mime_for(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
    .to_string()
}

fn read(path: &Path) -> Result<Vec<u8>, String> {
    fs::read(path).map_err(|e| format!("Error reading {}: {}", path.display(), e))
}

fn load_studio(config: Option<&Path>) -> Result<StudioConfig, String> {
    match config {
        Some(path) => StudioConfig::from_path(path),
        None => StudioConfig::builtin(),
    }
    .map_err(|e| e.to_string())
}

/// Build a controller and apply the field arguments to it.
fn prepare(studio: &mut StudioConfig, args: &CardArgs) -> Result<(CardController, Vec<Vec<u8>>), String> {
    if let Some(width) = args.viewport {
        studio.viewport_width = width;
    }
    let mut card = CardController::from_studio(studio, &args.card).map_err(|e| e.to_string())?;

    let mut fonts = Vec::new();
    for path in &args.font {
        let data = read(path)?;
        let families = card.register_font(data.clone());
        tracing::debug!(path = %path.display(), ?families, "registered font");
        fonts.push(data);
    }

    if let Some(heading) = &args.heading {
        card.set_heading(heading).map_err(|e| e.to_string())?;
    }
    if let Some(content) = &args.content {
        card.set_content(content);
    }
    if let Some(content) = &args.content_2 {
        card.set_content_2(content);
    }
    if let Some(path) = &args.image {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        card.select_file(SelectedFile {
            name,
            mime: mime_for(path),
            bytes: read(path)?,
        })
        .map_err(|e| e.to_string())?;
        card.save_crop(args.crop).map_err(|e| e.to_string())?;
    }
    Ok((card, fonts))
}

fn run(cli: Cli) -> Result<(), String> {
    let mut studio = load_studio(cli.config.as_deref())?;

    match cli.command {
        Commands::Cards => {
            for card in &studio.cards {
                println!(
                    "{}\t{}\tmax {} heading lines",
                    card.id, card.label, card.heading_fit.max_lines
                );
            }
        }
        Commands::Preview { args, output } => {
            let (mut card, _) = prepare(&mut studio, &args)?;
            let svg = card.preview_svg().map_err(|e| e.to_string())?;
            match output {
                Some(path) => {
                    fs::write(&path, &svg)
                        .map_err(|e| format!("Error writing {}: {}", path.display(), e))?;
                    eprintln!("Wrote {}", path.display());
                }
                None => println!("{}", svg),
            }
        }
        Commands::Export { args, out } => {
            let (mut card, fonts) = prepare(&mut studio, &args)?;
            if let Some(missing) = card.missing_fields() {
                return Err(missing.to_string());
            }
            let mut pipeline = ExportPipeline::native(studio.export.clone());
            for data in fonts {
                pipeline.rasterizer.register_font(data);
            }
            let mut downloader = DirectoryDownloader::new(&out);
            let outcome = card
                .export(&mut pipeline, &mut downloader)
                .map_err(|e| e.user_message())?;
            eprintln!(
                "Wrote {} ({}x{})",
                downloader.path_for(&outcome.filename).display(),
                outcome.width,
                outcome.height
            );
        }
        Commands::Version => {
            println!("cardsmith {}", env!("CARGO_PKG_VERSION"));
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(message) = run(Cli::parse()) {
        eprintln!("Error: {}", message);
        std::process::exit(1);
    }
}
