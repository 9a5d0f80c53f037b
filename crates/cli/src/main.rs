use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use restyle_core::{init, Annotations, Config, EncodedImage, FileStorage, Provider, Restyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Restyle photos with AI image models", long_about = None)]
struct Args {
    /// Passphrase protecting stored keys, history and usage.
    /// Without it nothing is kept beyond this run.
    #[arg(long, env = "RESTYLE_PASSPHRASE", hide_env_values = true, global = true)]
    passphrase: Option<String>,

    /// Select the provider (google or openrouter); the choice is remembered
    #[arg(long, global = true)]
    provider: Option<Provider>,

    /// Override the model of the selected provider
    #[arg(short, long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Restyle a photo with a theme
    Generate {
        image: PathBuf,
        /// Style descriptor, e.g. "watercolor" or "80s synthwave poster"
        #[arg(short, long)]
        theme: String,
        /// Annotation document (strokes and crop in preview coordinates)
        #[arg(short, long)]
        annotations: Option<PathBuf>,
        /// Where to write the result (extension added from the image type if missing)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Apply an annotation document to a photo without generating
    Edit {
        image: PathBuf,
        #[arg(short, long)]
        annotations: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Print the preview size annotation coordinates refer to
    PreviewSize { image: PathBuf },
    /// Manage API keys
    #[command(subcommand)]
    Keys(KeysCommand),
    /// Delete all stored keys, history and usage
    Forget,
    /// Select the default provider
    UseProvider {
        #[arg(value_name = "PROVIDER")]
        service: Provider,
    },
    /// Inspect or edit generation history
    #[command(subcommand)]
    History(HistoryCommand),
    /// Show or reset the usage estimate
    #[command(subcommand)]
    Usage(UsageCommand),
}

#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// Store the API key for a provider
    Set {
        #[arg(value_name = "PROVIDER")]
        service: Provider,
        key: String,
    },
    /// Check a stored key against the provider
    Validate {
        #[arg(value_name = "PROVIDER")]
        service: Provider,
    },
    /// Forget all stored keys
    Clear,
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    List,
    /// Write an entry's image to disk
    Save { index: usize, path: PathBuf },
    Delete { index: usize },
    Clear,
}

#[derive(Subcommand, Debug)]
enum UsageCommand {
    Show,
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup
    init();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let config = Config::load().context("Failed to load configuration")?;
    let mut app = Restyle::open(config).context("Failed to open storage")?;

    if args.passphrase.is_none() {
        tracing::warn!("no passphrase given; keys and history last only for this run");
    }
    app.unlock(args.passphrase.as_deref());
    if app.is_locked() {
        tracing::warn!("stored data could not be opened with this passphrase; changes will not be saved");
    }

    if let Some(provider) = args.provider {
        app.set_provider(provider).context("Failed to save provider selection")?;
    }
    if let Some(model) = args.model {
        match app.provider() {
            Provider::Google => app.config_mut().google_model = model,
            Provider::OpenRouter => app.config_mut().openrouter_model = model,
        }
    }

    match args.command {
        Command::Generate {
            image,
            theme,
            annotations,
            out,
        } => generate(&mut app, &image, &theme, annotations.as_deref(), out).await,
        Command::Edit {
            image,
            annotations,
            out,
        } => {
            let photo = EncodedImage::read_file(&image).context("Failed to read image")?;
            let (edited, _) = apply_annotations(&app, &photo, &annotations)?;
            edited.save(&out).context("Failed to write edited image")?;
            println!("Saved edited image to {}", out.display());
            Ok(())
        }
        Command::PreviewSize { image } => {
            let photo = EncodedImage::read_file(&image).context("Failed to read image")?;
            let editor = app.editor_for(&photo.decode()?)?;
            let (w, h) = editor.display_size();
            let (sw, sh) = editor.source_size();
            println!("Preview: {w}x{h} (source {sw}x{sh})");
            Ok(())
        }
        Command::Keys(cmd) => keys(&mut app, cmd).await,
        Command::Forget => {
            app.forget().context("Failed to delete stored data")?;
            println!("Stored keys, history and usage deleted");
            Ok(())
        }
        Command::UseProvider { service } => {
            app.set_provider(service)?;
            println!("Using {service}");
            Ok(())
        }
        Command::History(cmd) => history(&mut app, cmd),
        Command::Usage(UsageCommand::Show) => {
            let usage = app.usage();
            println!("Tokens in:  {}", usage.tokens_in);
            println!("Tokens out: {}", usage.tokens_out);
            println!("Est. cost:  ${:.6}", usage.cost);
            Ok(())
        }
        Command::Usage(UsageCommand::Reset) => {
            app.reset_usage()?;
            println!("Usage reset");
            Ok(())
        }
    }
}

async fn generate(
    app: &mut Restyle<FileStorage>,
    image: &Path,
    theme: &str,
    annotations: Option<&Path>,
    out: Option<PathBuf>,
) -> Result<()> {
    let photo = EncodedImage::read_file(image).context("Failed to read image")?;
    let (photo, notes) = match annotations {
        Some(path) => apply_annotations(app, &photo, path)?,
        None => (photo, Vec::new()),
    };
    let notes: Vec<&str> = notes.iter().map(String::as_str).collect();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.green} {msg}")?,
    );
    spinner.set_message(format!("Restyling with {}...", app.provider()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = app.submit(&photo, theme, &notes).await;
    spinner.finish_and_clear();

    let Some(item) = result else {
        bail!("{}", app.last_error().unwrap_or("Generation failed"));
    };

    let stem = image
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let saved = match out {
        Some(out) => item.save_to(&out),
        None => item.save_with_extension(format!("{stem}-restyled")),
    }
    .context("Failed to write result")?;
    println!("Saved {} ({} entries in history)", saved.display(), app.history().len());
    Ok(())
}

/// Loads an annotation document and renders it onto `photo` at full resolution.
fn apply_annotations(
    app: &Restyle<FileStorage>,
    photo: &EncodedImage,
    path: &Path,
) -> Result<(EncodedImage, Vec<String>)> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read annotations from {}", path.display()))?;
    let annotations: Annotations = serde_json::from_str(&raw).context("Invalid annotation document")?;

    let pixels = photo.decode().context("Failed to decode image")?;
    let mut editor = app.editor_for(&pixels)?;
    editor.apply(&annotations).context("Invalid annotation document")?;
    let notes = editor.notes().into_iter().map(str::to_string).collect();
    let edited = editor.export_encoded(&pixels).context("Failed to export edited image")?;
    Ok((edited, notes))
}

async fn keys(app: &mut Restyle<FileStorage>, cmd: KeysCommand) -> Result<()> {
    match cmd {
        KeysCommand::Set { service, key } => {
            app.set_key(service, &key).context("Failed to save key")?;
            println!("Stored key for {service}");
        }
        KeysCommand::Validate { service } => {
            if app.validate_key(service).await? {
                println!("{service} key is valid");
            } else {
                bail!("{service} rejected the stored key");
            }
        }
        KeysCommand::Clear => {
            app.clear_keys()?;
            println!("Keys cleared");
        }
    }
    Ok(())
}

fn history(app: &mut Restyle<FileStorage>, cmd: HistoryCommand) -> Result<()> {
    match cmd {
        HistoryCommand::List => {
            if app.history().is_empty() {
                println!("History is empty");
            }
            for (i, item) in app.history().iter().enumerate() {
                println!("{i:>3}  {:<12} {}", item.mime_type, item.theme);
            }
        }
        HistoryCommand::Save { index, path } => {
            let item = app
                .history()
                .get(index)
                .with_context(|| format!("No history entry at index {index}"))?;
            let saved = item.save_to(&path)?;
            println!("Saved {}", saved.display());
        }
        HistoryCommand::Delete { index } => {
            let removed = app.remove_history(index)?;
            println!("Deleted \"{}\"", removed.theme);
        }
        HistoryCommand::Clear => {
            app.clear_history()?;
            println!("History cleared");
        }
    }
    Ok(())
}
