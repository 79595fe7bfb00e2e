use clap::{Parser, Subcommand};
use file_variants::config::{self, HandlerConfig};
use file_variants::file::FileHandle;
use file_variants::handler::FileHandler;
use file_variants::output;
use std::path::{Path, PathBuf};

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Where the original lives in storage. Variant paths derive from it.
#[derive(clap::Args, Clone)]
struct TargetArgs {
    /// Storage path of the original, e.g. `uploads/original/photo.jpg`
    #[arg(long)]
    path: String,
}

#[derive(Parser)]
#[command(name = "file-variants")]
#[command(about = "Store uploads and their processed variants")]
#[command(long_about = "\
Store uploads and their processed variants

An upload is stored as the original, then every configured variant is
produced from a temporary copy by running its strategy chain in order,
and stored next to it:

  uploads/original/photo.jpg       # the upload, untouched
  uploads/thumb/photo.jpg          # [variants.thumb] auto-orient, resize
  uploads/poster/photo.jpg         # [variants.poster] ...

Variants are described in file-variants.toml:

  [variants.thumb]
  auto-orient = {}
  resize = { dimensions = \"150x150#\" }

A strategy that does not apply to a file (resizing a PDF) is skipped unless
force_apply is set. Unknown strategies or bad options are reported when the
config is loaded.

Run 'file-variants gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Log every strategy step
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a file and all configured variants
    Process {
        /// File to upload
        file: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
        /// Original file name (defaults to the file's name)
        #[arg(long)]
        name: Option<String>,
        /// Mime type (defaults to content sniffing)
        #[arg(long)]
        mime_type: Option<String>,
        /// Leave temporary working copies on disk
        #[arg(long)]
        keep_temp: bool,
    },
    /// Print public URLs of the original and the given variants
    Urls {
        #[command(flatten)]
        target: TargetArgs,
        /// Variant names (defaults to every configured variant)
        variants: Vec<String>,
    },
    /// Delete the original and the given variants
    Delete {
        #[command(flatten)]
        target: TargetArgs,
        /// Variant names (defaults to every configured variant)
        variants: Vec<String>,
    },
    /// Validate the config and list the configured variants
    Check,
    /// Print a stock config file with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Command::Process {
            file,
            target,
            name,
            mime_type,
            keep_temp,
        } => {
            let config = config::load_config(&cli.config)?;
            init_thread_pool(&config.processing);
            let source = source_handle(&file, name, mime_type)?;
            let handler = FileHandler::new(config.storage.local_storage(), config.processor()?);
            let target = config.target.target(&target.path);

            match handler.process(&source, &target, &config.process_options()) {
                Ok(mut result) => {
                    output::print_lines(&output::format_process_result(&result));
                    if keep_temp {
                        output::print_lines(&output::format_kept_temporaries(
                            result.temporary_files().files(),
                        ));
                    } else {
                        let total = result.temporary_files().len();
                        let failures = result.cleanup_temporary_files();
                        output::print_lines(&output::format_cleanup(total, &failures));
                    }
                }
                Err(failure) => {
                    output::print_lines(&output::format_process_failure(&failure));
                    let (error, mut partial) = failure.into_parts();
                    if !keep_temp {
                        partial.cleanup_temporary_files();
                    }
                    return Err(error.into());
                }
            }
        }
        Command::Urls { target, variants } => {
            let config = config::load_config(&cli.config)?;
            let handler = FileHandler::new(config.storage.local_storage(), config.processor()?);
            let keys = variant_keys(&config, variants);
            let urls = handler.variant_urls_for_target(&config.target.target(&target.path), &keys);
            output::print_lines(&output::format_urls(&urls));
        }
        Command::Delete { target, variants } => {
            let config = config::load_config(&cli.config)?;
            let handler = FileHandler::new(config.storage.local_storage(), config.processor()?);
            let keys = variant_keys(&config, variants);
            let deleted = handler.delete(&config.target.target(&target.path), &keys);
            output::print_lines(&output::format_delete(&target.path, deleted));
            if !deleted {
                return Err(format!("failed to delete files for {}", target.path).into());
            }
        }
        Command::Check => {
            println!("==> Checking {}", cli.config.display());
            let config = config::load_config(&cli.config)?;
            output::print_lines(&output::format_check(&config, &config.build_resolver()));
            println!("==> Config is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Build the upload handle. Mime type: flag, then content sniffing, then
/// `application/octet-stream`.
fn source_handle(
    file: &Path,
    name: Option<String>,
    mime_type: Option<String>,
) -> Result<FileHandle, Box<dyn std::error::Error>> {
    let mut handle = FileHandle::from_path(file)?.uploaded(true);
    if let Some(name) = name {
        handle = handle.with_name(name);
    }
    let mime_type = match mime_type {
        Some(mime) => mime,
        None => infer::get_from_path(file)?
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string()),
    };
    Ok(handle.with_mime_type(mime_type))
}

/// Explicit variant names, or every configured variant.
fn variant_keys(config: &HandlerConfig, variants: Vec<String>) -> Vec<String> {
    if variants.is_empty() {
        config.variants.keys().cloned().collect()
    } else {
        variants
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores: the config can constrain
/// parallelism down, never up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
