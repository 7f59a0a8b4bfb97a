use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::mpsc;

use heicbridge::api::server::serve;
use heicbridge::batch::{scan_heic_files, spawn_batch_worker, BatchEvent};
use heicbridge::config::ProxyConfig;
use heicbridge::convert::magick::MagickConverter;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    if matches!(cli_args.first().map(String::as_str), Some("convert-batch")) {
        run_convert_batch_cli(cli_args.into_iter().skip(1).collect::<Vec<_>>())?;
        return Ok(());
    }

    let config = ProxyConfig::from_env();
    let addr: SocketAddr = config.bind.parse()?;

    serve(addr, config).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConvertBatchCliArgs {
    input: PathBuf,
}

fn parse_convert_batch_cli_args(
    args: &[String],
) -> Result<ConvertBatchCliArgs, Box<dyn std::error::Error>> {
    let mut input = None::<PathBuf>;
    for arg in args {
        match arg.as_str() {
            flag if flag.starts_with('-') => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {flag}\n\nUse --help for usage."
                ))
                .into());
            }
            value => {
                if input.is_some() {
                    return Err(
                        std::io::Error::other("Expected exactly one input path").into()
                    );
                }
                input = Some(PathBuf::from(value));
            }
        }
    }

    let input = input
        .ok_or_else(|| std::io::Error::other("Missing required input path (file or folder)"))?;
    Ok(ConvertBatchCliArgs { input })
}

fn run_convert_batch_cli(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_convert_batch_usage();
        return Ok(());
    }

    let parsed = parse_convert_batch_cli_args(args.as_slice())?;
    let magick = MagickConverter::with_std_runner();
    if !magick.is_available() {
        return Err(std::io::Error::other(
            "ImageMagick is not installed. Install it first (e.g. `brew install imagemagick` or `apt-get install imagemagick`).",
        )
        .into());
    }

    let files = scan_heic_files(parsed.input.as_path())?;
    if files.is_empty() {
        println!("No HEIC files found in {}", parsed.input.display());
        return Ok(());
    }
    println!("Converting {} files...", files.len());

    let (tx, rx) = mpsc::channel();
    let worker = spawn_batch_worker(files, magick, tx);

    for event in rx {
        match event {
            BatchEvent::Started { .. } => {}
            BatchEvent::Progress { percent, .. } => {
                eprint!("\r{percent:>5.1}%");
            }
            BatchEvent::Line(line) => {
                eprint!("\r");
                println!("{line}");
            }
            BatchEvent::Finished(summary) => {
                eprint!("\r");
                println!();
                println!("🎉 Conversion complete!");
                println!("✅ Successful: {}", summary.succeeded);
                println!("❌ Failed: {}", summary.failed);
            }
        }
    }

    let summary = worker.join().map_err(|_| {
        std::io::Error::other("batch worker panicked before delivering a summary")
    })?;
    if summary.failed > 0 && summary.succeeded == 0 {
        return Err(std::io::Error::other("all conversions failed").into());
    }
    Ok(())
}

fn print_convert_batch_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  heicbridge convert-batch <file-or-folder>\n\n",
        "Converts a single .heic/.heif file, or every one found recursively\n",
        "under a folder, to .jpg next to the original.\n"
    ));
}
