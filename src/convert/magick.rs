use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use tempfile::Builder;
use thiserror::Error;
use tracing::debug;

pub const MAGICK_PROGRAM: &str = "convert";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandRunner: Send + Sync + 'static {
    fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput>;
}

#[derive(Debug, Default, Clone)]
pub struct StdCommandRunner;

impl CommandRunner for StdCommandRunner {
    fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        let output = Command::new(spec.program.as_str())
            .args(spec.args.iter().map(String::as_str))
            .output()?;

        Ok(CommandOutput {
            status_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).to_string(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum MagickError {
    #[error("imagemagick is not installed: {0}")]
    NotInstalled(String),
    #[error("convert exited with status {status_code}: {stderr}")]
    CommandFailed { status_code: i32, stderr: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Adapter around the ImageMagick `convert` binary. The binary itself is an
/// opaque collaborator; everything here is argument plumbing and temp-file
/// lifecycle.
#[derive(Clone)]
pub struct MagickConverter {
    runner: Arc<dyn CommandRunner>,
}

impl MagickConverter {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn with_std_runner() -> Self {
        Self::new(Arc::new(StdCommandRunner))
    }

    /// Probes `convert -version`; used by the batch CLI before starting work.
    pub fn is_available(&self) -> bool {
        let spec = CommandSpec {
            program: String::from(MAGICK_PROGRAM),
            args: vec![String::from("-version")],
        };
        self.runner
            .run(&spec)
            .map(|output| output.status_code == 0)
            .unwrap_or(false)
    }

    /// File-to-file conversion used by the batch driver.
    pub fn convert_file(
        &self,
        input: &Path,
        output: &Path,
        quality: u8,
    ) -> Result<(), MagickError> {
        let spec = CommandSpec {
            program: String::from(MAGICK_PROGRAM),
            args: vec![
                input.display().to_string(),
                String::from("-quality"),
                quality.to_string(),
                output.display().to_string(),
            ],
        };
        debug!(input = %input.display(), output = %output.display(), "invoking imagemagick");
        let result = self.runner.run(&spec).map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                MagickError::NotInstalled(error.to_string())
            } else {
                MagickError::Io(error)
            }
        })?;
        if result.status_code != 0 {
            return Err(MagickError::CommandFailed {
                status_code: result.status_code,
                stderr: result.stderr,
            });
        }
        Ok(())
    }

    /// Byte-to-byte conversion used by the server fallback path. The input is
    /// staged in a temporary `.heic` file and the converted `.jpg` is read
    /// back. Both temp files are deleted when their guards drop, on every exit
    /// path.
    pub fn convert_bytes(&self, input: &[u8], quality: u8) -> Result<Vec<u8>, MagickError> {
        let mut heic_file = Builder::new()
            .prefix("heicbridge_in_")
            .suffix(".heic")
            .tempfile()?;
        heic_file.write_all(input)?;
        heic_file.flush()?;

        let jpg_path = Builder::new()
            .prefix("heicbridge_out_")
            .suffix(".jpg")
            .tempfile()?
            .into_temp_path();

        self.convert_file(heic_file.path(), &jpg_path, quality)?;
        let jpeg = std::fs::read(&jpg_path)?;
        Ok(jpeg)
    }
}
