use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread;

use tracing::warn;

use crate::convert::magick::MagickConverter;
use crate::convert::BATCH_MAGICK_QUALITY;

/// Events emitted by the batch worker. The worker never touches consumer
/// state; the receiving side owns all presentation.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Started { total: usize },
    Progress { index: usize, total: usize, percent: f32 },
    Line(String),
    Finished(BatchSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub fn is_heic_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ext == "heic" || ext == "heif"
        })
        .unwrap_or(false)
}

pub fn output_path_for(input: &Path) -> PathBuf {
    input.with_extension("jpg")
}

/// Collects `*.heic` / `*.heif` files, case-insensitive. A directory is walked
/// recursively; a single matching file is returned as-is. Sorted for a stable
/// processing order.
pub fn scan_heic_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(if is_heic_path(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        });
    }
    let mut files = Vec::new();
    collect_heic_files(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_heic_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_heic_files(path.as_path(), out)?;
        } else if is_heic_path(path.as_path()) {
            out.push(path);
        }
    }
    Ok(())
}

/// Sequential conversion loop over an ordered file list. Files are processed
/// one at a time so the reported progress stays monotonic. Runs to completion;
/// there is no cancellation.
pub fn run_batch(
    files: &[PathBuf],
    magick: &MagickConverter,
    events: &Sender<BatchEvent>,
) -> BatchSummary {
    let total = files.len();
    let mut summary = BatchSummary {
        total,
        ..BatchSummary::default()
    };
    let _ = events.send(BatchEvent::Started { total });

    for (index, input) in files.iter().enumerate() {
        let percent = (index as f32 / total as f32) * 100.0;
        let _ = events.send(BatchEvent::Progress {
            index,
            total,
            percent,
        });

        let output = output_path_for(input.as_path());
        match magick.convert_file(input.as_path(), output.as_path(), BATCH_MAGICK_QUALITY) {
            Ok(()) => {
                summary.succeeded += 1;
                let _ = events.send(BatchEvent::Line(format!(
                    "✅ {} → {}",
                    file_label(input.as_path()),
                    file_label(output.as_path())
                )));
            }
            Err(error) => {
                summary.failed += 1;
                warn!(input = %input.display(), error = %error, "batch conversion failed");
                let _ = events.send(BatchEvent::Line(format!(
                    "❌ Failed: {}",
                    file_label(input.as_path())
                )));
            }
        }
    }

    let _ = events.send(BatchEvent::Progress {
        index: total,
        total,
        percent: 100.0,
    });
    let _ = events.send(BatchEvent::Finished(summary));
    summary
}

/// Spawns the single background worker for a batch. Communication with the
/// consumer happens only over the event channel.
pub fn spawn_batch_worker(
    files: Vec<PathBuf>,
    magick: MagickConverter,
    events: Sender<BatchEvent>,
) -> thread::JoinHandle<BatchSummary> {
    thread::spawn(move || run_batch(files.as_slice(), &magick, &events))
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("?")
        .to_string()
}
