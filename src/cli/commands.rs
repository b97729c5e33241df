//! CLI Command Implementations

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::engine::io::{collect_takes, load_take, write_export, ExportSummary, WavDecoder};
use crate::engine::mixdown;
use crate::engine::tracks::TrackRepository;
use crate::engine::wav::{self, WavInfo};
use crate::error::{MultitakeError, Result};

/// Arguments of the `mix` command
#[derive(Debug, Clone, Default)]
pub struct MixArgs {
    pub inputs: Vec<PathBuf>,
    pub dir: Option<PathBuf>,
    pub gains: Vec<f32>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Mix takes from disk into one WAV file.
pub async fn mix(args: MixArgs) -> Result<ExportSummary> {
    let config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };

    let inputs = match &args.dir {
        Some(dir) => collect_takes(dir)?,
        None => args.inputs.clone(),
    };
    if args.gains.len() > inputs.len() {
        warn!(
            gains = args.gains.len(),
            takes = inputs.len(),
            "more gains than takes; extra gains ignored"
        );
    }

    let mut repository = TrackRepository::new();
    for (index, path) in inputs.iter().enumerate() {
        let id = repository.append(load_take(path).await?);
        if let Some(&gain) = args.gains.get(index) {
            repository.set_gain(id, gain)?;
        }
        info!(take = index, path = %path.display(), "take loaded");
    }

    let bytes = mixdown::render(&WavDecoder::new(), &repository.list()).await?;

    let target = output_path(args.output.as_deref(), &config);
    let summary = write_export(&target, &bytes).await?;

    println!("Mixed {} take(s) -> {}", repository.len(), summary.path.display());
    print_info(&summary.info);
    println!("SHA-256:      {}", summary.sha256);

    Ok(summary)
}

/// Print the header of a WAV file produced by `mix`.
pub async fn inspect(path: &Path) -> Result<WavInfo> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => MultitakeError::NotFound {
            id: path.display().to_string(),
        },
        _ => MultitakeError::Io(e),
    })?;
    let info = wav::inspect(&bytes)?;

    println!("File: {}", path.display());
    print_info(&info);
    Ok(info)
}

fn output_path(output: Option<&Path>, config: &SessionConfig) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(&config.export_file_name),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(&config.export_file_name),
    }
}

fn print_info(info: &WavInfo) {
    println!("Channels:     {}", info.channels);
    println!("Sample rate:  {} Hz", info.sample_rate);
    println!("Bit depth:    {}", info.bits_per_sample);
    println!("Frames:       {}", info.frames);
    println!("Duration:     {:.3} s", info.duration_secs());
}
