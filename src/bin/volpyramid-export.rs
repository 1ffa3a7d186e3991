//! Export raw volume files as a chunked resolution pyramid

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{info, Level};
use volpyramid::{
    ChunkStoreSink, CompressionMethod, ExportConfig, MipmapPreset, PyramidWriter, RawFileSource,
    Sample, Triple,
};

#[derive(Parser, Debug)]
#[command(name = "volpyramid-export", version)]
struct Cli {
    /// Verbosity level (0-4)
    #[arg(short, action = ArgAction::Count)]
    v: u8,

    /// Raw file pattern; `{t}` and `{v}` expand to timepoint and view, `{t:3}` zero-pads.
    #[arg(long)]
    input: String,

    /// Volume dimensions as `XxYxZ`.
    #[arg(long, value_parser = parse_dims)]
    dims: Triple,

    /// Number of timepoints.
    #[arg(long, default_value_t = 1)]
    timepoints: usize,

    /// Number of views per timepoint.
    #[arg(long, default_value_t = 1)]
    views: usize,

    /// Sample type of the raw files.
    #[arg(long, value_enum, default_value_t = SampleType::U16)]
    data_type: SampleType,

    /// Export configuration JSON. Overrides `--preset`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Built-in mipmap definition used without `--config`.
    #[arg(long, value_enum, default_value_t = PresetChoice::Balanced)]
    preset: PresetChoice,

    /// Output store location (path, `file://` or `memory://` URL).
    #[arg(long)]
    output: String,

    /// Cell compression (none, deflate, zstd, rle). Overrides the configuration file.
    #[arg(long)]
    compression: Option<CompressionMethod>,

    /// Compression level (0-9).
    #[arg(long)]
    level: Option<u8>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SampleType {
    U8,
    U16,
    F32,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PresetChoice {
    Balanced,
    Planar,
}

fn parse_dims(value: &str) -> Result<Triple> {
    let parts = value
        .split(['x', ','])
        .map(|p| p.trim().parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid dimensions {:?}", value))?;
    match parts.as_slice() {
        &[x, y, z] => Ok([x, y, z]),
        _ => bail!("expected three dimensions, got {:?}", value),
    }
}

fn init_tracing_subscriber(verbosity_level: u8) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(match verbosity_level {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow!(e))
}

fn run<T: Sample>(cli: &Cli, config: ExportConfig) -> Result<()> {
    let mut source = RawFileSource::<T>::new(&cli.input, cli.dims, cli.timepoints, cli.views);
    let sink = ChunkStoreSink::create(&cli.output, T::DATA_TYPE, &config)?;

    let mut last_percent = usize::MAX;
    let mut writer = PyramidWriter::new(sink, config).with_progress(move |done: usize, total: usize| {
        let percent = done * 100 / total.max(1);
        if percent != last_percent {
            last_percent = percent;
            info!("progress {}% ({}/{})", percent, done, total);
        }
    });

    let summary = writer.export(&mut source)?;
    let sink = writer.into_sink();
    info!(
        datasets = summary.datasets,
        cells = summary.cells,
        stored = %volpyramid::utils::format_bytes(sink.bytes_written()),
        "wrote {}",
        cli.output
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing_subscriber(cli.v)?;

    let mut config = match &cli.config {
        Some(path) => ExportConfig::from_json_path(path)?,
        None => ExportConfig::from_preset(match cli.preset {
            PresetChoice::Balanced => MipmapPreset::Balanced,
            PresetChoice::Planar => MipmapPreset::Planar,
        }),
    };
    if let Some(method) = cli.compression {
        config.compression.method = method;
    }
    if let Some(level) = cli.level {
        config.compression.level = level;
    }

    match cli.data_type {
        SampleType::U8 => run::<u8>(&cli, config),
        SampleType::U16 => run::<u16>(&cli, config),
        SampleType::F32 => run::<f32>(&cli, config),
    }
}
