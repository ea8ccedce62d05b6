use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use memmap2::MmapOptions;
use parallel_bgzf::{
    BgzfConfig, BgzfDecoder, BgzfEncoder, CompressionLevel, FlushMode, DEFAULT_BLOCK_PAYLOAD,
};
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

mod writer;
use writer::OutputWriter;

/// Bytes handed to the engine (or taken from it) per call.
const CHUNK_SIZE: usize = 1 << 20;

#[derive(Parser, Debug)]
#[command(author, version, about = "Parallel BGZF compression", long_about = None)]
struct Args {
    /// Input file (stdin when omitted or "-")
    input: Option<PathBuf>,

    /// Decompress a BGZF file instead of compressing
    #[arg(short, long)]
    decompress: bool,

    /// Output file (defaults to the input with ".gz" added or removed)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write to stdout
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Compression level, 0 (store) to 9 (best)
    #[arg(short, long, default_value_t = 6)]
    level: u32,

    /// Worker threads (defaults to the number of CPUs)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Blocks in flight at once (defaults to twice the thread count)
    #[arg(long)]
    buffers: Option<usize>,

    /// Uncompressed bytes per block
    #[arg(long, default_value_t = DEFAULT_BLOCK_PAYLOAD)]
    block_size: usize,

    /// Hand the encoder at most one block per write call
    #[arg(long)]
    bounded: bool,

    /// Also write a block index side file (compression only)
    #[arg(long)]
    index: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> Result<BgzfConfig> {
        let mut config = BgzfConfig::default();
        if let Some(threads) = self.threads {
            config = config.with_threads(threads).with_buffers(threads * 2);
        }
        if let Some(buffers) = self.buffers {
            config = config.with_buffers(buffers);
        }
        let flush_mode = if self.bounded {
            FlushMode::Bounded
        } else {
            FlushMode::Full
        };
        let config = config
            .with_level(CompressionLevel::new(self.level)?)
            .with_block_payload(self.block_size)
            .with_flush_mode(flush_mode);
        config.validate()?;
        Ok(config)
    }

    fn input_path(&self) -> Option<&Path> {
        self.input
            .as_deref()
            .filter(|path| path.as_os_str() != "-")
    }

    fn output_path(&self) -> Option<PathBuf> {
        if self.stdout {
            return None;
        }
        if let Some(path) = &self.output {
            return Some(path.clone());
        }
        let input = self.input_path()?;
        if !self.decompress {
            return Some(with_suffix(input, ".gz"));
        }
        match input.extension() {
            Some(ext) if ext == "gz" || ext == "bgz" => Some(input.with_extension("")),
            _ => Some(with_suffix(input, ".out")),
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn progress_bar(total: Option<u64>) -> Result<ProgressBar> {
    let pb = match total {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?);
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec})",
            )?);
            pb
        }
    };
    pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
    Ok(pb)
}

fn compress(args: &Args, config: BgzfConfig, out: OutputWriter) -> Result<()> {
    let mut encoder = match &args.index {
        Some(path) => {
            let index = File::create(path)
                .with_context(|| format!("Failed to create index file {}", path.display()))?;
            BgzfEncoder::with_index(out, BufWriter::new(index), config)?
        }
        None => BgzfEncoder::new(out, config)?,
    };

    match args.input_path() {
        Some(path) => {
            let file = File::open(path).context("Failed to open input file")?;
            let mmap = unsafe {
                MmapOptions::new()
                    .map(&file)
                    .context("Failed to mmap input file")?
            };
            let pb = progress_bar(Some(mmap.len() as u64))?;
            for chunk in mmap.chunks(CHUNK_SIZE) {
                encoder.write_all(chunk).context("Failed to compress input")?;
                pb.inc(chunk.len() as u64);
            }
            pb.finish_and_clear();
        }
        None => {
            let pb = progress_bar(None)?;
            let mut stdin = io::stdin().lock();
            let mut buffer = vec![0u8; CHUNK_SIZE];
            loop {
                let n = stdin.read(&mut buffer).context("Failed to read stdin")?;
                if n == 0 {
                    break;
                }
                encoder
                    .write_all(&buffer[..n])
                    .context("Failed to compress input")?;
                pb.inc(n as u64);
            }
            pb.finish_and_clear();
        }
    }

    encoder
        .flush_stream()
        .context("Failed to finish BGZF stream")?;
    info!(
        blocks = encoder.blocks_written(),
        bytes_in = encoder.bytes_in(),
        bytes_out = encoder.bytes_out(),
        "compressed"
    );
    encoder.finish()?.finish().context("Failed to flush output")?;
    Ok(())
}

fn decompress(args: &Args, config: BgzfConfig, mut out: OutputWriter) -> Result<()> {
    let mut decoder = match args.input_path() {
        Some(path) => BgzfDecoder::open(path, config)
            .with_context(|| format!("Failed to open {}", path.display()))?,
        None => BgzfDecoder::new(io::stdin(), config)?,
    };

    let pb = progress_bar(None)?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = decoder
            .read(&mut buffer)
            .context("Failed to decompress input")?;
        if n == 0 {
            break;
        }
        out.write_all(&buffer[..n])
            .context("Failed to write output")?;
        pb.inc(n as u64);
    }
    pb.finish_and_clear();

    info!(
        blocks = decoder.blocks_read(),
        bytes_out = out.bytes_written(),
        "decompressed"
    );
    out.finish().context("Failed to flush output")?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.config()?;
    if args.decompress && args.index.is_some() {
        bail!("--index is only supported when compressing");
    }

    let output_path = args.output_path();
    let out = OutputWriter::create(output_path.as_deref()).context("Failed to create output file")?;

    info!(
        threads = config.threads,
        buffers = config.buffers,
        input = %args.input_path().map_or("<stdin>".into(), |p| p.display().to_string()),
        output = %output_path.as_ref().map_or("<stdout>".into(), |p| p.display().to_string()),
        "{}",
        if args.decompress { "decompressing" } else { "compressing" }
    );

    let start = Instant::now();
    if args.decompress {
        decompress(&args, config, out)?;
    } else {
        compress(&args, config, out)?;
    }
    info!("finished in {:.2?}", start.elapsed());
    Ok(())
}
