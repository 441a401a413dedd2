//! Copies a file one byte at a time through the block cache.
//!
//! ```text
//! cargo run --example copy -- [-i INPUT] [-o OUTPUT] [-b BLOCK_SIZE]
//! ```
//!
//! Without `-i` reads standard input; without `-o` writes standard output.

use std::{
  path::{Path, PathBuf},
  process,
};

use arenaio::{CacheConfig, DEFAULT_BLOCK_SIZE, File, Mode};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Copy a file one byte at a time through the block cache.
#[derive(Parser)]
#[command(name = "copy")]
struct Args {
  /// Input file [default: standard input]
  #[arg(short)]
  input: Option<PathBuf>,

  /// Output file, created or truncated [default: standard output]
  #[arg(short)]
  output: Option<PathBuf>,

  /// Cache block size in bytes
  #[arg(short, default_value_t = DEFAULT_BLOCK_SIZE)]
  block_size: usize,
}

fn open(
  path: Option<&Path>,
  mode: Mode,
  config: &CacheConfig,
) -> File {
  let file = match path {
    Some(path) => File::open_with(path, mode, config),
    None if mode == Mode::Read => File::stdin_with(config),
    None => File::stdout_with(config),
  };

  file.unwrap_or_else(|error| {
    eprintln!("{error}");
    process::exit(1);
  })
}

fn copy(
  input: &mut File,
  output: &mut File,
  copied: &mut u64,
) -> arenaio::Result<()> {
  while let Some(byte) = input.read_byte()? {
    output.write_byte(byte)?;
    *copied += 1;
  }

  Ok(())
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = CacheConfig::default().with_block_size(args.block_size);

  let mut input = open(args.input.as_deref(), Mode::Read, &config);
  let mut output = open(args.output.as_deref(), Mode::Write, &config);

  match input.file_size() {
    Some(size) => info!(size, "copying regular file"),
    None => info!("copying stream of unknown size"),
  }

  let mut copied: u64 = 0;
  if let Err(error) = copy(&mut input, &mut output, &mut copied).and_then(|()| output.close()) {
    eprintln!("copy failed after {copied} bytes: {error}");
    process::exit(1);
  }

  info!(copied, "done");
}
