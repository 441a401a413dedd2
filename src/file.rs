use std::{
  fmt,
  os::fd::{AsRawFd, RawFd},
  path::Path,
};

use libc::c_int;
use tracing::{debug, warn};

use crate::{
  cache::CacheWindow,
  config::CacheConfig,
  error::{IoError, Result},
  sys,
};

/// Direction a [`File`] was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  Read,
  Write,
}

impl Mode {
  fn open_flags(self) -> c_int {
    match self {
      Mode::Read => libc::O_RDONLY,
      Mode::Write => libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
    }
  }
}

impl fmt::Display for Mode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Mode::Read => f.write_str("read-only"),
      Mode::Write => f.write_str("write-only"),
    }
  }
}

/// A read-only or write-only file descriptor with its own cache window.
///
/// Single-byte calls go through the window; bulk calls move data directly
/// between the descriptor and the caller's buffer. The descriptor is closed
/// exactly once, by [`File::close`] or, failing that, on drop.
pub struct File {
  fd: RawFd,
  mode: Mode,
  window: CacheWindow,
}

impl File {
  /// Opens `path`. Write mode creates the file or truncates it.
  pub fn open(
    path: impl AsRef<Path>,
    mode: Mode,
  ) -> Result<Self> {
    Self::open_with(path, mode, &CacheConfig::default())
  }

  pub fn open_with(
    path: impl AsRef<Path>,
    mode: Mode,
    config: &CacheConfig,
  ) -> Result<Self> {
    let path = path.as_ref();
    validate(config)?;

    let fd = sys::open(path, mode.open_flags()).map_err(|source| IoError::Open {
      path: path.to_path_buf(),
      source,
    })?;

    debug!(fd, path = %path.display(), %mode, "opened file");

    Ok(Self::attach(fd, mode, config))
  }

  /// Standard input, read mode.
  pub fn stdin() -> Self {
    Self::attach(libc::STDIN_FILENO, Mode::Read, &CacheConfig::default())
  }

  pub fn stdin_with(config: &CacheConfig) -> Result<Self> {
    validate(config)?;

    Ok(Self::attach(libc::STDIN_FILENO, Mode::Read, config))
  }

  /// Standard output, write mode.
  pub fn stdout() -> Self {
    Self::attach(libc::STDOUT_FILENO, Mode::Write, &CacheConfig::default())
  }

  pub fn stdout_with(config: &CacheConfig) -> Result<Self> {
    validate(config)?;

    Ok(Self::attach(libc::STDOUT_FILENO, Mode::Write, config))
  }

  /// Wraps an already-open descriptor.
  ///
  /// # Safety
  ///
  /// `fd` must be open, must allow `mode`, and must not be owned by
  /// anything else: the returned `File` closes it.
  pub unsafe fn from_raw_fd(
    fd: RawFd,
    mode: Mode,
    config: &CacheConfig,
  ) -> Result<Self> {
    validate(config)?;

    Ok(Self::attach(fd, mode, config))
  }

  fn attach(
    fd: RawFd,
    mode: Mode,
    config: &CacheConfig,
  ) -> Self {
    Self {
      fd,
      mode,
      window: CacheWindow::new(config.block_size),
    }
  }

  pub fn mode(&self) -> Mode {
    self.mode
  }

  pub fn fileno(&self) -> RawFd {
    self.fd
  }

  pub fn window(&self) -> &CacheWindow {
    &self.window
  }

  /// Size in bytes, or `None` if this is not a regular file (a pipe, a
  /// terminal).
  pub fn file_size(&self) -> Option<u64> {
    sys::regular_file_size(self.fd)
  }

  /// Next byte, or `Ok(None)` at end of file.
  pub fn read_byte(&mut self) -> Result<Option<u8>> {
    self.expect(Mode::Read, "read")?;

    self.window.read_byte(self.fd).map_err(|source| IoError::os("read", source))
  }

  /// Reads up to `buf.len()` bytes. Fewer bytes than requested means end of
  /// file or an error after some bytes were read; `Err` is returned only if
  /// nothing was read.
  pub fn read_bulk(
    &mut self,
    buf: &mut [u8],
  ) -> Result<usize> {
    self.expect(Mode::Read, "read")?;

    let cached = self.window.drain(buf);
    if cached == buf.len() {
      return Ok(cached);
    }

    let (direct, error) = sys::read_full(self.fd, &mut buf[cached..]);
    self.window.advance_past(direct as u64);

    let total = cached + direct;
    match error {
      Some(source) if total == 0 => Err(IoError::os("read", source)),
      Some(source) => {
        debug!(fd = self.fd, total, error = %source, "short read");
        Ok(total)
      }
      None => Ok(total),
    }
  }

  pub fn write_byte(
    &mut self,
    byte: u8,
  ) -> Result<()> {
    self.expect(Mode::Write, "write")?;

    self.window.write_byte(self.fd, byte).map_err(|source| IoError::os("write", source))
  }

  /// Writes all of `buf` after flushing pending bytes. On an error after
  /// some bytes of `buf` went out, returns how many did; `Err` is returned
  /// only if none did.
  pub fn write_bulk(
    &mut self,
    buf: &[u8],
  ) -> Result<usize> {
    self.expect(Mode::Write, "write")?;
    self.flush()?;

    let (written, error) = sys::write_full(self.fd, buf);
    self.window.advance_past(written as u64);

    match error {
      Some(source) if written == 0 => Err(IoError::os("write", source)),
      Some(source) => {
        debug!(fd = self.fd, written, error = %source, "short write");
        Ok(written)
      }
      None => Ok(written),
    }
  }

  /// Writes out pending bytes of a write-mode file. No-op in read mode.
  pub fn flush(&mut self) -> Result<()> {
    match self.mode {
      Mode::Read => Ok(()),
      Mode::Write => self.window.flush(self.fd).map_err(|source| IoError::os("flush", source)),
    }
  }

  /// Moves to byte `offset` of the file. Pending writes are flushed first;
  /// cached reads are dropped.
  pub fn seek(
    &mut self,
    offset: u64,
  ) -> Result<()> {
    self.flush()?;

    sys::seek(self.fd, offset).map_err(|source| IoError::os("seek", source))?;
    self.window.reset_at(offset);

    Ok(())
  }

  /// Flushes, then closes the descriptor. Reports the first failure; the
  /// descriptor is closed either way.
  pub fn close(mut self) -> Result<()> {
    let flushed = self.flush();
    let fd = std::mem::replace(&mut self.fd, -1);
    let closed = sys::close(fd).map_err(|source| IoError::os("close", source));

    debug!(fd, "closed file");

    flushed.and(closed)
  }

  fn expect(
    &self,
    mode: Mode,
    op: &'static str,
  ) -> Result<()> {
    if self.mode != mode {
      return Err(IoError::WrongMode { mode: self.mode, op });
    }

    Ok(())
  }
}

fn validate(config: &CacheConfig) -> Result<()> {
  if config.block_size == 0 {
    return Err(IoError::InvalidBlockSize {
      block_size: config.block_size,
    });
  }

  Ok(())
}

impl AsRawFd for File {
  fn as_raw_fd(&self) -> RawFd {
    self.fd
  }
}

impl Drop for File {
  fn drop(&mut self) {
    if self.fd < 0 {
      return;
    }

    if let Err(error) = self.flush() {
      warn!(fd = self.fd, %error, "dropping unflushed bytes");
    }
    if let Err(error) = sys::close(self.fd) {
      warn!(fd = self.fd, %error, "close failed");
    }
  }
}
