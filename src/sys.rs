//! Raw descriptor calls. Interrupted calls are retried here and never reach
//! callers.

use std::{
  ffi::CString,
  io,
  os::{fd::RawFd, unix::ffi::OsStrExt},
  path::Path,
};

use libc::{c_int, c_void, off_t};

fn retry<T: PartialOrd + Default>(mut call: impl FnMut() -> T) -> io::Result<T> {
  loop {
    let result = call();
    if result >= T::default() {
      return Ok(result);
    }

    let error = io::Error::last_os_error();
    if error.kind() != io::ErrorKind::Interrupted {
      return Err(error);
    }
  }
}

/// One `read(2)`. `Ok(0)` means end of file.
pub fn read(
  fd: RawFd,
  buf: &mut [u8],
) -> io::Result<usize> {
  retry(|| unsafe { libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len()) }).map(|n| n as usize)
}

/// One `write(2)`.
pub fn write(
  fd: RawFd,
  buf: &[u8],
) -> io::Result<usize> {
  retry(|| unsafe { libc::write(fd, buf.as_ptr() as *const c_void, buf.len()) }).map(|n| n as usize)
}

/// Reads until `buf` is full, end of file, or an error. Returns the bytes
/// transferred and the error that stopped the transfer, if any.
pub fn read_full(
  fd: RawFd,
  buf: &mut [u8],
) -> (usize, Option<io::Error>) {
  let mut done = 0;

  while done < buf.len() {
    match read(fd, &mut buf[done..]) {
      Ok(0) => break,
      Ok(n) => done += n,
      Err(error) => return (done, Some(error)),
    }
  }

  (done, None)
}

/// Writes until all of `buf` is written or an error. Returns the bytes
/// transferred and the error that stopped the transfer, if any.
pub fn write_full(
  fd: RawFd,
  buf: &[u8],
) -> (usize, Option<io::Error>) {
  let mut done = 0;

  while done < buf.len() {
    match write(fd, &buf[done..]) {
      Ok(0) => return (done, Some(io::ErrorKind::WriteZero.into())),
      Ok(n) => done += n,
      Err(error) => return (done, Some(error)),
    }
  }

  (done, None)
}

/// Moves the file position to `offset` bytes from the start.
pub fn seek(
  fd: RawFd,
  offset: u64,
) -> io::Result<u64> {
  let offset = off_t::try_from(offset).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

  retry(|| unsafe { libc::lseek(fd, offset, libc::SEEK_SET) }).map(|position| position as u64)
}

/// Size of the file behind `fd`, or `None` if it is not a regular file.
pub fn regular_file_size(fd: RawFd) -> Option<u64> {
  let mut stat = std::mem::MaybeUninit::<libc::stat>::uninit();

  let result = unsafe { libc::fstat(fd, stat.as_mut_ptr()) };
  if result < 0 {
    return None;
  }

  let stat = unsafe { stat.assume_init() };
  if stat.st_mode & libc::S_IFMT != libc::S_IFREG {
    return None;
  }

  u64::try_from(stat.st_size).ok()
}

pub fn open(
  path: &Path,
  flags: c_int,
) -> io::Result<RawFd> {
  let path = CString::new(path.as_os_str().as_bytes())
    .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

  retry(|| unsafe { libc::open(path.as_ptr(), flags | libc::O_CLOEXEC, 0o666 as libc::c_uint) })
}

/// Closes `fd`. Not retried: after `EINTR` the descriptor is already gone.
pub fn close(fd: RawFd) -> io::Result<()> {
  if unsafe { libc::close(fd) } < 0 {
    return Err(io::Error::last_os_error());
  }

  Ok(())
}
