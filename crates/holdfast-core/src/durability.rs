//! Platform-specific durable sync
//!
//! A sync that returns Ok must mean the bytes survive power loss, and each
//! platform reaches that bar with a different call. This module maps the
//! strongest available primitive behind one function.

use std::fs::File;
use std::io;

/// Block until the file's written data reaches persistent storage.
///
/// - Linux: `fdatasync()` - data without metadata, cheaper than `fsync()`
/// - macOS/iOS: `fcntl(F_FULLFSYNC)` - plain `fsync` there only reaches the
///   drive's volatile cache
/// - Windows: `FlushFileBuffers()`
/// - elsewhere: `File::sync_data()`
///
/// May block for a long time under heavy I/O; callers must not hold locks
/// that another sync path could be waiting on.
pub fn durable_sync(file: &File) -> io::Result<()> {
    sync_impl(file)
}

#[cfg(target_os = "linux")]
fn sync_impl(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let fd = file.as_raw_fd();
    // SAFETY: fdatasync operates on a file descriptor taken from a live
    // File reference, so the descriptor is open for the duration of the call.
    let result = unsafe { libc::fdatasync(fd) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn sync_impl(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let fd = file.as_raw_fd();
    // SAFETY: fcntl(F_FULLFSYNC) operates on a file descriptor taken from a
    // live File reference, so the descriptor is open for the duration of the call.
    let result = unsafe { libc::fcntl(fd, libc::F_FULLFSYNC) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(target_os = "windows")]
fn sync_impl(file: &File) -> io::Result<()> {
    use std::os::windows::io::AsRawHandle;
    use winapi::um::fileapi::FlushFileBuffers;
    let handle = file.as_raw_handle();
    // SAFETY: FlushFileBuffers operates on a handle taken from a live File
    // reference, so the handle is valid for the duration of the call.
    let result = unsafe { FlushFileBuffers(handle as *mut _) };
    if result != 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "ios",
    target_os = "windows"
)))]
fn sync_impl(file: &File) -> io::Result<()> {
    file.sync_data()
}
