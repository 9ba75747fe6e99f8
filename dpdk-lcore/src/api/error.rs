pub type Errno = nix::errno::Errno;

/// Result type alias using nix's Errno for engine operations
pub type Result<T> = std::result::Result<T, Errno>;

/// Map an OS error (thread spawn, sysfs read, ...) onto an errno.
///
/// Errors that carry no raw OS code are reported as `EIO`.
pub fn io_errno(e: &std::io::Error) -> Errno {
    e.raw_os_error().map(Errno::from_raw).unwrap_or(Errno::EIO)
}
