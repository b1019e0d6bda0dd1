//! Error types for vfskit.
//!
//! Every operation failure maps onto exactly one POSIX error code. The
//! variants carry strerror-style messages; [`Error::code`] returns the Linux
//! errno value for shims that need to install it into a thread-local `errno`.

use thiserror::Error;

/// Result type alias using vfskit's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Filesystem operation errors, one variant per POSIX code raised by the core.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// ENOENT
    #[error("no such file or directory")]
    NotFound,

    /// ENOTDIR
    #[error("not a directory")]
    NotADirectory,

    /// EISDIR
    #[error("is a directory")]
    IsADirectory,

    /// ELOOP
    #[error("too many levels of symbolic links")]
    LinkLoop,

    /// ENAMETOOLONG
    #[error("file name too long")]
    NameTooLong,

    /// EACCES
    #[error("permission denied")]
    AccessDenied,

    /// EPERM
    #[error("operation not permitted")]
    NotPermitted,

    /// EEXIST
    #[error("file exists")]
    Exists,

    /// ENOTEMPTY
    #[error("directory not empty")]
    NotEmpty,

    /// EBADF
    #[error("bad file descriptor")]
    BadDescriptor,

    /// ENOTSOCK
    #[error("socket operation on non-socket")]
    NotASocket,

    /// EINVAL
    #[error("invalid argument")]
    InvalidArgument,

    /// EOPNOTSUPP
    #[error("operation not supported")]
    NotSupported,

    /// EPROTOTYPE
    #[error("protocol wrong type for socket")]
    WrongProtocolType,

    /// EPROTONOSUPPORT
    #[error("protocol not supported")]
    ProtocolNotSupported,

    /// ESPIPE
    #[error("illegal seek")]
    IllegalSeek,

    /// ENXIO
    #[error("no such device or address")]
    NoDevice,

    /// ENFILE
    #[error("too many open files in system")]
    DescriptorLimit,

    /// ENOMEM
    #[error("cannot allocate memory")]
    OutOfMemory,

    /// EOVERFLOW
    #[error("value too large for defined data type")]
    Overflow,

    /// EDESTADDRREQ
    #[error("destination address required")]
    DestinationRequired,

    /// EADDRINUSE
    #[error("address already in use")]
    AddressInUse,

    /// ENOTCONN
    #[error("transport endpoint is not connected")]
    NotConnected,

    /// EISCONN
    #[error("transport endpoint is already connected")]
    AlreadyConnected,

    /// ECONNREFUSED
    #[error("connection refused")]
    ConnectionRefused,

    /// ECONNRESET
    #[error("connection reset by peer")]
    ConnectionReset,

    /// EPIPE
    #[error("broken pipe")]
    BrokenPipe,

    /// EAGAIN
    #[error("resource temporarily unavailable")]
    WouldBlock,

    /// EBUSY
    #[error("device or resource busy")]
    Busy,

    /// EAFNOSUPPORT
    #[error("address family not supported by protocol")]
    AddressFamily,
}

impl Error {
    /// The Linux errno value corresponding to this error.
    pub fn code(self) -> i32 {
        match self {
            Error::NotFound => 2,
            Error::NoDevice => 6,
            Error::BadDescriptor => 9,
            Error::WouldBlock => 11,
            Error::OutOfMemory => 12,
            Error::AccessDenied => 13,
            Error::Busy => 16,
            Error::Exists => 17,
            Error::NotADirectory => 20,
            Error::IsADirectory => 21,
            Error::InvalidArgument => 22,
            Error::DescriptorLimit => 23,
            Error::IllegalSeek => 29,
            Error::BrokenPipe => 32,
            Error::NameTooLong => 36,
            Error::NotEmpty => 39,
            Error::LinkLoop => 40,
            Error::Overflow => 75,
            Error::NotASocket => 88,
            Error::DestinationRequired => 89,
            Error::WrongProtocolType => 91,
            Error::ProtocolNotSupported => 93,
            Error::NotSupported => 95,
            Error::AddressFamily => 97,
            Error::AddressInUse => 98,
            Error::ConnectionReset => 104,
            Error::AlreadyConnected => 106,
            Error::NotConnected => 107,
            Error::ConnectionRefused => 111,
            Error::NotPermitted => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_linux_errno() {
        assert_eq!(Error::NotFound.code(), 2);
        assert_eq!(Error::AccessDenied.code(), 13);
        assert_eq!(Error::LinkLoop.code(), 40);
        assert_eq!(Error::ConnectionRefused.code(), 111);
        assert_eq!(Error::WouldBlock.code(), 11);
    }

    #[test]
    fn messages_follow_strerror() {
        assert_eq!(Error::NotFound.to_string(), "no such file or directory");
        assert_eq!(Error::BrokenPipe.to_string(), "broken pipe");
        assert_eq!(Error::IsADirectory.to_string(), "is a directory");
    }
}
