//! Fixed resource limits of the virtual filesystem.

/// Maximum length of a whole path in bytes.
pub const PATH_LIMIT: usize = 1023;

/// Maximum length of a single path component in bytes.
pub const FILE_NAME_LIMIT: usize = 255;

/// Upper bound on the descriptor table.
pub const FILE_DESCRIPTOR_LIMIT: usize = 1024;

/// Capacity of a pipe's byte ring.
pub const PIPE_SIZE_LIMIT: usize = 1024;

/// Capacity of a stream socket's inbox ring.
pub const SOCKET_STREAM_LIMIT: usize = 1024;

/// Sentinel descriptor naming the current working directory (`AT_FDCWD`).
pub const CURRENT_DIRECTORY: i32 = -100;
