use super::{Stream, StreamKind};
use crate::error::{Error, Result};
use crate::reactor::RawFd;
use crate::reactor::poller::platform;
use crate::runtime::EventLoop;

use std::path::Path;

/// How [`Stream::open_file`] opens its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Read an existing file.
    Read,
    /// Write a file, creating or truncating it.
    Write,
    /// Read and write an existing file.
    ReadWrite,
    /// Create a file for reading and writing, truncating any previous one.
    Create,
    /// Append to a file, creating it if needed.
    Append,
}

impl FileMode {
    fn flags(self) -> libc::c_int {
        match self {
            FileMode::Read => platform::READ_FLAGS,
            FileMode::Write => platform::WRITE_FLAGS,
            FileMode::ReadWrite => platform::READ_WRITE_FLAGS,
            FileMode::Create => platform::CREATE_FLAGS,
            FileMode::Append => platform::APPEND_FLAGS,
        }
    }
}

impl Stream {
    /// Opens a file as a stream.
    ///
    /// Regular files never block; the poller treats them as always ready,
    /// so reads proceed chunk by chunk until end-of-file.
    pub fn open_file(
        event_loop: &EventLoop,
        path: impl AsRef<Path>,
        mode: FileMode,
    ) -> Result<Stream> {
        let fd = platform::sys_open(path.as_ref(), mode.flags()).map_err(Error::Io)?;
        Stream::from_fd(event_loop, StreamKind::File, fd)
    }

    /// Wraps one end of a pipe, taking ownership of `fd`.
    ///
    /// The descriptor is switched to non-blocking mode.
    pub fn open_pipe(event_loop: &EventLoop, fd: RawFd) -> Result<Stream> {
        if !platform::is_valid_fd(fd) {
            return Err(Error::InvalidArgument("invalid descriptor"));
        }

        platform::sys_set_nonblocking(fd).map_err(Error::Io)?;
        Stream::from_fd(event_loop, StreamKind::Pipe, fd)
    }
}

/// Creates a pipe and returns its `(reader, writer)` ends as streams.
pub fn pipe_pair(event_loop: &EventLoop) -> Result<(Stream, Stream)> {
    let (read_fd, write_fd) = platform::sys_pipe().map_err(Error::Io)?;

    let reader = match Stream::from_fd(event_loop, StreamKind::Pipe, read_fd) {
        Ok(reader) => reader,
        Err(err) => {
            let _ = platform::sys_close(write_fd);
            return Err(err);
        }
    };
    let writer = Stream::from_fd(event_loop, StreamKind::Pipe, write_fd)?;

    Ok((reader, writer))
}
