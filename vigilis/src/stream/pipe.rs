use super::Stream;
use crate::buffer::Buffer;
use crate::error::Result;

use std::rc::Rc;

/// Forwards every chunk read from `src` into `dst`.
///
/// This installs `src`'s data callback. `dst` is only weakly held: once
/// every other handle to it is gone, chunks are dropped.
pub fn pipe(src: &Stream, dst: &Stream) -> Result<()> {
    let target = Rc::downgrade(&dst.inner);

    src.read_start(move |_, chunk| {
        let Ok(bytes) = chunk else {
            return;
        };
        let Some(inner) = target.upgrade() else {
            return;
        };

        if let Err(err) = (Stream { inner }).write(bytes) {
            tracing::debug!(error = %err, len = bytes.len(), "pipe dropped a chunk");
        }
    })
}

/// Like [`pipe`], passing every chunk through `transform` first.
///
/// The transform appends its output to the buffer it is given. If it
/// fails, that chunk is dropped; both streams stay open and later chunks
/// are still forwarded.
pub fn pipe_through<F>(src: &Stream, dst: &Stream, mut transform: F) -> Result<()>
where
    F: FnMut(&[u8], &mut Buffer) -> Result<()> + 'static,
{
    let target = Rc::downgrade(&dst.inner);

    src.read_start(move |_, chunk| {
        let Ok(bytes) = chunk else {
            return;
        };
        let Some(inner) = target.upgrade() else {
            return;
        };

        let mut out = Buffer::default();
        if let Err(err) = transform(bytes, &mut out) {
            tracing::debug!(error = %err, len = bytes.len(), "transform failed, chunk dropped");
            return;
        }

        if let Err(err) = (Stream { inner }).write(out.as_slice()) {
            tracing::debug!(error = %err, len = out.len(), "pipe dropped a chunk");
        }
    })
}
