//! Byte-level progress for a single transfer.

use std::io::IsTerminal;
use std::pin::Pin;
use std::task::{Context, Poll};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncRead, ReadBuf};

const TEMPLATE: &str =
    "[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}";

/// Create a bar sized to `total` bytes.
///
/// Returns `None` when progress is disabled. When stdout is not a TTY the bar
/// is hidden but still counts bytes.
pub fn create_progress_bar(enabled: bool, total: u64) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    if !std::io::stdout().is_terminal() {
        return Some(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    Some(pb)
}

/// Run `f` with the bar cleared from the terminal, if there is one.
pub fn suspend<F: FnOnce()>(bar: Option<&ProgressBar>, f: F) {
    match bar {
        Some(bar) => bar.suspend(f),
        None => f(),
    }
}

/// Counting proxy around a reader.
///
/// Bytes and errors from the inner reader pass through untouched. The bar is
/// finished at end of stream and abandoned if the reader is dropped before.
pub struct ProgressReader<R> {
    inner: R,
    bar: ProgressBar,
    finished: bool,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, bar: ProgressBar) -> Self {
        Self {
            inner,
            bar,
            finished: false,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = &mut *self;
        let before = buf.filled().len();
        let had_room = buf.remaining() > 0;
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let read = buf.filled().len() - before;
            if read > 0 {
                this.bar.inc(read as u64);
            } else if had_room && !this.finished {
                this.finished = true;
                this.bar.finish();
            }
        }
        poll
    }
}

impl<R> Drop for ProgressReader<R> {
    fn drop(&mut self) {
        if !self.finished {
            self.bar.abandon();
        }
    }
}
