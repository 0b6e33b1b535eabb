use kdam::{Bar, BarExt, tqdm};
use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::io::AsyncWrite;

/// Sink which advances a byte progress bar with everything written into it.
pub struct Progress<W> {
    inner: W,
    pb: Bar,
}

impl<W> Progress<W> {
    pub fn new(inner: W, total: u64, position: u64) -> io::Result<Self> {
        let mut pb = tqdm!(
            total = total as usize,
            unit = "B".to_owned(),
            unit_scale = true,
            unit_divisor = 1024,
            dynamic_ncols = true
        );
        pb.update_to(position as usize)?;
        Ok(Self { inner, pb })
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.pb.refresh()?;
        eprintln!();
        Ok(self.inner)
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for Progress<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;

        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                this.pb.update(n)?;
                Poll::Ready(Ok(n))
            }
            x => x,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
