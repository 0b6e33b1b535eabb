use crate::{
    Error, Options, Result,
    decrypt::Decrypter,
    fetch::SegmentFetcher,
    keys::KeyStore,
    playlist::{Playlist, Resume, Segment},
};
use bytes::Bytes;
use log::{debug, info, warn};
use reqwest::Client;
use std::{future::Future, sync::Arc};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc::{self, Receiver, Sender},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

/// enumerate, fetch, decrypt and write
const STAGES: usize = 4;

/// Item passed between two stages. A channel which closes before `End` was
/// received means the sending stage failed or was cancelled.
enum Message<T> {
    Item(T),
    End,
}

struct Fetched {
    index: usize,
    segment: Segment,
    data: Bytes,
}

struct Decrypted {
    index: usize,
    data: Vec<u8>,
}

/// Result of one pipeline run. The first one sent decides the run.
enum Outcome {
    Completed,
    Failed(Error),
}

/// Downloads playlists through a four stage pipeline:
/// enumerate -> fetch -> decrypt -> write.
///
/// Every stage handles one segment at a time and stages are connected by
/// single slot channels, so output order is playlist order and at most a
/// handful of segments are held in memory regardless of playlist length.
#[derive(Clone)]
pub struct Downloader {
    fetcher: SegmentFetcher,
    decrypter: Decrypter,
    cancel: CancellationToken,
}

impl Downloader {
    pub fn new(options: &Options) -> Result<Self> {
        let client = options.client()?;
        let keys = Arc::new(KeyStore::new(client.clone(), options));
        Ok(Self::with_key_store(client, options, keys))
    }

    /// Uses an existing key store, which may be shared with other downloaders.
    pub fn with_key_store(client: Client, options: &Options, keys: Arc<KeyStore>) -> Self {
        Self {
            fetcher: SegmentFetcher::new(client, options),
            decrypter: Decrypter::new(keys),
            cancel: CancellationToken::new(),
        }
    }

    /// Stops running and future downloads once `token` is cancelled. The
    /// segment being written at that moment is still written completely and
    /// the download fails with [`Error::Cancelled`].
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        self.decrypter.keys()
    }

    pub async fn download<W>(&self, sink: &mut W, playlist: &Playlist) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.download_from(sink, playlist, 0).await
    }

    /// Resumes a download of which `n` bytes were already written to `sink`.
    ///
    /// The segment containing byte `n` is downloaded again in full. Returns
    /// immediately without any request when all bytes are written already.
    pub async fn download_after_bytes<W>(&self, sink: &mut W, playlist: &Playlist, n: u64) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match playlist.start_index_for_byte_count(n)? {
            Resume::Complete => {
                info!("Nothing left to download ({} bytes already written)", n);
                Ok(())
            }
            Resume::From(start) => self.download_from(sink, playlist, start).await,
        }
    }

    /// Writes the decrypted segments from entry `start` to the end of the
    /// playlist into `sink`.
    ///
    /// The first failure of any stage cancels all stages and is returned.
    /// `sink` then holds every segment written before the failure, complete.
    pub async fn download_from<W>(&self, sink: &mut W, playlist: &Playlist, start: usize) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if start >= playlist.len() {
            return Err(Error::OutOfRange);
        }

        let segments = playlist
            .present_from(start)
            .map(|(i, x)| (i, x.clone()))
            .collect::<Vec<_>>();
        let total = segments.len();
        info!("Downloading {} segments from index {}", total, start);

        let token = self.cancel.child_token();
        let (outcome_tx, mut outcome_rx) = mpsc::channel(STAGES);
        let (segment_tx, segment_rx) = mpsc::channel(1);
        let (fetched_tx, fetched_rx) = mpsc::channel(1);
        let (decrypted_tx, decrypted_rx) = mpsc::channel(1);

        let mut set = JoinSet::new();
        set.spawn(run_stage(
            "enumerate",
            enumerate(segments, segment_tx, token.clone()),
            outcome_tx.clone(),
            token.clone(),
        ));
        set.spawn(run_stage(
            "fetch",
            fetch(self.fetcher.clone(), segment_rx, fetched_tx, token.clone()),
            outcome_tx.clone(),
            token.clone(),
        ));
        set.spawn(run_stage(
            "decrypt",
            decrypt(self.decrypter.clone(), fetched_rx, decrypted_tx, token.clone()),
            outcome_tx.clone(),
            token.clone(),
        ));

        let writer = run_stage(
            "write",
            write(sink, decrypted_rx, outcome_tx.clone(), token.clone()),
            outcome_tx,
            token.clone(),
        );

        let supervisor = async {
            // None once every stage stopped without reporting, after a panic
            // or an outside cancellation
            let outcome = outcome_rx.recv().await;
            token.cancel();

            let mut panicked = None;

            while let Some(joined) = set.join_next().await {
                if let Err(e) = joined {
                    panicked.get_or_insert(Error::Stage(e.to_string()));
                }
            }

            (outcome, panicked)
        };

        let ((), (outcome, panicked)) = tokio::join!(writer, supervisor);

        match (outcome, panicked) {
            (Some(Outcome::Completed), None) => {
                info!("Downloaded {} segments", total);
                Ok(())
            }
            (Some(Outcome::Failed(e)), _) | (_, Some(e)) => Err(e),
            (None, None) if self.cancel.is_cancelled() => {
                warn!("Download cancelled");
                Err(Error::Cancelled)
            }
            (None, None) => Err(Error::Stage("pipeline stopped without an outcome".to_owned())),
        }
    }
}

async fn run_stage<F>(name: &'static str, stage: F, outcome: Sender<Outcome>, token: CancellationToken)
where
    F: Future<Output = Result<()>>,
{
    if let Err(e) = stage.await {
        warn!("{} stage failed: {}", name, e);
        let _ = outcome.try_send(Outcome::Failed(e));
        token.cancel();
    }
}

async fn send<T>(tx: &Sender<T>, value: T, token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        sent = tx.send(value) => sent.is_ok(),
    }
}

async fn recv<T>(rx: &mut Receiver<T>, token: &CancellationToken) -> Option<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        value = rx.recv() => value,
    }
}

async fn enumerate(
    segments: Vec<(usize, Segment)>,
    tx: Sender<Message<(usize, Segment)>>,
    token: CancellationToken,
) -> Result<()> {
    for segment in segments {
        if !send(&tx, Message::Item(segment), &token).await {
            return Ok(());
        }
    }

    send(&tx, Message::End, &token).await;
    Ok(())
}

async fn fetch(
    fetcher: SegmentFetcher,
    mut rx: Receiver<Message<(usize, Segment)>>,
    tx: Sender<Message<Fetched>>,
    token: CancellationToken,
) -> Result<()> {
    while let Some(message) = recv(&mut rx, &token).await {
        let (index, segment) = match message {
            Message::Item(x) => x,
            Message::End => {
                send(&tx, Message::End, &token).await;
                break;
            }
        };

        let data = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            data = fetcher.fetch(&segment) => data?,
        };
        debug!("Fetched segment {} ({} bytes)", index, data.len());

        let fetched = Fetched {
            index,
            segment,
            data,
        };

        if !send(&tx, Message::Item(fetched), &token).await {
            break;
        }
    }

    Ok(())
}

async fn decrypt(
    decrypter: Decrypter,
    mut rx: Receiver<Message<Fetched>>,
    tx: Sender<Message<Decrypted>>,
    token: CancellationToken,
) -> Result<()> {
    while let Some(message) = recv(&mut rx, &token).await {
        let fetched = match message {
            Message::Item(x) => x,
            Message::End => {
                send(&tx, Message::End, &token).await;
                break;
            }
        };

        let data = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            data = decrypter.process(fetched.data, &fetched.segment) => data?,
        };
        debug!("Decrypted segment {}", fetched.index);

        let decrypted = Decrypted {
            index: fetched.index,
            data,
        };

        if !send(&tx, Message::Item(decrypted), &token).await {
            break;
        }
    }

    Ok(())
}

/// Runs on the caller's task. A segment is always written completely, even
/// when the run gets cancelled meanwhile.
async fn write<W>(
    sink: &mut W,
    mut rx: Receiver<Message<Decrypted>>,
    outcome: Sender<Outcome>,
    token: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    while let Some(message) = recv(&mut rx, &token).await {
        match message {
            Message::Item(decrypted) => {
                sink.write_all(&decrypted.data).await?;
                debug!("Wrote segment {} ({} bytes)", decrypted.index, decrypted.data.len());
            }
            Message::End => {
                sink.flush().await?;
                let _ = outcome.try_send(Outcome::Completed);
                break;
            }
        }
    }

    Ok(())
}
