//! Live tail: change feed to log stream
//!
//! `open` returns immediately; a spawned task resolves the start offset,
//! connects the feed and forwards every live log document. The session
//! offset follows each change so a consumer can resume with
//! `StreamOptions::since(stream.offset())`.

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{FeedOptions, LogRecord, StreamOffset, StreamOptions};
use crate::error::TransportError;
use crate::metrics::TransportMetrics;
use crate::ports::DocumentStore;

/// Events buffered between the feed task and the consumer.
pub const STREAM_BUFFER: usize = 1024;

/// Item of a [`LogStream`].
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// `params` of a newly written log.
    Log(LogRecord),
    /// The feed failed or closed; nothing follows.
    Error(TransportError),
}

/// Shared between the stream handle and its feed task.
#[derive(Debug)]
struct StreamSession {
    offset: Mutex<Option<StreamOffset>>,
    live: AtomicBool,
}

impl StreamSession {
    fn new() -> Self {
        Self {
            offset: Mutex::new(None),
            live: AtomicBool::new(true),
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn advance(&self, offset: StreamOffset) {
        *self.offset.lock() = Some(offset);
    }
}

/// A cancelable live stream of log records.
pub struct LogStream {
    receiver: mpsc::Receiver<StreamEvent>,
    session: Arc<StreamSession>,
    task: Option<JoinHandle<()>>,
}

impl LogStream {
    /// Start tailing `store`.
    pub fn open(
        store: Arc<dyn DocumentStore>,
        options: StreamOptions,
        metrics: Arc<TransportMetrics>,
    ) -> Self {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return Self::failed(TransportError::Feed(
                "log streams need a tokio runtime".to_string(),
            ));
        };

        metrics.record_stream_opened();
        let (sender, receiver) = mpsc::channel(STREAM_BUFFER);
        let session = Arc::new(StreamSession::new());
        let feed = FeedTask {
            store,
            options,
            session: session.clone(),
            sender,
            metrics,
        };
        let task = handle.spawn(feed.run());

        Self {
            receiver,
            session,
            task: Some(task),
        }
    }

    /// A stream that yields `error` and ends.
    pub fn failed(error: TransportError) -> Self {
        let (sender, receiver) = mpsc::channel(1);
        let _ = sender.try_send(StreamEvent::Error(error));
        Self {
            receiver,
            session: Arc::new(StreamSession::new()),
            task: None,
        }
    }

    /// Next event; `None` once the stream has ended or been destroyed.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        if !self.session.is_live() {
            return None;
        }
        let event = self.receiver.recv().await?;
        self.session.is_live().then_some(event)
    }

    /// Stop the stream. Safe to call any number of times.
    pub fn destroy(&self) {
        if self.session.live.swap(false, Ordering::AcqRel) {
            debug!("Log stream destroyed");
        }
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_live(&self) -> bool {
        self.session.is_live()
    }

    /// Sequence of the last change seen, to resume from later.
    pub fn offset(&self) -> Option<StreamOffset> {
        self.session.offset.lock().clone()
    }
}

impl Stream for LogStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if !this.session.is_live() {
            return Poll::Ready(None);
        }
        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(_)) if !this.session.is_live() => Poll::Ready(None),
            other => other,
        }
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.destroy();
    }
}

struct FeedTask {
    store: Arc<dyn DocumentStore>,
    options: StreamOptions,
    session: Arc<StreamSession>,
    sender: mpsc::Sender<StreamEvent>,
    metrics: Arc<TransportMetrics>,
}

impl FeedTask {
    async fn run(self) {
        if let Err(e) = self.forward().await {
            if self.session.is_live() {
                warn!(error = %e, "Log stream ended");
                let _ = self.sender.send(StreamEvent::Error(e)).await;
            }
        }
    }

    async fn forward(&self) -> Result<(), TransportError> {
        let since = match self.options.resolved_start() {
            Some(offset) => offset,
            None => self.current_tip().await?,
        };
        self.session.advance(since.clone());
        debug!(since = %since, db = self.store.database(), "Opening change feed");

        let mut feed = self.store.follow(FeedOptions::continuous(since)).await?;
        while let Some(item) = feed.next().await {
            if !self.session.is_live() {
                return Ok(());
            }
            let change = item?;
            self.session.advance(change.seq.clone());

            let Some(params) = change.log_params() else {
                continue;
            };
            let event = StreamEvent::Log(LogRecord::new(params.clone()));
            if self.sender.send(event).await.is_err() {
                return Ok(());
            }
            self.metrics.record_stream_event();
        }

        Err(TransportError::Feed("change feed closed".to_string()))
    }

    async fn current_tip(&self) -> Result<StreamOffset, TransportError> {
        match self.store.info().await? {
            Some(info) => Ok(info.update_seq),
            None => Err(TransportError::Feed(format!(
                "database '{}' does not exist",
                self.store.database()
            ))),
        }
    }
}
