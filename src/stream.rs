use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

use crate::console_sink::ConsoleSink;
use crate::sink::{Sink, SinkError};

/// Transport that delivers one message to a named topic of a broker.
///
/// Implementations are driven from the stream sink's worker thread, one
/// message at a time, so they never see concurrent `publish` calls.
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), SinkError>;

    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Tuning knobs for [`StreamSink`].
///
/// **Fields**
/// - `queue_capacity`: lines buffered between callers and the worker
///   before new lines spill to the fallback sink.
/// - `flush_timeout`: upper bound on how long `flush` waits for the queue
///   to drain.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub queue_capacity: usize,
    pub flush_timeout: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            flush_timeout: Duration::from_secs(5),
        }
    }
}

enum Command {
    Publish(Vec<u8>),
    Flush(std_mpsc::SyncSender<()>),
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    failed: AtomicU64,
    overflowed: AtomicU64,
}

/// Sink that publishes every line as one message to a broker topic.
///
/// Writes are queued on a bounded channel and published by a dedicated
/// worker thread running its own current-thread Tokio runtime, so callers
/// never wait on the network and no ambient runtime is required. Publish
/// failures are written to a fallback console sink (stderr) and counted;
/// they never reach the logging caller.
pub struct StreamSink {
    topic: String,
    sender: Option<mpsc::Sender<Command>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
    flush_timeout: Duration,
}

impl StreamSink {
    /// Start the worker and connect the publisher produced by `connect`.
    ///
    /// Blocks until `connect` resolves. Fails with
    /// [`SinkError::Connection`] if the broker is unreachable, so a bad
    /// endpoint is reported at startup rather than on the first write.
    pub fn spawn<P, C, Fut>(
        topic: impl Into<String>,
        options: StreamOptions,
        connect: C,
    ) -> Result<Self, SinkError>
    where
        P: Publisher,
        C: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<P, SinkError>> + 'static,
    {
        Self::spawn_with_fallback(topic, options, Arc::new(ConsoleSink::stderr()), connect)
    }

    /// Same as [`StreamSink::spawn`] with an explicit fallback sink.
    pub fn spawn_with_fallback<P, C, Fut>(
        topic: impl Into<String>,
        options: StreamOptions,
        fallback: Arc<dyn Sink>,
        connect: C,
    ) -> Result<Self, SinkError>
    where
        P: Publisher,
        C: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<P, SinkError>> + 'static,
    {
        let topic = topic.into();
        let (tx, rx) = mpsc::channel::<Command>(options.queue_capacity.max(16));
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), SinkError>>();
        let counters = Arc::new(Counters::default());

        let worker_topic = topic.clone();
        let worker_counters = Arc::clone(&counters);
        let worker = thread::Builder::new()
            .name("log-stream".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(SinkError::Io(e)));
                        return;
                    }
                };
                runtime.block_on(async move {
                    let publisher = match connect().await {
                        Ok(p) => p,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));
                    run_worker(publisher, worker_topic, rx, fallback, worker_counters).await;
                });
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(StreamSink {
                topic,
                sender: Some(tx),
                worker: Some(worker),
                counters,
                flush_timeout: options.flush_timeout,
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(SinkError::Connection("stream worker exited during connect".to_string()))
            }
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Messages accepted by the broker.
    pub fn published(&self) -> u64 {
        self.counters.published.load(Ordering::Relaxed)
    }

    /// Messages the publisher rejected; each one went to the fallback sink.
    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// Lines refused because the queue was full.
    pub fn overflowed(&self) -> u64 {
        self.counters.overflowed.load(Ordering::Relaxed)
    }
}

async fn run_worker<P: Publisher>(
    publisher: P,
    topic: String,
    mut rx: mpsc::Receiver<Command>,
    fallback: Arc<dyn Sink>,
    counters: Arc<Counters>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Publish(line) => match publisher.publish(&topic, &line).await {
                Ok(()) => {
                    counters.published.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    let notice = format!("log stream publish to {} failed: {}\n", topic, e);
                    let _ = fallback.write(notice.as_bytes());
                    let _ = fallback.write(&line);
                }
            },
            Command::Flush(done) => {
                if let Err(e) = publisher.flush().await {
                    let notice = format!("log stream flush failed: {}\n", e);
                    let _ = fallback.write(notice.as_bytes());
                }
                let _ = done.send(());
            }
        }
    }
    let _ = publisher.flush().await;
}

impl Sink for StreamSink {
    fn write(&self, line: &[u8]) -> Result<(), SinkError> {
        let sender = self.sender.as_ref().ok_or(SinkError::Closed)?;
        match sender.try_send(Command::Publish(line.to_vec())) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.overflowed.fetch_add(1, Ordering::Relaxed);
                Err(SinkError::Publish("stream queue full".to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }

    /// Wait until every line queued before this call has been handed to
    /// the publisher, or until the flush timeout passes.
    fn flush(&self) -> Result<(), SinkError> {
        let sender = self.sender.as_ref().ok_or(SinkError::Closed)?;
        let deadline = Instant::now() + self.flush_timeout;
        let (done_tx, done_rx) = std_mpsc::sync_channel(1);

        let mut command = Command::Flush(done_tx);
        loop {
            match sender.try_send(command) {
                Ok(()) => break,
                Err(mpsc::error::TrySendError::Closed(_)) => return Err(SinkError::Closed),
                Err(mpsc::error::TrySendError::Full(returned)) => {
                    if Instant::now() >= deadline {
                        return Err(SinkError::Publish("flush timed out".to_string()));
                    }
                    command = returned;
                    thread::sleep(Duration::from_millis(5));
                }
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        done_rx
            .recv_timeout(remaining)
            .map_err(|_| SinkError::Publish("flush timed out".to_string()))
    }
}

impl Drop for StreamSink {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is queued and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[derive(Serialize)]
struct Frame<'a> {
    topic: &'a str,
    message: &'a str,
}

/// Publisher speaking newline-delimited JSON frames over TCP:
///
/// ```text
/// {"topic":"app-logs","message":"2024-06-08 00:51:55\tINFO\tready"}
/// ```
///
/// Brokers are tried in order; after a failed write the connection is
/// dropped and re-established on the next publish.
pub struct TcpPublisher {
    brokers: Vec<String>,
    timeout: Duration,
    conn: Mutex<Option<TcpStream>>,
}

impl TcpPublisher {
    pub async fn connect(brokers: Vec<String>, timeout: Duration) -> Result<Self, SinkError> {
        let stream = dial(&brokers, timeout).await?;
        Ok(TcpPublisher {
            brokers,
            timeout,
            conn: Mutex::new(Some(stream)),
        })
    }
}

async fn dial(brokers: &[String], timeout: Duration) -> Result<TcpStream, SinkError> {
    let mut last_err = None;
    for broker in brokers {
        match tokio::time::timeout(timeout, TcpStream::connect(broker.as_str())).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => last_err = Some(format!("{}: {}", broker, e)),
            Err(_) => last_err = Some(format!("{}: connect timed out", broker)),
        }
    }
    Err(SinkError::Connection(
        last_err.unwrap_or_else(|| "no brokers configured".to_string()),
    ))
}

#[async_trait]
impl Publisher for TcpPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), SinkError> {
        let text = String::from_utf8_lossy(payload);
        let frame = Frame {
            topic,
            message: text.trim_end_matches('\n'),
        };
        let mut bytes =
            serde_json::to_vec(&frame).map_err(|e| SinkError::Publish(e.to_string()))?;
        bytes.push(b'\n');

        let mut conn = self.conn.lock().await;
        if conn.is_none() {
            *conn = Some(dial(&self.brokers, self.timeout).await?);
        }
        let Some(stream) = conn.as_mut() else {
            return Err(SinkError::Closed);
        };

        let result = match tokio::time::timeout(self.timeout, stream.write_all(&bytes)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SinkError::Io(e)),
            Err(_) => Err(SinkError::Publish("write timed out".to_string())),
        };
        if result.is_err() {
            conn.take();
        }
        result
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let mut conn = self.conn.lock().await;
        if let Some(stream) = conn.as_mut() {
            stream.flush().await?;
        }
        Ok(())
    }
}
