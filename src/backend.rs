use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConfigError, Format, LogConfig};
use crate::console_sink::ConsoleSink;
use crate::encoder::{ConsoleEncoder, Encoder, JsonEncoder};
use crate::file_sink::{Rotation, RotatingFileSink};
use crate::sink::{Sink, SinkError};
use crate::stream::{StreamOptions, StreamSink, TcpPublisher};

/// How long the stream sink waits for a broker at construction time.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Supported sink kinds that can be selected via the `output` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Console,
    File,
    Stream,
}

/// Wire transport of the stream sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTransport {
    Tcp,
    Kafka,
}

/// Validated sink selection. Exactly one variant is active and it always
/// carries the fields that variant needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkConfig {
    Console,
    File {
        path: PathBuf,
        rotation: Rotation,
    },
    Stream {
        brokers: Vec<String>,
        topic: String,
        transport: StreamTransport,
    },
}

impl SinkConfig {
    pub fn kind(&self) -> SinkKind {
        match self {
            SinkConfig::Console => SinkKind::Console,
            SinkConfig::File { .. } => SinkKind::File,
            SinkConfig::Stream { .. } => SinkKind::Stream,
        }
    }
}

/// Turn the flat [`LogConfig`] into a [`SinkConfig`].
///
/// Unrecognized `output` values select the console. Fields belonging to
/// the other kinds are ignored.
pub fn sink_config(cfg: &LogConfig) -> Result<SinkConfig, ConfigError> {
    match cfg.output.as_str() {
        "file" => {
            if cfg.path.trim().is_empty() {
                return Err(ConfigError::MissingPath);
            }
            Ok(SinkConfig::File {
                path: PathBuf::from(&cfg.path),
                rotation: Rotation::from_limits(cfg.rotate_size, cfg.keep_hours, cfg.rotate_num),
            })
        }
        "stream" => {
            let brokers = cfg.brokers();
            let topic = cfg.stream_topic.trim();
            if brokers.is_empty() || topic.is_empty() {
                return Err(ConfigError::MissingStreamTarget);
            }
            let transport = match cfg.stream_transport.as_str() {
                "" | "tcp" => StreamTransport::Tcp,
                "kafka" => StreamTransport::Kafka,
                other => return Err(ConfigError::UnsupportedTransport(other.to_string())),
            };
            Ok(SinkConfig::Stream {
                brokers,
                topic: topic.to_string(),
                transport,
            })
        }
        _ => Ok(SinkConfig::Console),
    }
}

/// Error type returned when building a sink from configuration.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("kafka transport requires the `kafka` feature")]
    KafkaFeatureDisabled,
}

/// Create a concrete [`Sink`] from a [`SinkConfig`].
///
/// File sinks create their directories; stream sinks connect to the broker
/// and fail here if it is unreachable.
pub fn make_sink_from_config(cfg: &SinkConfig) -> Result<Arc<dyn Sink>, BuildError> {
    match cfg {
        SinkConfig::Console => Ok(Arc::new(ConsoleSink::stdout())),
        SinkConfig::File { path, rotation } => {
            let sink = RotatingFileSink::open(path, *rotation).map_err(SinkError::from)?;
            Ok(Arc::new(sink))
        }
        SinkConfig::Stream {
            brokers,
            topic,
            transport: StreamTransport::Tcp,
        } => {
            let brokers = brokers.clone();
            let sink = StreamSink::spawn(topic.clone(), StreamOptions::default(), move || {
                TcpPublisher::connect(brokers, CONNECT_TIMEOUT)
            })?;
            Ok(Arc::new(sink))
        }
        SinkConfig::Stream {
            brokers,
            topic,
            transport: StreamTransport::Kafka,
        } => {
            #[cfg(feature = "kafka")]
            {
                use crate::kafka::KafkaPublisher;

                let brokers = brokers.join(",");
                let probe_topic = topic.clone();
                let sink = StreamSink::spawn(topic.clone(), StreamOptions::default(), move || async move {
                    KafkaPublisher::connect(&brokers, &probe_topic, CONNECT_TIMEOUT).await
                })?;
                Ok(Arc::new(sink))
            }

            #[cfg(not(feature = "kafka"))]
            {
                let _ = (brokers, topic); // silence unused warning when feature is disabled
                Err(BuildError::KafkaFeatureDisabled)
            }
        }
    }
}

/// Encoder selected by the `format` and `utc` keys.
pub fn make_encoder(cfg: &LogConfig) -> Arc<dyn Encoder> {
    match cfg.format() {
        Format::Json => Arc::new(JsonEncoder::new().utc(cfg.utc)),
        Format::Console => Arc::new(ConsoleEncoder::new().utc(cfg.utc)),
    }
}
