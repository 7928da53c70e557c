//! FileTransport - appends serialized events to one file per destination key

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use contracts::{
    ConnectionState, ContractError, DestinationKey, Event, StreamDefinition, Transport,
    TransportDescriptor,
};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

use super::codec::{EventCodec, WireFormat};
use super::ConnectionCell;
use crate::routing::RoutingTemplate;

const DEFAULT_MAX_OPEN_FILES: usize = 64;

/// Configuration for FileTransport
#[derive(Debug, Clone)]
pub struct FileTransportConfig {
    /// Base output directory
    pub base_path: PathBuf,
    pub format: WireFormat,
    /// fsync after every record
    pub sync: bool,
    /// Open handles kept at most; the least recently written is closed first
    pub max_open_files: usize,
}

impl FileTransportConfig {
    pub fn from_descriptor(descriptor: &TransportDescriptor) -> Result<Self, ContractError> {
        let base_path = PathBuf::from(descriptor.require_destination()?);
        let format = WireFormat::from_params(&descriptor.params)?;
        let properties = super::properties_for(descriptor);
        let sync = properties.parse_value("sync").unwrap_or(false);
        let max_open_files = properties
            .parse_value::<usize>("max.open.files")
            .unwrap_or(DEFAULT_MAX_OPEN_FILES)
            .max(1);

        Ok(Self {
            base_path,
            format,
            sync,
            max_open_files,
        })
    }
}

struct OpenFile {
    file: File,
    last_write: u64,
}

/// Open handles by destination, bounded by `max_open_files`
#[derive(Default)]
struct FileCache {
    files: HashMap<DestinationKey, OpenFile>,
    clock: u64,
}

impl FileCache {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Remove the least recently written handle
    fn evict_oldest(&mut self) -> Option<(DestinationKey, File)> {
        let oldest = self
            .files
            .iter()
            .min_by_key(|(_, open)| open.last_write)
            .map(|(key, _)| key.clone())?;
        self.files.remove(&oldest).map(|open| (oldest, open.file))
    }
}

/// Transport that writes events under `<base_path>/<destination>.<ext>`
pub struct FileTransport {
    name: String,
    config: FileTransportConfig,
    codec: EventCodec,
    routing: RoutingTemplate,
    state: ConnectionCell,
    files: Mutex<FileCache>,
}

impl FileTransport {
    pub fn new(
        name: impl Into<String>,
        stream: &StreamDefinition,
        routing: RoutingTemplate,
        config: FileTransportConfig,
    ) -> Self {
        let name = name.into();
        Self {
            codec: EventCodec::new(&name, stream, config.format),
            name,
            config,
            routing,
            state: ConnectionCell::new(),
            files: Mutex::new(FileCache::default()),
        }
    }

    /// Create from a descriptor (for the registry)
    pub fn from_descriptor(
        descriptor: &TransportDescriptor,
        stream: &StreamDefinition,
    ) -> Result<Self, ContractError> {
        let config = FileTransportConfig::from_descriptor(descriptor)?;
        let routing = super::routing_for(descriptor, stream)?;
        Ok(Self::new(&descriptor.name, stream, routing, config))
    }

    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    /// Path of the file a destination key is written to
    pub fn path_for(&self, destination: &DestinationKey) -> PathBuf {
        let file_name: String = destination
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect();
        self.config
            .base_path
            .join(format!("{}.{}", file_name, self.config.format.extension()))
    }

    /// Number of output files currently held open
    pub async fn open_file_count(&self) -> usize {
        self.files.lock().await.files.len()
    }

    async fn append(&self, destination: &DestinationKey, record: &[u8]) -> std::io::Result<()> {
        let mut cache = self.files.lock().await;
        let now = cache.tick();

        if !cache.files.contains_key(destination) {
            while cache.files.len() >= self.config.max_open_files {
                let Some((evicted, mut file)) = cache.evict_oldest() else {
                    break;
                };
                if let Err(e) = file.flush().await {
                    error!(transport = %self.name, destination = %evicted, error = %e, "Flush failed on evict");
                }
                debug!(transport = %self.name, destination = %evicted, "Closed idle output file");
            }

            let path = self.path_for(destination);
            let file = OpenOptions::new().create(true).append(true).open(&path).await?;
            debug!(transport = %self.name, path = %path.display(), "Opened output file");
            cache
                .files
                .insert(destination.clone(), OpenFile { file, last_write: now });
        }

        let open = cache
            .files
            .get_mut(destination)
            .ok_or_else(|| std::io::Error::other("output file vanished"))?;
        open.last_write = now;
        open.file.write_all(record).await?;
        if self.config.sync {
            open.file.sync_data().await?;
        }
        Ok(())
    }

    async fn close_files(&self) -> Result<(), ContractError> {
        let mut cache = self.files.lock().await;
        for (destination, OpenFile { mut file, .. }) in cache.files.drain() {
            if let Err(e) = file.flush().await {
                error!(transport = %self.name, destination = %destination, error = %e, "Flush failed on close");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for FileTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport_type(&self) -> &str {
        "file"
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn resolve_destination(&self, event: &Event) -> Result<DestinationKey, ContractError> {
        self.routing.resolve(&self.name, event)
    }

    #[instrument(name = "file_transport_connect", skip(self), fields(transport = %self.name))]
    async fn connect(&self) -> Result<(), ContractError> {
        if self.state.is_connected() {
            return Ok(());
        }
        self.state.set(ConnectionState::Connecting);
        if let Err(e) = fs::create_dir_all(&self.config.base_path).await {
            self.state.set(ConnectionState::Disconnected);
            return Err(ContractError::connection_unavailable(
                &self.name,
                format!("cannot create '{}': {e}", self.config.base_path.display()),
            ));
        }
        self.state.set(ConnectionState::Connected);
        debug!(transport = %self.name, path = %self.config.base_path.display(), "FileTransport ready");
        Ok(())
    }

    #[instrument(
        name = "file_transport_send",
        skip(self, event),
        fields(transport = %self.name, destination = %destination)
    )]
    async fn send(&self, destination: &DestinationKey, event: &Event) -> Result<(), ContractError> {
        if !self.state.is_connected() {
            return Err(ContractError::connection_unavailable(&self.name, "not connected"));
        }
        let record = self.codec.encode_record(destination, event)?;
        self.append(destination, &record)
            .await
            .map_err(|e| ContractError::send_failure(&self.name, e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), ContractError> {
        self.state.set(ConnectionState::Disconnected);
        self.close_files().await
    }

    #[instrument(name = "file_transport_shutdown", skip(self))]
    async fn shutdown(&self) -> Result<(), ContractError> {
        self.disconnect().await?;
        debug!(transport = %self.name, "FileTransport closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Attribute, AttributeType};
    use tempfile::tempdir;

    fn stream() -> StreamDefinition {
        StreamDefinition::new(
            "StockStream",
            vec![
                Attribute::new("symbol", AttributeType::String),
                Attribute::new("price", AttributeType::Double),
            ],
        )
    }

    #[tokio::test]
    async fn test_writes_one_file_per_destination() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let descriptor = TransportDescriptor::new("archive", "file")
            .with_destination(out.to_string_lossy())
            .with_routing_key("stock-{{symbol}}");
        let transport = FileTransport::from_descriptor(&descriptor, &stream()).unwrap();
        transport.connect().await.unwrap();

        for (ts, symbol) in [(1, "IBM"), (2, "WSO2"), (3, "IBM")] {
            let event = Event::new(ts, vec![symbol.into(), 10.0f64.into()]);
            let key = transport.resolve_destination(&event).unwrap();
            transport.send(&key, &event).await.unwrap();
        }
        transport.shutdown().await.unwrap();

        let ibm = std::fs::read_to_string(out.join("stock-IBM.jsonl")).unwrap();
        let lines: Vec<_> = ibm.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["timestamp"], 1);
        assert_eq!(first["data"]["symbol"], "IBM");

        let wso2 = std::fs::read_to_string(out.join("stock-WSO2.jsonl")).unwrap();
        assert_eq!(wso2.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_send_before_connect_is_unavailable() {
        let dir = tempdir().unwrap();
        let descriptor = TransportDescriptor::new("archive", "file")
            .with_destination(dir.path().to_string_lossy());
        let transport = FileTransport::from_descriptor(&descriptor, &stream()).unwrap();

        let event = Event::new(1, vec!["IBM".into(), 1.0f64.into()]);
        let err = transport
            .send(&DestinationKey::from("archive"), &event)
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::ConnectionUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_open_handles_bounded() {
        let dir = tempdir().unwrap();
        let descriptor = TransportDescriptor::new("archive", "file")
            .with_destination(dir.path().to_string_lossy())
            .with_routing_key("{{symbol}}")
            .with_properties("max.open.files:4");
        let transport = FileTransport::from_descriptor(&descriptor, &stream()).unwrap();
        assert_eq!(transport.config.max_open_files, 4);
        transport.connect().await.unwrap();

        for ts in 0..50 {
            let event = Event::new(ts, vec![format!("S{ts}").into(), 1.0f64.into()]);
            let key = transport.resolve_destination(&event).unwrap();
            transport.send(&key, &event).await.unwrap();
            assert!(transport.open_file_count().await <= 4);
        }

        // Evicted destinations reopen in append mode
        let again = Event::new(50, vec!["S0".into(), 2.0f64.into()]);
        let key = transport.resolve_destination(&again).unwrap();
        transport.send(&key, &again).await.unwrap();
        assert_eq!(transport.open_file_count().await, 4);
        transport.shutdown().await.unwrap();
        assert_eq!(transport.open_file_count().await, 0);

        for ts in 1..50 {
            let content = std::fs::read_to_string(dir.path().join(format!("S{ts}.jsonl"))).unwrap();
            assert_eq!(content.lines().count(), 1);
        }
        let s0 = std::fs::read_to_string(dir.path().join("S0.jsonl")).unwrap();
        assert_eq!(s0.lines().count(), 2);
    }

    #[test]
    fn test_default_handle_limit() {
        let descriptor = TransportDescriptor::new("archive", "file")
            .with_destination("/tmp/x")
            .with_properties("max.open.files:0");
        let config = FileTransportConfig::from_descriptor(&descriptor).unwrap();
        assert_eq!(config.max_open_files, 1);

        let descriptor = TransportDescriptor::new("archive", "file").with_destination("/tmp/x");
        let config = FileTransportConfig::from_descriptor(&descriptor).unwrap();
        assert_eq!(config.max_open_files, DEFAULT_MAX_OPEN_FILES);
    }

    #[test]
    fn test_missing_destination_rejected() {
        let descriptor = TransportDescriptor::new("archive", "file");
        let err = FileTransport::from_descriptor(&descriptor, &stream()).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_path_sanitized() {
        let descriptor = TransportDescriptor::new("archive", "file").with_destination("/tmp/x");
        let transport = FileTransport::from_descriptor(&descriptor, &stream()).unwrap();
        let path = transport.path_for(&DestinationKey::from("a/b c"));
        assert_eq!(path, PathBuf::from("/tmp/x/a_b_c.jsonl"));
    }
}
