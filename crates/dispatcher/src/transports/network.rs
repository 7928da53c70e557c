//! NetworkTransport - TCP (length-prefixed frames) or UDP (one datagram per event)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use contracts::{
    ConnectionState, ContractError, DestinationKey, Event, StreamDefinition, Transport,
    TransportDescriptor,
};
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

use super::codec::{EventCodec, WireFormat};
use super::ConnectionCell;
use crate::properties::Properties;
use crate::routing::RoutingTemplate;

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(5000);
const DEFAULT_MAX_PACKET_SIZE: usize = 65000;
const KNOWN_PROPERTIES: &[&str] = &["tcp.nodelay", "send.timeout.ms"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

/// Configuration for NetworkTransport
#[derive(Debug, Clone)]
pub struct NetworkTransportConfig {
    /// Target `host:port`, resolved on connect
    pub addr: String,
    pub protocol: Protocol,
    pub format: WireFormat,
    pub nodelay: bool,
    pub send_timeout: Duration,
    /// Max datagram size (UDP only)
    pub max_packet_size: usize,
}

impl NetworkTransportConfig {
    pub fn from_descriptor(descriptor: &TransportDescriptor) -> Result<Self, ContractError> {
        let addr = descriptor.require_destination()?;
        validate_addr(addr).map_err(|msg| {
            ContractError::configuration(format!("transports[{}].destination", descriptor.name), msg)
        })?;

        let protocol = match descriptor.params.get("protocol").map(String::as_str) {
            Some("tcp") | None => Protocol::Tcp,
            Some("udp") => Protocol::Udp,
            Some(other) => {
                return Err(ContractError::configuration(
                    "params.protocol",
                    format!("unknown protocol '{other}', expected tcp or udp"),
                ));
            }
        };

        let max_packet_size = parse_param(&descriptor.params, "max_packet_size")?
            .unwrap_or(DEFAULT_MAX_PACKET_SIZE);

        let properties = super::properties_for(descriptor);
        log_unrecognised(&descriptor.name, &properties);

        Ok(Self {
            addr: addr.to_string(),
            protocol,
            format: WireFormat::from_params(&descriptor.params)?,
            nodelay: properties.parse_value("tcp.nodelay").unwrap_or(false),
            send_timeout: properties
                .parse_value("send.timeout.ms")
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SEND_TIMEOUT),
            max_packet_size,
        })
    }
}

fn validate_addr(addr: &str) -> Result<(), String> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| format!("invalid address '{addr}', expected host:port"))?;
    if host.is_empty() {
        return Err(format!("invalid address '{addr}', empty host"));
    }
    port.parse::<u16>()
        .map(|_| ())
        .map_err(|e| format!("invalid port in '{addr}': {e}"))
}

fn parse_param<T: std::str::FromStr>(
    params: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, ContractError>
where
    T::Err: std::fmt::Display,
{
    params
        .get(key)
        .map(|raw| {
            raw.parse()
                .map_err(|e| ContractError::configuration(format!("params.{key}"), format!("{e}")))
        })
        .transpose()
}

fn log_unrecognised(transport: &str, properties: &Properties) {
    for (key, value) in properties.iter() {
        if !KNOWN_PROPERTIES.contains(&key) {
            debug!(transport, key, value, "Ignoring unrecognised property");
        }
    }
}

/// TCP stream plus a marker for frames that were started but not finished
struct TcpLink {
    stream: TcpStream,
    mid_frame: bool,
}

enum Link {
    Tcp(Mutex<TcpLink>),
    Udp(UdpSocket),
}

enum TransmitError {
    /// A previous writer left the stream mid-frame
    Stale,
    TimedOut,
    Io(std::io::Error),
}

/// Transport that streams events to a remote peer
pub struct NetworkTransport {
    name: String,
    config: NetworkTransportConfig,
    codec: EventCodec,
    routing: RoutingTemplate,
    state: ConnectionCell,
    link: RwLock<Option<Arc<Link>>>,
    connect_lock: Mutex<()>,
}

impl NetworkTransport {
    pub fn new(
        name: impl Into<String>,
        stream: &StreamDefinition,
        routing: RoutingTemplate,
        config: NetworkTransportConfig,
    ) -> Self {
        let name = name.into();
        Self {
            codec: EventCodec::new(&name, stream, config.format),
            name,
            config,
            routing,
            state: ConnectionCell::new(),
            link: RwLock::new(None),
            connect_lock: Mutex::new(()),
        }
    }

    /// Create from a descriptor (for the registry)
    pub fn from_descriptor(
        descriptor: &TransportDescriptor,
        stream: &StreamDefinition,
    ) -> Result<Self, ContractError> {
        let config = NetworkTransportConfig::from_descriptor(descriptor)?;
        let routing = super::routing_for(descriptor, stream)?;
        Ok(Self::new(&descriptor.name, stream, routing, config))
    }

    pub fn config(&self) -> &NetworkTransportConfig {
        &self.config
    }

    async fn open_link(&self) -> std::io::Result<Link> {
        match self.config.protocol {
            Protocol::Tcp => {
                let stream = TcpStream::connect(self.config.addr.as_str()).await?;
                stream.set_nodelay(self.config.nodelay)?;
                Ok(Link::Tcp(Mutex::new(TcpLink {
                    stream,
                    mid_frame: false,
                })))
            }
            Protocol::Udp => {
                let target = lookup_host(self.config.addr.as_str()).await?.next().ok_or_else(|| {
                    std::io::Error::other(format!("'{}' did not resolve", self.config.addr))
                })?;
                let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
                let socket = UdpSocket::bind(local).await?;
                socket.connect(target).await?;
                Ok(Link::Udp(socket))
            }
        }
    }

    /// Current link, reconnecting once if the previous one was lost
    async fn link(&self) -> Result<Arc<Link>, ContractError> {
        if let Some(link) = self.link.read().await.as_ref() {
            return Ok(Arc::clone(link));
        }

        debug!(transport = %self.name, addr = %self.config.addr, "Reconnecting");
        self.connect().await?;
        self.link
            .read()
            .await
            .clone()
            .ok_or_else(|| ContractError::connection_unavailable(&self.name, "connection closed"))
    }

    /// Forget `failed` unless someone already replaced it
    async fn drop_link(&self, failed: &Arc<Link>) {
        let mut link = self.link.write().await;
        if link.as_ref().is_some_and(|current| Arc::ptr_eq(current, failed)) {
            *link = None;
            self.state.set(ConnectionState::Disconnected);
        }
    }

    /// Write one payload; the send timeout starts once the stream lock is held
    ///
    /// The TCP stream is marked mid-frame for the duration of the write, so a
    /// failed, timed out or cancelled write leaves it unusable for the writers
    /// queued behind it.
    async fn transmit(&self, link: &Link, payload: &Bytes) -> Result<(), TransmitError> {
        let limit = self.config.send_timeout;
        match link {
            Link::Tcp(tcp) => {
                let mut tcp = tcp.lock().await;
                if tcp.mid_frame {
                    return Err(TransmitError::Stale);
                }

                tcp.mid_frame = true;
                let written = tokio::time::timeout(limit, async {
                    tcp.stream.write_all(payload).await?;
                    tcp.stream.flush().await
                })
                .await;

                match written {
                    Ok(Ok(())) => {
                        tcp.mid_frame = false;
                        Ok(())
                    }
                    Ok(Err(e)) => {
                        let _ = tcp.stream.shutdown().await;
                        Err(TransmitError::Io(e))
                    }
                    Err(_) => {
                        let _ = tcp.stream.shutdown().await;
                        Err(TransmitError::TimedOut)
                    }
                }
            }
            Link::Udp(socket) => match tokio::time::timeout(limit, socket.send(payload)).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(TransmitError::Io(e)),
                Err(_) => Err(TransmitError::TimedOut),
            },
        }
    }

    fn encode(&self, destination: &DestinationKey, event: &Event) -> Result<Bytes, ContractError> {
        match self.config.protocol {
            Protocol::Tcp => self.codec.encode_framed(destination, event),
            Protocol::Udp => {
                let payload = self.codec.encode(destination, event)?;
                if payload.len() > self.config.max_packet_size {
                    return Err(ContractError::send_failure(
                        &self.name,
                        format!(
                            "datagram of {} bytes exceeds max_packet_size {}",
                            payload.len(),
                            self.config.max_packet_size
                        ),
                    ));
                }
                Ok(payload)
            }
        }
    }
}

#[async_trait]
impl Transport for NetworkTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport_type(&self) -> &str {
        "network"
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn resolve_destination(&self, event: &Event) -> Result<DestinationKey, ContractError> {
        self.routing.resolve(&self.name, event)
    }

    #[instrument(
        name = "network_transport_connect",
        skip(self),
        fields(transport = %self.name, addr = %self.config.addr)
    )]
    async fn connect(&self) -> Result<(), ContractError> {
        let _guard = self.connect_lock.lock().await;
        if self.link.read().await.is_some() {
            return Ok(());
        }

        self.state.set(ConnectionState::Connecting);
        match self.open_link().await {
            Ok(link) => {
                *self.link.write().await = Some(Arc::new(link));
                self.state.set(ConnectionState::Connected);
                debug!(transport = %self.name, protocol = ?self.config.protocol, "NetworkTransport connected");
                Ok(())
            }
            Err(e) => {
                self.state.set(ConnectionState::Disconnected);
                Err(ContractError::connection_unavailable(
                    &self.name,
                    format!("{}: {e}", self.config.addr),
                ))
            }
        }
    }

    #[instrument(
        name = "network_transport_send",
        skip(self, event),
        fields(transport = %self.name, destination = %destination)
    )]
    async fn send(&self, destination: &DestinationKey, event: &Event) -> Result<(), ContractError> {
        let payload = self.encode(destination, event)?;
        let mut link = self.link().await?;
        let mut result = self.transmit(&link, &payload).await;

        if matches!(result, Err(TransmitError::Stale)) {
            debug!(transport = %self.name, "Stream abandoned mid-frame, reconnecting");
            self.drop_link(&link).await;
            link = self.link().await?;
            result = self.transmit(&link, &payload).await;
        }

        match result {
            Ok(()) => Ok(()),
            Err(TransmitError::Stale) => {
                self.drop_link(&link).await;
                Err(ContractError::connection_unavailable(&self.name, "stream abandoned mid-frame"))
            }
            Err(TransmitError::Io(e)) => {
                warn!(transport = %self.name, error = %e, "Connection lost");
                self.drop_link(&link).await;
                Err(ContractError::connection_unavailable(&self.name, e.to_string()))
            }
            Err(TransmitError::TimedOut) => {
                self.drop_link(&link).await;
                Err(ContractError::send_failure(
                    &self.name,
                    format!("send timed out after {:?}", self.config.send_timeout),
                ))
            }
        }
    }

    async fn disconnect(&self) -> Result<(), ContractError> {
        let link = self.link.write().await.take();
        self.state.set(ConnectionState::Disconnected);
        if let Some(link) = link {
            if let Link::Tcp(tcp) = link.as_ref() {
                let _ = tcp.lock().await.stream.shutdown().await;
            }
            debug!(transport = %self.name, "NetworkTransport disconnected");
        }
        Ok(())
    }

    #[instrument(name = "network_transport_shutdown", skip(self))]
    async fn shutdown(&self) -> Result<(), ContractError> {
        self.disconnect().await
    }
}
