//! Framed wire connection
//!
//! One TCP stream carrying length-delimited frames, one XML message per
//! frame. Requests from the peer dispatch to registered servants on
//! spawned tasks, so calls may overlap; events dispatch inline on the
//! read loop and keep raise order. Responses resolve pending oneshot
//! slots by request id. Dropping the transport fails every pending call
//! and fires the closed token.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{InternalError, ServerError, SessionError};
use crate::serial::XmlNode;

use super::message::{RemoteEvent, RemoteRequest, ResponseBody, WireMessage};

/// Which half of a remote object a proxy addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProxyRole {
    /// Handle calling a servant on the peer.
    Client,
    /// Object served locally to the peer.
    Servant,
}

/// Typed handle to one object id on a connection.
///
/// The two roles never convert into each other; asking a servant handle
/// for a callable peer id is a framework bug, not a recoverable state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectProxy {
    id: u64,
    role: ProxyRole,
}

impl ObjectProxy {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> ProxyRole {
        self.role
    }

    /// Id of the peer-side servant this proxy calls.
    pub fn remote_id(&self) -> Result<u64, InternalError> {
        match self.role {
            ProxyRole::Client => Ok(self.id),
            ProxyRole::Servant => Err(InternalError::new(format!(
                "object {} is served locally and cannot be called as a peer object",
                self.id
            ))),
        }
    }

    /// Id under which the object is served locally.
    pub fn local_id(&self) -> Result<u64, InternalError> {
        match self.role {
            ProxyRole::Servant => Ok(self.id),
            ProxyRole::Client => Err(InternalError::new(format!(
                "object {} lives on the peer and is not served locally",
                self.id
            ))),
        }
    }
}

/// One object served to the peer.
#[async_trait]
pub trait Servant: Send + Sync {
    /// Serve one request; an error becomes a fault on the caller's side.
    async fn call(&self, request: RemoteRequest) -> Result<ResponseBody, ServerError>;

    /// Receive a one-way notification, in raise order.
    fn event(&self, event: RemoteEvent);
}

enum HandshakeSlot {
    Empty,
    Waiting(oneshot::Sender<WireMessage>),
    Ready(WireMessage),
}

struct ConnectionInner {
    outgoing: mpsc::UnboundedSender<WireMessage>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<ResponseBody, ServerError>>>>,
    servants: Mutex<HashMap<u64, Arc<dyn Servant>>>,
    next_request_id: AtomicU64,
    next_object_id: AtomicU64,
    handshake: Mutex<HandshakeSlot>,
    closed: CancellationToken,
}

impl ConnectionInner {
    fn dispatch(self: &Arc<Self>, message: WireMessage) {
        match message {
            WireMessage::Response { id, body } => self.resolve(id, Ok(body)),
            WireMessage::Fault { id, message } => self.resolve(id, Err(ServerError::Fault(message))),
            WireMessage::Request {
                id,
                object_id,
                request,
            } => match self.servant(object_id) {
                Some(servant) => {
                    let inner = self.clone();
                    tokio::spawn(async move {
                        let reply = match servant.call(request).await {
                            Ok(body) => WireMessage::Response { id, body },
                            Err(error) => WireMessage::Fault {
                                id,
                                message: error.to_string(),
                            },
                        };
                        let _ = inner.outgoing.send(reply);
                    });
                }
                None => {
                    let _ = self.outgoing.send(WireMessage::Fault {
                        id,
                        message: format!("no object {object_id}"),
                    });
                }
            },
            WireMessage::Event { object_id, event } => match self.servant(object_id) {
                Some(servant) => servant.event(event),
                None => debug!("event for unknown object {object_id}"),
            },
            message @ (WireMessage::Handshake { .. } | WireMessage::HandshakeDone { .. }) => {
                if let Ok(mut slot) = self.handshake.lock() {
                    match std::mem::replace(&mut *slot, HandshakeSlot::Empty) {
                        HandshakeSlot::Waiting(tx) => {
                            let _ = tx.send(message);
                        }
                        _ => *slot = HandshakeSlot::Ready(message),
                    }
                }
            }
        }
    }

    fn servant(&self, object_id: u64) -> Option<Arc<dyn Servant>> {
        self.servants
            .lock()
            .ok()
            .and_then(|servants| servants.get(&object_id).cloned())
    }

    fn resolve(&self, id: u64, outcome: Result<ResponseBody, ServerError>) {
        let slot = self.pending.lock().ok().and_then(|mut pending| pending.remove(&id));
        match slot {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => debug!("response for unknown request {id}"),
        }
    }

    fn close(&self) {
        self.closed.cancel();
        if let Ok(mut pending) = self.pending.lock() {
            for (_, tx) in pending.drain() {
                let _ = tx.send(Err(ServerError::ConnectionClosed));
            }
        }
    }
}

fn decode(frame: &[u8]) -> Result<WireMessage, ServerError> {
    let text = std::str::from_utf8(frame)
        .map_err(|_| ServerError::Protocol("frame is not valid UTF-8".into()))?;
    let root = XmlNode::parse(text)?;
    Ok(WireMessage::from_xml(&root)?)
}

/// One end of a wire connection. Cheap to clone; all clones share the
/// transport, the pending map and the servant table.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, LengthDelimitedCodec::new());
        let mut writer = FramedWrite::new(write_half, LengthDelimitedCodec::new());
        let (outgoing, mut outbox) = mpsc::unbounded_channel::<WireMessage>();

        let inner = Arc::new(ConnectionInner {
            outgoing,
            pending: Mutex::new(HashMap::new()),
            servants: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
            next_object_id: AtomicU64::new(1),
            handshake: Mutex::new(HandshakeSlot::Empty),
            closed: CancellationToken::new(),
        });

        let write_closed = inner.closed.clone();
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    message = outbox.recv() => match message {
                        Some(message) => message,
                        None => break,
                    },
                    _ = write_closed.cancelled() => break,
                };
                let frame = match message.to_xml().to_compact() {
                    Ok(text) => Bytes::from(text),
                    Err(error) => {
                        warn!("dropping unencodable wire message: {error}");
                        continue;
                    }
                };
                if writer.send(frame).await.is_err() {
                    break;
                }
            }
        });

        let read_inner = inner.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    frame = reader.next() => frame,
                    _ = read_inner.closed.cancelled() => break,
                };
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(error)) => {
                        warn!("wire read failed: {error}");
                        break;
                    }
                    None => break,
                };
                match decode(&frame) {
                    Ok(message) => read_inner.dispatch(message),
                    Err(error) => {
                        warn!("dropping peer after protocol error: {error}");
                        break;
                    }
                }
            }
            read_inner.close();
        });

        Connection { inner }
    }

    /// Serve `servant` to the peer under a fresh object id. Ids are
    /// never reused while the connection lives.
    pub fn register(&self, servant: Arc<dyn Servant>) -> ObjectProxy {
        let id = self.inner.next_object_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut servants) = self.inner.servants.lock() {
            servants.insert(id, servant);
        }
        ObjectProxy {
            id,
            role: ProxyRole::Servant,
        }
    }

    /// Handle to a servant the peer announced by id.
    pub fn proxy(&self, id: u64) -> ObjectProxy {
        ObjectProxy {
            id,
            role: ProxyRole::Client,
        }
    }

    /// Invoke an operation on a peer object and await its response.
    pub async fn call(
        &self,
        target: &ObjectProxy,
        request: RemoteRequest,
    ) -> Result<ResponseBody, SessionError> {
        let object_id = target.remote_id()?;
        let id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        match self.inner.pending.lock() {
            Ok(mut pending) => {
                pending.insert(id, tx);
            }
            Err(_) => return Err(InternalError::new("pending request table poisoned").into()),
        }
        let sent = self.inner.outgoing.send(WireMessage::Request {
            id,
            object_id,
            request,
        });
        if sent.is_err() {
            if let Ok(mut pending) = self.inner.pending.lock() {
                pending.remove(&id);
            }
            return Err(ServerError::ConnectionClosed.into());
        }
        match rx.await {
            Ok(outcome) => Ok(outcome?),
            Err(_) => Err(ServerError::ConnectionClosed.into()),
        }
    }

    /// Fire-and-forget notification to a peer object. Silently dropped
    /// once the transport is gone; the run token carries the teardown.
    pub fn send_event(&self, target: &ObjectProxy, event: RemoteEvent) -> Result<(), InternalError> {
        let object_id = target.remote_id()?;
        let _ = self
            .inner
            .outgoing
            .send(WireMessage::Event { object_id, event });
        Ok(())
    }

    pub fn send(&self, message: WireMessage) -> Result<(), ServerError> {
        self.inner
            .outgoing
            .send(message)
            .map_err(|_| ServerError::ConnectionClosed)
    }

    /// The first handshake message seen on this connection.
    pub async fn await_handshake(&self) -> Result<WireMessage, ServerError> {
        let rx = {
            let mut slot = self
                .inner
                .handshake
                .lock()
                .map_err(|_| ServerError::Protocol("handshake slot poisoned".into()))?;
            match std::mem::replace(&mut *slot, HandshakeSlot::Empty) {
                HandshakeSlot::Ready(message) => return Ok(message),
                HandshakeSlot::Empty => {
                    let (tx, rx) = oneshot::channel();
                    *slot = HandshakeSlot::Waiting(tx);
                    rx
                }
                HandshakeSlot::Waiting(_) => {
                    return Err(ServerError::Protocol("handshake already awaited".into()))
                }
            }
        };
        tokio::select! {
            message = rx => message.map_err(|_| ServerError::ConnectionClosed),
            _ = self.inner.closed.cancelled() => Err(ServerError::ConnectionClosed),
        }
    }

    /// Token fired when the transport is gone, whichever side dropped it.
    pub fn closed(&self) -> CancellationToken {
        self.inner.closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Tear the connection down: fail pending calls, stop both pump
    /// tasks, drop the stream.
    pub fn close(&self) {
        self.inner.close();
    }
}
