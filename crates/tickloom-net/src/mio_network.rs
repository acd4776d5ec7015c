//! A real, non-blocking transport over `mio` — sketch-level, per
//! `spec.md` §1 ("the real non-blocking TCP transport" is out of scope
//! beyond its interface). Frames are length-prefixed, codec-encoded
//! envelopes over a `TcpStream` per destination; delivery is at-most-once
//! per connection since `mio`'s readiness events never redeliver data
//! already handed to the application.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tickloom_types::{Message, ProcessId, TickLoomError};

use crate::network::{MessageDispatcher, Network};

const LISTENER_TOKEN: Token = Token(0);

/// Length-prefixed bincode-free JSON framing kept deliberately simple —
/// production deployments are expected to supply their own transport.
fn frame(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u32;
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

struct Connection {
    stream: TcpStream,
    read_buf: Vec<u8>,
}

/// Real transport: one `TcpListener` plus one outbound `TcpStream` per
/// peer the process has sent to so far (lazily connected).
pub struct MioNetwork {
    poll: Poll,
    listener: Option<TcpListener>,
    peer_addrs: HashMap<String, SocketAddr>,
    connections: HashMap<String, Connection>,
    next_token: usize,
    dispatcher: Option<Rc<RefCell<dyn MessageDispatcher>>>,
}

impl MioNetwork {
    pub fn new(peer_addrs: HashMap<String, SocketAddr>) -> std::io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            listener: None,
            peer_addrs,
            connections: HashMap::new(),
            next_token: 1,
            dispatcher: None,
        })
    }

    fn connection_for(&mut self, destination: &ProcessId) -> Result<&mut Connection, TickLoomError> {
        if !self.connections.contains_key(destination.name()) {
            let addr = self.peer_addrs.get(destination.name()).ok_or_else(|| {
                TickLoomError::UnknownDestination(destination.name().to_string())
            })?;
            let mut stream = TcpStream::connect(*addr)
                .map_err(|e| TickLoomError::MalformedMessage(e.to_string()))?;
            let token = Token(self.next_token);
            self.next_token += 1;
            self.poll
                .registry()
                .register(&mut stream, token, Interest::WRITABLE)
                .ok();
            self.connections.insert(
                destination.name().to_string(),
                Connection {
                    stream,
                    read_buf: Vec::new(),
                },
            );
        }
        Ok(self.connections.get_mut(destination.name()).unwrap())
    }
}

impl Network for MioNetwork {
    fn send(&mut self, message: Message, _current_tick: u64) {
        let destination = message.destination.clone();
        let encoded = match serde_json::to_vec(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "mio network: failed to encode outgoing message");
                return;
            }
        };
        match self.connection_for(&destination) {
            Ok(conn) => {
                if let Err(e) = conn.stream.write_all(&frame(&encoded)) {
                    tracing::warn!(%destination, error = %e, "mio network: write failed, dropping");
                }
            }
            Err(e) => tracing::warn!(%destination, error = %e, "mio network: send failed"),
        }
    }

    fn tick(&mut self, _current_tick: u64) {
        let mut events = Events::with_capacity(64);
        if self
            .poll
            .poll(&mut events, Some(Duration::from_millis(0)))
            .is_err()
        {
            return;
        }

        if let Some(listener) = &self.listener {
            while let Ok((mut stream, _addr)) = listener.accept() {
                let token = Token(self.next_token);
                self.next_token += 1;
                let _ = self
                    .poll
                    .registry()
                    .register(&mut stream, token, Interest::READABLE);
                self.connections.insert(
                    format!("inbound-{}", token.0),
                    Connection {
                        stream,
                        read_buf: Vec::new(),
                    },
                );
            }
        }

        let dispatcher = match &self.dispatcher {
            Some(d) => Rc::clone(d),
            None => return,
        };

        let mut ready_messages = Vec::new();
        for conn in self.connections.values_mut() {
            let mut chunk = [0u8; 4096];
            loop {
                match conn.stream.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => conn.read_buf.extend_from_slice(&chunk[..n]),
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(_) => break,
                }
            }
            while conn.read_buf.len() >= 4 {
                let len = u32::from_be_bytes(conn.read_buf[0..4].try_into().unwrap()) as usize;
                if conn.read_buf.len() < 4 + len {
                    break;
                }
                let payload: Vec<u8> = conn.read_buf[4..4 + len].to_vec();
                conn.read_buf.drain(0..4 + len);
                if let Ok(message) = serde_json::from_slice::<Message>(&payload) {
                    ready_messages.push(message);
                }
            }
        }
        for message in ready_messages {
            dispatcher.borrow_mut().dispatch(message);
        }
    }

    fn bind(&mut self, id: &ProcessId) {
        if let Some(addr) = self.peer_addrs.get(id.name()).copied() {
            if let Ok(mut listener) = TcpListener::bind(addr) {
                let _ = self
                    .poll
                    .registry()
                    .register(&mut listener, LISTENER_TOKEN, Interest::READABLE);
                self.listener = Some(listener);
            }
        }
    }

    fn register_dispatcher(&mut self, dispatcher: Rc<RefCell<dyn MessageDispatcher>>) {
        self.dispatcher = Some(dispatcher);
    }

    fn close(&mut self) {
        self.connections.clear();
        self.listener = None;
    }
}
