//! Shared helpers for adapter tests
//!
//! `ScriptedSocket` stands in for the TLS primitive: connect/close outcomes,
//! write sizes and inbound data are scripted up front and every call is
//! counted. `Recorder` collects callback invocations in order.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;
use tlsio::tls::{SslConfig, SslSocket, TlsError};
use tlsio::xio::{OnBytesReceived, OnCloseComplete, OnIoError, OnOpenComplete, OnSendComplete};
use tlsio::{OpenResult, SendResult, TlsIo, TlsIoConfig};

pub const CA_PEM: &str = include_str!("../data/localhost_ca.pem");
pub const BUNDLE_PEM: &str = include_str!("../data/localhost.pem");
pub const UNTRUSTED_CA_PEM: &str = include_str!("../data/untrusted_ca.pem");

/// What a scripted write call does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    /// Accept up to this many bytes
    Accept(usize),
    /// Report zero bytes written
    Zero,
    /// Fail with an error
    Fail,
}

/// Scripted TLS primitive
#[derive(Default)]
pub struct ScriptedSocket {
    /// Number of upcoming connect calls that fail
    pub connect_failures: usize,
    /// Fail every connect
    pub connect_always_fails: bool,
    /// Number of upcoming close calls that fail
    pub close_failures: usize,
    /// Fail every close
    pub close_always_fails: bool,
    /// Per-call write behavior; once exhausted, `max_write` applies
    pub write_script: VecDeque<WriteStep>,
    /// Largest write accepted when the script is empty (`None` = unlimited)
    pub max_write: Option<usize>,
    /// Queued read outcomes; an empty queue reads as "no data"
    pub inbound: VecDeque<Result<Vec<u8>, ()>>,

    pub connect_calls: usize,
    pub close_calls: usize,
    pub write_calls: usize,
    pub read_calls: usize,
    pub written: Vec<u8>,
    pub last_config: Option<SslConfig>,
    pub last_target: Option<(String, u16)>,
}

impl ScriptedSocket {
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.push_back(Ok(bytes.to_vec()));
    }

    pub fn push_read_error(&mut self) {
        self.inbound.push_back(Err(()));
    }
}

impl SslSocket for ScriptedSocket {
    fn connect(&mut self, config: &SslConfig, host: &str, port: u16) -> Result<(), TlsError> {
        self.connect_calls += 1;
        self.last_config = Some(config.clone());
        self.last_target = Some((host.to_string(), port));

        if self.connect_always_fails {
            return Err(TlsError::HandshakeFailed("scripted failure".to_string()));
        }
        if self.connect_failures > 0 {
            self.connect_failures -= 1;
            return Err(TlsError::HandshakeInProgress);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, TlsError> {
        self.read_calls += 1;

        match self.inbound.pop_front() {
            None => Ok(0),
            Some(Err(())) => Err(TlsError::OperationFailed("scripted read failure".to_string())),
            Some(Ok(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.inbound.push_front(Ok(bytes[n..].to_vec()));
                }
                Ok(n)
            }
        }
    }

    fn write(&mut self, buf: &[u8], _timeout: Duration) -> Result<usize, TlsError> {
        self.write_calls += 1;

        let step = self
            .write_script
            .pop_front()
            .unwrap_or(WriteStep::Accept(self.max_write.unwrap_or(usize::MAX)));

        match step {
            WriteStep::Accept(limit) => {
                let n = buf.len().min(limit);
                self.written.extend_from_slice(&buf[..n]);
                Ok(n)
            }
            WriteStep::Zero => Ok(0),
            WriteStep::Fail => Err(TlsError::OperationFailed("scripted write failure".to_string())),
        }
    }

    fn close(&mut self) -> Result<(), TlsError> {
        self.close_calls += 1;

        if self.close_always_fails {
            return Err(TlsError::OperationFailed("scripted close failure".to_string()));
        }
        if self.close_failures > 0 {
            self.close_failures -= 1;
            return Err(TlsError::OperationFailed("scripted close failure".to_string()));
        }
        Ok(())
    }
}

/// Callback invocation, in the order observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open(OpenResult),
    Bytes(Vec<u8>),
    IoError,
    Close,
    Send(SendResult),
}

/// Collects callback invocations from one or more adapters
#[derive(Clone, Default)]
pub struct Recorder {
    events: Rc<RefCell<Vec<Event>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events.borrow().iter().filter(|e| *e == event).count()
    }

    pub fn received(&self) -> Vec<u8> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Bytes(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn on_open(&self) -> OnOpenComplete {
        let events = Rc::clone(&self.events);
        Box::new(move |result: OpenResult| events.borrow_mut().push(Event::Open(result)))
    }

    pub fn on_bytes(&self) -> OnBytesReceived {
        let events = Rc::clone(&self.events);
        Box::new(move |bytes: &[u8]| events.borrow_mut().push(Event::Bytes(bytes.to_vec())))
    }

    pub fn on_error(&self) -> OnIoError {
        let events = Rc::clone(&self.events);
        Box::new(move || events.borrow_mut().push(Event::IoError))
    }

    pub fn on_close(&self) -> Option<OnCloseComplete> {
        let events = Rc::clone(&self.events);
        Some(Box::new(move || events.borrow_mut().push(Event::Close)))
    }

    pub fn on_send(&self) -> Option<OnSendComplete> {
        let events = Rc::clone(&self.events);
        Some(Box::new(move |result: SendResult| {
            events.borrow_mut().push(Event::Send(result))
        }))
    }
}

/// Adapter for `broker.example:8883` over a fresh scripted socket
pub fn scripted_io() -> TlsIo<ScriptedSocket> {
    TlsIo::with_socket(TlsIoConfig::new("broker.example", 8883), ScriptedSocket::default())
        .unwrap()
}

/// Open `io` with callbacks wired to `recorder`
pub fn open_with(io: &mut TlsIo<ScriptedSocket>, recorder: &Recorder) -> tlsio::xio::Result<()> {
    use tlsio::IoInterface;
    io.open(recorder.on_open(), recorder.on_bytes(), recorder.on_error())
}

/// Adapter already in the Open state
pub fn open_io(recorder: &Recorder) -> TlsIo<ScriptedSocket> {
    let mut io = scripted_io();
    open_with(&mut io, recorder).unwrap();
    assert_eq!(io.state(), tlsio::TlsIoState::Open);
    recorder.clear();
    io
}
