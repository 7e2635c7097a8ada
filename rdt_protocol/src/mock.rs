//! In-memory transport for exercising the sensor client without a box.
//!
//! [`MockTransport::pair`] returns the transport half, handed to the client,
//! and a [`MockBoxHandle`] playing the role of the Net F/T box: it queues
//! datagrams or faults for the client to receive and records every command
//! the client sent.

use crate::protocol::{decode_command, Command, RawSample};
use crate::transport::Transport;
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

enum Inbound {
    Datagram(Vec<u8>),
    Fault(io::ErrorKind),
}

/// Client side of the mock link
pub struct MockTransport {
    inbound: Receiver<Inbound>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    sent_tx: Sender<Vec<u8>>,
}

/// Box side of the mock link
#[derive(Clone)]
pub struct MockBoxHandle {
    inbound: Sender<Inbound>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    sent_rx: Receiver<Vec<u8>>,
}

impl MockTransport {
    pub fn pair() -> (MockTransport, MockBoxHandle) {
        let (inbound_tx, inbound_rx) = unbounded();
        let (sent_tx, sent_rx) = unbounded();
        let sent = Arc::new(Mutex::new(Vec::new()));

        let transport = MockTransport {
            inbound: inbound_rx,
            sent: sent.clone(),
            sent_tx,
        };
        let handle = MockBoxHandle {
            inbound: inbound_tx,
            sent,
            sent_rx,
        };
        (transport, handle)
    }

    fn deliver(item: Inbound, max_len: usize) -> io::Result<Vec<u8>> {
        match item {
            Inbound::Datagram(mut bytes) => {
                bytes.truncate(max_len);
                Ok(bytes)
            }
            Inbound::Fault(kind) => Err(io::Error::new(kind, "injected transport fault")),
        }
    }

    fn closed() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionAborted, "mock box closed")
    }
}

impl Transport for MockTransport {
    fn send(&self, bytes: &[u8]) -> io::Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(bytes.to_vec());
        // The handle may already be gone; the record above is what tests inspect
        let _ = self.sent_tx.send(bytes.to_vec());
        Ok(())
    }

    fn receive(&self, max_len: usize) -> io::Result<Vec<u8>> {
        let item = self.inbound.recv().map_err(|_| Self::closed())?;
        Self::deliver(item, max_len)
    }

    fn receive_timeout(&self, max_len: usize, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        match self.inbound.recv_timeout(timeout) {
            Ok(item) => Self::deliver(item, max_len).map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Self::closed()),
        }
    }
}

impl MockBoxHandle {
    /// Queue a raw datagram for the client
    pub fn push_datagram(&self, bytes: &[u8]) {
        let _ = self.inbound.send(Inbound::Datagram(bytes.to_vec()));
    }

    /// Queue an encoded response record
    pub fn push_sample(&self, sample: &RawSample) {
        self.push_datagram(&sample.to_bytes());
    }

    /// Queue a response carrying the given counts and sequence number
    pub fn push_counts(&self, sequence: u32, counts: [i32; 6]) {
        self.push_sample(&RawSample {
            sequence,
            status: 0,
            sample_index: 0,
            counts,
        });
    }

    /// Make the next receive fail with `kind`
    pub fn push_fault(&self, kind: io::ErrorKind) {
        let _ = self.inbound.send(Inbound::Fault(kind));
    }

    /// Every datagram the client has sent so far
    pub fn sent_datagrams(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Every command the client has sent so far, decoded
    pub fn sent_commands(&self) -> Vec<(Command, u32)> {
        self.sent_datagrams()
            .iter()
            .filter_map(|bytes| decode_command(bytes).ok())
            .collect()
    }

    /// Wait for the next command sent after the previous call
    pub fn next_command(&self, timeout: Duration) -> Option<(Command, u32)> {
        let bytes = self.sent_rx.recv_timeout(timeout).ok()?;
        decode_command(&bytes).ok()
    }
}
