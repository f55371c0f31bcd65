//! Receive pipeline.
//!
//! Receive requests queue FIFO. Decoded text accumulates in a [`LineBuffer`]
//! and each complete line goes to the oldest waiting request. The pipeline
//! reads only while a request is waiting and no complete line is buffered,
//! so it never reads ahead of demand.
//!
//! End of stream, read errors and undecodable input end the stream. Lines
//! completed before that point are still delivered in order; requests
//! beyond them fail with the error.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use linesock_codec::{LineBuffer, TextCodec};
use linesock_transport::ByteTransport;
use tracing::{debug, trace, warn};

use crate::dispatch::Dispatcher;
use crate::error::{ChannelError, Result};

pub(crate) type ReceiveCompletion = Box<dyn FnOnce(Result<String>) + Send + 'static>;

struct ReceiveState {
    queue: VecDeque<ReceiveCompletion>,
    // Bytes read but not yet decodable (a split multi-byte character).
    undecoded: BytesMut,
    lines: LineBuffer,
    reading: bool,
    // See `SendState::issuing`.
    issuing: bool,
    parked: Option<linesock_transport::Result<Bytes>>,
    // Why the stream ended. Only requests left over once buffered lines run
    // out see it.
    failed: Option<ChannelError>,
}

pub(crate) struct ReceivePipeline {
    state: Mutex<ReceiveState>,
    transport: Arc<dyn ByteTransport>,
    codec: Arc<dyn TextCodec>,
    dispatcher: Dispatcher,
    read_size: usize,
}

impl ReceivePipeline {
    pub(crate) fn new(
        transport: Arc<dyn ByteTransport>,
        codec: Arc<dyn TextCodec>,
        dispatcher: Dispatcher,
        delimiter: char,
        read_size: usize,
    ) -> Self {
        Self {
            state: Mutex::new(ReceiveState {
                queue: VecDeque::new(),
                undecoded: BytesMut::new(),
                lines: LineBuffer::new(delimiter),
                reading: false,
                issuing: false,
                parked: None,
                failed: None,
            }),
            transport,
            codec,
            dispatcher,
            read_size: read_size.max(1),
        }
    }

    /// Queue a request for the next line; read if nothing is buffered.
    pub(crate) fn submit(self: &Arc<Self>, on_received: ReceiveCompletion) {
        let read = {
            let mut state = self.lock();
            state.queue.push_back(on_received);
            self.pump(&mut state)
        };

        if read {
            self.issue_reads();
        }
    }

    /// Number of receives waiting for a line.
    pub(crate) fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    fn lock(&self) -> MutexGuard<'_, ReceiveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Matches buffered lines to waiting requests, then fails whatever is
    // left if the stream has ended. Returns true when the caller must issue
    // a read (the pipeline is then marked as reading).
    fn pump(&self, state: &mut ReceiveState) -> bool {
        while !state.queue.is_empty() {
            let Some(line) = state.lines.next_line() else {
                break;
            };
            if let Some(on_received) = state.queue.pop_front() {
                trace!(len = line.len(), "line matched");
                self.dispatcher
                    .dispatch(Box::new(move || on_received(Ok(line))));
            }
        }

        if state.queue.is_empty() {
            return false;
        }
        if let Some(err) = &state.failed {
            debug!(error = %err, pending = state.queue.len(), "failing receives");
            for on_received in state.queue.drain(..) {
                let err = err.clone();
                self.dispatcher
                    .dispatch(Box::new(move || on_received(Err(err))));
            }
            return false;
        }
        if state.reading {
            return false;
        }
        state.reading = true;
        state.issuing = true;
        true
    }

    fn issue_reads(self: &Arc<Self>) {
        loop {
            // The transport may hold this completion indefinitely, so it must
            // not keep the pipeline (and with it the transport) alive.
            let pipeline = Arc::downgrade(self);
            self.transport.begin_read(
                self.read_size,
                Box::new(move |result| {
                    if let Some(pipeline) = pipeline.upgrade() {
                        pipeline.on_read(result);
                    }
                }),
            );

            let mut state = self.lock();
            state.issuing = false;
            let Some(result) = state.parked.take() else {
                return;
            };
            if !self.absorb(&mut state, result) {
                return;
            }
        }
    }

    fn on_read(self: &Arc<Self>, result: linesock_transport::Result<Bytes>) {
        let read = {
            let mut state = self.lock();
            if state.issuing {
                state.parked = Some(result);
                return;
            }
            self.absorb(&mut state, result)
        };

        if read {
            self.issue_reads();
        }
    }

    // Folds a read result into the buffer and re-runs matching.
    fn absorb(&self, state: &mut ReceiveState, result: linesock_transport::Result<Bytes>) -> bool {
        state.reading = false;
        match result {
            Ok(bytes) if bytes.is_empty() => self.fail(state, ChannelError::ConnectionClosed),
            Ok(bytes) => {
                trace!(read = bytes.len(), "read completed");
                state.undecoded.extend_from_slice(&bytes);
                self.decode(state);
            }
            Err(err) => self.fail(state, ChannelError::Read(Arc::new(err))),
        }
        self.pump(state)
    }

    // Moves every decodable byte into the line buffer. Valid text ahead of
    // an invalid sequence is kept, so its lines are still delivered.
    fn decode(&self, state: &mut ReceiveState) {
        while !state.undecoded.is_empty() {
            match self.codec.decode(&mut state.undecoded) {
                Ok(text) if text.is_empty() => return,
                Ok(text) => state.lines.push_str(&text),
                Err(err) => {
                    self.fail(state, err.into());
                    return;
                }
            }
        }
    }

    // Nothing more will be read. The unterminated tail of the buffer can
    // never complete, so only lines already terminated remain deliverable.
    fn fail(&self, state: &mut ReceiveState, err: ChannelError) {
        warn!(error = %err, pending = state.queue.len(), "receive stream ended");
        state.undecoded.clear();
        if state.failed.is_none() {
            state.failed = Some(err);
        }
    }
}

impl Drop for ReceivePipeline {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !state.queue.is_empty() {
            debug!(pending = state.queue.len(), "channel dropped with receives waiting");
        }
        for on_received in state.queue.drain(..) {
            self.dispatcher
                .dispatch(Box::new(move || on_received(Err(ChannelError::ConnectionClosed))));
        }
    }
}
