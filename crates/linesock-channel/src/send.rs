//! Send pipeline.
//!
//! Sends are queued FIFO and written one at a time: the head of the queue is
//! the only item with bytes in flight, and it stays at the head until every
//! byte of its encoding has been accepted by the transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use linesock_codec::TextCodec;
use linesock_transport::{ByteTransport, TransportError};
use tracing::{debug, trace, warn};

use crate::dispatch::Dispatcher;
use crate::error::{ChannelError, Result};

pub(crate) type SendCompletion = Box<dyn FnOnce(Result<()>) + Send + 'static>;

struct PendingSend {
    text: String,
    on_sent: SendCompletion,
}

#[derive(Default)]
struct SendState {
    queue: VecDeque<PendingSend>,
    // Encoding of the head item, once computed, and how much of it the
    // transport has accepted.
    encoded: Option<Bytes>,
    written: usize,
    // A write is outstanding or about to be issued.
    in_flight: bool,
    // A thread is inside `issue` between calling the transport and checking
    // for a completion that arrived meanwhile.
    issuing: bool,
    parked: Option<linesock_transport::Result<usize>>,
}

pub(crate) struct SendPipeline {
    state: Mutex<SendState>,
    transport: Arc<dyn ByteTransport>,
    codec: Arc<dyn TextCodec>,
    dispatcher: Dispatcher,
}

impl SendPipeline {
    pub(crate) fn new(
        transport: Arc<dyn ByteTransport>,
        codec: Arc<dyn TextCodec>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            state: Mutex::new(SendState::default()),
            transport,
            codec,
            dispatcher,
        }
    }

    /// Queue `text`; start writing if the pipeline is idle.
    pub(crate) fn submit(self: &Arc<Self>, text: String, on_sent: SendCompletion) {
        let next = {
            let mut state = self.lock();
            state.queue.push_back(PendingSend { text, on_sent });
            if state.in_flight {
                return;
            }
            state.in_flight = true;
            debug!(queued = state.queue.len(), "send pipeline started");
            self.next_chunk(&mut state)
        };

        if let Some(chunk) = next {
            self.issue(chunk);
        }
    }

    /// Number of sends not yet completed.
    pub(crate) fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    fn lock(&self) -> MutexGuard<'_, SendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Writes `chunk`, then keeps going for as long as completions arrive
    // while this thread is still the issuer. Transports that complete inline
    // therefore loop here instead of recursing.
    fn issue(self: &Arc<Self>, mut chunk: Bytes) {
        loop {
            // Holds the pipeline until the write completes, so queued sends
            // still drain after the last channel handle is dropped.
            let pipeline = Arc::clone(self);
            self.transport
                .begin_write(chunk, Box::new(move |result| pipeline.on_written(result)));

            let mut state = self.lock();
            state.issuing = false;
            let Some(result) = state.parked.take() else {
                return;
            };
            match self.advance(&mut state, result) {
                Some(next) => chunk = next,
                None => return,
            }
        }
    }

    fn on_written(self: &Arc<Self>, result: linesock_transport::Result<usize>) {
        let next = {
            let mut state = self.lock();
            if state.issuing {
                state.parked = Some(result);
                return;
            }
            self.advance(&mut state, result)
        };

        if let Some(chunk) = next {
            self.issue(chunk);
        }
    }

    fn advance(
        &self,
        state: &mut SendState,
        result: linesock_transport::Result<usize>,
    ) -> Option<Bytes> {
        match result {
            Ok(0) => {
                warn!("transport accepted no bytes; failing send");
                self.complete_head(state, Err(ChannelError::ConnectionClosed));
            }
            Ok(n) => {
                let total = state.encoded.as_ref().map_or(0, Bytes::len);
                state.written = (state.written + n).min(total);
                trace!(written = state.written, total, "send progress");
            }
            Err(err) => {
                warn!(error = %err, "send failed");
                self.complete_head(state, Err(write_error(err)));
            }
        }
        self.next_chunk(state)
    }

    // Returns the unwritten suffix of the head item, completing items that
    // are already done (fully written, empty, or unencodable) along the way.
    // Marks the pipeline idle when the queue runs dry.
    fn next_chunk(&self, state: &mut SendState) -> Option<Bytes> {
        loop {
            let Some(head) = state.queue.front() else {
                state.in_flight = false;
                debug!("send pipeline idle");
                return None;
            };

            let encoded = match &state.encoded {
                Some(encoded) => encoded.clone(),
                None => match self.codec.encode(&head.text) {
                    Ok(encoded) => {
                        state.encoded = Some(encoded.clone());
                        state.written = 0;
                        encoded
                    }
                    Err(err) => {
                        warn!(error = %err, "cannot encode queued text");
                        self.complete_head(state, Err(err.into()));
                        continue;
                    }
                },
            };

            if state.written >= encoded.len() {
                self.complete_head(state, Ok(()));
                continue;
            }

            state.issuing = true;
            return Some(encoded.slice(state.written..));
        }
    }

    fn complete_head(&self, state: &mut SendState, result: Result<()>) {
        state.encoded = None;
        state.written = 0;
        if let Some(PendingSend { on_sent, .. }) = state.queue.pop_front() {
            self.dispatcher.dispatch(Box::new(move || on_sent(result)));
        }
    }
}

impl Drop for SendPipeline {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !state.queue.is_empty() {
            debug!(pending = state.queue.len(), "channel dropped with sends queued");
        }
        for PendingSend { on_sent, .. } in state.queue.drain(..) {
            self.dispatcher
                .dispatch(Box::new(move || on_sent(Err(ChannelError::ConnectionClosed))));
        }
    }
}

fn write_error(err: TransportError) -> ChannelError {
    ChannelError::Write(Arc::new(err))
}
