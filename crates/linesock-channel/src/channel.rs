use std::sync::Arc;

use linesock_codec::TextCodec;
use linesock_transport::ByteTransport;
use tracing::debug;

use crate::config::ChannelConfig;
use crate::dispatch::Dispatcher;
use crate::error::{ChannelError, Result};
use crate::receive::ReceivePipeline;
use crate::send::SendPipeline;

/// A line-oriented text channel over a duplex byte transport.
///
/// `send` and `receive` only queue work and return; results arrive through
/// the supplied callback together with the caller's `state` value. For each
/// direction, callbacks are handed off in submission order. The two
/// directions progress independently: a stalled receive never holds up a
/// send, and the other way round.
///
/// Cloning is cheap and yields another handle to the same channel. Once the
/// last handle is dropped, sends already queued are still written; then the
/// transport is dropped. Receives still waiting complete with
/// [`ChannelError::ConnectionClosed`].
#[derive(Clone)]
pub struct LineChannel {
    send: Arc<SendPipeline>,
    receive: Arc<ReceivePipeline>,
    config: Arc<ChannelConfig>,
    transport_name: &'static str,
}

impl LineChannel {
    /// Create a channel with default configuration.
    pub fn new<T, C>(transport: T, codec: C) -> Result<Self>
    where
        T: ByteTransport,
        C: TextCodec,
    {
        Self::with_config(transport, codec, ChannelConfig::default())
    }

    /// Create a channel with explicit configuration.
    pub fn with_config<T, C>(transport: T, codec: C, config: ChannelConfig) -> Result<Self>
    where
        T: ByteTransport,
        C: TextCodec,
    {
        Self::from_shared(Arc::new(transport), Arc::new(codec), config)
    }

    /// Create a channel from already shared transport and codec handles.
    pub fn from_shared(
        transport: Arc<dyn ByteTransport>,
        codec: Arc<dyn TextCodec>,
        config: ChannelConfig,
    ) -> Result<Self> {
        let (send_dispatch, receive_dispatch) = Dispatcher::for_channel(config.dispatch)
            .map_err(|err| ChannelError::Dispatch(Arc::new(err)))?;
        let read_size = config
            .read_chunk_size
            .unwrap_or_else(|| transport.read_granularity());
        let transport_name = transport.transport_name();

        debug!(
            transport = transport_name,
            codec = codec.name(),
            delimiter = ?config.delimiter,
            read_size,
            dispatch = ?config.dispatch,
            "line channel created"
        );

        let send = SendPipeline::new(Arc::clone(&transport), Arc::clone(&codec), send_dispatch);
        let receive = ReceivePipeline::new(
            transport,
            codec,
            receive_dispatch,
            config.delimiter,
            read_size,
        );

        Ok(Self {
            send: Arc::new(send),
            receive: Arc::new(receive),
            config: Arc::new(config),
            transport_name,
        })
    }

    /// Queue `text` for transmission.
    ///
    /// `on_sent` runs once every byte of `text` has been written, or with
    /// the error that stopped it. Texts are written whole and in submission
    /// order. No delimiter is added; see [`send_line`](Self::send_line).
    pub fn send<S, F>(&self, text: impl Into<String>, on_sent: F, state: S)
    where
        S: Send + 'static,
        F: FnOnce(Result<()>, S) + Send + 'static,
    {
        self.send
            .submit(text.into(), Box::new(move |result| on_sent(result, state)));
    }

    /// Queue `text` followed by the line delimiter.
    pub fn send_line<S, F>(&self, text: impl Into<String>, on_sent: F, state: S)
    where
        S: Send + 'static,
        F: FnOnce(Result<()>, S) + Send + 'static,
    {
        let mut text = text.into();
        text.push(self.config.delimiter);
        self.send(text, on_sent, state);
    }

    /// Queue a request for the next line.
    ///
    /// `on_received` gets the line without its delimiter, or the error that
    /// prevented it. The Nth line on the wire goes to the Nth request.
    pub fn receive<S, F>(&self, on_received: F, state: S)
    where
        S: Send + 'static,
        F: FnOnce(Result<String>, S) + Send + 'static,
    {
        self.receive
            .submit(Box::new(move |result| on_received(result, state)));
    }

    /// Sends queued or in flight.
    pub fn pending_sends(&self) -> usize {
        self.send.pending()
    }

    /// Receive requests still waiting for a line.
    pub fn pending_receives(&self) -> usize {
        self.receive.pending()
    }

    /// Channel configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }
}

impl std::fmt::Debug for LineChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineChannel")
            .field("transport", &self.transport_name)
            .field("delimiter", &self.config.delimiter)
            .field("pending_sends", &self.pending_sends())
            .field("pending_receives", &self.pending_receives())
            .finish()
    }
}
