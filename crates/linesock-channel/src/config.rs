use linesock_codec::DEFAULT_DELIMITER;

/// How completion callbacks are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// One dedicated worker per direction.
    ///
    /// Callbacks of one direction run one after another, in submission
    /// order. A callback that blocks delays later callbacks of the same
    /// direction, but never the pipelines themselves.
    #[default]
    Ordered,

    /// A worker pool shared by both directions.
    ///
    /// Callbacks are handed to the pool in submission order, but two
    /// callbacks may run concurrently or finish out of order.
    Pooled {
        /// Number of pool threads (at least one is started).
        workers: usize,
    },
}

impl DispatchMode {
    /// A pool sized to the available parallelism.
    pub fn pooled() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::Pooled { workers }
    }
}

/// Configuration for a [`LineChannel`](crate::LineChannel).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Line terminator. Default: `'\n'`.
    pub delimiter: char,
    /// Size of each transport read. Default: the transport's read granularity.
    pub read_chunk_size: Option<usize>,
    /// Callback execution strategy. Default: [`DispatchMode::Ordered`].
    pub dispatch: DispatchMode,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            read_chunk_size: None,
            dispatch: DispatchMode::default(),
        }
    }
}
