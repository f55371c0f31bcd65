use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use linesock_channel::{ChannelConfig, LineChannel, Result as ChannelResult};
use linesock_codec::{Latin1Codec, TextCodec, Utf8Codec, DEFAULT_DELIMITER};
use linesock_transport::StreamTransport;

use crate::exit::{channel_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod endpoint;
pub mod listen;
pub mod send;
pub mod version;

pub use endpoint::Endpoint;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept clients and echo every line back.
    Echo(EchoArgs),
    /// Send lines and wait until they are written.
    Send(SendArgs),
    /// Accept one client and print the lines it sends.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Encoding {
    Utf8,
    Latin1,
}

/// Options shared by every command that opens a channel.
#[derive(Args, Debug, Clone)]
pub struct ChannelArgs {
    /// Text encoding used on the wire.
    #[arg(long, value_enum, default_value = "utf8")]
    pub encoding: Encoding,
    /// Line delimiter character.
    #[arg(long, default_value_t = DEFAULT_DELIMITER, hide_default_value = true)]
    pub delimiter: char,
    /// Run completions on a pool of N workers instead of one per direction.
    #[arg(long, value_name = "N")]
    pub pool: Option<usize>,
}

impl ChannelArgs {
    pub fn config(&self) -> ChannelConfig {
        let mut config = ChannelConfig {
            delimiter: self.delimiter,
            ..ChannelConfig::default()
        };
        if let Some(workers) = self.pool {
            config.dispatch = linesock_channel::DispatchMode::Pooled { workers };
        }
        config
    }

    pub fn codec(&self) -> Arc<dyn TextCodec> {
        match self.encoding {
            Encoding::Utf8 => Arc::new(Utf8Codec),
            Encoding::Latin1 => Arc::new(Latin1Codec),
        }
    }

    pub fn open(&self, transport: StreamTransport) -> CliResult<LineChannel> {
        LineChannel::from_shared(Arc::new(transport), self.codec(), self.config())
            .map_err(|err| channel_error("channel setup failed", &err))
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to bind (host:port or unix:<path>).
    pub addr: Endpoint,
    /// Stop after serving N clients.
    #[arg(long, value_name = "N")]
    pub clients: Option<usize>,
    #[command(flatten)]
    pub channel: ChannelArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address to connect to (host:port or unix:<path>).
    pub addr: Endpoint,
    /// Text to send; split on the delimiter into lines.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read the text to send from a file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Wait for N response lines and print them.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub expect: usize,
    /// Maximum time to wait for writes and responses (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    #[command(flatten)]
    pub channel: ChannelArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind (host:port or unix:<path>).
    pub addr: Endpoint,
    /// Exit after printing N lines.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub channel: ChannelArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Keep one receive queued until the channel fails, forwarding every result.
///
/// The final result forwarded is the error that ended the stream.
pub fn forward_lines(channel: LineChannel, lines: mpsc::Sender<ChannelResult<String>>) {
    let next = channel.clone();
    channel.receive(
        move |result, lines: mpsc::Sender<_>| {
            let more = result.is_ok();
            if lines.send(result).is_ok() && more {
                forward_lines(next, lines);
            }
        },
        lines,
    );
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
