use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use linesock_channel::ChannelError;
use tracing::info;

use crate::cmd::{forward_lines, install_ctrlc_handler, ListenArgs};
use crate::exit::{channel_error, transport_error, CliResult, SUCCESS};
use crate::output::{flush_stdout, print_line, LineRecord, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let listener = args
        .addr
        .bind()
        .map_err(|err| transport_error("bind failed", &err))?;

    let Some((transport, peer)) = listener
        .accept_while(&running)
        .map_err(|err| transport_error("accept failed", &err))?
    else {
        return Ok(SUCCESS);
    };
    info!(peer, "client connected");

    let channel = args.channel.open(transport)?;
    let (tx, rx) = mpsc::channel();
    forward_lines(channel, tx);

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(line)) => {
                print_line(&LineRecord::new(printed, &peer, &line), format);
                flush_stdout();
                printed += 1;
            }
            Ok(Err(ChannelError::ConnectionClosed)) | Err(RecvTimeoutError::Disconnected) => {
                info!(peer, lines = printed, "client disconnected");
                break;
            }
            Ok(Err(err)) => return Err(channel_error("receive failed", &err)),
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    Ok(SUCCESS)
}
