use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use linesock_channel::{ChannelError, LineChannel};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, EchoArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let listener = args
        .addr
        .bind()
        .map_err(|err| transport_error("bind failed", &err))?;

    let mut served = 0usize;
    while running.load(Ordering::SeqCst) {
        if args.clients.is_some_and(|clients| served >= clients) {
            break;
        }

        let Some((transport, peer)) = listener
            .accept_while(&running)
            .map_err(|err| transport_error("accept failed", &err))?
        else {
            break;
        };
        info!(peer, "client connected");

        let channel = args.channel.open(transport)?;
        let (done_tx, done_rx) = mpsc::channel();
        echo_lines(channel, done_tx);

        let reason = loop {
            if !running.load(Ordering::SeqCst) {
                break None;
            }
            match done_rx.recv_timeout(POLL_INTERVAL) {
                Ok(reason) => break Some(reason),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break None,
            }
        };
        match reason {
            Some(ChannelError::ConnectionClosed) | None => info!(peer, "client disconnected"),
            Some(err) => warn!(peer, error = %err, "client dropped"),
        }
        served += 1;
    }

    Ok(SUCCESS)
}

// Re-queues a receive from inside each completion, writing the line back
// before asking for the next one.
fn echo_lines(channel: LineChannel, done: mpsc::Sender<ChannelError>) {
    let next = channel.clone();
    channel.receive(
        move |result, done: mpsc::Sender<ChannelError>| match result {
            Ok(line) => {
                info!(chars = line.chars().count(), "echoing line");
                next.send_line(
                    line,
                    |result, ()| {
                        if let Err(err) = result {
                            warn!(error = %err, "echo send failed");
                        }
                    },
                    (),
                );
                echo_lines(next, done);
            }
            Err(err) => {
                let _ = done.send(err);
            }
        },
        done,
    );
}
