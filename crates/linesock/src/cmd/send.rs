use std::io::Read;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Instant;

use tracing::debug;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{
    channel_error, io_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT,
};
use crate::output::{flush_stdout, print_line, LineRecord, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let text = resolve_text(&args)?;
    let lines = split_lines(&text, args.channel.delimiter);

    let transport = args
        .addr
        .connect()
        .map_err(|err| transport_error("connect failed", &err))?;
    let channel = args.channel.open(transport)?;
    let deadline = Instant::now() + timeout;

    let (reply_tx, reply_rx) = mpsc::channel();
    for _ in 0..args.expect {
        let reply_tx = reply_tx.clone();
        channel.receive(
            move |line, ()| {
                let _ = reply_tx.send(line);
            },
            (),
        );
    }

    let (sent_tx, sent_rx) = mpsc::channel();
    for line in &lines {
        let sent_tx = sent_tx.clone();
        channel.send_line(
            *line,
            move |result, ()| {
                let _ = sent_tx.send(result);
            },
            (),
        );
    }
    for _ in &lines {
        wait_before(&sent_rx, deadline, "send completion")?
            .map_err(|err| channel_error("send failed", &err))?;
    }
    debug!(lines = lines.len(), "all lines written");

    let peer = args.addr.to_string();
    for seq in 0..args.expect {
        let line = wait_before(&reply_rx, deadline, "response line")?
            .map_err(|err| channel_error("receive failed", &err))?;
        print_line(&LineRecord::new(seq, &peer, &line), format);
    }
    flush_stdout();

    Ok(SUCCESS)
}

fn resolve_text(args: &SendArgs) -> CliResult<String> {
    if let Some(data) = &args.data {
        return Ok(data.clone());
    }
    if let Some(path) = &args.file {
        return std::fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), &err));
    }
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .map_err(|err| io_error("failed reading stdin", &err))?;
    Ok(text)
}

/// Split `text` into the lines to send. A trailing delimiter does not
/// produce an extra empty line.
fn split_lines(text: &str, delimiter: char) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let text = text.strip_suffix(delimiter).unwrap_or(text);
    text.split(delimiter).collect()
}

fn wait_before<T>(rx: &mpsc::Receiver<T>, deadline: Instant, what: &str) -> CliResult<T> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    rx.recv_timeout(remaining).map_err(|err| match err {
        RecvTimeoutError::Timeout => CliError::new(TIMEOUT, format!("timed out waiting for {what}")),
        RecvTimeoutError::Disconnected => CliError::new(INTERNAL, format!("{what} was dropped")),
    })
}
