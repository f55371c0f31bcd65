//! Minimal echo server: accepts one TCP client and echoes lines back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1:7878 --data "hello" --expect 1

use std::net::TcpListener;
use std::sync::mpsc;

use linesock::channel::{ChannelError, LineChannel};
use linesock::codec::Utf8Codec;
use linesock::transport::StreamTransport;

fn echo(channel: LineChannel, done: mpsc::Sender<ChannelError>) {
    let next = channel.clone();
    channel.receive(
        move |line, done: mpsc::Sender<ChannelError>| match line {
            Ok(line) => {
                eprintln!("Received {} bytes", line.len());
                next.send_line(line, |_, ()| {}, ());
                echo(next, done);
            }
            Err(err) => {
                let _ = done.send(err);
            }
        },
        done,
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:7878")?;
    eprintln!("Listening on {}", listener.local_addr()?);

    let (stream, peer) = listener.accept()?;
    eprintln!("Client connected: {peer}");

    let channel = LineChannel::new(StreamTransport::from_tcp(stream)?, Utf8Codec)?;
    let (done_tx, done_rx) = mpsc::channel();
    echo(channel, done_tx);

    let reason = done_rx.recv()?;
    eprintln!("Client disconnected: {reason}");
    Ok(())
}
