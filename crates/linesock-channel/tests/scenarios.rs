#![cfg(unix)]

use std::collections::HashMap;
use std::io::Read;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use linesock_channel::{ChannelConfig, ChannelError, LineChannel};
use linesock_codec::Utf8Codec;
use linesock_transport::{ByteTransport, ReadCompletion, StreamTransport, WriteCompletion};

const TIMEOUT: Duration = Duration::from_secs(10);

fn unix_pair() -> (StreamTransport, StreamTransport) {
    let (left, right) = UnixStream::pair().unwrap();
    (
        StreamTransport::from_unix(left).unwrap(),
        StreamTransport::from_unix(right).unwrap(),
    )
}

fn channel_pair() -> (LineChannel, LineChannel) {
    let (left, right) = unix_pair();
    (
        LineChannel::new(left, Utf8Codec).unwrap(),
        LineChannel::new(right, Utf8Codec).unwrap(),
    )
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Forwards to a stream transport, moving at most one byte per call.
struct OneByte(StreamTransport);

impl ByteTransport for OneByte {
    fn begin_write(&self, data: Bytes, on_written: WriteCompletion) {
        let n = data.len().min(1);
        self.0.begin_write(data.slice(..n), on_written);
    }

    fn begin_read(&self, _max_len: usize, on_read: ReadCompletion) {
        self.0.begin_read(1, on_read);
    }
}

/// Forwards to a stream transport and counts read requests.
struct CountingReads {
    inner: StreamTransport,
    reads: Arc<AtomicUsize>,
}

impl ByteTransport for CountingReads {
    fn begin_write(&self, data: Bytes, on_written: WriteCompletion) {
        self.inner.begin_write(data, on_written);
    }

    fn begin_read(&self, max_len: usize, on_read: ReadCompletion) {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.begin_read(max_len, on_read);
    }
}

/// Holds every write until the test completes it by hand.
#[derive(Default)]
struct Deferred {
    writes: Mutex<Vec<(Bytes, WriteCompletion)>>,
}

impl Deferred {
    fn complete_next(&self) -> Bytes {
        let (data, on_written) = self.writes.lock().unwrap().remove(0);
        on_written(Ok(data.len()));
        data
    }

    fn held(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

impl ByteTransport for Deferred {
    fn begin_write(&self, data: Bytes, on_written: WriteCompletion) {
        self.writes.lock().unwrap().push((data, on_written));
    }

    fn begin_read(&self, _max_len: usize, _on_read: ReadCompletion) {}
}

#[test]
fn two_lines_in_one_send_go_to_two_receives() {
    let (a, b) = channel_pair();
    let (tx, rx) = mpsc::channel();

    for tag in ["first", "second"] {
        let tx = tx.clone();
        b.receive(move |line, tag| tx.send((tag, line.unwrap())).unwrap(), tag);
    }
    a.send("Hello world\nThis is a test\n", |result, ()| result.unwrap(), ());

    assert_eq!(
        rx.recv_timeout(TIMEOUT).unwrap(),
        ("first", "Hello world".to_string())
    );
    assert_eq!(
        rx.recv_timeout(TIMEOUT).unwrap(),
        ("second", "This is a test".to_string())
    );
}

#[test]
fn single_character_sends_complete_one_line() {
    let (a, b) = channel_pair();
    let (line_tx, line_rx) = mpsc::channel();
    let (sent_tx, sent_rx) = mpsc::channel();

    b.receive(move |line, ()| line_tx.send(line.unwrap()).unwrap(), ());

    let text = "Hello world\n";
    let (body, last) = text.split_at(text.len() - 1);
    for ch in body.chars() {
        let sent_tx = sent_tx.clone();
        a.send(ch.to_string(), move |result, ()| sent_tx.send(result).unwrap(), ());
    }
    for _ in body.chars() {
        sent_rx.recv_timeout(TIMEOUT).unwrap().unwrap();
    }

    thread::sleep(Duration::from_millis(50));
    assert!(line_rx.try_recv().is_err(), "line delivered before its delimiter");

    a.send(last, |result, ()| result.unwrap(), ());
    assert_eq!(line_rx.recv_timeout(TIMEOUT).unwrap(), "Hello world");
    thread::sleep(Duration::from_millis(50));
    assert!(line_rx.try_recv().is_err(), "receive completed twice");
}

#[test]
fn concurrent_senders_never_interleave() {
    const PER_SENDER: usize = 10_000;

    let (a, b) = channel_pair();
    let (tx, rx) = mpsc::channel();

    for _ in 0..2 * PER_SENDER {
        let tx = tx.clone();
        b.receive(move |line, ()| tx.send(line).unwrap(), ());
    }

    let senders: Vec<_> = ["Blast1", "Blast2"]
        .into_iter()
        .map(|tag| {
            let a = a.clone();
            thread::spawn(move || {
                for i in 0..PER_SENDER {
                    a.send_line(format!("{tag} {i}"), |result, ()| result.unwrap(), ());
                }
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }

    let mut last: HashMap<String, usize> = HashMap::new();
    for _ in 0..2 * PER_SENDER {
        let line = rx.recv_timeout(Duration::from_secs(30)).unwrap().unwrap();
        let (tag, seq) = line.split_once(' ').expect("tagged line");
        let seq: usize = seq.parse().expect("sequence number");
        if let Some(prev) = last.insert(tag.to_string(), seq) {
            assert!(seq > prev, "{tag}: {seq} arrived after {prev}");
        } else {
            assert_eq!(seq, 0, "{tag} started at {seq}");
        }
    }
    assert_eq!(last.get("Blast1"), Some(&(PER_SENDER - 1)));
    assert_eq!(last.get("Blast2"), Some(&(PER_SENDER - 1)));
}

#[test]
fn send_callbacks_follow_submission_order() {
    let (a, b) = channel_pair();
    let (tx, rx) = mpsc::channel();

    for i in 0..200 {
        let tx = tx.clone();
        a.send_line(
            format!("line {i}"),
            move |result, i| tx.send((i, result.is_ok())).unwrap(),
            i,
        );
    }
    for i in 0..200 {
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), (i, true));
    }

    let (line_tx, line_rx) = mpsc::channel();
    for _ in 0..200 {
        let line_tx = line_tx.clone();
        b.receive(move |line, ()| line_tx.send(line.unwrap()).unwrap(), ());
    }
    for i in 0..200 {
        assert_eq!(line_rx.recv_timeout(TIMEOUT).unwrap(), format!("line {i}"));
    }
}

#[test]
fn submission_returns_while_writes_are_held() {
    let transport = Arc::new(Deferred::default());
    let channel = LineChannel::from_shared(
        transport.clone(),
        Arc::new(Utf8Codec),
        ChannelConfig::default(),
    )
    .unwrap();
    let (tx, rx) = mpsc::channel();

    for text in ["a\n", "b\n", "c\n"] {
        let tx = tx.clone();
        channel.send(text, move |result, text| tx.send((text, result.is_ok())).unwrap(), text);
    }

    assert_eq!(channel.pending_sends(), 3);
    assert_eq!(transport.held(), 1);
    assert!(rx.try_recv().is_err());

    let mut written = Vec::new();
    for _ in 0..3 {
        written.push(transport.complete_next());
    }
    assert_eq!(written, vec!["a\n", "b\n", "c\n"]);

    for text in ["a\n", "b\n", "c\n"] {
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), (text, true));
    }
    assert_eq!(channel.pending_sends(), 0);
}

#[test]
fn nothing_is_read_without_a_waiting_receive() {
    let (left, right) = unix_pair();
    let reads = Arc::new(AtomicUsize::new(0));
    let a = LineChannel::new(left, Utf8Codec).unwrap();
    let b = LineChannel::new(
        CountingReads {
            inner: right,
            reads: Arc::clone(&reads),
        },
        Utf8Codec,
    )
    .unwrap();

    let (sent_tx, sent_rx) = mpsc::channel();
    for i in 0..100 {
        let sent_tx = sent_tx.clone();
        a.send_line(format!("unread {i}"), move |r, ()| sent_tx.send(r).unwrap(), ());
    }
    for _ in 0..100 {
        sent_rx.recv_timeout(TIMEOUT).unwrap().unwrap();
    }
    thread::sleep(Duration::from_millis(50));
    assert_eq!(reads.load(Ordering::SeqCst), 0);

    let (tx, rx) = mpsc::channel();
    b.receive(move |line, ()| tx.send(line.unwrap()).unwrap(), ());
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "unread 0");

    let after_first = reads.load(Ordering::SeqCst);
    assert!(after_first >= 1);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(reads.load(Ordering::SeqCst), after_first);
}

#[test]
fn one_byte_transports_still_frame_lines() {
    let (left, right) = unix_pair();
    let a = LineChannel::new(OneByte(left), Utf8Codec).unwrap();
    let b = LineChannel::new(OneByte(right), Utf8Codec).unwrap();
    let (tx, rx) = mpsc::channel();

    for _ in 0..3 {
        let tx = tx.clone();
        b.receive(move |line, ()| tx.send(line.unwrap()).unwrap(), ());
    }
    a.send("Hello world\nThis is a test\n", |result, ()| result.unwrap(), ());
    a.send_line("héllo ☃", |result, ()| result.unwrap(), ());

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "Hello world");
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "This is a test");
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "héllo ☃");
}

#[test]
fn blocked_callback_does_not_stall_the_channel() {
    let (a, b) = channel_pair();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (tx, rx) = mpsc::channel();

    b.receive(
        move |line, ()| {
            release_rx.recv().unwrap();
            drop(line);
        },
        (),
    );
    let second_tx = tx.clone();
    b.receive(move |line, ()| second_tx.send(line.unwrap()).unwrap(), ());
    a.send("one\ntwo\n", |_, ()| {}, ());

    // The second line is matched even though the first callback has not
    // returned, and the send direction keeps completing.
    wait_until(|| b.pending_receives() == 0);
    b.send_line("reply", move |result, ()| tx.send(format!("{result:?}")).unwrap(), ());
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "Ok(())");

    release_tx.send(()).unwrap();
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "two");
}

#[test]
fn callbacks_may_use_the_channel_again() {
    fn echo(channel: LineChannel, remaining: usize) {
        if remaining == 0 {
            return;
        }
        let next = channel.clone();
        channel.receive(
            move |line, ()| {
                let line = line.unwrap();
                next.send_line(format!("echo {line}"), |result, ()| result.unwrap(), ());
                echo(next, remaining - 1);
            },
            (),
        );
    }

    let (a, b) = channel_pair();
    echo(b, 5);

    let (tx, rx) = mpsc::channel();
    for i in 0..5 {
        a.send_line(i.to_string(), |result, ()| result.unwrap(), ());
        let tx = tx.clone();
        a.receive(move |line, ()| tx.send(line.unwrap()).unwrap(), ());
    }
    for i in 0..5 {
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), format!("echo {i}"));
    }
}

#[test]
fn peer_close_fails_waiting_receives() {
    let (a, b) = channel_pair();
    let (tx, rx) = mpsc::channel();

    for _ in 0..2 {
        let tx = tx.clone();
        b.receive(move |line, ()| tx.send(line).unwrap(), ());
    }
    a.send("complete\nincomplete", |_, ()| {}, ());
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().unwrap(), "complete");

    drop(a);
    let err = rx.recv_timeout(TIMEOUT).unwrap().unwrap_err();
    assert!(matches!(err, ChannelError::ConnectionClosed));
}

#[test]
fn tcp_transport_roundtrip() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = thread::spawn(move || listener.accept().unwrap().0);

    let a = LineChannel::new(StreamTransport::connect_tcp(&addr).unwrap(), Utf8Codec).unwrap();
    let b = LineChannel::new(
        StreamTransport::from_tcp(server.join().unwrap()).unwrap(),
        Utf8Codec,
    )
    .unwrap();
    let (tx, rx) = mpsc::channel();

    b.receive(move |line, ()| tx.send(line.unwrap()).unwrap(), ());
    a.send_line("over tcp", |result, ()| result.unwrap(), ());
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "over tcp");
}

fn channel_and_raw_peer() -> (LineChannel, UnixStream) {
    let (left, right) = UnixStream::pair().unwrap();
    right.set_read_timeout(Some(TIMEOUT)).unwrap();
    let channel = LineChannel::new(StreamTransport::from_unix(left).unwrap(), Utf8Codec).unwrap();
    (channel, right)
}

#[test]
fn dropping_channel_with_waiting_receive_closes_connection() {
    let (a, mut peer) = channel_and_raw_peer();
    let (tx, rx) = mpsc::channel();

    a.receive(move |line, ()| tx.send(line).unwrap(), ());
    wait_until(|| a.pending_receives() == 1);
    drop(a);

    let err = rx.recv_timeout(TIMEOUT).unwrap().unwrap_err();
    assert!(matches!(err, ChannelError::ConnectionClosed));

    let mut buf = [0u8; 16];
    assert_eq!(peer.read(&mut buf).unwrap(), 0);
}

#[test]
fn queued_sends_drain_after_last_handle_is_dropped() {
    let (a, mut peer) = channel_and_raw_peer();

    for i in 0..50 {
        a.send_line(format!("parting {i}"), |_, ()| {}, ());
    }
    drop(a);

    let mut received = String::new();
    peer.read_to_string(&mut received).unwrap();
    let expected: String = (0..50).map(|i| format!("parting {i}\n")).collect();
    assert_eq!(received, expected);
}
