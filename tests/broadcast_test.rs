//! Multi-threaded broadcast scenarios

use std::io::{self, Read};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use bytecast::{
    BroadcastConsumer, BroadcastError, BroadcastStream, BroadcastWriter, StreamConfig,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn stream_with(buffer_size: usize, poll_ms: u64) -> (BroadcastStream, BroadcastWriter) {
    init_tracing();
    BroadcastStream::with_config(
        StreamConfig::default()
            .buffer_size(buffer_size)
            .poll_interval(Duration::from_millis(poll_ms))
            .debug(true),
    )
    .unwrap()
}

/// Read every byte, recording `None` (the end marker) as the final element
fn read_all(consumer: &mut BroadcastConsumer) -> Vec<Option<u8>> {
    let mut out = Vec::new();
    loop {
        let next = consumer.read_byte().unwrap();
        out.push(next);
        if next.is_none() {
            return out;
        }
    }
}

fn expected(bytes: &[u8]) -> Vec<Option<u8>> {
    bytes.iter().copied().map(Some).chain([None]).collect()
}

fn pattern(len: usize) -> Vec<u8> {
    let mut x: u32 = 0x9e37_79b9;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            x as u8
        })
        .collect()
}

#[test]
fn test_two_consumers_replay_same_sequence() {
    let (stream, mut writer) = stream_with(4, 1);
    let mut c1 = stream.subscribe("c1").unwrap();
    let mut c2 = stream.subscribe("c2").unwrap();

    writer.publish(b"ABCD").unwrap();
    writer.publish(b"E").unwrap();
    writer.finish().unwrap();

    let t1 = thread::spawn(move || (read_all(&mut c1), c1));
    let t2 = thread::spawn(move || (read_all(&mut c2), c2));
    let (seq1, c1) = t1.join().unwrap();
    let (seq2, c2) = t2.join().unwrap();

    assert_eq!(seq1, expected(b"ABCDE"));
    assert_eq!(seq2, expected(b"ABCDE"));
    for c in [&c1, &c2] {
        assert!(!c.is_open());
        assert!(c.error().is_none());
    }
}

#[test]
fn test_paused_consumer_holds_buffer() {
    let (stream, mut writer) = stream_with(4, 1);
    let mut c1 = stream.subscribe("c1").unwrap();
    let mut c2 = stream.subscribe("c2").unwrap();

    writer.publish(b"ABCD").unwrap();
    let buffer1 = stream.tail();
    assert_eq!(buffer1.data(), b"ABCD");
    assert_eq!(buffer1.outstanding(), 2);

    writer.publish(b"E").unwrap();
    writer.finish().unwrap();

    assert_eq!(read_all(&mut c1), expected(b"ABCDE"));
    assert_eq!(buffer1.outstanding(), 1);
    assert!(!buffer1.is_reclaimed());

    assert_eq!(read_all(&mut c2), expected(b"ABCDE"));
    assert!(buffer1.is_reclaimed());
}

#[test]
fn test_producer_fault_closes_consumers_quietly() {
    let (stream, mut writer) = stream_with(4, 1);
    let mut c1 = stream.subscribe("c1").unwrap();
    let mut c2 = stream.subscribe("c2").unwrap();

    writer.publish(b"AB").unwrap();
    writer
        .fail(BroadcastError::SourceFault("decoder crashed".into()))
        .unwrap();

    for c in [&mut c1, &mut c2] {
        assert_eq!(read_all(c), expected(b"AB"));
        assert!(!c.is_open());
        assert!(c.had_error());
        let err = c.error().unwrap();
        assert!(matches!(*err, BroadcastError::SourceFault(ref m) if m == "decoder crashed"));
    }

    // Both consumers report the same captured fault
    assert!(Arc::ptr_eq(&c1.error().unwrap(), &c2.error().unwrap()));
}

#[test]
fn test_many_consumers_with_lag() {
    let data = pattern(50_000);
    let (stream, mut writer) = stream_with(64, 1);

    let consumers: Vec<_> = (0..6)
        .map(|i| stream.subscribe(format!("c{}", i)).unwrap())
        .collect();

    let readers: Vec<_> = consumers
        .into_iter()
        .enumerate()
        .map(|(i, mut consumer)| {
            thread::spawn(move || {
                let mut out = Vec::new();
                while let Some(b) = consumer.read_byte().unwrap() {
                    out.push(b);
                    // Odd consumers fall behind now and then
                    if i % 2 == 1 && out.len() % 10_000 == 0 {
                        thread::sleep(Duration::from_millis(5));
                    }
                }
                (out, consumer.stats())
            })
        })
        .collect();

    for chunk in data.chunks(777) {
        writer.publish(chunk).unwrap();
    }
    writer.finish().unwrap();

    for reader in readers {
        let (out, stats) = reader.join().unwrap();
        assert_eq!(out, data);
        assert_eq!(stats.bytes_read, data.len() as u64);
        assert!(!stats.open);
        assert!(stats.elapsed.is_some());
    }

    let stats = stream.stats();
    assert_eq!(stats.consumer_count, 0);
    assert_eq!(stats.bytes_published, data.len() as u64);
    // Every buffer, head included, reclaimed exactly once
    assert_eq!(stats.buffers_reclaimed, stats.buffers_appended + 1);
}

#[test]
fn test_io_read_interface() {
    let data = pattern(10_000);
    let (stream, mut writer) = stream_with(256, 1);
    let consumer = stream.subscribe("reader").unwrap();

    let reader = thread::spawn(move || {
        let mut consumer = consumer;
        let mut out = Vec::new();
        consumer.read_to_end(&mut out).unwrap();
        out
    });

    writer.pump(&data[..]).unwrap();
    assert_eq!(reader.join().unwrap(), data);
}

#[test]
fn test_source_io_error_raised_to_reader() {
    let (stream, mut writer) = stream_with(8, 1);
    let mut consumer = stream.subscribe("reader").unwrap();

    struct Truncated(bool);
    impl Read for Truncated {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated"));
            }
            self.0 = true;
            buf[..3].copy_from_slice(b"xyz");
            Ok(3)
        }
    }

    assert!(writer.pump(Truncated(false)).is_err());

    let mut out = Vec::new();
    let err = consumer.read_to_end(&mut out).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    assert_eq!(out, b"xyz");
    assert!(!consumer.is_open());
    assert!(!consumer.had_error());
}

#[test]
fn test_concurrent_close_is_idempotent() {
    let (stream, _writer) = stream_with(4, 1);
    let consumer = stream.subscribe("c1").unwrap();
    let _other = stream.subscribe("c2").unwrap();
    assert_eq!(stream.consumer_count(), 2);

    let barrier = Arc::new(Barrier::new(8));
    let closers: Vec<_> = (0..8)
        .map(|_| {
            let handle = consumer.handle();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                handle.close()
            })
        })
        .collect();

    let transitions = closers
        .into_iter()
        .map(|t| t.join().unwrap())
        .filter(|closed| *closed)
        .count();

    assert_eq!(transitions, 1);
    assert_eq!(stream.consumer_count(), 1);
    assert!(!consumer.close());
}

#[test]
fn test_waiting_consumer_sees_new_data_within_poll_interval() {
    let poll = Duration::from_millis(20);
    let (stream, mut writer) = stream_with(4, 20);
    let mut consumer = stream.subscribe("c1").unwrap();

    let reader = thread::spawn(move || {
        let first = consumer.read_byte().unwrap();
        (first, Instant::now(), consumer)
    });

    thread::sleep(Duration::from_millis(50));
    let published_at = Instant::now();
    writer.publish(b"Z").unwrap();
    writer.publish_partial().unwrap();

    let (first, read_at, consumer) = reader.join().unwrap();
    assert_eq!(first, Some(b'Z'));
    // One poll interval, plus scheduling slack
    assert!(read_at.duration_since(published_at) < poll * 10);
    assert!(consumer.stats().waits > 0);
}

#[test]
fn test_late_subscriber_starts_at_tail() {
    let (stream, mut writer) = stream_with(4, 1);
    let mut early = stream.subscribe("early").unwrap();

    writer.publish(b"ABCD").unwrap();
    writer.publish(b"EFGH").unwrap();
    let mut late = stream.subscribe("late").unwrap();
    writer.publish(b"IJ").unwrap();
    writer.finish().unwrap();

    assert_eq!(read_all(&mut early), expected(b"ABCDEFGHIJ"));
    assert_eq!(read_all(&mut late), expected(b"EFGHIJ"));

    let stats = stream.stats();
    assert_eq!(stats.buffers_reclaimed, stats.buffers_appended + 1);
}

#[test]
fn test_report_lines() {
    let (stream, mut writer) = stream_with(4, 1);
    let mut consumer = stream.subscribe("reporter").unwrap();
    let handle = consumer.handle();

    writer.publish(b"ABC").unwrap();
    writer.finish().unwrap();
    read_all(&mut consumer);

    let report = handle.report(1);
    assert!(report.starts_with("[(1) Label: reporter -- Thrd: ThreadId("));
    assert!(report.contains("TtlRead: 3"));
    assert!(report.contains("Open: false"));
    assert!(handle
        .to_string()
        .starts_with("BroadcastConsumer -- reporter, isOpen: false, BytesRead: 3"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_pump_feeds_blocking_consumers() {
    let data = pattern(4_096);
    let (stream, mut writer) = stream_with(128, 1);

    let readers: Vec<_> = (0..3)
        .map(|i| {
            let mut consumer = stream.subscribe(format!("c{}", i)).unwrap();
            tokio::task::spawn_blocking(move || {
                let mut out = Vec::new();
                consumer.read_to_end(&mut out).map(|_| out)
            })
        })
        .collect();

    let copied = writer.pump_async(&data[..]).await.unwrap();
    assert_eq!(copied, data.len() as u64);

    for reader in readers {
        assert_eq!(reader.await.unwrap().unwrap(), data);
    }
}
