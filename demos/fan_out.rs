//! Fan one byte source out to several reader threads
//!
//! Run with: cargo run --example fan_out [FILE] [READERS]
//!
//! Examples:
//!   cargo run --example fan_out                     # 1 MiB of generated data, 4 readers
//!   cargo run --example fan_out Cargo.toml 8        # replay a file to 8 readers
//!   RUST_LOG=debug cargo run --example fan_out      # show register/close events
//!
//! Every reader computes a simple checksum of what it saw; all checksums
//! must match. Reader 0 is deliberately slow to show that a lagging reader
//! never holds up the others.

use std::fs::File;
use std::io::Read;
use std::thread;
use std::time::Duration;

use bytecast::{BroadcastStream, StreamConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next();
    let readers: usize = args.next().map(|n| n.parse()).transpose()?.unwrap_or(4);

    let config = StreamConfig::default()
        .buffer_size(16 * 1024)
        .poll_interval(Duration::from_millis(2))
        .debug(true);
    let (stream, mut writer) = BroadcastStream::with_config(config)?;

    let mut handles = Vec::with_capacity(readers);
    let threads: Vec<_> = (0..readers)
        .map(|i| -> Result<_, bytecast::BroadcastError> {
            let mut consumer = stream.subscribe(format!("reader-{}", i))?;
            handles.push(consumer.handle());
            Ok(thread::spawn(move || {
                let mut buf = [0u8; 4096];
                let mut checksum = 0u64;
                loop {
                    match consumer.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            for &b in &buf[..n] {
                                checksum = checksum.wrapping_mul(31).wrapping_add(u64::from(b));
                            }
                            if i == 0 {
                                thread::sleep(Duration::from_micros(200));
                            }
                        }
                        Err(e) => {
                            eprintln!("reader-{} failed: {}", i, e);
                            break;
                        }
                    }
                }
                checksum
            }))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let copied = match path {
        Some(path) => writer.pump(File::open(path)?)?,
        None => {
            let data: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();
            writer.pump(&data[..])?
        }
    };
    println!("Published {} bytes", copied);

    let checksums: Vec<u64> = threads
        .into_iter()
        .map(|t| t.join().unwrap_or(0))
        .collect();

    for (i, handle) in handles.iter().enumerate() {
        println!("{}", handle.report(i));
    }

    let stats = stream.stats();
    println!(
        "Buffers: {} appended, {} reclaimed, {} consumers open",
        stats.buffers_appended, stats.buffers_reclaimed, stats.consumer_count
    );

    if checksums.windows(2).all(|w| w[0] == w[1]) {
        println!("All {} readers saw identical data", checksums.len());
    } else {
        println!("Checksum mismatch: {:?}", checksums);
    }

    Ok(())
}
