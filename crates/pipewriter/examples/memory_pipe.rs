//! memory_pipe

use pipewriter::{
    io::{MemoryPipe, Outcome},
    notify::FlushPending,
    MemoryPipeWriter,
};
use std::{
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, prelude::*};

#[tokio::main]
async fn main() -> io::Result<()> {
    // Setup logging
    let stdout = fmt::layer()
        .compact()
        .with_ansi(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false)
        .with_target(true);
    tracing_subscriber::registry()
        .with(stdout)
        .with(LevelFilter::TRACE)
        .init();

    // Print welcome message
    info!("Starting pipe writer demo");

    // A pipe whose reader only accepts one write every 100ms
    let pipe = MemoryPipe::with_fallback(Outcome::Pend);
    let reader = tokio::spawn({
        let pipe = pipe.clone();
        async move {
            let mut interval = tokio::time::interval(Duration::from_millis(100));
            loop {
                interval.tick().await;
                pipe.complete_pending();
            }
        }
    });

    // Notifications are delivered to this task through the channel
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<FlushPending>();
    let writer = MemoryPipeWriter::new(Some(pipe.clone()), tx)?;
    let total = Arc::new(AtomicU64::new(0));
    writer.on_bytes_written({
        let total = Arc::clone(&total);
        move |writer, n| {
            let sum = total.fetch_add(n, Ordering::SeqCst) + n;
            info!(n, sum, remaining = writer.bytes_to_write(), "bytes written");
        }
    });

    // Writes never block, they queue behind the outstanding write
    let messages = ["hello", "from", "the", "owner", "task"];
    let expect: u64 = messages.iter().map(|m| m.len() as u64).sum();
    for message in messages {
        writer.write(message.as_bytes());
    }
    info!(queued = writer.bytes_to_write(), "all messages queued");

    while let Some(FlushPending) = rx.recv().await {
        writer.process_notification();
        if total.load(Ordering::SeqCst) == expect {
            break;
        }
    }

    // Print exit message
    writer.stop();
    reader.abort();
    info!(written = ?String::from_utf8_lossy(&pipe.written()), "all done");
    Ok(())
}
