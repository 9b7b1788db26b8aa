//! properties

use crate::util::{eventually, recorder};
use pipewriter::{
    io::{MemoryPipe, Outcome, ERROR_BROKEN_PIPE},
    notify, MemoryPipeWriter, PipeWriterOptions,
};

/// Resolve outstanding writes until the writer has nothing in flight
fn settle(writer: &MemoryPipeWriter, pipe: &MemoryPipe) {
    eventually(|| {
        pipe.complete_pending();
        !writer.is_write_operation_active()
    });
}

fn payload(i: usize) -> Vec<u8> {
    (0..(i * 7) % 23 + 1).map(|n| (i + n) as u8).collect()
}

#[test]
fn pipewriter_test_order_and_accounting() {
    let pipe = MemoryPipe::new();
    let (tx, rx) = notify::channel();
    let options = PipeWriterOptions {
        max_write_size: 9,
        chunk_capacity: 16,
    };
    let writer = MemoryPipeWriter::with_options(Some(pipe.clone()), tx, options).unwrap();
    let seen = recorder(&writer);

    let mut enqueued = Vec::new();
    for i in 0..64 {
        let outcome = match i % 3 {
            0 => Outcome::Pend,
            _ => Outcome::Complete,
        };
        pipe.script([outcome, Outcome::Pend]);
        let bytes = payload(i);
        enqueued.extend_from_slice(&bytes);
        writer.write(&bytes);
        if i % 4 == 3 {
            settle(&writer, &pipe);
            writer.drain_notifications(&rx);
        }
    }
    settle(&writer, &pipe);
    writer.drain_notifications(&rx);
    // The last token may still be on its way
    writer.check_for_write();

    // Segments reach the OS in order, without duplication
    let issued: Vec<u8> = pipe.issued().iter().flat_map(|s| s.to_vec()).collect();
    assert_eq!(enqueued, issued);
    assert_eq!(&enqueued[..], &pipe.written()[..]);

    // Everything written was reported, nothing more
    let reported: u64 = seen.lock().iter().sum();
    assert_eq!(enqueued.len() as u64, reported);
    assert_eq!(0, writer.bytes_to_write());
    assert!(pipe.max_outstanding() <= 1);
}

#[test]
fn pipewriter_test_one_outstanding_write() {
    let pipe = MemoryPipe::with_fallback(Outcome::Pend);
    let (tx, _rx) = notify::channel();
    let writer = MemoryPipeWriter::new(Some(pipe.clone()), tx).unwrap();

    for i in 0..16 {
        writer.write(&payload(i));
        assert_eq!(1, pipe.outstanding());
    }
    settle(&writer, &pipe);
    assert_eq!(1, pipe.max_outstanding());
}

#[test]
fn pipewriter_test_stop_twice() {
    let pipe = MemoryPipe::with_fallback(Outcome::Pend);
    let (tx, rx) = notify::channel();
    let writer = MemoryPipeWriter::new(Some(pipe.clone()), tx).unwrap();
    let seen = recorder(&writer);
    writer.write(b"pending");

    writer.stop();
    let after_once = (writer.bytes_to_write(), pipe.issued().len(), pipe.outstanding());
    writer.stop();
    let after_twice = (writer.bytes_to_write(), pipe.issued().len(), pipe.outstanding());
    assert_eq!(after_once, after_twice);
    assert!(!writer.is_write_operation_active());
    assert_eq!(0, writer.drain_notifications(&rx));
    assert!(seen.lock().is_empty());
}

#[test]
fn pipewriter_test_failure_poisons() {
    let pipe = MemoryPipe::with_fallback(Outcome::Pend);
    let (tx, rx) = notify::channel();
    let writer = MemoryPipeWriter::new(Some(pipe.clone()), tx).unwrap();
    let seen = recorder(&writer);

    writer.write(b"abc");
    writer.write(b"def");
    assert!(pipe.fail_pending(ERROR_BROKEN_PIPE));
    eventually(|| writer.last_error().is_some());
    assert_eq!(0, writer.bytes_to_write());

    for i in 0..8 {
        writer.write(&payload(i));
    }
    assert_eq!(0, writer.bytes_to_write());
    assert_eq!(1, pipe.issued().len());
    assert_eq!(0, writer.drain_notifications(&rx));
    assert!(seen.lock().is_empty());
}

#[test]
fn pipewriter_test_drop_while_outstanding() {
    let pipe = MemoryPipe::with_fallback(Outcome::Pend);
    let (tx, _rx) = notify::channel();
    let writer = MemoryPipeWriter::new(Some(pipe.clone()), tx).unwrap();
    writer.write(b"never completes");
    assert_eq!(1, pipe.outstanding());
    drop(writer);
    assert_eq!(0, pipe.outstanding());
    assert!(pipe.written().is_empty());
}
