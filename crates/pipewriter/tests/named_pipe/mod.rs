//! named_pipe

use crate::util::{eventually, TIMEOUT};
use parking_lot::Mutex;
use pipewriter::{io::RawPipeHandle, notify, NamedPipeWriter};
use std::{
    os::windows::io::{AsHandle, AsRawHandle, FromRawHandle, OwnedHandle},
    sync::Arc,
    thread,
};
use windows_sys::Win32::{
    Foundation::{FALSE, GENERIC_READ, INVALID_HANDLE_VALUE},
    Storage::FileSystem::{
        CreateFileW, ReadFile, FILE_ATTRIBUTE_NORMAL, FILE_FLAG_OVERLAPPED, OPEN_EXISTING,
        PIPE_ACCESS_OUTBOUND,
    },
    System::Pipes::{CreateNamedPipeW, PIPE_READMODE_BYTE, PIPE_TYPE_BYTE, PIPE_WAIT},
};

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// An overlapped outbound server end and a blocking client end
fn pipe_pair(name: &str) -> (OwnedHandle, OwnedHandle) {
    let name = wide(&format!(r"\\.\pipe\pipewriter-{name}-{}", std::process::id()));
    let server = unsafe {
        CreateNamedPipeW(
            name.as_ptr(),
            PIPE_ACCESS_OUTBOUND | FILE_FLAG_OVERLAPPED,
            PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT,
            1,
            4096,
            4096,
            0,
            std::ptr::null(),
        )
    };
    assert_ne!(INVALID_HANDLE_VALUE, server);
    let client = unsafe {
        CreateFileW(
            name.as_ptr(),
            GENERIC_READ,
            0,
            std::ptr::null(),
            OPEN_EXISTING,
            FILE_ATTRIBUTE_NORMAL,
            0,
        )
    };
    assert_ne!(INVALID_HANDLE_VALUE, client);
    unsafe {
        (
            OwnedHandle::from_raw_handle(server as _),
            OwnedHandle::from_raw_handle(client as _),
        )
    }
}

fn read_exact(client: &OwnedHandle, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    let mut offset = 0;
    while offset < len {
        let mut read = 0u32;
        let result = unsafe {
            ReadFile(
                client.as_raw_handle() as _,
                out[offset..].as_mut_ptr(),
                (len - offset) as _,
                &mut read,
                std::ptr::null_mut(),
            )
        };
        assert_ne!(FALSE, result);
        offset += read as usize;
    }
    out
}

#[test]
fn pipewriter_test_named_pipe() {
    let (server, client) = pipe_pair("roundtrip");
    let (tx, rx) = notify::channel();
    let handle = RawPipeHandle::borrowed(server.as_handle());
    let writer = NamedPipeWriter::new(Some(handle), tx).unwrap();
    let seen = Arc::new(Mutex::new(0u64));
    writer.on_bytes_written({
        let seen = Arc::clone(&seen);
        move |_, n| *seen.lock() += n
    });

    // Larger than the pipe buffer, so writes are left outstanding
    let payload: Vec<u8> = (0..256 * 1024).map(|n| n as u8).collect();
    let reader = thread::spawn({
        let len = payload.len();
        move || read_exact(&client, len)
    });
    writer.write(&payload);
    assert_eq!(payload, reader.join().unwrap());

    eventually(|| {
        writer.drain_notifications(&rx);
        writer.check_for_write();
        *seen.lock() == payload.len() as u64
    });
    assert_eq!(0, writer.bytes_to_write());
    assert!(writer.last_error().is_none());
    writer.stop();
}

#[test]
fn pipewriter_test_named_pipe_reader_gone() {
    let (server, client) = pipe_pair("reader-gone");
    let (tx, _rx) = notify::channel();
    let writer = NamedPipeWriter::new(Some(RawPipeHandle::borrowed(server.as_handle())), tx).unwrap();
    drop(client);

    writer.write(b"nobody listens");
    let failure = writer.last_error().unwrap();
    assert!(failure.is_expected(), "{failure}");
    assert_eq!(0, writer.bytes_to_write());
    assert!(!writer.wait_for_write(Some(TIMEOUT)));
}

#[test]
fn pipewriter_test_named_pipe_stop_outstanding() {
    let (server, _client) = pipe_pair("stop");
    let (tx, rx) = notify::channel();
    let writer = NamedPipeWriter::new(Some(RawPipeHandle::borrowed(server.as_handle())), tx).unwrap();

    // Nobody reads, the write stays outstanding until cancelled
    writer.write(&vec![1u8; 64 * 1024]);
    assert!(writer.is_write_operation_active());
    writer.stop();
    assert!(!writer.is_write_operation_active());
    assert_eq!(0, writer.drain_notifications(&rx));
    drop(writer);
    drop(server);
}
