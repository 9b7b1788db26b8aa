use super::{MemoryPipe, Outcome, OverlappedError, WriteBuffer, WriteFailure, WriteOverlapped};
use crate::io::{
    ERROR_BROKEN_PIPE, ERROR_IO_INCOMPLETE, ERROR_NOT_FOUND, ERROR_NO_DATA,
    ERROR_OPERATION_ABORTED, ERROR_PIPE_NOT_CONNECTED,
};
use bytes::Bytes;

#[test]
fn pipewriter_test_buffer_coalesces_small_appends() {
    let mut buffer = WriteBuffer::new(8);
    buffer.append(b"abc");
    buffer.append(b"def");
    assert_eq!(6, buffer.len());
    assert_eq!(b"abcdef", buffer.next_block(usize::MAX));

    // A block handed out is frozen, later appends land behind it
    buffer.append(b"gh");
    assert_eq!(b"abcdef", buffer.next_block(usize::MAX));
    buffer.free(6);
    assert_eq!(b"gh", buffer.next_block(usize::MAX));
    buffer.free(2);
    assert!(buffer.is_empty());
    assert_eq!(b"", buffer.next_block(usize::MAX));
}

#[test]
fn pipewriter_test_buffer_block_is_stable() {
    let mut buffer = WriteBuffer::new(4);
    buffer.append(b"01");
    let block = buffer.next_block(usize::MAX);
    let (ptr, len) = (block.as_ptr(), block.len());
    buffer.append(b"2345678");
    buffer.append(b"9");
    let block = buffer.next_block(usize::MAX);
    assert_eq!(ptr, block.as_ptr());
    assert_eq!(len, block.len());
    assert_eq!(b"01", block);
}

#[test]
fn pipewriter_test_buffer_limits_block_size() {
    let mut buffer = WriteBuffer::new(4);
    buffer.append(b"0123456789");
    assert_eq!(b"012", buffer.next_block(3));
    buffer.free(3);
    assert_eq!(b"3456789", buffer.next_block(usize::MAX));
    assert_eq!(7, buffer.len());
}

#[test]
fn pipewriter_test_buffer_preserves_order() {
    let mut buffer = WriteBuffer::new(4);
    buffer.append(b"a");
    buffer.append_bytes(Bytes::from_static(b"bcdef"));
    buffer.append(b"g");
    buffer.append(b"hijkl");
    let mut out = Vec::new();
    while !buffer.is_empty() {
        let block = buffer.next_block(2).to_vec();
        buffer.free(block.len());
        out.extend_from_slice(&block);
    }
    assert_eq!(b"abcdefghijkl", &out[..]);
}

#[test]
fn pipewriter_test_buffer_clear() {
    let mut buffer = WriteBuffer::new(16);
    buffer.append(b"hello");
    buffer.append_bytes(Bytes::from_static(b"world"));
    buffer.clear();
    assert!(buffer.is_empty());
    assert_eq!(b"", buffer.next_block(usize::MAX));
    buffer.append(b"x");
    assert_eq!(b"x", buffer.next_block(usize::MAX));
}

#[test]
fn pipewriter_test_write_failure_expected() {
    assert!(WriteFailure::new(ERROR_PIPE_NOT_CONNECTED).is_expected());
    assert!(WriteFailure::new(ERROR_OPERATION_ABORTED).is_expected());
    assert!(WriteFailure::new(ERROR_NO_DATA).is_expected());
    assert!(!WriteFailure::new(ERROR_BROKEN_PIPE).is_expected());
    assert!(!WriteFailure::new(5).is_expected());
    assert_eq!(ERROR_BROKEN_PIPE, WriteFailure::from(OverlappedError::Os(109)).code());
    assert!(WriteFailure::new(ERROR_BROKEN_PIPE)
        .to_string()
        .contains("109"));
}

#[test]
fn pipewriter_test_memory_pipe_sync() {
    let pipe = MemoryPipe::new();
    let mut overlapped = MemoryPipe::overlapped().unwrap();
    assert_eq!(3, pipe.write_overlapped(&mut overlapped, b"abc").unwrap());
    assert_eq!(3, pipe.overlapped_result(&overlapped, false).unwrap());
    assert_eq!(&b"abc"[..], &pipe.written()[..]);
    assert_eq!(0, pipe.outstanding());
}

#[test]
fn pipewriter_test_memory_pipe_pending() {
    let pipe = MemoryPipe::new();
    pipe.script([Outcome::Pend]);
    let mut overlapped = MemoryPipe::overlapped().unwrap();
    let result = pipe.write_overlapped(&mut overlapped, b"abc");
    assert!(matches!(result, Err(OverlappedError::Pending)));
    assert_eq!(1, pipe.outstanding());
    assert!(pipe.written().is_empty());
    let incomplete = pipe.overlapped_result(&overlapped, false).unwrap_err();
    assert_eq!(ERROR_IO_INCOMPLETE, incomplete.code());

    // Completion signals the request event and exposes the result
    assert!(!MemoryPipe::waitable(&overlapped).is_set());
    assert!(pipe.complete_pending());
    assert!(MemoryPipe::waitable(&overlapped).is_set());
    assert_eq!(3, pipe.overlapped_result(&overlapped, true).unwrap());
    assert_eq!(&b"abc"[..], &pipe.written()[..]);
    assert!(!pipe.complete_pending());
}

#[test]
fn pipewriter_test_memory_pipe_cancel() {
    let pipe = MemoryPipe::with_fallback(Outcome::Pend);
    let mut overlapped = MemoryPipe::overlapped().unwrap();
    assert!(pipe.write_overlapped(&mut overlapped, b"abc").is_err());
    pipe.cancel_overlapped(&overlapped).unwrap();
    let aborted = pipe.overlapped_result(&overlapped, true).unwrap_err();
    assert_eq!(ERROR_OPERATION_ABORTED, aborted.code());
    assert_eq!(0, pipe.outstanding());

    // Nothing left to cancel
    let err = pipe.cancel_overlapped(&overlapped).unwrap_err();
    assert_eq!(ERROR_NOT_FOUND, err.code());
}

#[test]
fn pipewriter_test_memory_pipe_closed() {
    let pipe = MemoryPipe::new();
    pipe.close(ERROR_NO_DATA);
    let mut overlapped = MemoryPipe::overlapped().unwrap();
    let err = pipe.write_overlapped(&mut overlapped, b"abc").unwrap_err();
    assert_eq!(ERROR_NO_DATA, err.code());
    assert_eq!(1, pipe.issued().len());
    assert!(pipe.written().is_empty());
}

#[cfg(windows)]
#[test]
fn pipewriter_test_overlapped_layout() {
    use super::Overlapped;
    use std::mem;
    use windows_sys::Win32::System::IO::{OVERLAPPED, OVERLAPPED_0, OVERLAPPED_0_0};

    let newtyp = Overlapped {
        internal: 0,
        internal_high: 1,
        offset: 2,
        offset_high: 3,
        hevent: 4,
    };
    let expect = OVERLAPPED {
        Internal: 0,
        InternalHigh: 1,
        Anonymous: OVERLAPPED_0 {
            Anonymous: OVERLAPPED_0_0 {
                Offset: 2,
                OffsetHigh: 3,
            },
        },
        hEvent: 4,
    };
    let from_newtyp = unsafe { *newtyp.as_ptr() };
    assert_eq!(mem::size_of::<OVERLAPPED>(), mem::size_of::<Overlapped>());
    assert_eq!(expect.Internal, from_newtyp.Internal);
    assert_eq!(expect.InternalHigh, from_newtyp.InternalHigh);
    assert_eq!(expect.hEvent, from_newtyp.hEvent);
    unsafe {
        assert_eq!(
            expect.Anonymous.Anonymous.Offset,
            from_newtyp.Anonymous.Anonymous.Offset
        );
        assert_eq!(
            expect.Anonymous.Anonymous.OffsetHigh,
            from_newtyp.Anonymous.Anonymous.OffsetHigh
        );
    }
}
