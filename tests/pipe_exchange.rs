//! End-to-end exchange tests for the pipe.
//!
//! A writer and a reader run on separate threads (or as futures driven by
//! `block_on`) and must reconstruct every byte sequence exactly, regardless
//! of how reads fragment the writes. The property test at the bottom checks
//! reconstruction for arbitrary data and arbitrary read-buffer partitions.

use proptest::prelude::*;
use rendsync::test_utils::{block_on, init_test_logging};
use rendsync::{PipeError, RendezvousPipe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn init_test(name: &str) {
    init_test_logging();
    rendsync::test_phase!(name);
}

#[test]
fn pipe_delivers_one_write_to_one_read() {
    init_test("pipe_delivers_one_write_to_one_read");
    let pipe = RendezvousPipe::new();
    let data = b"hello world";

    let writer = {
        let pipe = pipe.clone();
        thread::spawn(move || pipe.write(data).expect("write failed"))
    };

    let mut buf = [0u8; 11];
    let read = pipe.read(&mut buf).expect("read failed");
    let written = writer.join().expect("writer thread panicked");

    rendsync::assert_with_log!(read == data.len(), "read size", data.len(), read);
    rendsync::assert_with_log!(written == data.len(), "written size", data.len(), written);
    rendsync::assert_with_log!(&buf == data, "read bytes", data, &buf);
    rendsync::test_complete!("pipe_delivers_one_write_to_one_read");
}

#[test]
fn pipe_fragments_write_across_one_byte_reads() {
    init_test("pipe_fragments_write_across_one_byte_reads");
    let pipe = RendezvousPipe::new();
    let data = b"hello world";

    let writer = {
        let pipe = pipe.clone();
        thread::spawn(move || pipe.write(data).expect("write failed"))
    };

    let mut collected = Vec::with_capacity(data.len());
    for _ in 0..data.len() {
        let mut buf = [0u8; 1];
        let read = pipe.read(&mut buf).expect("read failed");
        rendsync::assert_with_log!(read == 1, "one byte per read", 1usize, read);
        collected.push(buf[0]);
    }
    writer.join().expect("writer thread panicked");

    rendsync::assert_with_log!(collected == data, "byte order", data, collected);
    rendsync::test_complete!("pipe_fragments_write_across_one_byte_reads");
}

#[test]
fn write_blocks_until_reads_drain_it() {
    init_test("write_blocks_until_reads_drain_it");
    let pipe = RendezvousPipe::new();
    let finished = Arc::new(AtomicBool::new(false));

    let writer = {
        let pipe = pipe.clone();
        let finished = Arc::clone(&finished);
        thread::spawn(move || {
            pipe.write(b"12345678").expect("write failed");
            finished.store(true, Ordering::SeqCst);
        })
    };

    // Each read consumes one offer and returns min(remaining, buffer len):
    // 8 bytes through 3-byte buffers arrive as 3, 3, 2.
    let mut sizes = Vec::new();
    let mut collected = Vec::new();
    while collected.len() < 8 {
        // The write must not have completed while bytes remain undelivered.
        let finished_now = finished.load(Ordering::SeqCst);
        rendsync::assert_with_log!(
            !finished_now,
            "write still blocked",
            false,
            finished_now
        );
        let mut buf = [0u8; 3];
        let read = pipe.read(&mut buf).expect("read failed");
        sizes.push(read);
        collected.extend_from_slice(&buf[..read]);
    }
    writer.join().expect("writer thread panicked");

    rendsync::assert_with_log!(sizes == vec![3, 3, 2], "read sizes", vec![3, 3, 2], sizes);
    rendsync::assert_with_log!(
        collected == b"12345678",
        "reconstructed bytes",
        b"12345678",
        collected
    );
    rendsync::test_complete!("write_blocks_until_reads_drain_it");
}

#[test]
fn suspending_pipe_matches_blocking_pipe() {
    init_test("suspending_pipe_matches_blocking_pipe");
    let pipe = RendezvousPipe::new();
    let data = b"suspended bytes";

    let writer = {
        let pipe = pipe.clone();
        thread::spawn(move || block_on(pipe.write_async(data)).expect("write failed"))
    };

    let mut collected = Vec::new();
    while collected.len() < data.len() {
        let mut buf = [0u8; 4];
        let read = block_on(pipe.read_async(&mut buf)).expect("read failed");
        collected.extend_from_slice(&buf[..read]);
    }
    let written = writer.join().expect("writer thread panicked");

    rendsync::assert_with_log!(written == data.len(), "written size", data.len(), written);
    rendsync::assert_with_log!(collected == data, "reconstructed bytes", data, collected);
    rendsync::test_complete!("suspending_pipe_matches_blocking_pipe");
}

#[test]
fn scheduling_models_interoperate() {
    init_test("scheduling_models_interoperate");
    let pipe = RendezvousPipe::new();
    let data = b"mixed mode";

    // Blocking writer against a suspending reader.
    let writer = {
        let pipe = pipe.clone();
        thread::spawn(move || pipe.write(data).expect("write failed"))
    };
    let mut collected = Vec::new();
    while collected.len() < data.len() {
        let mut buf = [0u8; 3];
        let read = block_on(pipe.read_async(&mut buf)).expect("read failed");
        collected.extend_from_slice(&buf[..read]);
    }
    writer.join().expect("writer thread panicked");
    rendsync::assert_with_log!(collected == data, "blocking into suspending", data, collected);

    // Suspending writer against a blocking reader.
    let writer = {
        let pipe = pipe.clone();
        thread::spawn(move || block_on(pipe.write_async(data)).expect("write failed"))
    };
    let mut collected = Vec::new();
    while collected.len() < data.len() {
        let mut buf = [0u8; 3];
        let read = pipe.read(&mut buf).expect("read failed");
        collected.extend_from_slice(&buf[..read]);
    }
    writer.join().expect("writer thread panicked");
    rendsync::assert_with_log!(collected == data, "suspending into blocking", data, collected);
    rendsync::test_complete!("scheduling_models_interoperate");
}

#[test]
fn sequential_writes_arrive_in_order() {
    init_test("sequential_writes_arrive_in_order");
    let pipe = RendezvousPipe::new();

    let writer = {
        let pipe = pipe.clone();
        thread::spawn(move || {
            pipe.write(b"first ").expect("write failed");
            pipe.write(b"second ").expect("write failed");
            pipe.write(b"third").expect("write failed");
        })
    };

    let expected = b"first second third";
    let mut collected = Vec::new();
    while collected.len() < expected.len() {
        let mut buf = [0u8; 5];
        let read = pipe.read(&mut buf).expect("read failed");
        collected.extend_from_slice(&buf[..read]);
    }
    writer.join().expect("writer thread panicked");

    rendsync::assert_with_log!(collected == expected, "write order", expected, collected);
    rendsync::test_complete!("sequential_writes_arrive_in_order");
}

#[test]
fn unsupported_operations_fail_after_traffic() {
    init_test("unsupported_operations_fail_after_traffic");
    let pipe = RendezvousPipe::new();

    let writer = {
        let pipe = pipe.clone();
        thread::spawn(move || pipe.write(b"traffic").expect("write failed"))
    };
    let mut buf = [0u8; 7];
    pipe.read(&mut buf).expect("read failed");
    writer.join().expect("writer thread panicked");

    // Structural failures are independent of prior read/write activity.
    assert_eq!(pipe.length(), Err(PipeError::Unsupported("length query")));
    assert_eq!(
        pipe.set_length(1),
        Err(PipeError::Unsupported("length change"))
    );
    assert_eq!(
        pipe.position(),
        Err(PipeError::Unsupported("position query"))
    );
    assert_eq!(
        pipe.set_position(1),
        Err(PipeError::Unsupported("position change"))
    );
    rendsync::test_complete!("unsupported_operations_fail_after_traffic");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// For every byte sequence and every read-buffer-size schedule, one
    /// write against repeated reads reconstructs the sequence exactly, in
    /// order, with no loss or duplication.
    #[test]
    fn any_read_partition_reconstructs_the_stream(
        data in prop::collection::vec(any::<u8>(), 1..256),
        sizes in prop::collection::vec(1usize..32, 1..16),
    ) {
        init_test_logging();
        let pipe = RendezvousPipe::new();

        let writer = {
            let pipe = pipe.clone();
            let data = data.clone();
            thread::spawn(move || pipe.write(&data).expect("write failed"))
        };

        let mut collected = Vec::with_capacity(data.len());
        let mut schedule = sizes.iter().cycle();
        while collected.len() < data.len() {
            let size = *schedule.next().expect("cycle never ends");
            let mut buf = vec![0u8; size];
            let read = pipe.read(&mut buf).expect("read failed");
            // Each read returns exactly min(remaining offered, buffer len).
            let expected = size.min(data.len() - collected.len());
            prop_assert_eq!(read, expected);
            collected.extend_from_slice(&buf[..read]);
        }
        let written = writer.join().expect("writer thread panicked");

        prop_assert_eq!(written, data.len());
        prop_assert_eq!(collected, data);
    }
}
