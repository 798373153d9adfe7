//! Criterion benchmarks for the podlink frame codec.
//!
//! Output frames sit on the hot path of every session: one encode per upstream
//! chunk.  These benchmarks measure encode and decode latency across the chunk
//! sizes a relay actually sees.
//!
//! Run with:
//! ```bash
//! cargo bench --package podlink-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use podlink_core::{
    decode_client_message, decode_server_message, encode_client_message, encode_server_message,
    ClientMessage, Command, ServerMessage, TerminalSize,
};

// ── Fixtures ──────────────────────────────────────────────────────────────────

const CHUNK_SIZES: &[usize] = &[16, 1024, 32 * 1024];

fn make_command() -> ClientMessage {
    ClientMessage::Command(Command {
        name: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), "tail -f /var/log/app.log".to_string()],
        tty: true,
        interactive: true,
    })
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_server_chunks(c: &mut Criterion) {
    let mut group = c.benchmark_group("stdout_chunk");
    for &size in CHUNK_SIZES {
        let msg = ServerMessage::StdoutChunk(vec![b'x'; size]);
        let frame = encode_server_message(&msg);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &msg, |b, msg| {
            b.iter(|| encode_server_message(black_box(msg)))
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &frame, |b, frame| {
            b.iter(|| decode_server_message(black_box(frame)))
        });
    }
    group.finish();
}

fn bench_client_frames(c: &mut Criterion) {
    let command = make_command();
    let command_frame = encode_client_message(&command).expect("fixture encodes");
    let resize = ClientMessage::ResizeEvent(TerminalSize {
        width: 211,
        height: 57,
    });
    let resize_frame = encode_client_message(&resize).expect("fixture encodes");

    c.bench_function("decode_command", |b| {
        b.iter(|| decode_client_message(black_box(&command_frame)))
    });
    c.bench_function("decode_resize", |b| {
        b.iter(|| decode_client_message(black_box(&resize_frame)))
    });
    c.bench_function("encode_command", |b| {
        b.iter(|| encode_client_message(black_box(&command)))
    });
}

criterion_group!(benches, bench_server_chunks, bench_client_frames);
criterion_main!(benches);
