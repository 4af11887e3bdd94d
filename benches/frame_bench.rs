use bytes::{BufMut, BytesMut};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use websocket_wrapper::core::frame::apply_mask;
use websocket_wrapper::protocol::negotiate::{compute_accept_key, HandshakeChallenge};
use websocket_wrapper::{DecodeResult, Flavor, FrameCodec, Payload};

fn masked_frame(payload: &[u8]) -> BytesMut {
    let key = [0x12, 0x34, 0x56, 0x78];
    let mut buf = BytesMut::with_capacity(payload.len() + 14);
    buf.put_u8(0x82);
    match payload.len() {
        len if len < 126 => buf.put_u8(0x80 | len as u8),
        len if len <= u16::MAX as usize => {
            buf.put_u8(0x80 | 126);
            buf.put_u16(len as u16);
        }
        len => {
            buf.put_u8(0x80 | 127);
            buf.put_u64(len as u64);
        }
    }
    buf.put_slice(&key);
    let mut body = payload.to_vec();
    apply_mask(&mut body, key);
    buf.put_slice(&body);
    buf
}

#[allow(clippy::unwrap_used)]
fn bench_frame_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode_decode");
    let payload_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];

    for &size in &payload_sizes {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("encode_rfc6455_{size}b"), |b| {
            let codec = FrameCodec::new(Flavor::Rfc6455);
            b.iter_batched(
                || Payload::from(vec![0u8; size]),
                |payload| {
                    let mut buf = BytesMut::with_capacity(size + 10);
                    codec.encode_payload(&payload, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("decode_rfc6455_{size}b"), |b| {
            let codec = FrameCodec::new(Flavor::Rfc6455);
            let frame = masked_frame(&vec![0xa5u8; size]);
            b.iter_batched(
                || frame.clone(),
                |mut buf| {
                    let decoded = codec.decode(&mut buf);
                    assert!(matches!(decoded, DecodeResult::Decoded(_)));
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("decode_hybi00_{size}b"), |b| {
            let codec = FrameCodec::new(Flavor::Hybi00);
            let mut frame = BytesMut::with_capacity(size + 2);
            codec
                .encode_payload(&Payload::from(vec![b'a'; size]), &mut frame)
                .unwrap();
            b.iter_batched(
                || frame.clone(),
                |mut buf| {
                    let decoded = codec.decode(&mut buf);
                    assert!(matches!(decoded, DecodeResult::Decoded(_)));
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_handshake_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("handshake_keys");

    group.bench_function("accept_key", |b| {
        b.iter(|| compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="))
    });

    #[allow(clippy::unwrap_used)]
    let challenge =
        HandshakeChallenge::from_keys("4 @1  46546xW%0l 1 5", "12998 5 Y3 1  .P00").unwrap();
    group.bench_function("hybi00_challenge", |b| b.iter(|| challenge.respond(b"^n:ds[4U")));

    group.finish();
}

criterion_group!(benches, bench_frame_encode_decode, bench_handshake_keys);
criterion_main!(benches);
