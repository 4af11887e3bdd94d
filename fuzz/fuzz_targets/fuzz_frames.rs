#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use websocket_wrapper::{DecodeResult, Flavor, FrameCodec};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks the dialect, the rest is wire input
    let flavor = match data[0] % 4 {
        0 => Flavor::Hybi00,
        1 => Flavor::Hybi07,
        2 => Flavor::Hybi10,
        _ => Flavor::Rfc6455,
    };
    let codec = FrameCodec::new(flavor).with_max_frame_size(64 * 1024);
    let mut buf = BytesMut::from(&data[1..]);

    loop {
        let before = buf.len();
        match codec.decode(&mut buf) {
            DecodeResult::Decoded(frame) => {
                assert!(frame.payload.len() <= 64 * 1024);
                assert!(buf.len() < before);
            }
            DecodeResult::NeedMoreData | DecodeResult::ProtocolError(_) => break,
        }
    }
});
