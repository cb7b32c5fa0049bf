#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;
use whoop_protocol::core::codec::FrameCodec;
use whoop_protocol::Packet;

fuzz_target!(|data: &[u8]| {
    // Single notification path
    if let Ok(packet) = Packet::decode(data) {
        let frame = packet.encode().expect("decoded packet re-encodes");
        assert_eq!(Packet::decode(&frame).ok(), Some(packet));
    }

    // Back-to-back stream path must always make progress
    let mut buf = BytesMut::from(data);
    let mut codec = FrameCodec::new();
    while let Ok(Some(_)) = codec.decode(&mut buf) {}
    let _ = codec.decode_eof(&mut buf);
    assert!(buf.is_empty());
});
