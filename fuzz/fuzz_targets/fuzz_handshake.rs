#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use machine_protocol::core::codec::FrameDecoder;
use machine_protocol::protocol::{ConnectionState, PacketCatalogue};
use tokio_util::codec::Decoder;

const STATES: [ConnectionState; 5] = [
    ConnectionState::Handshake,
    ConnectionState::Status,
    ConnectionState::Login,
    ConnectionState::Configuration,
    ConnectionState::Play,
];

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let Ok(catalogue) = PacketCatalogue::standard() else {
        return;
    };
    let state = STATES[usize::from(selector) % STATES.len()];

    // First bit of the selector turns on the compressed framing
    let mut decoder = FrameDecoder::new(1 << 16);
    if selector & 0x80 != 0 {
        decoder.enable_compression(64);
    }

    let mut buffer = BytesMut::from(rest);
    while let Ok(Some(frame)) = decoder.decode(&mut buffer) {
        if let Ok(packet) = catalogue.decode_serverbound(state, frame.freeze()) {
            // Whatever decodes must encode again
            catalogue
                .encode_serverbound(state, &packet)
                .expect("decoded packet re-encodes");
        }
    }
});
