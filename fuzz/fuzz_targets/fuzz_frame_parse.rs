#![no_main]

use botc_room_client::protocol::Frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Any JSON value, then the classifier on top of it.
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        if let Ok(frame) = Frame::from_value(value) {
            let _ = frame.tag();
            let _ = frame.route();
        }
    }

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = Frame::parse(text);
    }
});
