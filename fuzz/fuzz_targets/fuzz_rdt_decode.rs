#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Wire decoders must reject arbitrary bytes with typed errors, never panic.
    let _ = netft_proto::rdt::decode_response(data);
    let _ = netft_proto::tcp::decode_calinfo_response(data);
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = netft_proto::http::parse_calibration_xml(text);
    }
});
