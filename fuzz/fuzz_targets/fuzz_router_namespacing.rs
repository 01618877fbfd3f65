#![no_main]

use gateway_core::jsonrpc::parse_inbound;
use gateway_core::router::{decode_name, decode_uri};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding an arbitrary namespaced tool/prompt name or resource URI must
    // only ever succeed or return Unparseable — never panic.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = decode_name(s);
        let _ = decode_uri(s);
        let _ = parse_inbound(s);
    }
});
