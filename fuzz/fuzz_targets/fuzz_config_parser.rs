#![no_main]

use gateway_config::parse_config_from_str;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Parsing arbitrary bytes as a gateway config should never panic,
    // regardless of whether the YAML is well-formed or the schema matches.
    if let Ok(yaml_str) = std::str::from_utf8(data) {
        let _ = parse_config_from_str(yaml_str);
    }
});
