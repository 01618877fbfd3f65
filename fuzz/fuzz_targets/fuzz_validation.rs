#![no_main]

use gateway_config::{validate_config, GatewayConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Deserializing and validating an arbitrary gateway config must never
    // panic, whatever garbage the YAML contains.
    if let Ok(yaml_str) = std::str::from_utf8(data) {
        if let Ok(config) = serde_yaml::from_str::<GatewayConfig>(yaml_str) {
            let _ = validate_config(&config);
            let _ = serde_yaml::to_string(&config);
        }
    }
});
