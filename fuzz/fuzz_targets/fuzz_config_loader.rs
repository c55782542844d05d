#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // TOML parsing of Preferences must never panic; parse and validation
    // errors are both acceptable outcomes.
    if let Ok(prefs) = netft_config::load_toml(data) {
        let _ = prefs.validate();
    }
});
