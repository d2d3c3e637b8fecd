#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // The state record is rewritten on every transition; parsing plus
    // validation of arbitrary bytes must reject, never panic.
    let parsed = toml::from_str::<dilutor_core::ControllerState>(data);
    match parsed {
        Ok(state) => {
            let _ = state.validate();
        }
        Err(_e) => {
            // parse error is acceptable
        }
    }
});
