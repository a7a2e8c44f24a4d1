#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are both fine; panics are not.
    if let Ok(cfg) = servo_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // anything that validates must convert cleanly
            let _ = servo_core::SessionCfg::from(&cfg);
            let _ = servo_core::LinkCfg::from(&cfg.serial);
        }
    }
});
