//! TAP test runner binary.
//!
//! Runs all tests registered with `#[tap_test]` and outputs TAP format.
//!
//! # Usage
//!
//! ```bash
//! # Run on host
//! cargo run --bin device-tests --features tap-tests
//!
//! # Run on QEMU (plain ESP32)
//! cargo run --bin device-tests --features "esp32,tap-tests" --target xtensa-esp32-espidf --release
//!
//! # Flash to hardware
//! cargo espflash flash --bin device-tests --features "esp32,tap-tests" --release --monitor
//! ```

fn main() {
    #[cfg(feature = "esp32")]
    {
        esp_idf_sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();
    }

    let success = wifi_provision_esp32::testing::run_all_tests();

    // Exiting main on the device restarts the firmware and re-runs the
    // suite, so park instead and leave the verdict on the console.
    #[cfg(feature = "esp32")]
    {
        log::info!(
            "Tests complete ({}). Halting.",
            if success { "PASS" } else { "FAIL" }
        );
        loop {
            std::thread::sleep(std::time::Duration::from_secs(1));
        }
    }

    #[cfg(not(feature = "esp32"))]
    std::process::exit(if success { 0 } else { 1 });
}
