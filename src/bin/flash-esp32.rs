//! Flash the provisioning firmware to ESP32 hardware.
//!
//! Usage: cargo run --bin flash-esp32

use std::process::{exit, Command};

fn main() {
    println!("=== Building firmware for ESP32 ===\n");

    let status = Command::new("cargo")
        .args([
            "build",
            "--bin",
            "wifi-provision-esp32",
            "--release",
            "--target",
            "xtensa-esp32-espidf",
            "--features",
            "esp32",
        ])
        .status();

    if !matches!(status, Ok(s) if s.success()) {
        eprintln!("\nBuild failed!");
        exit(1);
    }

    println!("\n=== Flashing to device ===\n");

    let status = Command::new("espflash")
        .args([
            "flash",
            "--monitor",
            "target/xtensa-esp32-espidf/release/wifi-provision-esp32",
        ])
        .status();

    if !matches!(status, Ok(s) if s.success()) {
        eprintln!("\nFlash failed!");
        exit(1);
    }
}
