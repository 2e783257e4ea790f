fn main() {
    // The build script itself runs on the host, so the ESP-IDF environment
    // is emitted only when cross-compiling for the Xtensa target
    let target = std::env::var("TARGET").unwrap_or_default();
    if target.contains("xtensa") {
        embuild::espidf::sysenv::output();
    }
}
