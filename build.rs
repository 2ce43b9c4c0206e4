fn main() {
    // Only ESP-IDF builds need the sysenv handoff; host builds have nothing
    // to generate.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
