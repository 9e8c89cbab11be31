//! Generates the foreign-language bindings for CredKit.

fn main() {
    uniffi::uniffi_bindgen_main();
}
