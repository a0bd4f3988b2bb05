use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src");

    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into());
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap_or_else(|_| ".".into()));

    let config = cbindgen::Config {
        language: cbindgen::Language::C,
        include_guard: Some("FLIGHT_H".into()),
        cpp_compat: true,
        ..Default::default()
    };

    // Header generation is best effort; the library builds without it.
    match cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(out_dir.join("flight.h"));
        }
        Err(err) => println!("cargo:warning=flight.h not generated: {err}"),
    }
}
