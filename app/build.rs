use std::{env, fs, path::Path};

// exposes the workspace version as `VERSION`
fn main() {
    let manifest = fs::read_to_string("../Cargo.toml").expect("read workspace Cargo.toml");
    let version = manifest
        .lines()
        .find_map(|line| line.strip_prefix("version = "))
        .map(|v| v.trim_matches(&[' ', '"'][..]).to_string())
        .expect("workspace version not found");

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    fs::write(Path::new(&out_dir).join("version.rs"), format!("pub const VERSION: &str = \"{version}\";"))
        .expect("write version file");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../Cargo.toml");
}
