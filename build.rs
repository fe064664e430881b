// build.rs

use std::env;

fn main() -> anyhow::Result<()> {
    // Necessary because of this issue: https://github.com/rust-lang/cargo/issues/9641
    // see also https://github.com/rust-lang/cargo/issues/9554
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::build::CfgArgs::output_propagated("ESP_IDF")?;
        embuild::build::LinkArgs::output_propagated("ESP_IDF")?;
    }

    let wifi_ssid = env::var("SECRET_SSID").unwrap_or_else(|_| "internet".into());
    let wifi_pass = env::var("SECRET_OPTIONAL_PASS").unwrap_or_default();
    let api_port = env::var("API_PORT").unwrap_or_else(|_| "80".into());

    println!("cargo:rerun-if-env-changed=SECRET_SSID");
    println!("cargo:rerun-if-env-changed=SECRET_OPTIONAL_PASS");
    println!("cargo:rerun-if-env-changed=API_PORT");

    println!("cargo:rustc-env=SECRET_SSID={wifi_ssid}");
    println!("cargo:rustc-env=SECRET_OPTIONAL_PASS={wifi_pass}");
    println!("cargo:rustc-env=API_PORT={api_port}");

    build_data::set_BUILD_TIMESTAMP();
    build_data::no_debug_rebuilds().map_err(anyhow::Error::msg)?;

    Ok(())
}

// EOF
