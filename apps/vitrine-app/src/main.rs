//! # Vitrine Entry Point
//!
//! `vitrine [CONFIG_PATH]`: loads configuration (or the platform default
//! `vitrine.toml`), runs the storefront demo and prints the final state.

#[tokio::main]
async fn main() {
    let config_path = std::env::args_os().nth(1).map(std::path::PathBuf::from);

    if let Err(e) = vitrine_app::run(config_path).await {
        eprintln!("vitrine: {}", e);
        std::process::exit(1);
    }
}
