//! Main application entry point (native).

#[cfg(feature = "native")]
fn main() {
    env_logger::init();
    log::info!("Starting scrollink");

    let config = match std::env::args().nth(1) {
        Some(path) => scrollink_app::AppConfig::from_file(std::path::Path::new(&path)),
        None => Ok(scrollink_app::AppConfig::default()),
    };
    match config {
        Ok(config) => pollster::block_on(scrollink_app::App::run(config.with_env_overrides())),
        Err(e) => {
            log::error!("Cannot load configuration: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(not(feature = "native"))]
fn main() {
    panic!("Native feature not enabled. Use `cargo run --features native`");
}
