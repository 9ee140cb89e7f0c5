#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> Result<(), eframe::Error> {
    // Set up logging; RUST_LOG controls verbosity
    env_logger::init();

    let mut read_only = false;
    let mut bundle = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--read-only" => read_only = true,
            _ => bundle = Some(std::path::PathBuf::from(arg)),
        }
    }

    bibmap_canvas::run_app(bundle, read_only)
}

// The binary is desktop-only; web hosts embed `BibMapApp` from the library.
#[cfg(target_arch = "wasm32")]
fn main() {}
