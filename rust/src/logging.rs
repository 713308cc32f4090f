//! Subscriber setup, run once from `FfiApp::new()` before the actor starts.
//!
//! Apple targets log to os_log and to `<data_dir>/chatsync.log`, Android to
//! logcat, and everything else (tests, the CLI host) to stderr.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "chatsync_core=debug,info";

/// `CHATSYNC_LOG` (same syntax as `RUST_LOG`) wins over the built-in default on
/// every platform.
fn filter() -> EnvFilter {
    EnvFilter::try_from_env("CHATSYNC_LOG").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init_logging(#[allow(unused)] data_dir: &str) {
    #[cfg(target_os = "ios")]
    init_apple(data_dir);

    #[cfg(target_os = "android")]
    init_android();

    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    init_stderr();
}

#[cfg(target_os = "ios")]
fn init_apple(data_dir: &str) {
    use tracing_subscriber::prelude::*;

    let _ = std::fs::create_dir_all(data_dir);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(std::path::Path::new(data_dir).join("chatsync.log"))
        .ok();
    let file_layer = file.map(|f| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(f))
            .with_ansi(false)
            .with_target(true)
    });

    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(tracing_oslog::OsLogger::new("com.chatsync.app", "default"))
        .with(file_layer)
        .try_init();
}

#[cfg(target_os = "android")]
fn init_android() {
    use tracing_subscriber::prelude::*;

    let _ = tracing_subscriber::registry()
        .with(paranoid_android::layer("chatsync").with_filter(filter()))
        .try_init();
}

#[cfg(not(any(target_os = "ios", target_os = "android")))]
fn init_stderr() {
    // Tests construct many apps in one process; only the first install sticks.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .try_init();
}
