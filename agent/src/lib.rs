//! The executable shell around `hwpc-power`: config loading, source/sink
//! plumbing and the optional carbon-intensity side channel.

use env_logger::Env;

pub mod carbon;
pub mod config;
pub mod sink;
pub mod source;

/// Initializes the global logger. Call this first.
pub fn init_logger() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    #[cfg(debug_assertions)]
    log::warn!("DEBUG assertions are enabled, this build is fine for development but not for production.");
}
