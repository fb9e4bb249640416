//! CLI surface and startup-time configuration (§D).
//!
//! The CLI only ever seeds the durable config store on first run; after
//! that the database is authoritative (`db::config_store::ConfigStore`).
//! Grounded on the teacher's bootstrap-TOML-then-database pattern, with
//! the TOML layer dropped since this server has no bootstrap file of its
//! own, only CLI flags and the store.

use clap::Parser;
use std::path::PathBuf;

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_database() -> PathBuf {
    PathBuf::from("bridge.db")
}

fn default_song_dir() -> PathBuf {
    PathBuf::from("./videos/song")
}

fn default_transition_dir() -> PathBuf {
    PathBuf::from("./videos/transition")
}

#[derive(Parser, Debug, Clone)]
#[command(name = "bridge-server")]
#[command(about = "DJ console to video wall coordination server")]
#[command(version)]
pub struct Args {
    /// Address to bind the HTTP/SSE listener on.
    #[arg(long, default_value_t = default_listen())]
    pub listen: String,

    /// SQLite database file path.
    #[arg(long, default_value_os_t = default_database())]
    pub database: PathBuf,

    /// Default song video directory, used only to seed the config store
    /// on first run.
    #[arg(long, default_value_os_t = default_song_dir())]
    pub song_dir: PathBuf,

    /// Default transition video directory, used only to seed the config
    /// store on first run.
    #[arg(long, default_value_os_t = default_transition_dir())]
    pub transition_dir: PathBuf,

    /// Verbose logging.
    #[arg(long)]
    pub debug: bool,

    /// Do not attempt to open a browser tab pointed at the dashboard.
    #[arg(long)]
    pub no_browser: bool,
}

pub const CONFIG_KEY_SONG_DIR: &str = "song_dir";
pub const CONFIG_KEY_TRANSITION_DIR: &str = "transition_dir";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        assert_eq!(default_listen(), "127.0.0.1:8080");
        assert_eq!(default_database(), PathBuf::from("bridge.db"));
    }
}
