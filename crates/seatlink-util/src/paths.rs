//! Default paths for seatlink components
//!
//! - Socket: `$SEATLINK_SOCKET`, else `$XDG_RUNTIME_DIR/seatlink/seatlink.sock`,
//!   else `/tmp/seatlink-$USER/seatlink.sock`
//! - Config: `$XDG_CONFIG_HOME/seatlink/config.toml` or `~/.config/seatlink/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const SEATLINK_SOCKET_ENV: &str = "SEATLINK_SOCKET";

const SOCKET_FILENAME: &str = "seatlink.sock";
const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "seatlink";

/// Get the default socket path, honoring `$SEATLINK_SOCKET`.
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(SEATLINK_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Socket path derived from the runtime directory only.
/// Used for config defaults, where the override env var is handled by the CLI.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default configuration file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}
