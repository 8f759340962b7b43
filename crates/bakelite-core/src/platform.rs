use std::path::PathBuf;

/// Data directory (catalog, settings, caches, logs): `~/.local/share/bakelite`.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".local")
        .join("share")
        .join("bakelite")
}

/// Config directory: `~/.config/bakelite`.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("bakelite")
}

/// Prefix shared by every primary-stream IPC socket.  The orphan sweep at
/// startup globs on this.
pub fn socket_prefix() -> PathBuf {
    std::env::temp_dir().join("bakelite-mpv")
}

/// Base IPC socket path used by exclusive stream starts.
pub fn primary_socket_path() -> PathBuf {
    let mut p = socket_prefix();
    p.set_extension("sock");
    p
}

/// Numbered IPC socket path used when streams overlap during a crossfade.
pub fn numbered_socket_path(n: u64) -> PathBuf {
    std::env::temp_dir().join(format!("bakelite-mpv-{}.sock", n))
}

/// IPC socket for the persistent static/ambience process.
pub fn ambience_socket_path() -> PathBuf {
    std::env::temp_dir().join("bakelite-static.sock")
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var("PATH").ok()?;
    for dir in path.split(':') {
        let p = PathBuf::from(dir).join(name);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

/// Find the mpv binary for playback: beside the current executable first,
/// then PATH.
pub fn find_player_binary() -> Option<PathBuf> {
    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(dir) = current_exe.parent() {
            let local = dir.join("mpv");
            if local.exists() {
                return Some(local);
            }
        }
    }
    find_on_path("mpv")
}

/// Find the yt-dlp binary for stream resolution.
///
/// Searches in order:
/// 1. YT_DLP_PATH environment variable
/// 2. Beside the current executable
/// 3. PATH
pub fn find_yt_dlp_binary() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("YT_DLP_PATH") {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }

    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(dir) = current_exe.parent() {
            let local = dir.join("yt-dlp");
            if local.exists() {
                return Some(local);
            }
        }
    }

    find_on_path("yt-dlp")
}
