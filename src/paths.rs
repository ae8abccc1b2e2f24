/// Default on-disk locations for the config file and the revision cache
///
/// Unix-like systems honour `XDG_CONFIG_HOME` / `XDG_CACHE_HOME`.
use std::path::PathBuf;

const PROJECT_DIR: &str = "rag-sync";

/// Base directory of one kind on the current platform
struct DirKind {
    windows_var: &'static str,
    macos_subdir: &'static str,
    xdg_var: &'static str,
    xdg_fallback: &'static str,
}

const CACHE: DirKind = DirKind {
    windows_var: "LOCALAPPDATA",
    macos_subdir: "Library/Caches",
    xdg_var: "XDG_CACHE_HOME",
    xdg_fallback: ".cache",
};

const CONFIG: DirKind = DirKind {
    windows_var: "APPDATA",
    macos_subdir: "Library/Application Support",
    xdg_var: "XDG_CONFIG_HOME",
    xdg_fallback: ".config",
};

fn resolve(kind: &DirKind) -> PathBuf {
    let from_home = |sub: &str| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(sub));

    let dir = if cfg!(target_os = "windows") {
        std::env::var_os(kind.windows_var).map(PathBuf::from)
    } else if cfg!(target_os = "macos") {
        from_home(kind.macos_subdir)
    } else {
        std::env::var_os(kind.xdg_var)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| from_home(kind.xdg_fallback))
    };
    dir.unwrap_or_else(|| PathBuf::from("."))
}

/// Platform-specific paths used by rag-sync
pub struct PlatformPaths;

impl PlatformPaths {
    /// `%LOCALAPPDATA%`, `~/Library/Caches` or `$XDG_CACHE_HOME` (`~/.cache`)
    pub fn cache_dir() -> PathBuf {
        resolve(&CACHE)
    }

    /// `%APPDATA%`, `~/Library/Application Support` or `$XDG_CONFIG_HOME` (`~/.config`)
    pub fn config_dir() -> PathBuf {
        resolve(&CONFIG)
    }

    pub fn project_cache_dir() -> PathBuf {
        Self::cache_dir().join(PROJECT_DIR)
    }

    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join(PROJECT_DIR)
    }

    /// `{cache_dir}/rag-sync/revisions.json`
    pub fn default_revision_cache_path() -> PathBuf {
        Self::project_cache_dir().join("revisions.json")
    }

    /// `{config_dir}/rag-sync/config.toml`
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }
}
