//! Detected front-end flags, cached in a JSON file.
//!
//! Probing the host compiler for its system include directories takes a
//! process launch per run; the result is stored next to the fixtures and
//! reused while the compiler stays the same.
//!
//! # Cache Versioning
//!
//! The file is discarded when:
//! - the cache format version changes
//! - the major version of shakecc changes
//! - the fingerprint of the probed compiler no longer matches

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Maximum cache file size (1MB); anything larger is not ours
const MAX_CACHE_SIZE_BYTES: usize = 1_000_000;

/// Current cache format version. Increment when the format changes.
const CACHE_VERSION: u32 = 1;

const SHAKECC_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default location, relative to the working directory.
pub const DEFAULT_FLAGS_CACHE: &str = ".shakecc/flags.json";

/// Flags every detection starts from.
const BASE_FLAGS: &[&str] = &["-std=c++17"];

/// Cache metadata for version checking.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FlagsCacheMetadata {
    pub cache_version: u32,
    pub shakecc_version: String,
    /// SHA-256 of the probed compiler's identity
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl FlagsCacheMetadata {
    fn current(fingerprint: String) -> Self {
        Self {
            cache_version: CACHE_VERSION,
            shakecc_version: SHAKECC_VERSION.to_string(),
            fingerprint,
            created_at: Utc::now(),
        }
    }

    /// Check if this cache was written by a compatible shakecc.
    pub fn is_compatible(&self) -> bool {
        if self.cache_version != CACHE_VERSION {
            return false;
        }
        let current_major = SHAKECC_VERSION.split('.').next().unwrap_or("0");
        let cached_major = self.shakecc_version.split('.').next().unwrap_or("0");
        current_major == cached_major
    }
}

/// The cache model stored in the flags file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FlagsCache {
    pub metadata: FlagsCacheMetadata,
    /// Front-end flags, ready for `FrontEndFlags::parse`
    pub flags: Vec<String>,
}

/// The compiler detection probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerProbe {
    pub program: String,
    /// `--version` output; empty if the compiler could not be run
    pub version: String,
}

impl CompilerProbe {
    /// `$CXX`, falling back to `c++`.
    pub fn from_env() -> Self {
        let program = std::env::var("CXX").unwrap_or_else(|_| "c++".to_string());
        let version = Command::new(&program)
            .arg("--version")
            .output()
            .ok()
            .filter(|out| out.status.success())
            .map(|out| String::from_utf8_lossy(&out.stdout).into_owned())
            .unwrap_or_default();
        Self { program, version }
    }

    pub fn is_available(&self) -> bool {
        !self.version.is_empty()
    }

    pub fn fingerprint(&self) -> String {
        let mut sha = Sha256::new();
        sha.update(self.program.as_bytes());
        sha.update([0]);
        sha.update(self.version.as_bytes());
        format!("{:x}", sha.finalize())
    }

    /// Ask the compiler for its include search list.
    fn search_list(&self) -> Option<String> {
        if !self.is_available() {
            return None;
        }
        let null = if cfg!(windows) { "NUL" } else { "/dev/null" };
        let out = Command::new(&self.program)
            .args(["-E", "-x", "c++", "-v", null])
            .output()
            .ok()?;
        Some(String::from_utf8_lossy(&out.stderr).into_owned())
    }
}

/// `-isystem` flags for the directories listed in the compiler's verbose
/// output, between the `#include <...>` header and the end marker.
pub fn parse_search_list(verbose: &str) -> Vec<String> {
    let mut flags = Vec::new();
    let mut inside = false;
    for line in verbose.lines() {
        if line.starts_with("#include <...> search starts here:") {
            inside = true;
            continue;
        }
        if line.starts_with("End of search list.") {
            break;
        }
        if inside {
            // macOS marks framework directories; they hold no C++ headers
            let dir = line.trim();
            if !dir.is_empty() && !dir.ends_with("(framework directory)") {
                flags.push(format!("-isystem{dir}"));
            }
        }
    }
    flags
}

/// Probe `probe` and build fresh flags.
pub fn detect_flags(probe: &CompilerProbe) -> FlagsCache {
    let mut flags: Vec<String> = BASE_FLAGS.iter().map(|f| f.to_string()).collect();
    match probe.search_list() {
        Some(verbose) => flags.extend(parse_search_list(&verbose)),
        None => warn!(program = %probe.program, "compiler not available, using base flags"),
    }
    info!(count = flags.len(), "front-end flags detected");
    FlagsCache {
        metadata: FlagsCacheMetadata::current(probe.fingerprint()),
        flags,
    }
}

/// Load the flags file.
///
/// Returns `None` if the file is missing, corrupted, written by an
/// incompatible version, or fingerprinted for another compiler.
pub fn load_flags_cache(path: &Path, probe: &CompilerProbe) -> Option<FlagsCache> {
    if !path.exists() {
        return None;
    }
    let text = fs::read_to_string(path).ok()?;
    let cache: FlagsCache = match serde_json::from_str(&text) {
        Ok(cache) => cache,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupted flags cache, rebuilding");
            return None;
        }
    };
    if !cache.metadata.is_compatible() {
        info!(
            cached = %cache.metadata.shakecc_version,
            current = SHAKECC_VERSION,
            "flags cache version mismatch, rebuilding"
        );
        let _ = fs::remove_file(path);
        return None;
    }
    if cache.metadata.fingerprint != probe.fingerprint() {
        info!(path = %path.display(), "compiler changed, rebuilding flags cache");
        return None;
    }
    Some(cache)
}

/// Save the flags file with a temp file and a rename, so readers never see
/// a partial write.
pub fn save_flags_cache(path: &Path, cache: &FlagsCache) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let json = serde_json::to_string_pretty(cache)?;
    if json.len() > MAX_CACHE_SIZE_BYTES {
        warn!(bytes = json.len(), "flags cache too large, not saved");
        return Ok(());
    }

    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let temp_path = dir.join(format!("flags.json.{}.{}.tmp", std::process::id(), nanos));
    fs::write(&temp_path, &json)
        .with_context(|| format!("Failed to write temp cache file: {}", temp_path.display()))?;
    fs::rename(&temp_path, path).with_context(|| {
        let _ = fs::remove_file(&temp_path);
        format!("Failed to rename cache file to: {}", path.display())
    })?;
    Ok(())
}

/// Cached flags when still valid, fresh detection otherwise.
pub fn detect_or_load(path: &Path) -> Result<FlagsCache> {
    let probe = CompilerProbe::from_env();
    if let Some(cache) = load_flags_cache(path, &probe) {
        debug!(path = %path.display(), "flags cache hit");
        return Ok(cache);
    }
    let cache = detect_flags(&probe);
    save_flags_cache(path, &cache)?;
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn create_temp_dir(name: &str) -> PathBuf {
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("shakecc_flags_cache_test")
            .join(format!("{}_{}_{}", name, std::process::id(), id));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn probe(version: &str) -> CompilerProbe {
        CompilerProbe {
            program: "g++".to_string(),
            version: version.to_string(),
        }
    }

    #[test]
    fn test_parse_search_list() {
        let verbose = "ignoring nonexistent directory \"/x\"\n\
                       #include \"...\" search starts here:\n\
                       #include <...> search starts here:\n \
                       /usr/include/c++/13\n \
                       /usr/include\n \
                       /Library/Frameworks (framework directory)\n\
                       End of search list.\n \
                       /not/listed\n";
        assert_eq!(
            parse_search_list(verbose),
            vec!["-isystem/usr/include/c++/13".to_string(), "-isystem/usr/include".to_string()]
        );
    }

    #[test]
    fn test_fingerprint_tracks_compiler() {
        assert_eq!(probe("13.2").fingerprint(), probe("13.2").fingerprint());
        assert_ne!(probe("13.2").fingerprint(), probe("14.1").fingerprint());
        assert_eq!(probe("13.2").fingerprint().len(), 64);
    }

    #[test]
    fn test_unavailable_compiler_uses_base_flags() {
        let cache = detect_flags(&probe(""));
        assert_eq!(cache.flags, vec!["-std=c++17".to_string()]);
        assert!(cache.metadata.is_compatible());
    }

    #[test]
    fn test_cache_save_load() {
        let dir = create_temp_dir("save_load");
        let path = dir.join(".shakecc").join("flags.json");
        let cache = detect_flags(&probe(""));

        save_flags_cache(&path, &cache).unwrap();
        let loaded = load_flags_cache(&path, &probe("")).unwrap();
        assert_eq!(loaded, cache);

        // Another compiler invalidates it.
        assert!(load_flags_cache(&path, &probe("clang 18")).is_none());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_cache_not_found() {
        let dir = create_temp_dir("not_found");
        assert!(load_flags_cache(&dir.join("flags.json"), &probe("")).is_none());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupted_and_incompatible_cache() {
        let dir = create_temp_dir("corrupted");
        let path = dir.join("flags.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load_flags_cache(&path, &probe("")).is_none());

        let mut cache = detect_flags(&probe(""));
        cache.metadata.cache_version = CACHE_VERSION + 1;
        save_flags_cache(&path, &cache).unwrap();
        assert!(load_flags_cache(&path, &probe("")).is_none());
        assert!(!path.exists());

        fs::remove_dir_all(&dir).ok();
    }
}
