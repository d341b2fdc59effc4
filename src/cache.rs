use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::trace;
use crate::transcript::Transcript;

pub const CACHE_DIR_ENV: &str = "KLENDATHU_CACHE";
pub const CACHE_MODE_ENV: &str = "KLENDATHU_CACHE_MODE";

/// How the orchestrator consults the cache for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Look up, replay on hit, fall back to the agent on miss.
    #[default]
    Normal,
    /// Skip the lookup entirely.
    Ignore,
    /// Replay or fail; the agent is never invoked.
    ForceUse,
}

impl CacheMode {
    pub fn from_env() -> Self {
        match std::env::var(CACHE_MODE_ENV).as_deref() {
            Ok("ignore") => CacheMode::Ignore,
            Ok("force-use") => CacheMode::ForceUse,
            _ => CacheMode::Normal,
        }
    }
}

/// Lowercased instruction with non-alphanumerics collapsed to
/// underscores, trimmed, at most 50 chars. Informational only; the hash
/// is the identity.
pub fn slugify(instruction: &str) -> String {
    let mut slug = String::new();
    let mut pending_separator = false;
    for c in instruction.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c);
        } else {
            pending_separator = true;
        }
    }
    slug.chars().take(50).collect()
}

/// `slug(instruction)[:50] + "_" + sha256(instruction + ":::" + schema)`.
/// The schema string must come from a stable serialization
/// ([`Schema::canonical_json`](crate::schema::Schema::canonical_json)),
/// which is what makes the key whitespace-invariant.
pub fn cache_key(instruction: &str, schema_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(instruction.as_bytes());
    hasher.update(b":::");
    hasher.update(schema_json.as_bytes());
    let digest = hasher.finalize();

    let hex = digest
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<String>();

    format!("{}_{}", slugify(instruction), hex)
}

/// Nearest ancestor with a `.klendathu` marker, else the nearest `.git`,
/// else the working directory.
pub fn project_root() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    for dir in cwd.ancestors() {
        if dir.join(".klendathu").exists() {
            return dir.to_path_buf();
        }
    }
    for dir in cwd.ancestors() {
        if dir.join(".git").exists() {
            return dir.to_path_buf();
        }
    }
    cwd
}

fn default_cache_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CACHE_DIR_ENV) {
        return PathBuf::from(dir);
    }
    project_root().join(".klendathu").join("cache")
}

/// On-disk transcript store. Reads and writes are best-effort: a broken
/// cache must never break a request, so failures are traced and
/// swallowed.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_env() -> Self {
        Self::new(default_cache_dir())
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// A usable transcript, or None when the file is absent, unreadable,
    /// or records a failed request.
    pub async fn lookup(&self, key: &str) -> Option<Transcript> {
        let path = self.path_for(key);
        let bytes = tokio::fs::read(&path).await.ok()?;
        let transcript: Transcript = match serde_json::from_slice(&bytes) {
            Ok(transcript) => transcript,
            Err(error) => {
                trace::trace(format!(
                    "cache: unreadable transcript at {}: {}",
                    path.display(),
                    error
                ));
                return None;
            }
        };
        if !transcript.success {
            trace::trace(format!("cache: ignoring failed transcript {}", key));
            return None;
        }
        Some(transcript)
    }

    pub async fn save(&self, key: &str, transcript: &Transcript) {
        if let Err(error) = self.try_save(key, transcript).await {
            trace::trace(format!("cache: failed to write {}: {}", key, error));
        }
    }

    async fn try_save(&self, key: &str, transcript: &Transcript) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec_pretty(transcript).map_err(std::io::Error::other)?;
        tokio::fs::write(self.path_for(key), json).await
    }
}
