//! Process settings: listen address, index backend, and collaborator choice.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use docqa_rag::RagConfig;

/// Environment variable names read by [`Settings::from_env`].
pub mod env {
    pub const HOST: &str = "DOCQA_HOST";
    pub const PORT: &str = "DOCQA_PORT";
    /// `memory`, `qdrant`, or `pgvector`.
    pub const INDEX_BACKEND: &str = "DOCQA_INDEX_BACKEND";
    /// Snapshot file for the `memory` backend.
    pub const INDEX_PATH: &str = "DOCQA_INDEX_PATH";
    /// Collection (qdrant) or table suffix (pgvector).
    pub const COLLECTION: &str = "DOCQA_COLLECTION";
    pub const QDRANT_URL: &str = "DOCQA_QDRANT_URL";
    pub const DATABASE_URL: &str = "DOCQA_DATABASE_URL";
    /// `hashing`, `openai`, or `gemini`.
    pub const EMBEDDER: &str = "DOCQA_EMBEDDER";
    /// `gemini` or `openai`.
    pub const GENERATOR: &str = "DOCQA_GENERATOR";
    pub const OPENAI_BASE_URL: &str = "DOCQA_OPENAI_BASE_URL";
    pub const EMBEDDING_MODEL: &str = "DOCQA_EMBEDDING_MODEL";
    pub const CHAT_MODEL: &str = "DOCQA_CHAT_MODEL";
}

/// Which vector index backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    Memory,
    Qdrant,
    PgVector,
}

impl FromStr for IndexBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "inmemory" => Ok(Self::Memory),
            "qdrant" => Ok(Self::Qdrant),
            "pgvector" | "postgres" => Ok(Self::PgVector),
            other => Err(anyhow!("unknown index backend '{other}' (expected memory, qdrant, or pgvector)")),
        }
    }
}

impl fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Qdrant => "qdrant",
            Self::PgVector => "pgvector",
        })
    }
}

/// Which embedding provider turns text into vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    Hashing,
    OpenAI,
    Gemini,
}

impl FromStr for EmbedderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            other => Err(anyhow!("unknown embedder '{other}' (expected hashing, openai, or gemini)")),
        }
    }
}

impl fmt::Display for EmbedderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hashing => "hashing",
            Self::OpenAI => "openai",
            Self::Gemini => "gemini",
        })
    }
}

/// Which model writes the answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorKind {
    Gemini,
    OpenAI,
}

impl FromStr for GeneratorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAI),
            other => Err(anyhow!("unknown generator '{other}' (expected gemini or openai)")),
        }
    }
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gemini => "gemini",
            Self::OpenAI => "openai",
        })
    }
}

/// Everything the `docqa` binary needs to assemble a [`docqa_rag::RagService`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub index_backend: IndexBackend,
    pub index_path: PathBuf,
    pub collection: String,
    pub qdrant_url: String,
    pub database_url: Option<String>,
    pub embedder: EmbedderKind,
    pub generator: GeneratorKind,
    pub openai_base_url: Option<String>,
    pub embedding_model: Option<String>,
    pub chat_model: Option<String>,
    pub rag: RagConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            index_backend: IndexBackend::Memory,
            index_path: PathBuf::from("docqa_index.json"),
            collection: "docqa".to_string(),
            qdrant_url: "http://localhost:6334".to_string(),
            database_url: None,
            embedder: EmbedderKind::Hashing,
            generator: GeneratorKind::Gemini,
            openai_base_url: None,
            embedding_model: None,
            chat_model: None,
            rag: RagConfig::default(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; unset or blank values keep defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let port = match get(env::PORT) {
            Some(raw) => raw.parse().with_context(|| format!("{}={raw:?} is invalid", env::PORT))?,
            None => defaults.port,
        };

        Ok(Self {
            host: get(env::HOST).unwrap_or(defaults.host),
            port,
            index_backend: parse_or(get(env::INDEX_BACKEND), env::INDEX_BACKEND, defaults.index_backend)?,
            index_path: get(env::INDEX_PATH).map(PathBuf::from).unwrap_or(defaults.index_path),
            collection: get(env::COLLECTION).unwrap_or(defaults.collection),
            qdrant_url: get(env::QDRANT_URL).unwrap_or(defaults.qdrant_url),
            database_url: get(env::DATABASE_URL),
            embedder: parse_or(get(env::EMBEDDER), env::EMBEDDER, defaults.embedder)?,
            generator: parse_or(get(env::GENERATOR), env::GENERATOR, defaults.generator)?,
            openai_base_url: get(env::OPENAI_BASE_URL),
            embedding_model: get(env::EMBEDDING_MODEL),
            chat_model: get(env::CHAT_MODEL),
            rag: RagConfig::from_lookup(&lookup)?,
        })
    }

    /// `host:port` to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr<Err = anyhow::Error>,
{
    match raw {
        Some(raw) => raw.parse().with_context(|| format!("invalid {key}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use docqa_rag::DistanceMetric;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.bind_address(), "127.0.0.1:8000");
        assert_eq!(settings.index_backend, IndexBackend::Memory);
        assert_eq!(settings.embedder, EmbedderKind::Hashing);
        assert_eq!(settings.generator, GeneratorKind::Gemini);
        assert_eq!(settings.rag, RagConfig::default());
    }

    #[test]
    fn environment_overrides_are_parsed() {
        let settings = Settings::from_lookup(lookup(&[
            ("DOCQA_PORT", "9100"),
            ("DOCQA_INDEX_BACKEND", "Qdrant"),
            ("DOCQA_EMBEDDER", "openai"),
            ("DOCQA_GENERATOR", "openai"),
            ("DOCQA_OPENAI_BASE_URL", "http://localhost:11434/v1"),
            ("DOCQA_DISTANCE_METRIC", "l2"),
            ("DOCQA_CHAT_MODEL", "  "),
        ]))
        .unwrap();
        assert_eq!(settings.port, 9100);
        assert_eq!(settings.index_backend, IndexBackend::Qdrant);
        assert_eq!(settings.embedder, EmbedderKind::OpenAI);
        assert_eq!(settings.openai_base_url.as_deref(), Some("http://localhost:11434/v1"));
        assert_eq!(settings.rag.metric, DistanceMetric::L2);
        assert_eq!(settings.chat_model, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Settings::from_lookup(lookup(&[("DOCQA_PORT", "eighty")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("DOCQA_EMBEDDER", "word2vec")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("DOCQA_CHUNK_SIZE", "0")])).is_err());
    }

    #[test]
    fn choices_round_trip_through_display() {
        assert_eq!(IndexBackend::PgVector.to_string(), "pgvector");
        assert_eq!("postgres".parse::<IndexBackend>().unwrap(), IndexBackend::PgVector);
        assert_eq!(GeneratorKind::OpenAI.to_string(), "openai");
    }
}
