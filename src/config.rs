use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Which graph-store backend to run against. Resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    Falkor,
    Gremlin,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "falkor" | "falkordb" => Ok(Self::Falkor),
            "gremlin" | "neptune" => Ok(Self::Gremlin),
            other => anyhow::bail!("unknown graph backend '{other}'"),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Falkor => write!(f, "falkor"),
            Self::Gremlin => write!(f, "gremlin"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: BackendKind,
    pub falkor_host: String,
    pub falkor_port: u16,
    pub graph_name: String,
    pub gremlin_endpoint: String,
    pub max_cycle_depth: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            backend: env::var("GRAPH_BACKEND")
                .unwrap_or_else(|_| "memory".to_string())
                .parse()?,
            falkor_host: env::var("FALKORDB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            falkor_port: env::var("FALKORDB_PORT")
                .unwrap_or_else(|_| "6379".to_string())
                .parse()?,
            graph_name: env::var("GRAPH_NAME").unwrap_or_else(|_| "gst_graph".to_string()),
            gremlin_endpoint: env::var("GREMLIN_ENDPOINT").unwrap_or_default(),
            max_cycle_depth: env::var("MAX_CYCLE_DEPTH")
                .unwrap_or_else(|_| "4".to_string())
                .parse()?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            falkor_host: "localhost".to_string(),
            falkor_port: 6379,
            graph_name: "gst_graph".to_string(),
            gremlin_endpoint: String::new(),
            max_cycle_depth: 4,
        }
    }
}
