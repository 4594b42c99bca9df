//! Application configuration.
//!
//! Interpreter options are plain values passed to the tokenizer. Server
//! settings for the importer come from the environment (a `.env` file is
//! loaded first when present).

use std::env;

use crate::error::{ClientError, ClientResult};

/// Maximum nesting of `run <script>` includes.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 16;

/// Token that closes a record source scope in delimited mode.
pub const END_OF_SCOPE: &str = "end";

/// Tokenizer directive that splices a command script.
pub const INCLUDE_DIRECTIVE: &str = "run";

/// Environment variable holding the GraphQL endpoint.
pub const SERVER_URL_VAR: &str = "STASHBOX_URL";

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "STASHBOX_API_KEY";

/// How record source scopes end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeMode {
    /// A record source owns every remaining token.
    #[default]
    Legacy,
    /// `end` closes the innermost record source.
    Delimited,
}

/// Options for building a command tree.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub scope_mode: ScopeMode,
    pub max_include_depth: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            scope_mode: ScopeMode::Legacy,
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }
}

/// Connection settings for a stash-box server.
#[derive(Debug, Clone)]
pub struct StashBoxConfig {
    /// GraphQL endpoint, e.g. `http://localhost:9998/graphql`
    pub server_url: String,
    pub api_key: String,
}

impl StashBoxConfig {
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Read `STASHBOX_URL` and `STASHBOX_API_KEY`
    pub fn from_env() -> ClientResult<Self> {
        let _ = dotenvy::dotenv();

        let server_url = env::var(SERVER_URL_VAR)
            .map_err(|_| ClientError::MissingConfig(format!("{} not set", SERVER_URL_VAR)))?;
        let api_key = env::var(API_KEY_VAR)
            .map_err(|_| ClientError::MissingConfig(format!("{} not set", API_KEY_VAR)))?;

        Ok(Self::new(server_url, api_key))
    }
}
