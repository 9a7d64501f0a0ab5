use std::env;

use anyhow::{anyhow, Result};

/// Runtime configuration, read from environment variables (a `.env` file is
/// loaded first if present).
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,

    pub ollama_base_url: String,
    pub extraction_model: String,
    pub chat_model: String,

    pub server_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let neo4j_uri =
            env::var("NEO4J_URI").map_err(|_| anyhow!("NEO4J_URI is not set"))?;
        let neo4j_user = env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string());
        let neo4j_password =
            env::var("NEO4J_PASSWORD").map_err(|_| anyhow!("NEO4J_PASSWORD is not set"))?;

        let ollama_base_url = env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        let extraction_model =
            env::var("EXTRACTION_MODEL").unwrap_or_else(|_| "llama3.1".to_string());
        let chat_model = env::var("CHAT_MODEL").unwrap_or_else(|_| "llama3.1".to_string());

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Ok(Self {
            neo4j_uri,
            neo4j_user,
            neo4j_password,
            ollama_base_url,
            extraction_model,
            chat_model,
            server_addr,
        })
    }
}
