mod config;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use kgrag_extract::{LanguageModel, OllamaClient};
use kgrag_graph::store::{GraphStore, Params};
use kgrag_graph::Neo4jStore;
use kgrag_pipeline::{IngestionPipeline, IngestionReport, IngestionStatus};
use kgrag_query::Retriever;

use config::AppConfig;

const RETRIEVAL_LIMIT: usize = 5;
const NO_CONTEXT_ANSWER: &str = "No relevant information found in the knowledge graph.";

struct AppState {
    pipeline: IngestionPipeline,
    retriever: Retriever,
    chat_model: Arc<dyn LanguageModel>,
    store: Arc<dyn GraphStore>,
    threads: DashMap<String, Vec<ChatTurn>>,
}

#[derive(Deserialize)]
struct IngestRequest {
    documents: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize)]
struct ChatTurn {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
    #[serde(default = "default_thread_id")]
    thread_id: String,
    history: Option<Vec<ChatTurn>>,
}

fn default_thread_id() -> String {
    "default_thread".to_string()
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    thread_id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env()?;

    let neo4j = Neo4jStore::connect(
        &config.neo4j_uri,
        &config.neo4j_user,
        &config.neo4j_password,
    )
    .await?;
    neo4j.init_schema().await?;
    let store: Arc<dyn GraphStore> = Arc::new(neo4j);

    let extraction_model: Arc<dyn LanguageModel> = Arc::new(
        OllamaClient::new(&config.ollama_base_url, &config.extraction_model).json_output(),
    );
    let chat_model: Arc<dyn LanguageModel> =
        Arc::new(OllamaClient::new(&config.ollama_base_url, &config.chat_model));

    let state = Arc::new(AppState {
        pipeline: IngestionPipeline::new(extraction_model, Arc::clone(&store)),
        retriever: Retriever::new(Arc::clone(&store)),
        chat_model,
        store,
        threads: DashMap::new(),
    });

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/chat", post(chat))
        .route("/clear", post(clear))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    info!("listening on {}", config.server_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Knowledge graph RAG API is running" }))
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match state.store.run("RETURN 1", Params::new()).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(err) => {
            error!("health check failed: {err:#}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}

async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> (StatusCode, Json<IngestionReport>) {
    let report = state.pipeline.ingest_documents(&request.documents).await;
    let status = match report.status {
        IngestionStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    (status, Json(report))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let context = state.retriever.retrieve(&request.query, RETRIEVAL_LIMIT).await;

    // History supplied in the request overrides the stored thread.
    let history = match &request.history {
        Some(turns) => turns.clone(),
        None => state
            .threads
            .get(&request.thread_id)
            .map(|turns| turns.value().clone())
            .unwrap_or_default(),
    };

    let response = if context.is_empty() {
        NO_CONTEXT_ANSWER.to_string()
    } else {
        let prompt = build_answer_prompt(&context.to_listing(), &history, &request.query);
        state.chat_model.complete(&prompt).await.map_err(|err| {
            error!("chat completion failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("chat completion failed: {err:#}"),
            )
        })?
    };

    let mut thread = state.threads.entry(request.thread_id.clone()).or_default();
    thread.push(ChatTurn {
        role: "user".to_string(),
        content: request.query,
    });
    thread.push(ChatTurn {
        role: "assistant".to_string(),
        content: response.clone(),
    });

    Ok(Json(ChatResponse {
        response,
        thread_id: request.thread_id,
    }))
}

async fn clear(State(state): State<Arc<AppState>>) -> Result<Json<Value>, (StatusCode, String)> {
    state
        .store
        .run("MATCH (n) DETACH DELETE n", Params::new())
        .await
        .map_err(|err| {
            error!("clearing the graph failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("clearing the graph failed: {err:#}"),
            )
        })?;
    state.threads.clear();
    Ok(Json(json!({ "status": "cleared" })))
}

fn build_answer_prompt(context: &str, history: &[ChatTurn], question: &str) -> String {
    let mut prompt = String::from(
        "Answer the question based only on the following knowledge graph context. \
         Explain the connections between entities where the context shows them, \
         and cite the source text when possible. If the context does not contain \
         the answer, say so.\n\n",
    );
    prompt.push_str(context);
    prompt.push('\n');

    if !history.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        for turn in history {
            prompt.push_str(&format!("{}: {}\n", turn.role, turn.content));
        }
    }

    prompt.push_str(&format!("\nQuestion: {question}\n"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: &str, content: &str) -> ChatTurn {
        ChatTurn {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn answer_prompt_embeds_context_history_and_question() {
        let history = vec![turn("user", "Who is Alice?"), turn("assistant", "A person.")];
        let prompt = build_answer_prompt("GRAPH CONNECTIONS:\n- A", &history, "Where does she work?");

        assert!(prompt.contains("GRAPH CONNECTIONS:"));
        assert!(prompt.contains("user: Who is Alice?"));
        assert!(prompt.contains("assistant: A person."));
        assert!(prompt.contains("Question: Where does she work?"));
    }

    #[test]
    fn answer_prompt_omits_history_block_when_empty() {
        let prompt = build_answer_prompt("context", &[], "a question");
        assert!(!prompt.contains("Conversation so far"));
    }

    #[test]
    fn chat_request_defaults_the_thread_id() {
        let request: ChatRequest = serde_json::from_str(r#"{"query": "hi"}"#).unwrap();
        assert_eq!(request.thread_id, "default_thread");
        assert!(request.history.is_none());
    }
}
