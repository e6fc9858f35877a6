//! Semantic search and retrieval-augmented answering.
//!
//! One request moves through
//! `embed query -> search -> (no results | build prompt -> generate)`.
//! No state is kept between requests.

use std::sync::Arc;

use ragline_index::collection_name;
use ragline_prompts::{keys, TemplateCatalog};
use ragline_providers::{
    DocumentType, EmbeddingProvider, GenerationProvider, Message, MessageRole, RetrievedDocument,
    VectorStoreProvider,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::RagError;
use crate::signal::ResponseSignal;
use crate::validate_project_id;

/// Why a search produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoResultsReason {
    /// The embedding provider returned an empty vector for the query.
    EmptyEmbedding,
    /// Nothing has been indexed for the project.
    NoCollection,
    /// The collection returned zero matches.
    NoMatches,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Hits in the store's rank order, highest similarity first.
    Found(Vec<RetrievedDocument>),
    NoResults(NoResultsReason),
}

impl SearchOutcome {
    pub fn signal(&self) -> ResponseSignal {
        match self {
            Self::Found(_) => ResponseSignal::VectordbSearchSuccess,
            Self::NoResults(_) => ResponseSignal::VectordbSearchNoResults,
        }
    }
}

/// A generated answer with the exact inputs that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    /// Body prompt sent for generation (documents and footer)
    pub full_prompt: String,
    /// Conversation used for generation followed by the new user and
    /// assistant turns, ready to pass into the next call. Turns are built
    /// with the provider's `construct_message`, so the user turn holds the
    /// prompt truncated to the provider's input limit; `full_prompt` keeps
    /// it whole.
    pub chat_history: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    Answered(RagAnswer),
    NoAnswer(NoResultsReason),
}

impl AnswerOutcome {
    /// `(answer, prompt, history)`: all present, or all absent.
    pub fn into_parts(self) -> (Option<String>, Option<String>, Option<Vec<Message>>) {
        match self {
            Self::Answered(rag) => (Some(rag.answer), Some(rag.full_prompt), Some(rag.chat_history)),
            Self::NoAnswer(_) => (None, None, None),
        }
    }

    pub fn signal(&self) -> ResponseSignal {
        match self {
            Self::Answered(_) => ResponseSignal::RagAnswerSuccess,
            Self::NoAnswer(_) => ResponseSignal::RagNoAnswer,
        }
    }
}

fn dimension_mismatch(project: &str, collection: &str, expected: usize, actual: usize) -> RagError {
    RagError::DimensionMismatch {
        project: project.to_string(),
        collection: collection.to_string(),
        expected,
        actual,
    }
}

/// Answers questions from a project's indexed chunks.
pub struct RetrievalOrchestrator {
    embeddings: Arc<dyn EmbeddingProvider>,
    generation: Arc<dyn GenerationProvider>,
    store: Arc<dyn VectorStoreProvider>,
    templates: Arc<TemplateCatalog>,
}

impl RetrievalOrchestrator {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        generation: Arc<dyn GenerationProvider>,
        store: Arc<dyn VectorStoreProvider>,
        templates: Arc<TemplateCatalog>,
    ) -> Self {
        Self {
            embeddings,
            generation,
            store,
            templates,
        }
    }

    pub async fn search(
        &self,
        project_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<SearchOutcome, RagError> {
        let project_id = validate_project_id(project_id)?;
        if limit == 0 {
            return Err(RagError::InvalidRequest("limit must be at least 1".to_string()));
        }
        let collection = collection_name(project_id);

        let vector = self
            .embeddings
            .embed_text(query, DocumentType::Query)
            .await
            .map_err(|e| RagError::provider_call(project_id, &collection, "embed_query", e))?;
        if vector.is_empty() {
            info!(project = project_id, "Query embedding is empty");
            return Ok(SearchOutcome::NoResults(NoResultsReason::EmptyEmbedding));
        }
        let expected = self.embeddings.embedding_size();
        if vector.len() != expected {
            return Err(dimension_mismatch(project_id, &collection, expected, vector.len()));
        }

        let exists = self
            .store
            .collection_exists(&collection)
            .await
            .map_err(|e| RagError::provider_call(project_id, &collection, "collection_exists", e))?;
        if !exists {
            info!(project = project_id, "No collection {}", collection);
            return Ok(SearchOutcome::NoResults(NoResultsReason::NoCollection));
        }

        let dimensions = self
            .store
            .collection_info(&collection)
            .await
            .map_err(|e| RagError::provider_call(project_id, &collection, "collection_info", e))?
            .dimensions;
        if dimensions != vector.len() {
            return Err(dimension_mismatch(project_id, &collection, dimensions, vector.len()));
        }

        let hits = self
            .store
            .search_by_vector(&collection, &vector, limit)
            .await
            .map_err(|e| RagError::provider_call(project_id, &collection, "search", e))?;

        debug!(project = project_id, "Search returned {} hits", hits.len());
        if hits.is_empty() {
            return Ok(SearchOutcome::NoResults(NoResultsReason::NoMatches));
        }
        Ok(SearchOutcome::Found(hits))
    }

    /// Answer `query` from the top `limit` chunks.
    ///
    /// A non-empty `chat_history` is used as the running conversation;
    /// otherwise a new one starts with the system prompt.
    pub async fn answer(
        &self,
        project_id: &str,
        query: &str,
        limit: usize,
        chat_history: Option<Vec<Message>>,
    ) -> Result<AnswerOutcome, RagError> {
        let documents = match self.search(project_id, query, limit).await? {
            SearchOutcome::Found(documents) => documents,
            SearchOutcome::NoResults(reason) => return Ok(AnswerOutcome::NoAnswer(reason)),
        };

        let full_prompt = self.build_prompt(query, &documents)?;

        let mut history = match chat_history {
            Some(history) if !history.is_empty() => history,
            _ => {
                let system = self
                    .templates
                    .get(keys::RAG_GROUP, keys::SYSTEM_PROMPT, &json!({}))?;
                vec![self.generation.construct_message(&system, MessageRole::System)]
            }
        };

        let answer = self
            .generation
            .generate(&full_prompt, &history)
            .await
            .map_err(|e| {
                RagError::provider_call(project_id, &collection_name(project_id), "generate", e)
            })?;

        history.push(self.generation.construct_message(&full_prompt, MessageRole::User));
        history.push(self.generation.construct_message(&answer, MessageRole::Assistant));

        info!(
            project = project_id,
            documents = documents.len(),
            "Generated answer"
        );
        Ok(AnswerOutcome::Answered(RagAnswer {
            answer,
            full_prompt,
            chat_history: history,
        }))
    }

    /// Document fragments in rank order, a blank line apart, then the footer.
    pub fn build_prompt(
        &self,
        query: &str,
        documents: &[RetrievedDocument],
    ) -> Result<String, RagError> {
        let fragments = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                self.templates.get(
                    keys::RAG_GROUP,
                    keys::DOCUMENT_PROMPT,
                    &json!({ "doc_num": i + 1, "chunk_text": doc.text }),
                )
            })
            .collect::<Result<Vec<String>, _>>()?;

        let footer = self
            .templates
            .get(keys::RAG_GROUP, keys::FOOTER_PROMPT, &json!({ "query": query }))?;

        Ok(format!("{}\n\n{}", fragments.join("\n\n"), footer))
    }
}
