//! End-to-end tests: upload, process, push, search and answer against local
//! stores and mock providers.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ragline_config::FileConfig;
use ragline_core::{
    AnswerOutcome, DocumentStore, IngestService, LocalFileStore, MemoryDocumentStore,
    NoResultsReason, ProcessOutcome, ProcessRequest, PushOutcome, RagError, ResponseSignal,
    RetrievalOrchestrator, SearchOutcome, UploadOutcome,
};
use ragline_index::{IndexerConfig, IndexingPipeline};
use ragline_prompts::TemplateCatalog;
use ragline_providers::{
    DocumentType, EmbeddingProvider, GenerationProvider, Message, MessageRole, MemoryVectorStore,
    process_text, ProviderError, VectorRecord, VectorStoreProvider,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const KEYWORDS: [&str; 3] = ["alpha", "beta", "gamma"];

const TEMPLATES: &str = r#"
[rag]
system_prompt = "SYSTEM"
document_prompt = "Doc {{doc_num}}: {{chunk_text}}"
footer_prompt = "Q: {{query}}"
"#;

/// Embeds text as keyword counts, plus a constant so no vector is zero.
#[derive(Default)]
struct KeywordEmbeddings {
    empty_queries: bool,
    /// Reported size when it should differ from the real one
    declared_size: Option<usize>,
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbeddings {
    async fn embed_text(&self, text: &str, purpose: DocumentType) -> Result<Vec<f32>, ProviderError> {
        if self.empty_queries && purpose == DocumentType::Query {
            return Ok(Vec::new());
        }
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = KEYWORDS
            .iter()
            .map(|k| lower.matches(k).count() as f32)
            .collect();
        vector.push(0.01);
        Ok(vector)
    }

    fn embedding_size(&self) -> usize {
        self.declared_size.unwrap_or(KEYWORDS.len() + 1)
    }

    fn model_name(&self) -> &str {
        "keywords"
    }

    fn name(&self) -> &str {
        "keywords"
    }
}

/// Records every generation call and answers with a fixed text.
#[derive(Default)]
struct RecordingGeneration {
    calls: Mutex<Vec<(String, Vec<Message>)>>,
    max_chars: Option<usize>,
}

#[async_trait]
impl GenerationProvider for RecordingGeneration {
    fn construct_message(&self, text: &str, role: MessageRole) -> Message {
        match self.max_chars {
            Some(max) => Message::new(role, process_text(text, max)),
            None => Message::new(role, text.to_string()),
        }
    }

    async fn generate(&self, prompt: &str, history: &[Message]) -> Result<String, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), history.to_vec()));
        Ok("generated answer".to_string())
    }

    fn model_name(&self) -> &str {
        "recording"
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct Harness {
    ingest: IngestService,
    retrieval: RetrievalOrchestrator,
    documents: Arc<MemoryDocumentStore>,
    store: Arc<MemoryVectorStore>,
    generation: Arc<RecordingGeneration>,
    _dir: TempDir,
}

async fn harness_with(embeddings: KeywordEmbeddings) -> Harness {
    harness_full(embeddings, RecordingGeneration::default()).await
}

async fn harness_full(embeddings: KeywordEmbeddings, generation: RecordingGeneration) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let file_config = FileConfig {
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    };

    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(embeddings);
    let generation = Arc::new(generation);
    let store = Arc::new(MemoryVectorStore::default());
    store.connect().await.unwrap();
    let documents = Arc::new(MemoryDocumentStore::new());
    let templates = Arc::new(TemplateCatalog::with_definitions("en", "en", &[("en", TEMPLATES)]).unwrap());

    let pipeline = IndexingPipeline::new(IndexerConfig::default(), embeddings.clone(), store.clone());
    let ingest = IngestService::new(
        documents.clone(),
        Arc::new(LocalFileStore::new(&file_config)),
        store.clone(),
        pipeline,
    );
    let retrieval = RetrievalOrchestrator::new(embeddings, generation.clone(), store.clone(), templates);

    Harness {
        ingest,
        retrieval,
        documents,
        store,
        generation,
        _dir: dir,
    }
}

async fn harness() -> Harness {
    harness_with(KeywordEmbeddings::default()).await
}

fn process_all(reset: bool) -> ProcessRequest {
    ProcessRequest {
        file_id: None,
        chunk_size: 100,
        overlap_size: 20,
        reset,
    }
}

/// Upload each paragraph as its own file, then process and push them.
async fn ingest_paragraphs(h: &Harness, project: &str, paragraphs: &[&str]) -> usize {
    for (i, paragraph) in paragraphs.iter().enumerate() {
        let name = format!("part{}.txt", i + 1);
        let upload = h.ingest.upload(project, &name, paragraph.as_bytes()).await.unwrap();
        assert_eq!(upload.signal(), ResponseSignal::FileUploadSuccess);
    }

    h.ingest.process(project, &process_all(false)).await.unwrap();
    match h.ingest.push(project, false, &CancellationToken::new()).await.unwrap() {
        PushOutcome::Inserted {
            inserted_items_count,
        } => inserted_items_count,
        PushOutcome::NoChunks => panic!("nothing pushed"),
    }
}

#[tokio::test]
async fn test_upload_process_push_and_answer() {
    let h = harness().await;
    let inserted = ingest_paragraphs(
        &h,
        "alpha123",
        &["Alpha alpha is the first topic.", "Beta covers the second topic.", "Gamma closes the notes."],
    )
    .await;
    assert_eq!(inserted, 3);

    let info = h.ingest.collection_info("alpha123").await.unwrap().unwrap();
    assert_eq!(info.name, "collection_alpha123");
    assert_eq!(info.points_count, 3);

    let outcome = h.retrieval.answer("alpha123", "tell me about alpha", 2, None).await.unwrap();
    assert_eq!(outcome.signal(), ResponseSignal::RagAnswerSuccess);
    let (answer, prompt, history) = outcome.into_parts();

    assert_eq!(answer.as_deref(), Some("generated answer"));
    let prompt = prompt.unwrap();
    assert!(prompt.starts_with("Doc 1: Alpha alpha is the first topic."));
    assert!(prompt.ends_with("\n\nQ: tell me about alpha"));

    let history = history.unwrap();
    let roles: Vec<MessageRole> = history.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![MessageRole::System, MessageRole::User, MessageRole::Assistant]);
    assert_eq!(history[0].content, "SYSTEM");

    // The system prompt travels only in the history, never in the body.
    let calls = h.generation.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].0.contains("SYSTEM"));
    assert_eq!(calls[0].1, vec![Message::new(MessageRole::System, "SYSTEM".to_string())]);
}

#[tokio::test]
async fn test_prompt_follows_rank_order() {
    let h = harness().await;
    ingest_paragraphs(&h, "rank", &["gamma only here.", "beta beta beta.", "beta and gamma."]).await;

    let outcome = h.retrieval.answer("rank", "beta", 3, None).await.unwrap();
    let AnswerOutcome::Answered(rag) = outcome else {
        panic!("expected an answer");
    };

    assert_eq!(
        rag.full_prompt,
        "Doc 1: beta beta beta.\n\nDoc 2: beta and gamma.\n\nDoc 3: gamma only here.\n\nQ: beta"
    );
}

#[tokio::test]
async fn test_answer_without_index_is_fully_absent() {
    let h = harness().await;

    let outcome = h.retrieval.answer("emptyproject", "anything", 5, None).await.unwrap();
    assert_eq!(outcome, AnswerOutcome::NoAnswer(NoResultsReason::NoCollection));
    assert_eq!(outcome.into_parts(), (None, None, None));
    assert!(h.generation.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_query_embedding_is_no_results() {
    let h = harness_with(KeywordEmbeddings {
        empty_queries: true,
        ..Default::default()
    })
    .await;
    ingest_paragraphs(&h, "p1", &["alpha text"]).await;

    let outcome = h.retrieval.search("p1", "alpha", 5).await.unwrap();
    assert_eq!(outcome, SearchOutcome::NoResults(NoResultsReason::EmptyEmbedding));
    assert_eq!(outcome.signal(), ResponseSignal::VectordbSearchNoResults);
}

#[tokio::test]
async fn test_empty_collection_is_no_matches() {
    let h = harness().await;
    h.store.create_collection("collection_p1", 4, false).await.unwrap();

    let outcome = h.retrieval.search("p1", "alpha", 5).await.unwrap();
    assert_eq!(outcome, SearchOutcome::NoResults(NoResultsReason::NoMatches));
}

#[tokio::test]
async fn test_collection_dimension_mismatch_fails_fast() {
    let h = harness().await;
    h.store.create_collection("collection_p1", 3, false).await.unwrap();

    let err = h.retrieval.search("p1", "alpha", 5).await.unwrap_err();
    assert!(matches!(
        err,
        RagError::DimensionMismatch {
            expected: 3,
            actual: 4,
            ..
        }
    ));
    assert!(!err.is_retryable());
    assert_eq!(
        err.signal(ResponseSignal::VectordbSearchError),
        ResponseSignal::DimensionMismatch
    );
}

#[tokio::test]
async fn test_query_vector_must_match_declared_size() {
    let h = harness_with(KeywordEmbeddings {
        declared_size: Some(8),
        ..Default::default()
    })
    .await;

    let err = h.retrieval.search("p1", "alpha", 5).await.unwrap_err();
    assert!(matches!(
        err,
        RagError::DimensionMismatch {
            expected: 8,
            actual: 4,
            ..
        }
    ));
}

#[tokio::test]
async fn test_history_user_turn_is_truncated_but_prompt_is_whole() {
    let generation = RecordingGeneration {
        max_chars: Some(10),
        ..Default::default()
    };
    let h = harness_full(KeywordEmbeddings::default(), generation).await;
    ingest_paragraphs(&h, "short", &["alpha is described here."]).await;

    let AnswerOutcome::Answered(rag) = h.retrieval.answer("short", "alpha?", 1, None).await.unwrap()
    else {
        panic!("expected an answer");
    };

    assert!(rag.full_prompt.ends_with("Q: alpha?"));
    assert_eq!(rag.chat_history[1].role, MessageRole::User);
    assert_eq!(rag.chat_history[1].content, process_text(&rag.full_prompt, 10));
    assert!(rag.chat_history[1].content.chars().count() < rag.full_prompt.chars().count());
}

#[tokio::test]
async fn test_supplied_history_is_used_verbatim() {
    let h = harness().await;
    ingest_paragraphs(&h, "chat", &["alpha facts."]).await;

    let prior = vec![
        Message::new(MessageRole::System, "custom system".to_string()),
        Message::new(MessageRole::User, "earlier question".to_string()),
        Message::new(MessageRole::Assistant, "earlier answer".to_string()),
    ];
    let outcome = h
        .retrieval
        .answer("chat", "alpha?", 1, Some(prior.clone()))
        .await
        .unwrap();

    let (_, prompt, history) = outcome.into_parts();
    let history = history.unwrap();
    assert_eq!(&history[..3], &prior[..]);
    assert_eq!(history[3], Message::new(MessageRole::User, prompt.unwrap()));
    assert_eq!(history[4].role, MessageRole::Assistant);

    let calls = h.generation.calls.lock().unwrap();
    assert_eq!(calls[0].1, prior);
}

#[tokio::test]
async fn test_search_results_are_ordered() {
    let h = harness().await;
    ingest_paragraphs(&h, "ord", &["alpha.", "alpha alpha beta.", "gamma.", "alpha gamma."]).await;

    let SearchOutcome::Found(hits) = h.retrieval.search("ord", "alpha", 10).await.unwrap() else {
        panic!("expected hits");
    };
    assert_eq!(hits.len(), 4);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn test_process_outcomes_for_missing_files() {
    let h = harness().await;

    let outcome = h.ingest.process("nofiles", &process_all(false)).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::NoFiles);
    assert_eq!(outcome.signal(), ResponseSignal::NoFilesError);

    let request = ProcessRequest {
        file_id: Some("missing.txt".to_string()),
        ..process_all(false)
    };
    let outcome = h.ingest.process("nofiles", &request).await.unwrap();
    assert_eq!(outcome.signal(), ResponseSignal::FileIdError);
}

#[tokio::test]
async fn test_process_single_file_and_reset() {
    let h = harness().await;
    let UploadOutcome::Stored { file_id, .. } = h
        .ingest
        .upload("p1", "doc.md", "alpha one.\n\nbeta two.".as_bytes())
        .await
        .unwrap()
    else {
        panic!("upload rejected");
    };

    let request = ProcessRequest {
        file_id: Some(file_id),
        ..process_all(false)
    };
    let first = h.ingest.process("p1", &request).await.unwrap();
    assert_eq!(
        first,
        ProcessOutcome::Completed {
            inserted_chunks: 1,
            processed_files: 1
        }
    );

    // Without reset records accumulate; with reset they are replaced.
    h.ingest.process("p1", &request).await.unwrap();
    let project = h.documents.find_project("p1").await.unwrap().unwrap();
    assert_eq!(h.documents.list_chunks(project.id, 1, 50).await.unwrap().len(), 2);

    let reset = ProcessRequest {
        reset: true,
        ..request
    };
    h.ingest.process("p1", &reset).await.unwrap();
    let chunks = h.documents.list_chunks(project.id, 1, 50).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].order, 1);
    assert!(chunks[0].asset.is_some());
}

#[tokio::test]
async fn test_invalid_chunk_sizes_are_rejected() {
    let h = harness().await;
    let request = ProcessRequest {
        chunk_size: 20,
        overlap_size: 20,
        ..process_all(false)
    };
    let err = h.ingest.process("p1", &request).await.unwrap_err();
    assert!(matches!(err, RagError::Chunking(_)));
}

#[tokio::test]
async fn test_push_pages_and_resets_once() {
    let h = harness().await;
    let paragraphs: Vec<String> = (1..=120).map(|i| format!("alpha paragraph {}.", i)).collect();
    let refs: Vec<&str> = paragraphs.iter().map(String::as_str).collect();

    // Small chunks keep one paragraph per chunk.
    let content = refs.join("\n\n");
    h.ingest.upload("big", "big.txt", content.as_bytes()).await.unwrap();
    let request = ProcessRequest {
        chunk_size: 25,
        overlap_size: 5,
        ..process_all(false)
    };
    let processed = h.ingest.process("big", &request).await.unwrap();
    assert_eq!(
        processed,
        ProcessOutcome::Completed {
            inserted_chunks: 120,
            processed_files: 1
        }
    );

    // A stale point that only the reset removes.
    h.ingest.push("big", false, &CancellationToken::new()).await.unwrap();
    let stale = VectorRecord {
        id: 9999,
        vector: vec![1.0, 0.0, 0.0, 0.01],
        text: "stale".to_string(),
        metadata: Default::default(),
    };
    h.store.upsert("collection_big", vec![stale]).await.unwrap();
    let info = h.store.collection_info("collection_big").await.unwrap();
    assert_eq!(info.points_count, 121);

    let outcome = h.ingest.push("big", true, &CancellationToken::new()).await.unwrap();
    assert_eq!(
        outcome,
        PushOutcome::Inserted {
            inserted_items_count: 120
        }
    );
    let info = h.store.collection_info("collection_big").await.unwrap();
    assert_eq!(info.points_count, 120);
}

#[tokio::test]
async fn test_push_without_chunks() {
    let h = harness().await;
    let outcome = h.ingest.push("idle", false, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, PushOutcome::NoChunks);
}

#[tokio::test]
async fn test_push_cancelled_reports_progress() {
    let h = harness().await;
    h.ingest.upload("p1", "a.txt", b"alpha").await.unwrap();
    h.ingest.process("p1", &process_all(false)).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = h.ingest.push("p1", false, &cancel).await.unwrap_err();

    assert!(matches!(err, RagError::IndexingIncomplete { inserted: 0, .. }));
    assert_eq!(
        err.signal(ResponseSignal::InsertIntoVectordbError),
        ResponseSignal::OperationCancelled
    );
}

#[tokio::test]
async fn test_upload_rejections() {
    let h = harness().await;

    let outcome = h.ingest.upload("p1", "photo.png", b"png").await.unwrap();
    assert_eq!(outcome.signal(), ResponseSignal::FileTypeNotSupported);

    let too_big = vec![b'a'; 11 * 1024 * 1024];
    let outcome = h.ingest.upload("p1", "huge.txt", &too_big).await.unwrap();
    assert_eq!(outcome.signal(), ResponseSignal::FileSizeExceeded);
}

#[tokio::test]
async fn test_invalid_project_id() {
    let h = harness().await;
    let err = h.ingest.upload("bad id!", "a.txt", b"x").await.unwrap_err();
    assert!(matches!(err, RagError::InvalidProjectId(_)));

    let err = h.retrieval.search("", "q", 5).await.unwrap_err();
    assert_eq!(
        err.signal(ResponseSignal::VectordbSearchError),
        ResponseSignal::ProjectIdInvalid
    );
}

#[tokio::test]
async fn test_collection_info_and_reset() {
    let h = harness().await;
    assert!(h.ingest.collection_info("p1").await.unwrap().is_none());

    ingest_paragraphs(&h, "p1", &["alpha"]).await;
    assert!(h.ingest.collection_info("p1").await.unwrap().is_some());

    assert!(h.ingest.reset_collection("p1").await.unwrap());
    assert!(!h.ingest.reset_collection("p1").await.unwrap());
    assert!(h.ingest.collection_info("p1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_projects() {
    let h = harness().await;
    for project in ["one", "two", "three"] {
        h.ingest.collection_info(project).await.unwrap();
    }

    let page = h.ingest.list_projects(1, 2).await.unwrap();
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.projects.len(), 2);
    assert!(h.ingest.list_projects(0, 2).await.is_err());
}
