//! Subcommands and their JSON reports.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use ragline_core::{
    AnswerOutcome, ProcessRequest, RagError, ResponseSignal, SearchOutcome, UploadOutcome,
};
use ragline_providers::Message;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::app::App;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Upload a document into a project
    Upload {
        project: String,
        path: PathBuf,
    },

    /// Split uploaded files into chunk records
    Process {
        project: String,
        /// Process only this file id
        #[arg(long)]
        file_id: Option<String>,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        overlap_size: Option<usize>,
        /// Replace the project's existing chunk records
        #[arg(long)]
        reset: bool,
    },

    /// Index chunk records into the project's vector collection
    Push {
        project: String,
        /// Recreate the collection first
        #[arg(long)]
        reset: bool,
    },

    /// Show the project's vector collection
    CollectionInfo { project: String },

    /// Delete the project's vector collection
    Reset { project: String },

    /// Semantic search over a project's chunks
    Search {
        project: String,
        text: String,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a question from a project's chunks
    Answer {
        project: String,
        text: String,
        #[arg(long)]
        limit: Option<usize>,
        /// JSON file holding the chat history of a previous answer
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// List projects
    Projects {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        page_size: usize,
    },

    /// Show application name, version and configured backends
    Info,
}

impl Command {
    /// Signal reported when the command fails with an error.
    pub fn failure_signal(&self) -> ResponseSignal {
        match self {
            Self::Upload { .. } => ResponseSignal::FileUploadFailed,
            Self::Process { .. } => ResponseSignal::ProcessingFailed,
            Self::Push { .. } => ResponseSignal::InsertIntoVectordbError,
            Self::CollectionInfo { .. } | Self::Reset { .. } => {
                ResponseSignal::VectordbCollectionNotFound
            }
            Self::Search { .. } => ResponseSignal::VectordbSearchError,
            Self::Answer { .. } => ResponseSignal::RagAnswerError,
            Self::Projects { .. } | Self::Info => ResponseSignal::ProjectsListed,
        }
    }

    /// Whether the command talks to the vector store.
    pub fn needs_vector_store(&self) -> bool {
        !matches!(
            self,
            Self::Upload { .. } | Self::Process { .. } | Self::Projects { .. } | Self::Info
        )
    }
}

/// Build a report object: `signal` first, then the fields of `body`.
pub fn report<T: Serialize>(signal: ResponseSignal, body: T) -> Value {
    let mut out = json!({ "signal": signal });
    if let (Some(out), Value::Object(fields)) = (out.as_object_mut(), json!(body)) {
        out.extend(fields);
    }
    out
}

/// Report for a command that failed.
pub fn error_report(command: &Command, err: &RagError) -> Value {
    json!({
        "signal": err.signal(command.failure_signal()),
        "error": err.to_string(),
        "retryable": err.is_retryable(),
    })
}

/// Read a chat history written by a previous `answer` run.
///
/// Accepts either a bare message list or a full answer report.
pub async fn read_history(path: &Path) -> Result<Vec<Message>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read history file {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("History file {} is not JSON", path.display()))?;

    let messages = match value {
        Value::Object(mut report) => report.remove("chat_history").unwrap_or(Value::Null),
        other => other,
    };
    if messages.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(messages)
        .with_context(|| format!("Invalid chat history in {}", path.display()))
}

/// Input the command needs from disk, read before any service call.
pub enum Prepared {
    Upload { file_name: String, content: Vec<u8> },
    History(Option<Vec<Message>>),
    Nothing,
}

pub async fn prepare(command: &Command) -> Result<Prepared> {
    match command {
        Command::Upload { path, .. } => {
            let content = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("{} has no file name", path.display()))?
                .to_string();
            Ok(Prepared::Upload { file_name, content })
        }
        Command::Answer {
            history: Some(path),
            ..
        } => Ok(Prepared::History(Some(read_history(path).await?))),
        _ => Ok(Prepared::Nothing),
    }
}

/// Run one command against the services.
pub async fn execute(
    app: &App,
    command: Command,
    prepared: Prepared,
    cancel: &CancellationToken,
) -> Result<Value, RagError> {
    let defaults = &app.settings.defaults;

    match command {
        Command::Upload { project, .. } => {
            let Prepared::Upload { file_name, content } = prepared else {
                return Err(RagError::InvalidRequest("no upload content".to_string()));
            };
            let outcome = app.ingest.upload(&project, &file_name, &content).await?;
            Ok(match &outcome {
                UploadOutcome::Stored { .. } => report(outcome.signal(), &outcome),
                UploadOutcome::Rejected { signal } => report(*signal, json!({})),
            })
        }

        Command::Process {
            project,
            file_id,
            chunk_size,
            overlap_size,
            reset,
        } => {
            let request = ProcessRequest {
                file_id,
                chunk_size: chunk_size.unwrap_or(defaults.chunk_size),
                overlap_size: overlap_size.unwrap_or(defaults.overlap_size),
                reset,
            };
            let outcome = app.ingest.process(&project, &request).await?;
            Ok(report(outcome.signal(), &outcome))
        }

        Command::Push { project, reset } => {
            let outcome = app.ingest.push(&project, reset, cancel).await?;
            Ok(report(outcome.signal(), &outcome))
        }

        Command::CollectionInfo { project } => Ok(match app.ingest.collection_info(&project).await? {
            Some(info) => report(
                ResponseSignal::VectordbCollectionRetrieved,
                json!({ "collection_info": info }),
            ),
            None => report(ResponseSignal::VectordbCollectionNotFound, json!({})),
        }),

        Command::Reset { project } => {
            let deleted = app.ingest.reset_collection(&project).await?;
            let signal = if deleted {
                ResponseSignal::VectordbCollectionReset
            } else {
                ResponseSignal::VectordbCollectionNotFound
            };
            Ok(report(signal, json!({ "deleted": deleted })))
        }

        Command::Search {
            project,
            text,
            limit,
        } => {
            let outcome = app
                .retrieval
                .search(&project, &text, limit.unwrap_or(defaults.limit))
                .await?;
            let signal = outcome.signal();
            Ok(match outcome {
                SearchOutcome::Found(results) => report(signal, json!({ "results": results })),
                SearchOutcome::NoResults(reason) => report(signal, json!({ "reason": reason })),
            })
        }

        Command::Answer {
            project,
            text,
            limit,
            ..
        } => {
            let history = match prepared {
                Prepared::History(history) => history,
                _ => None,
            };
            let outcome = app
                .retrieval
                .answer(&project, &text, limit.unwrap_or(defaults.limit), history)
                .await?;
            let signal = outcome.signal();
            let reason = match &outcome {
                AnswerOutcome::NoAnswer(reason) => Some(*reason),
                AnswerOutcome::Answered(_) => None,
            };
            let (answer, full_prompt, chat_history) = outcome.into_parts();
            Ok(report(
                signal,
                json!({
                    "answer": answer,
                    "full_prompt": full_prompt,
                    "chat_history": chat_history,
                    "reason": reason,
                }),
            ))
        }

        Command::Projects { page, page_size } => {
            let page = app.ingest.list_projects(page, page_size).await?;
            Ok(report(ResponseSignal::ProjectsListed, &page))
        }

        Command::Info => Ok(info_report(&app.settings)),
    }
}

/// `info` needs no services, only settings.
pub fn info_report(settings: &ragline_config::Settings) -> Value {
    json!({
        "app_name": settings.app.name,
        "app_version": settings.app.version,
        "embedding_backend": settings.llm.embedding_backend,
        "generation_backend": settings.llm.generation_backend,
        "vectordb_backend": settings.vectordb.backend,
        "primary_lang": settings.templates.primary_lang,
        "default_lang": settings.templates.default_lang,
    })
}
