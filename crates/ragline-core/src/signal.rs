//! Stable outcome codes reported to users.

use std::fmt;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSignal {
    FileValidatedSuccess,
    FileTypeNotSupported,
    FileSizeExceeded,
    FileUploadSuccess,
    FileUploadFailed,
    ProcessingFailed,
    ProcessingCompleted,
    NoFilesError,
    FileIdError,
    ProjectIdInvalid,
    InsertIntoVectordbError,
    InsertIntoVectordbSuccess,
    EmbeddingError,
    DimensionMismatch,
    OperationCancelled,
    VectordbCollectionRetrieved,
    VectordbCollectionNotFound,
    VectordbCollectionReset,
    VectordbSearchError,
    VectordbSearchSuccess,
    VectordbSearchNoResults,
    TemplateParsingError,
    RagAnswerError,
    RagAnswerSuccess,
    RagNoAnswer,
    ProjectsListed,
}

impl ResponseSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileValidatedSuccess => "file_validate_successfully",
            Self::FileTypeNotSupported => "file_type_not_supported",
            Self::FileSizeExceeded => "file_size_exceeded",
            Self::FileUploadSuccess => "file_upload_success",
            Self::FileUploadFailed => "file_upload_failed",
            Self::ProcessingFailed => "processing_failed",
            Self::ProcessingCompleted => "processing_completed",
            Self::NoFilesError => "not_found_files",
            Self::FileIdError => "no_file_found_with_this_id",
            Self::ProjectIdInvalid => "invalid_project_id",
            Self::InsertIntoVectordbError => "insert_into_vectordb_error",
            Self::InsertIntoVectordbSuccess => "inserted_into_vectordb_successfully",
            Self::EmbeddingError => "embedding_error",
            Self::DimensionMismatch => "embedding_dimension_mismatch",
            Self::OperationCancelled => "operation_cancelled",
            Self::VectordbCollectionRetrieved => "vectordb_collection_retrieved_successfully",
            Self::VectordbCollectionNotFound => "vectordb_collection_not_found",
            Self::VectordbCollectionReset => "vectordb_collection_reset",
            Self::VectordbSearchError => "vectordb_search_error",
            Self::VectordbSearchSuccess => "vectordb_search_successfully",
            Self::VectordbSearchNoResults => "vectordb_search_no_results",
            Self::TemplateParsingError => "template_parsing_error",
            Self::RagAnswerError => "rag_answer_error",
            Self::RagAnswerSuccess => "rag_answer_successfully",
            Self::RagNoAnswer => "rag_no_answer",
            Self::ProjectsListed => "projects_listed",
        }
    }
}

impl fmt::Display for ResponseSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResponseSignal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
