//! Модуль обработки ошибок библиотеки tts-stitch
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть при работе библиотеки.

use thiserror::Error;

/// Ошибки библиотеки tts-stitch
#[derive(Debug, Error)]
pub enum TtsStitchError {
    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Не удалось загрузить референсное аудио в кэш сервера
    #[error("Reference upload failed: {0}")]
    Upload(String),

    /// Сервер не вернул идентификатор задачи
    #[error("Job submission failed: {0}")]
    JobSubmission(String),

    /// Задача не завершилась за отведённое число опросов
    #[error("Job {event_id} did not finish after {attempts} polls")]
    JobTimeout {
        event_id: String,
        attempts: u32,
    },

    /// Сервер сообщил об ошибке (`event: error`)
    #[error("Job failed on the server: {0}")]
    JobFailed(String),

    /// Ошибка склейки аудио
    #[error("Audio merge error: {0}")]
    Merge(String),

    /// Ошибка разбиения текста
    #[error("Text chunking error: {0}")]
    Chunking(String),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Генерация для этой модели уже выполняется
    #[error("Generation already running for {0}")]
    Busy(String),

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(String),
}

impl TtsStitchError {
    /// Короткое сообщение для строки статуса
    pub fn status_line(&self) -> String {
        match self {
            Self::Upload(_) => "Reference upload failed".to_string(),
            Self::JobSubmission(_) => "Server did not accept the request".to_string(),
            Self::JobTimeout { .. } => "Timed out waiting for audio".to_string(),
            Self::JobFailed(_) => "Server reported an error".to_string(),
            Self::Merge(_) => "Failed to merge audio".to_string(),
            Self::Busy(_) => "Generation already running".to_string(),
            other => format!("Error: {}", other),
        }
    }
}

impl From<&str> for TtsStitchError {
    fn from(s: &str) -> Self {
        TtsStitchError::Other(s.to_string())
    }
}

impl From<String> for TtsStitchError {
    fn from(s: String) -> Self {
        TtsStitchError::Other(s)
    }
}

impl From<hound::Error> for TtsStitchError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => TtsStitchError::Io(io),
            other => TtsStitchError::Merge(other.to_string()),
        }
    }
}

/// Тип Result для библиотеки tts-stitch
pub type Result<T> = std::result::Result<T, TtsStitchError>;
