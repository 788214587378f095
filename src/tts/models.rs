//! Модели данных TTS

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::{ModelSettings, SynthesisParams};

/// Источник референсного аудио (образца голоса)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceAudio {
    /// Локальный файл, перед использованием загружается на сервер
    Local(PathBuf),
    /// URL http(s), передаётся серверу напрямую
    Remote(String),
    /// Ничего не задано, используется встроенный пример
    None,
}

impl ReferenceAudio {
    /// Разобрать значение поля настроек
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return ReferenceAudio::None;
        }
        let lower = input.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return ReferenceAudio::Remote(input.to_string());
        }
        let path = Path::new(input);
        if path.is_file() {
            ReferenceAudio::Local(path.to_path_buf())
        } else {
            ReferenceAudio::None
        }
    }
}

/// Маркер `FileData` для Gradio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    #[serde(rename = "_type")]
    pub kind: String,
}

impl Default for FileMeta {
    fn default() -> Self {
        Self {
            kind: "gradio.FileData".to_string(),
        }
    }
}

/// Ссылка на файл в первом позиционном аргументе.
///
/// Некоторые сборки сервера чувствительны к порядку полей:
/// `path, url, orig_name, size, mime_type, meta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orig_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub meta: FileMeta,
}

impl FileDescriptor {
    /// Дескриптор, указывающий серверу URL без загрузки
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            path: url.into(),
            url: None,
            orig_name: None,
            size: None,
            mime_type: None,
            meta: FileMeta::default(),
        }
    }
}

/// Запрос на генерацию, после отправки не меняется
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub server: String,
    pub reference: ReferenceAudio,
    pub reference_text: Option<String>,
    pub text: String,
    pub params: SynthesisParams,
}

impl GenerationRequest {
    pub fn new(
        server: impl Into<String>,
        reference: ReferenceAudio,
        reference_text: Option<String>,
        text: impl Into<String>,
        params: SynthesisParams,
    ) -> Self {
        let reference_text = reference_text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Self {
            server: server.into().trim().trim_end_matches('/').to_string(),
            reference,
            reference_text,
            text: text.into(),
            params,
        }
    }

    /// Запрос из сохранённых настроек модели
    pub fn from_settings(settings: &ModelSettings, text: impl Into<String>) -> Self {
        Self::new(
            settings.server.clone(),
            ReferenceAudio::parse(&settings.ref_audio),
            Some(settings.ref_text.clone()),
            text,
            settings.params(),
        )
    }

    /// Тот же запрос с другим текстом (один фрагмент)
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..self.clone()
        }
    }
}

/// Отправленная задача
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub event_id: String,
    pub submitted_at: Instant,
    /// После этого момента задача больше не опрашивается
    pub deadline: Instant,
}

impl JobHandle {
    pub fn new(event_id: impl Into<String>, poll_window: Duration) -> Self {
        let submitted_at = Instant::now();
        Self {
            event_id: event_id.into(),
            submitted_at,
            deadline: submitted_at + poll_window,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Аудио одного фрагмента во временном файле
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkResult {
    pub index: usize,
    pub path: PathBuf,
    /// Текст референса, распознанный сервером, если он не был задан
    pub transcribed_text: Option<String>,
}

/// Результат склейки нескольких фрагментов
#[derive(Debug, Clone, PartialEq)]
pub struct MergedAudio {
    pub path: PathBuf,
    pub duration: Duration,
    pub chunk_count: usize,
}

/// Результат одной генерации
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutput {
    Single(ChunkResult),
    Merged {
        audio: MergedAudio,
        transcribed_text: Option<String>,
    },
}

impl GenerationOutput {
    pub fn path(&self) -> &Path {
        match self {
            GenerationOutput::Single(chunk) => &chunk.path,
            GenerationOutput::Merged { audio, .. } => &audio.path,
        }
    }

    pub fn transcribed_text(&self) -> Option<&str> {
        match self {
            GenerationOutput::Single(chunk) => chunk.transcribed_text.as_deref(),
            GenerationOutput::Merged {
                transcribed_text, ..
            } => transcribed_text.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_parsing() {
        assert_eq!(ReferenceAudio::parse("  "), ReferenceAudio::None);
        assert_eq!(
            ReferenceAudio::parse("HTTPS://host/a.wav"),
            ReferenceAudio::Remote("HTTPS://host/a.wav".to_string())
        );
        assert_eq!(
            ReferenceAudio::parse("/definitely/not/here.wav"),
            ReferenceAudio::None
        );

        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(
            ReferenceAudio::parse(file.path().to_str().unwrap()),
            ReferenceAudio::Local(file.path().to_path_buf())
        );
    }

    #[test]
    fn test_job_handle_deadline() {
        let open = JobHandle::new("a", Duration::from_secs(60));
        assert!(!open.is_expired());
        assert_eq!(open.deadline - open.submitted_at, Duration::from_secs(60));

        let expired = JobHandle::new("b", Duration::ZERO);
        assert!(expired.is_expired());
    }

    #[test]
    fn test_descriptor_serialization_order() {
        let descriptor = FileDescriptor {
            path: "/tmp/gradio/ref.wav".to_string(),
            url: Some("http://h/gradio_api/file=/tmp/gradio/ref.wav".to_string()),
            orig_name: Some("ref.wav".to_string()),
            size: Some(10),
            mime_type: Some("audio/wav".to_string()),
            meta: FileMeta::default(),
        };
        let json = serde_json::to_string(&descriptor).unwrap();
        assert_eq!(
            json,
            r#"{"path":"/tmp/gradio/ref.wav","url":"http://h/gradio_api/file=/tmp/gradio/ref.wav","orig_name":"ref.wav","size":10,"mime_type":"audio/wav","meta":{"_type":"gradio.FileData"}}"#
        );

        let remote = serde_json::to_value(FileDescriptor::remote("https://x/y.wav")).unwrap();
        assert_eq!(
            remote,
            serde_json::json!({"path": "https://x/y.wav", "meta": {"_type": "gradio.FileData"}})
        );
    }

    #[test]
    fn test_request_normalizes_server_and_reference_text() {
        let request = GenerationRequest::new(
            "http://127.0.0.1:7860/ ",
            ReferenceAudio::None,
            Some("   ".to_string()),
            "hi",
            SynthesisParams::default(),
        );
        assert_eq!(request.server, "http://127.0.0.1:7860");
        assert_eq!(request.reference_text, None);
    }
}
