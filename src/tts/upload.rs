//! Подготовка референсного аудио
//!
//! URL передаётся серверу как есть, локальный файл загружается через
//! `/gradio_api/upload`.

use std::path::Path;
use std::time::Duration;

use rand::Rng;
use reqwest::{multipart, Client};

use super::models::{FileDescriptor, FileMeta, ReferenceAudio};
use super::response::{file_url, parse_upload_response};
use crate::config::ClientConfig;
use crate::error::{Result, TtsStitchError};

const UPLOAD_PATH: &str = "/gradio_api/upload";
const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const TOKEN_LEN: usize = 11;

/// Превращает референс из настроек в дескриптор файла для сервера
#[derive(Debug, Clone)]
pub struct ReferenceUploader {
    http: Client,
    config: ClientConfig,
}

impl ReferenceUploader {
    pub fn new(http: Client, config: ClientConfig) -> Self {
        Self { http, config }
    }

    /// Дескриптор для референса.
    ///
    /// URL передаётся как есть, локальный файл загружается в кэш сервера,
    /// без референса используется встроенный пример.
    pub async fn resolve(&self, server: &str, reference: &ReferenceAudio) -> Result<FileDescriptor> {
        match reference {
            ReferenceAudio::Remote(url) => {
                log::debug!("Using remote reference audio {}", url);
                Ok(FileDescriptor::remote(url.clone()))
            }
            ReferenceAudio::Local(path) => self.upload(server, path).await,
            ReferenceAudio::None => {
                log::info!(
                    "No reference audio configured, using sample {}",
                    self.config.fallback_sample_url
                );
                Ok(FileDescriptor::remote(self.config.fallback_sample_url.clone()))
            }
        }
    }

    /// Загрузить локальный файл multipart-запросом
    pub async fn upload(&self, server: &str, path: &Path) -> Result<FileDescriptor> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            TtsStitchError::Upload(format!("cannot read {}: {}", path.display(), e))
        })?;
        let size = bytes.len() as u64;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "reference.wav".to_string());
        let mime = mime_for(path);

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str(mime)?;
        let form = multipart::Form::new().part("files", part);

        let url = format!("{}{}?upload_id={}", server, UPLOAD_PATH, upload_token());
        log::info!("Uploading reference audio {} ({} bytes)", path.display(), size);

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .timeout(Duration::from_secs(self.config.upload_timeout_secs))
            .send()
            .await
            .map_err(|e| TtsStitchError::Upload(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            log::error!("Upload rejected with {}: {}", status, body);
            return Err(TtsStitchError::Upload(format!(
                "server returned {}: {}",
                status, body
            )));
        }

        let remote_path = parse_upload_response(&body).ok_or_else(|| {
            log::error!("Unrecognized upload response: {}", body);
            TtsStitchError::Upload(format!("unrecognized upload response: {}", body))
        })?;
        log::debug!("Reference stored on server as {}", remote_path);

        let lower = remote_path.to_ascii_lowercase();
        let url = if lower.starts_with("http://") || lower.starts_with("https://") {
            remote_path.clone()
        } else {
            file_url(server, &remote_path)
        };

        Ok(FileDescriptor {
            path: remote_path,
            url: Some(url),
            orig_name: Some(file_name),
            size: Some(size),
            mime_type: Some(mime.to_string()),
            meta: FileMeta::default(),
        })
    }
}

/// Случайный `upload_id` из 11 строчных букв и цифр
pub fn upload_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// MIME-тип по расширению, по умолчанию WAV
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        _ => "audio/wav",
    }
}
