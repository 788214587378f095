//! Клиент задач Gradio
//!
//! Отправка задачи `basic_tts`, опрос результата с фиксированным интервалом и
//! скачивание аудио. Если сервер отверг URL референса, референс один раз
//! скачивается, загружается на сервер и задача отправляется заново.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::models::{ChunkResult, FileDescriptor, GenerationRequest, JobHandle, ReferenceAudio};
use super::response::{extract_event_id, parse_poll_response, resolve_audio_url, JobStatus};
use super::upload::ReferenceUploader;
use crate::config::{ClientConfig, ModelVariant};
use crate::error::{Result, TtsStitchError};
use crate::utils::temp::remove_if_exists;

/// Бэкенд, превращающий фрагмент текста в аудиофайл.
///
/// Оркестратор работает только через этот трейт, в тестах вместо HTTP-клиента
/// подставляется заглушка.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Дескриптор референса, общий для всех фрагментов запроса
    async fn resolve_reference(&self, request: &GenerationRequest) -> Result<FileDescriptor>;

    /// Синтезировать `request.text` и скачать результат
    async fn synthesize(
        &self,
        index: usize,
        request: &GenerationRequest,
        descriptor: &FileDescriptor,
    ) -> Result<ChunkResult>;
}

/// Клиент API задач `basic_tts`
#[derive(Debug, Clone)]
pub struct GradioClient {
    http: Client,
    config: ClientConfig,
    api_path: String,
    uploader: ReferenceUploader,
}

impl GradioClient {
    pub fn new(config: ClientConfig, variant: ModelVariant) -> Result<Self> {
        let http = Client::builder().build()?;
        Ok(Self::with_http(http, config, variant))
    }

    /// Клиент поверх уже созданного `reqwest::Client`
    pub fn with_http(http: Client, config: ClientConfig, variant: ModelVariant) -> Self {
        let uploader = ReferenceUploader::new(http.clone(), config.clone());
        Self {
            http,
            config,
            api_path: variant.api_path().to_string(),
            uploader,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn call_url(&self, server: &str) -> String {
        format!("{}{}", server, self.api_path)
    }

    /// Отправить задачу и вернуть её дескриптор
    pub async fn submit(
        &self,
        request: &GenerationRequest,
        descriptor: &FileDescriptor,
    ) -> Result<JobHandle> {
        let url = self.call_url(&request.server);
        let payload = build_payload(descriptor, request);
        log::debug!("Submitting job to {}: {}", url, preview(&payload.to_string()));

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .timeout(Duration::from_secs(self.config.submit_timeout_secs))
            .send()
            .await
            .map_err(|e| TtsStitchError::JobSubmission(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            log::error!("Job submission rejected with {}: {}", status, body);
            return Err(TtsStitchError::JobSubmission(format!(
                "server returned {}: {}",
                status, body
            )));
        }

        let event_id = extract_event_id(&body).ok_or_else(|| {
            log::error!("No event id in submission response: {}", body);
            TtsStitchError::JobSubmission(format!("no event id in response: {}", body))
        })?;
        log::info!("Job submitted, event id {}", event_id);

        Ok(JobHandle::new(event_id, self.config.poll_window()))
    }

    /// Опрашивать задачу до результата, ошибки или конца попыток.
    ///
    /// Возвращает абсолютный URL аудио и распознанный текст референса.
    pub async fn await_job(
        &self,
        server: &str,
        handle: &JobHandle,
    ) -> Result<(String, Option<String>)> {
        let url = format!("{}/{}", self.call_url(server), handle.event_id);

        let mut attempts = 0;
        for attempt in 1..=self.config.max_poll_attempts {
            if handle.is_expired() {
                log::warn!("Job {} passed its polling deadline", handle.event_id);
                break;
            }
            attempts = attempt;
            match self.poll_once(&url).await {
                Ok(JobStatus::Completed {
                    audio_ref,
                    transcribed_text,
                }) => {
                    log::info!(
                        "Job {} completed after {} polls ({:.1}s)",
                        handle.event_id,
                        attempt,
                        handle.submitted_at.elapsed().as_secs_f32()
                    );
                    return Ok((resolve_audio_url(server, &audio_ref), transcribed_text));
                }
                Ok(JobStatus::Failed { message }) => {
                    log::error!("Job {} failed: {}", handle.event_id, message);
                    return Err(TtsStitchError::JobFailed(message));
                }
                Ok(JobStatus::Pending) => {
                    log::debug!("Job {} pending (poll {})", handle.event_id, attempt);
                }
                Err(e) => {
                    log::warn!("Poll {} for job {} failed: {}", attempt, handle.event_id, e);
                }
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }

        log::error!("Job {} gave no result within {} polls", handle.event_id, attempts);
        Err(TtsStitchError::JobTimeout {
            event_id: handle.event_id.clone(),
            attempts,
        })
    }

    async fn poll_once(&self, url: &str) -> Result<JobStatus> {
        let body = self
            .http
            .get(url)
            .timeout(Duration::from_secs(self.config.poll_timeout_secs))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        log::debug!("Poll response: {}", preview(&body));
        Ok(parse_poll_response(&body))
    }

    /// Скачать аудио во временный файл, который переживает вызов
    pub async fn download(&self, url: &str) -> Result<PathBuf> {
        let response = self
            .http
            .get(url)
            .timeout(Duration::from_secs(self.config.download_timeout_secs))
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;

        let path = self.config.keep_temp_file("f5tts_chunk_", ".wav")?;
        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            let _ = remove_if_exists(&path);
            return Err(e.into());
        }
        log::debug!("Downloaded {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Отправить, дождаться и скачать один фрагмент
    pub async fn submit_and_await(
        &self,
        index: usize,
        request: &GenerationRequest,
        descriptor: &FileDescriptor,
    ) -> Result<ChunkResult> {
        let handle = self.submit(request, descriptor).await?;
        let (audio_url, transcribed_text) = self.await_job(&request.server, &handle).await?;
        let path = self.download(&audio_url).await?;
        Ok(ChunkResult {
            index,
            path,
            transcribed_text,
        })
    }

    /// Скачать удалённый референс, загрузить его на сервер и повторить один раз
    async fn retry_with_uploaded_reference(
        &self,
        index: usize,
        request: &GenerationRequest,
        reference_url: &str,
    ) -> Result<ChunkResult> {
        log::info!("Retrying with locally uploaded copy of {}", reference_url);

        let bytes = self
            .http
            .get(reference_url)
            .timeout(Duration::from_secs(self.config.upload_timeout_secs))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let suffix = reference_extension(reference_url);
        let mut builder = tempfile::Builder::new();
        builder.prefix("tts_ref_").suffix(&suffix);
        let local = match &self.config.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        tokio::fs::write(local.path(), &bytes).await?;

        let descriptor = self.uploader.upload(&request.server, local.path()).await?;
        self.submit_and_await(index, request, &descriptor).await
    }
}

#[async_trait]
impl SpeechBackend for GradioClient {
    async fn resolve_reference(&self, request: &GenerationRequest) -> Result<FileDescriptor> {
        self.uploader.resolve(&request.server, &request.reference).await
    }

    async fn synthesize(
        &self,
        index: usize,
        request: &GenerationRequest,
        descriptor: &FileDescriptor,
    ) -> Result<ChunkResult> {
        match self.submit_and_await(index, request, descriptor).await {
            Err(TtsStitchError::JobFailed(message)) => {
                // сервер мог не принять URL референса, пробуем один раз с загрузкой
                let ReferenceAudio::Remote(url) = &request.reference else {
                    return Err(TtsStitchError::JobFailed(message));
                };
                match self.retry_with_uploaded_reference(index, request, url).await {
                    Ok(result) => Ok(result),
                    Err(e) => {
                        log::error!("Retry with uploaded reference failed: {}", e);
                        Err(TtsStitchError::JobFailed(message))
                    }
                }
            }
            other => other,
        }
    }
}

/// Тело запроса с девятью позиционными аргументами `basic_tts`
pub fn build_payload(descriptor: &FileDescriptor, request: &GenerationRequest) -> Value {
    let params = request.params.normalized();
    json!({
        "data": [
            descriptor,
            request.reference_text.clone().unwrap_or_default(),
            request.text,
            params.remove_silences,
            params.randomize_seed,
            params.seed,
            params.crossfade,
            params.nfe_steps,
            params.speed,
        ]
    })
}

/// Первые 200 символов тела ответа для журнала
fn preview(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

fn reference_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or("");
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => ".mp3".to_string(),
    }
}
