//! Оркестрация генерации
//!
//! Текст режется на фрагменты, референс готовится один раз, фрагменты
//! синтезируются строго по очереди и склеиваются. При ошибке любого фрагмента
//! все промежуточные файлы удаляются.

use std::sync::Arc;

use super::client::SpeechBackend;
use super::models::{GenerationOutput, GenerationRequest};
use crate::config::ClientConfig;
use crate::error::{Result, TtsStitchError};
use crate::media::audio;
use crate::progress::{GenerationStep, ProgressTracker};
use crate::text::chunk_text;
use crate::utils::temp::{remove_if_exists, ScopedFiles};

/// Выполняет одну генерацию от текста до готового файла
pub struct JobOrchestrator {
    backend: Arc<dyn SpeechBackend>,
    config: ClientConfig,
}

impl JobOrchestrator {
    pub fn new(backend: Arc<dyn SpeechBackend>, config: ClientConfig) -> Self {
        Self { backend, config }
    }

    /// Сгенерировать аудио для `request.text`.
    ///
    /// Референс готовится один раз и общий для всех фрагментов. Частичный
    /// результат не возвращается никогда.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        tracker: Option<&ProgressTracker>,
    ) -> Result<GenerationOutput> {
        if let Some(t) = tracker {
            t.set_step(GenerationStep::Preparing);
        }

        let text = request.text.trim();
        if text.is_empty() {
            return Err(TtsStitchError::Configuration(
                "nothing to generate, text is empty".to_string(),
            ));
        }
        let chunks = chunk_text(text, self.config.max_chunk_chars)?;
        log::info!(
            "Generating {} characters in {} chunk(s)",
            text.chars().count(),
            chunks.len()
        );

        if let Some(t) = tracker {
            t.set_step(GenerationStep::UploadingReference);
        }
        let descriptor = self.backend.resolve_reference(request).await?;

        if let Some(t) = tracker {
            t.set_step(GenerationStep::Synthesizing);
        }

        if chunks.len() == 1 {
            let result = self
                .backend
                .synthesize(0, &request.with_text(chunks[0].clone()), &descriptor)
                .await?;
            if let Some(t) = tracker {
                t.complete();
            }
            return Ok(GenerationOutput::Single(result));
        }

        let total = chunks.len();
        let mut produced = ScopedFiles::new();
        let mut transcribed_text = None;

        for (index, chunk) in chunks.into_iter().enumerate() {
            let chunk_request = request.with_text(chunk);
            let result = match self.backend.synthesize(index, &chunk_request, &descriptor).await {
                Ok(result) => result,
                Err(e) => {
                    log::error!(
                        "Chunk {} of {} failed, discarding {} finished chunk(s): {}",
                        index + 1,
                        total,
                        produced.len(),
                        e
                    );
                    return Err(e);
                }
            };
            produced.track(result.path.clone());
            if transcribed_text.is_none() {
                transcribed_text = result.transcribed_text;
            }
            log::info!("Chunk {} of {} done", index + 1, total);
            if let Some(t) = tracker {
                t.report_chunk(index + 1, total);
            }
        }

        if let Some(t) = tracker {
            t.set_step(GenerationStep::Merging);
        }
        let output = self.config.keep_temp_file("f5tts_merged_", ".wav")?;
        // после удачной склейки чанки удаляются сразу, сбой удаления только в журнал
        let merged = match audio::merge_and_remove_sources(produced.paths(), &output) {
            Ok(merged) => {
                produced.release_all();
                merged
            }
            Err(e) => {
                log::error!("Merging {} chunks failed: {}", total, e);
                if let Err(cleanup) = remove_if_exists(&output) {
                    log::warn!("Could not remove {}: {}", output.display(), cleanup);
                }
                return Err(e);
            }
        };

        if let Some(t) = tracker {
            t.complete();
        }
        Ok(GenerationOutput::Merged {
            audio: merged,
            transcribed_text,
        })
    }
}
