//! Основной файл библиотеки tts-stitch
//!
//! Библиотека озвучивает текст произвольной длины через Gradio API F5-TTS:
//! режет текст на фрагменты, отправляет их на сервер по одному, опрашивает
//! результат и склеивает фрагменты в один WAV-файл.

pub mod config;
pub mod error;
pub mod media;
pub mod notification;
pub mod progress;
pub mod session;
pub mod settings;
pub mod text;
pub mod tts;
pub mod utils;

use std::sync::Arc;

pub use crate::config::{ClientConfig, ModelSettings, ModelVariant, SynthesisParams};
pub use crate::error::{Result, TtsStitchError};
pub use crate::session::{Session, SessionEvent};
pub use crate::tts::{GenerationOutput, GenerationRequest, ReferenceAudio};

use crate::progress::{ProgressObserver, ProgressReporter, ProgressTracker};
use crate::tts::{GradioClient, JobOrchestrator};

/// Основная структура для работы с библиотекой
pub struct TtsStitch {
    config: ClientConfig,
    variant: ModelVariant,
    progress_tracker: Option<ProgressTracker>,
}

impl TtsStitch {
    pub fn new(config: ClientConfig, variant: ModelVariant) -> Self {
        Self {
            config,
            variant,
            progress_tracker: None,
        }
    }

    /// Экземпляр с репортером прогресса
    pub fn with_progress_reporter(
        config: ClientConfig,
        variant: ModelVariant,
        reporter: Box<dyn ProgressReporter>,
    ) -> Self {
        Self {
            config,
            variant,
            progress_tracker: Some(ProgressTracker::with_reporter(reporter)),
        }
    }

    /// Добавить наблюдателя прогресса
    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> Option<usize> {
        match &mut self.progress_tracker {
            Some(tracker) => tracker.add_observer(observer),
            None => {
                self.progress_tracker = Some(ProgressTracker::with_observer(observer));
                Some(0)
            }
        }
    }

    /// Сгенерировать аудио для запроса
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        log::info!("Starting {} generation against {}", self.variant, request.server);
        let client = GradioClient::new(self.config.clone(), self.variant)?;
        let orchestrator = JobOrchestrator::new(Arc::new(client), self.config.clone());

        let output = orchestrator
            .generate(request, self.progress_tracker.as_ref())
            .await
            .map_err(|e| {
                log::error!("Generation failed: {}", e);
                e
            })?;

        log::info!("Generation finished: {}", output.path().display());
        Ok(output)
    }
}

/// Публичный API для удобного использования
pub async fn generate_speech(
    settings: &ModelSettings,
    variant: ModelVariant,
    text: &str,
) -> Result<GenerationOutput> {
    let request = GenerationRequest::from_settings(settings, text);
    TtsStitch::new(ClientConfig::default(), variant)
        .generate(&request)
        .await
}
