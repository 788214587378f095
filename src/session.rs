//! Сессия генерации для интерфейса
//!
//! Каждая генерация выполняется в отдельной задаче tokio. Задача ничего не
//! меняет напрямую: она отправляет [`SessionEvent`] в канал, а поток
//! интерфейса применяет их через [`Session::drain`] или [`Session::next_event`].
//! Для одного варианта модели одновременно выполняется не больше одной
//! генерации; разные варианты независимы.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{random_seed, ClientConfig, ModelSettings, ModelVariant};
use crate::error::{Result, TtsStitchError};
use crate::notification::ChannelProgressObserver;
use crate::progress::ProgressTracker;
use crate::settings::{load_model_settings, save_model_settings, SettingsStore};
use crate::tts::client::{GradioClient, SpeechBackend};
use crate::tts::models::{GenerationOutput, GenerationRequest};
use crate::tts::orchestrator::JobOrchestrator;
use crate::utils::naming;
use crate::utils::temp::remove_if_exists;

/// Сообщение от рабочей задачи к интерфейсу
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Новый текст строки статуса
    Status { variant: ModelVariant, text: String },
    /// Строка для журнала
    Log { variant: ModelVariant, message: String },
    /// Генерация завершилась, аудио готово
    Completed {
        variant: ModelVariant,
        output: GenerationOutput,
    },
    /// Генерация завершилась ошибкой
    Failed {
        variant: ModelVariant,
        status: String,
        detail: String,
    },
}

/// Фабрика бэкенда синтеза для варианта модели
pub type BackendFactory =
    Box<dyn Fn(ModelVariant, &ClientConfig) -> Result<Arc<dyn SpeechBackend>> + Send + Sync>;

/// Состояние интерфейса: настройки, занятость вариантов и последние результаты
pub struct Session<S: SettingsStore> {
    store: S,
    config: ClientConfig,
    settings: HashMap<ModelVariant, ModelSettings>,
    busy: HashSet<ModelVariant>,
    last_output: HashMap<ModelVariant, PathBuf>,
    status: HashMap<ModelVariant, String>,
    log_lines: Vec<String>,
    backend_factory: BackendFactory,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl<S: SettingsStore> Session<S> {
    /// Сессия, работающая с сервером Gradio
    pub fn new(store: S, config: ClientConfig) -> Self {
        Self::with_backend(
            store,
            config,
            Box::new(|variant: ModelVariant, config: &ClientConfig| {
                let client = GradioClient::new(config.clone(), variant)?;
                Ok(Arc::new(client) as Arc<dyn SpeechBackend>)
            }),
        )
    }

    pub fn with_backend(store: S, config: ClientConfig, backend_factory: BackendFactory) -> Self {
        let settings = load_model_settings(&store);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            store,
            config,
            settings,
            busy: HashSet::new(),
            last_output: HashMap::new(),
            status: HashMap::new(),
            log_lines: Vec::new(),
            backend_factory,
            events_tx,
            events_rx,
        }
    }

    pub fn settings(&self, variant: ModelVariant) -> &ModelSettings {
        &self.settings[&variant]
    }

    pub fn settings_mut(&mut self, variant: ModelVariant) -> &mut ModelSettings {
        self.settings.entry(variant).or_default()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Сохранить настройки всех вариантов
    pub fn persist(&mut self) -> Result<()> {
        save_model_settings(&mut self.store, &self.settings)
    }

    pub fn is_busy(&self, variant: ModelVariant) -> bool {
        self.busy.contains(&variant)
    }

    pub fn status(&self, variant: ModelVariant) -> Option<&str> {
        self.status.get(&variant).map(String::as_str)
    }

    pub fn log_lines(&self) -> &[String] {
        &self.log_lines
    }

    /// Путь к последнему результату варианта
    pub fn last_output(&self, variant: ModelVariant) -> Option<&Path> {
        self.last_output.get(&variant).map(PathBuf::as_path)
    }

    /// Запустить генерацию текста из настроек варианта.
    ///
    /// Должна вызываться внутри рантайма tokio. Возвращает дескриптор
    /// рабочей задачи; результат приходит событием в канал.
    pub fn start(&mut self, variant: ModelVariant) -> Result<JoinHandle<()>> {
        if self.busy.contains(&variant) {
            return Err(TtsStitchError::Busy(variant.to_string()));
        }

        let text = self.settings(variant).gen_text.trim().to_string();
        if text.is_empty() {
            let error = TtsStitchError::Configuration("enter some text to generate".to_string());
            self.report_failure(variant, &error);
            return Err(error);
        }

        if self.settings(variant).randomize_seed {
            self.settings_mut(variant).seed = random_seed();
            if let Err(e) = self.persist() {
                log::warn!("Failed to persist new seed: {}", e);
            }
        }

        let backend = match (self.backend_factory)(variant, &self.config) {
            Ok(backend) => backend,
            Err(e) => {
                self.report_failure(variant, &e);
                return Err(e);
            }
        };
        let orchestrator = JobOrchestrator::new(backend, self.config.clone());
        let request = GenerationRequest::from_settings(self.settings(variant), text);

        self.busy.insert(variant);
        self.status.insert(variant, "Generating...".to_string());
        self.push_log(
            variant,
            &format!(
                "Generating {} characters (seed {})",
                request.text.chars().count(),
                request.params.seed
            ),
        );

        let tx = self.events_tx.clone();
        Ok(tokio::spawn(async move {
            let status_tx = tx.clone();
            let tracker = ProgressTracker::with_observer(Box::new(
                ChannelProgressObserver::with_mapper(status_tx, move |progress| {
                    SessionEvent::Status {
                        variant,
                        text: progress.status_text(),
                    }
                }),
            ));

            let started = Instant::now();
            let event = match orchestrator.generate(&request, Some(&tracker)).await {
                Ok(output) => {
                    let _ = tx.send(SessionEvent::Log {
                        variant,
                        message: format!("Finished in {:.1}s", started.elapsed().as_secs_f32()),
                    });
                    SessionEvent::Completed { variant, output }
                }
                Err(e) => SessionEvent::Failed {
                    variant,
                    status: e.status_line(),
                    detail: e.to_string(),
                },
            };
            if tx.send(event).is_err() {
                log::warn!("Session closed before {} generation finished", variant);
            }
        }))
    }

    /// Применить все накопившиеся события, возвращает их количество
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(&event);
            applied += 1;
        }
        applied
    }

    /// Дождаться следующего события и применить его
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let event = self.events_rx.recv().await?;
        self.apply(&event);
        Some(event)
    }

    fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Status { variant, text } => {
                self.status.insert(*variant, text.clone());
            }
            SessionEvent::Log { variant, message } => self.push_log(*variant, message),
            SessionEvent::Completed { variant, output } => self.complete(*variant, output),
            SessionEvent::Failed {
                variant,
                status,
                detail,
            } => {
                self.busy.remove(variant);
                self.status.insert(*variant, status.clone());
                log::error!("{} generation failed: {}", variant, detail);
                self.push_log(*variant, &format!("Generation failed: {}", detail));
            }
        }
    }

    fn complete(&mut self, variant: ModelVariant, output: &GenerationOutput) {
        self.busy.remove(&variant);
        let path = output.path().to_path_buf();

        if let Some(previous) = self.last_output.insert(variant, path.clone()) {
            if previous != path {
                if let Err(e) = remove_if_exists(&previous) {
                    log::warn!("Could not remove previous output {}: {}", previous.display(), e);
                }
            }
        }
        self.push_log(variant, &format!("Audio ready: {}", path.display()));
        self.status.insert(variant, "Done".to_string());

        if let Some(text) = output.transcribed_text() {
            if self.settings(variant).ref_text != text {
                self.settings_mut(variant).ref_text = text.to_string();
                self.push_log(variant, &format!("Reference text recognized: {}", text));
                if let Err(e) = self.persist() {
                    log::warn!("Failed to persist recognized reference text: {}", e);
                }
            }
        }

        if let Some(dir) = self.settings(variant).auto_save_dir() {
            match naming::auto_save(&path, &dir, Local::now().date_naive()) {
                Ok(saved) => {
                    self.status.insert(variant, format!("Saved to {}", saved.display()));
                    self.push_log(variant, &format!("Auto-saved to {}", saved.display()));
                }
                Err(e) => {
                    self.status.insert(variant, "Auto-save failed".to_string());
                    self.push_log(variant, &format!("Auto-save failed: {}", e));
                }
            }
        }
    }

    /// Скопировать последний результат варианта в `dest`
    pub fn save_output(&mut self, variant: ModelVariant, dest: &Path) -> Result<PathBuf> {
        let source = self
            .last_output
            .get(&variant)
            .cloned()
            .ok_or_else(|| TtsStitchError::Other(format!("no {} audio generated yet", variant)))?;
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::copy(&source, dest)?;
        self.push_log(variant, &format!("Saved to {}", dest.display()));
        Ok(dest.to_path_buf())
    }

    fn report_failure(&mut self, variant: ModelVariant, error: &TtsStitchError) {
        self.status.insert(variant, error.status_line());
        log::error!("{} generation failed: {}", variant, error);
        self.push_log(variant, &format!("Generation failed: {}", error));
    }

    fn push_log(&mut self, variant: ModelVariant, message: &str) {
        log::info!("[{}] {}", variant, message);
        self.log_lines.push(format!("[{}] {}", variant, message));
    }
}
