//! Модуль для отслеживания прогресса генерации
//!
//! Реализация паттерна Observer: трекер хранит текущий этап и прогресс,
//! репортер рассылает обновления наблюдателям (консоль, память, канал сессии).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Информация о прогрессе выполнения операции
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Текущий этап операции
    pub step: String,
    /// Процент выполнения текущего этапа (0.0 - 100.0)
    pub step_progress: f32,
    /// Общий процент выполнения всей операции (0.0 - 100.0)
    pub total_progress: f32,
    /// Дополнительная информация о текущем этапе
    pub details: Option<String>,
}

impl ProgressInfo {
    pub fn new(
        step: impl Into<String>,
        step_progress: f32,
        total_progress: f32,
        details: Option<String>,
    ) -> Self {
        Self {
            step: step.into(),
            step_progress: step_progress.clamp(0.0, 100.0),
            total_progress: total_progress.clamp(0.0, 100.0),
            details,
        }
    }

    /// Строка для строки статуса: детали, если есть, иначе название этапа
    pub fn status_text(&self) -> String {
        self.details.clone().unwrap_or_else(|| self.step.clone())
    }
}

/// Трейт для наблюдателя, получающего уведомления о прогрессе
pub trait ProgressObserver: Send + Sync {
    fn on_progress_update(&self, progress: ProgressInfo);
}

/// Трейт для объекта, отправляющего уведомления о прогрессе
pub trait ProgressReporter: Send + Sync {
    /// Добавить наблюдателя, возвращает его идентификатор
    fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize;

    /// Удалить наблюдателя по идентификатору
    fn remove_observer(&mut self, id: usize) -> Option<Box<dyn ProgressObserver>>;

    /// Уведомить всех наблюдателей о прогрессе
    fn notify_progress(&self, progress: ProgressInfo);
}

/// Репортер, синхронно вызывающий наблюдателей
#[derive(Default)]
pub struct DefaultProgressReporter {
    observers: RwLock<HashMap<usize, Box<dyn ProgressObserver>>>,
    next_id: AtomicUsize,
}

impl DefaultProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressReporter for DefaultProgressReporter {
    fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.observers.write().insert(id, observer);
        id
    }

    fn remove_observer(&mut self, id: usize) -> Option<Box<dyn ProgressObserver>> {
        self.observers.write().remove(&id)
    }

    fn notify_progress(&self, progress: ProgressInfo) {
        for observer in self.observers.read().values() {
            observer.on_progress_update(progress.clone());
        }
    }
}

/// Этапы одной генерации
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationStep {
    /// Проверка входных данных и разбиение текста
    Preparing,
    /// Загрузка референсного аудио
    UploadingReference,
    /// Синтез фрагментов
    Synthesizing,
    /// Склейка фрагментов
    Merging,
}

impl GenerationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparing => "Preparing text",
            Self::UploadingReference => "Preparing reference audio",
            Self::Synthesizing => "Generating speech",
            Self::Merging => "Merging audio",
        }
    }

    /// Вес этапа в процентах от всей генерации
    pub fn weight(&self) -> f32 {
        match self {
            Self::Preparing => 5.0,
            Self::UploadingReference => 5.0,
            Self::Synthesizing => 80.0,
            Self::Merging => 10.0,
        }
    }
}

struct TrackerState {
    step: GenerationStep,
    step_progress: f32,
    total_progress: f32,
    completed: HashMap<GenerationStep, f32>,
}

/// Трекер прогресса одной генерации
pub struct ProgressTracker {
    reporter: Option<Box<dyn ProgressReporter>>,
    state: RwLock<TrackerState>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            reporter: None,
            state: RwLock::new(TrackerState {
                step: GenerationStep::Preparing,
                step_progress: 0.0,
                total_progress: 0.0,
                completed: HashMap::new(),
            }),
        }
    }

    pub fn with_reporter(reporter: Box<dyn ProgressReporter>) -> Self {
        let mut tracker = Self::new();
        tracker.reporter = Some(reporter);
        tracker
    }

    /// Трекер с одним наблюдателем
    pub fn with_observer(observer: Box<dyn ProgressObserver>) -> Self {
        let mut reporter = DefaultProgressReporter::new();
        reporter.add_observer(observer);
        Self::with_reporter(Box::new(reporter))
    }

    pub fn set_reporter(&mut self, reporter: Box<dyn ProgressReporter>) {
        self.reporter = Some(reporter);
    }

    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> Option<usize> {
        self.reporter
            .as_mut()
            .map(|reporter| reporter.add_observer(observer))
    }

    /// Перейти к этапу; предыдущий этап считается завершённым
    pub fn set_step(&self, step: GenerationStep) {
        {
            let mut state = self.state.write();
            if state.step == step {
                return;
            }
            let previous = state.step;
            state.completed.insert(previous, 100.0);
            state.step = step;
            state.step_progress = 0.0;
            Self::recalculate(&mut state);
        }
        self.report(None);
    }

    /// Обновить прогресс текущего этапа
    pub fn update_step_progress(&self, progress: f32, details: Option<String>) {
        {
            let mut state = self.state.write();
            state.step_progress = progress.clamp(0.0, 100.0);
            Self::recalculate(&mut state);
        }
        self.report(details);
    }

    /// Фрагмент `done` из `total` готов
    pub fn report_chunk(&self, done: usize, total: usize) {
        let progress = if total == 0 {
            100.0
        } else {
            done as f32 / total as f32 * 100.0
        };
        self.update_step_progress(progress, Some(format!("chunk {} of {}", done, total)));
    }

    /// Текущий общий прогресс
    pub fn total_progress(&self) -> f32 {
        self.state.read().total_progress
    }

    fn recalculate(state: &mut TrackerState) {
        // веса этапов в сумме дают 100
        let done: f32 = state
            .completed
            .iter()
            .filter(|(step, _)| **step != state.step)
            .map(|(step, progress)| step.weight() * progress / 100.0)
            .sum();
        let current = state.step.weight() * state.step_progress / 100.0;
        state.total_progress = (done + current).clamp(0.0, 100.0);
    }

    fn report(&self, details: Option<String>) {
        if let Some(reporter) = &self.reporter {
            let progress = {
                let state = self.state.read();
                ProgressInfo::new(
                    state.step.as_str(),
                    state.step_progress,
                    state.total_progress,
                    details,
                )
            };
            reporter.notify_progress(progress);
        }
    }

    /// Отметить завершение генерации
    pub fn complete(&self) {
        {
            let mut state = self.state.write();
            let step = state.step;
            state.completed.insert(step, 100.0);
            state.step_progress = 100.0;
            state.total_progress = 100.0;
        }
        self.report(Some("Done".to_string()));
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct TestObserver {
        updates: Arc<Mutex<Vec<ProgressInfo>>>,
    }

    impl ProgressObserver for TestObserver {
        fn on_progress_update(&self, progress: ProgressInfo) {
            self.updates.lock().push(progress);
        }
    }

    fn tracker() -> (ProgressTracker, Arc<Mutex<Vec<ProgressInfo>>>) {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let tracker = ProgressTracker::with_observer(Box::new(TestObserver {
            updates: updates.clone(),
        }));
        (tracker, updates)
    }

    #[test]
    fn test_progress_tracker() {
        let (tracker, updates) = tracker();

        tracker.update_step_progress(50.0, None);
        tracker.set_step(GenerationStep::Synthesizing);
        tracker.set_step(GenerationStep::Synthesizing);
        tracker.report_chunk(1, 4);
        tracker.complete();

        let updates = updates.lock();
        assert_eq!(updates.len(), 4);
        assert_eq!(updates[0].step, GenerationStep::Preparing.as_str());
        assert_eq!(updates[0].step_progress, 50.0);
        assert_eq!(updates[1].step, GenerationStep::Synthesizing.as_str());
        assert_eq!(updates[1].step_progress, 0.0);
        assert_eq!(updates[2].details.as_deref(), Some("chunk 1 of 4"));
        assert_eq!(updates[2].step_progress, 25.0);
        assert_eq!(updates[3].total_progress, 100.0);
    }

    #[test]
    fn test_total_progress_grows_monotonically() {
        let (tracker, _) = tracker();
        let mut last = tracker.total_progress();

        for step in [
            GenerationStep::UploadingReference,
            GenerationStep::Synthesizing,
            GenerationStep::Merging,
        ] {
            tracker.set_step(step);
            assert!(tracker.total_progress() >= last);
            last = tracker.total_progress();
            tracker.update_step_progress(100.0, None);
            assert!(tracker.total_progress() >= last);
            last = tracker.total_progress();
        }
        assert!((last - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_tracker_without_reporter_is_silent() {
        let tracker = ProgressTracker::new();
        tracker.report_chunk(2, 3);
        assert!(tracker.total_progress() > 0.0);
    }
}
