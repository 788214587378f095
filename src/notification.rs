//! Модуль для реализации системы уведомлений
//!
//! Конкретные наблюдатели для системы прогресса: вывод в консоль,
//! запись в память (для тестов) и пересылка в канал сессии.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::progress::{ProgressInfo, ProgressObserver};

/// Наблюдатель, выводящий информацию о прогрессе в консоль
#[derive(Debug, Default)]
pub struct ConsoleProgressObserver {
    prefix: Option<String>,
}

impl ConsoleProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl ProgressObserver for ConsoleProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        let prefix = self.prefix.as_deref().unwrap_or("");
        match progress.details.as_deref() {
            Some(details) => println!(
                "{}[{:5.1}%] {}: {}",
                prefix, progress.total_progress, progress.step, details
            ),
            None => println!("{}[{:5.1}%] {}", prefix, progress.total_progress, progress.step),
        }
    }
}

/// Наблюдатель, сохраняющий историю обновлений в памяти
#[derive(Debug, Clone, Default)]
pub struct MemoryProgressObserver {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl MemoryProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Копия истории обновлений
    pub fn history(&self) -> Vec<ProgressInfo> {
        self.history.lock().clone()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl ProgressObserver for MemoryProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        self.history.lock().push(progress);
    }
}

/// Наблюдатель, пересылающий обновления в канал.
///
/// Канал неограниченный, поэтому отправка не блокирует рабочую задачу.
/// Обновления можно преобразовать в сообщения получателя через `with_mapper`.
pub struct ChannelProgressObserver<T = ProgressInfo> {
    sender: mpsc::UnboundedSender<T>,
    map: Box<dyn Fn(ProgressInfo) -> T + Send + Sync>,
}

impl ChannelProgressObserver<ProgressInfo> {
    pub fn new(sender: mpsc::UnboundedSender<ProgressInfo>) -> Self {
        Self::with_mapper(sender, |progress| progress)
    }
}

impl<T: Send> ChannelProgressObserver<T> {
    pub fn with_mapper(
        sender: mpsc::UnboundedSender<T>,
        map: impl Fn(ProgressInfo) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            sender,
            map: Box::new(map),
        }
    }
}

impl<T: Send> ProgressObserver for ChannelProgressObserver<T> {
    fn on_progress_update(&self, progress: ProgressInfo) {
        if self.sender.send((self.map)(progress)).is_err() {
            log::debug!("Progress receiver dropped, update discarded");
        }
    }
}
