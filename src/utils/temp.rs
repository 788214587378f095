//! Модуль для работы с временными файлами
//!
//! Файлы фрагментов и результат склейки создаются вне `TempDir`, потому что
//! итоговый файл должен пережить вызов генерации. Поэтому удаление ведётся
//! вручную: всё, что попало в [`ScopedFiles`], удаляется при выходе из области
//! видимости, если файл не был явно освобождён.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Набор временных файлов, удаляемых при уничтожении
#[derive(Debug, Default)]
pub struct ScopedFiles {
    files: Vec<PathBuf>,
}

impl ScopedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Взять файл под управление
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    /// Файлы в порядке добавления
    pub fn paths(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Вывести все файлы из-под управления, они больше не будут удалены
    pub fn release_all(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.files)
    }

    /// Удалить все файлы сейчас
    pub fn cleanup(&mut self) -> Result<()> {
        let mut first_error = None;
        for file in self.files.drain(..) {
            if let Err(e) = remove_if_exists(&file) {
                log::warn!("Failed to remove temp file {}: {}", file.display(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ScopedFiles {
    fn drop(&mut self) {
        // Пытаемся очистить файлы при уничтожении объекта
        let _ = self.cleanup();
    }
}

/// Удалить файл, отсутствие файла ошибкой не считается
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
