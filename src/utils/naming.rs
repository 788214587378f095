//! Имена файлов автосохранения вида `YYYY-MM-DD_NNN.wav`

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use regex::Regex;
use walkdir::WalkDir;

use crate::error::{Result, TtsStitchError};

/// Расширение автосохранённых файлов
pub const AUTO_SAVE_EXTENSION: &str = "wav";

/// Следующий свободный путь `{dir}/{date}_{NNN}.{ext}`.
///
/// Номер на единицу больше максимального среди существующих файлов за эту
/// дату. Директория создаётся, если её нет. Рассчитано на одного писателя.
pub fn next_auto_save_path(dir: &Path, date: NaiveDate, ext: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let date = date.format("%Y-%m-%d").to_string();
    let pattern = Regex::new(&format!(
        r"^{}_(\d{{3}})\.{}$",
        regex::escape(&date),
        regex::escape(ext)
    ))
    .map_err(|e| TtsStitchError::Configuration(format!("bad auto-save extension {}: {}", ext, e)))?;

    let max = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            pattern
                .captures(&name)
                .and_then(|caps| caps[1].parse::<u32>().ok())
        })
        .max()
        .unwrap_or(0);

    Ok(dir.join(format!("{}_{:03}.{}", date, max + 1, ext)))
}

/// Скопировать `source` в следующий свободный файл директории автосохранения
pub fn auto_save(source: &Path, dir: &Path, date: NaiveDate) -> Result<PathBuf> {
    let target = next_auto_save_path(dir, date, AUTO_SAVE_EXTENSION)?;
    fs::copy(source, &target)?;
    log::info!("Auto-saved {} to {}", source.display(), target.display());
    Ok(target)
}
