//! Модуль конфигурации библиотеки tts-stitch
//!
//! Этот модуль содержит структуры и перечисления для настройки библиотеки:
//! варианты модели, параметры синтеза, настройки клиента и сохраняемые
//! настройки каждой модели.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Максимальное значение seed (10 цифр)
pub const MAX_SEED: i64 = 9_999_999_999;

/// Эндпоинт `basic_tts` Gradio-приложения F5-TTS
pub const BASIC_TTS_PATH: &str = "/gradio_api/call/basic_tts";

/// Пример аудио, который используется, когда референс не задан
pub const DEFAULT_SAMPLE_URL: &str =
    "https://github.com/gradio-app/gradio/raw/main/test/test_files/audio_sample.wav";

/// Адрес сервера по умолчанию
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:7860";

/// Вариант модели на сервере
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// F5-TTS
    F5tts,
    /// E2-TTS
    E2tts,
}

impl Default for ModelVariant {
    fn default() -> Self {
        Self::F5tts
    }
}

impl ModelVariant {
    /// Все варианты, в порядке вкладок
    pub const ALL: [ModelVariant; 2] = [ModelVariant::F5tts, ModelVariant::E2tts];

    /// Ключ в файле настроек
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::F5tts => "f5tts",
            Self::E2tts => "e2tts",
        }
    }

    /// Путь API для отправки задач.
    ///
    /// E2-TTS обслуживается тем же `basic_tts`, модель выбирается на сервере.
    pub fn api_path(&self) -> &'static str {
        BASIC_TTS_PATH
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

/// Параметры синтеза, которые передаются серверу как есть
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParams {
    pub seed: i64,
    pub randomize_seed: bool,
    pub speed: f64,
    pub nfe_steps: u32,
    pub crossfade: f64,
    pub remove_silences: bool,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            seed: random_seed(),
            randomize_seed: true,
            speed: 1.0,
            nfe_steps: 32,
            crossfade: 0.15,
            remove_silences: false,
        }
    }
}

impl SynthesisParams {
    /// Копия с приведёнными к допустимым диапазонам значениями
    pub fn normalized(&self) -> Self {
        Self {
            seed: clamp_seed(self.seed),
            randomize_seed: self.randomize_seed,
            speed: align_speed(self.speed),
            nfe_steps: self.nfe_steps.clamp(4, 64),
            crossfade: align_crossfade(self.crossfade),
            remove_silences: self.remove_silences,
        }
    }
}

/// Ограничение seed диапазоном [0, 9999999999]
pub fn clamp_seed(seed: i64) -> i64 {
    if seed < 0 {
        log::warn!("Seed {} is below 0, using 0", seed);
        0
    } else if seed > MAX_SEED {
        log::warn!("Seed {} exceeds {}, clamping", seed, MAX_SEED);
        MAX_SEED
    } else {
        seed
    }
}

/// Округление скорости до шага 0.1 в пределах [0.1, 2.0]
pub fn align_speed(speed: f64) -> f64 {
    if !speed.is_finite() {
        return 1.0;
    }
    ((speed * 10.0).round() / 10.0).clamp(0.1, 2.0)
}

fn align_crossfade(crossfade: f64) -> f64 {
    if !crossfade.is_finite() {
        return 0.0;
    }
    ((crossfade * 100.0).round() / 100.0).clamp(0.0, 1.0)
}

/// Случайный 10-значный seed
pub fn random_seed() -> i64 {
    rand::thread_rng().gen_range(1_000_000_000..=MAX_SEED)
}

/// Настройки HTTP-клиента и конвейера генерации
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Интервал между опросами задачи, мс
    pub poll_interval_ms: u64,
    /// Максимальное количество опросов
    pub max_poll_attempts: u32,
    /// Таймаут отправки задачи, с
    pub submit_timeout_secs: u64,
    /// Таймаут одного опроса, с
    pub poll_timeout_secs: u64,
    /// Таймаут загрузки референса, с
    pub upload_timeout_secs: u64,
    /// Таймаут скачивания аудио, с
    pub download_timeout_secs: u64,
    /// Максимальная длина одного фрагмента текста (в символах)
    pub max_chunk_chars: usize,
    /// Аудио, которое используется без референса
    pub fallback_sample_url: String,
    /// Директория для временных файлов (по умолчанию системная)
    pub temp_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            max_poll_attempts: 60,
            submit_timeout_secs: 60,
            poll_timeout_secs: 30,
            upload_timeout_secs: 60,
            download_timeout_secs: 120,
            max_chunk_chars: 3000,
            fallback_sample_url: DEFAULT_SAMPLE_URL.to_string(),
            temp_dir: None,
        }
    }
}

impl ClientConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Крайний срок опроса задачи: все попытки, каждая с паузой и таймаутом
    pub fn poll_window(&self) -> Duration {
        (self.poll_interval() + Duration::from_secs(self.poll_timeout_secs)) * self.max_poll_attempts
    }

    /// Создать временный файл, который переживёт свой дескриптор
    pub(crate) fn keep_temp_file(&self, prefix: &str, suffix: &str) -> std::io::Result<PathBuf> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix).suffix(suffix);
        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let (_, path) = file.keep().map_err(|e| e.error)?;
        Ok(path)
    }
}

/// Сохраняемые настройки одного варианта модели
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Адрес сервера Gradio
    pub server: String,
    /// Путь к файлу или URL референсного аудио
    pub ref_audio: String,
    /// Текст референса (если пустой, сервер распознает сам)
    pub ref_text: String,
    /// Последний текст для генерации
    pub gen_text: String,
    pub remove_silences: bool,
    pub randomize_seed: bool,
    pub seed: i64,
    pub speed: f64,
    pub nfe_steps: u32,
    pub crossfade: f64,
    /// Директория автосохранения (пустая строка отключает автосохранение)
    pub auto_save_dir: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        let params = SynthesisParams::default();
        Self {
            server: DEFAULT_SERVER.to_string(),
            ref_audio: String::new(),
            ref_text: String::new(),
            gen_text: String::new(),
            remove_silences: params.remove_silences,
            randomize_seed: params.randomize_seed,
            seed: params.seed,
            speed: params.speed,
            nfe_steps: params.nfe_steps,
            crossfade: params.crossfade,
            auto_save_dir: String::new(),
        }
    }
}

impl ModelSettings {
    /// Параметры синтеза из настроек
    pub fn params(&self) -> SynthesisParams {
        SynthesisParams {
            seed: self.seed,
            randomize_seed: self.randomize_seed,
            speed: self.speed,
            nfe_steps: self.nfe_steps,
            crossfade: self.crossfade,
            remove_silences: self.remove_silences,
        }
    }

    /// Сбросить расширенные настройки к значениям по умолчанию
    pub fn reset_advanced(&mut self) {
        let defaults = SynthesisParams::default();
        self.remove_silences = defaults.remove_silences;
        self.randomize_seed = defaults.randomize_seed;
        self.seed = defaults.seed;
        self.speed = defaults.speed;
        self.nfe_steps = defaults.nfe_steps;
        self.crossfade = defaults.crossfade;
    }

    /// Выбрать локальный файл референса; текст референса берётся из имени файла
    pub fn set_reference_audio(&mut self, path: &Path) {
        self.ref_audio = path.to_string_lossy().into_owned();
        if let Some(stem) = path.file_stem() {
            self.ref_text = stem.to_string_lossy().into_owned();
        }
    }

    /// Директория автосохранения, если задана
    pub fn auto_save_dir(&self) -> Option<PathBuf> {
        let dir = self.auto_save_dir.trim();
        if dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(dir))
        }
    }
}
