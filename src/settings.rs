//! Хранение настроек моделей
//!
//! Настройки лежат в хранилище ключ-значение: по ключу на вариант модели
//! (`f5tts`, `e2tts`). Старый плоский формат с одной моделью переносится в
//! `f5tts` при загрузке.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::config::{ModelSettings, ModelVariant};
use crate::error::Result;
use crate::tts::models::ReferenceAudio;

/// Хранилище настроек ключ-значение
pub trait SettingsStore: Send {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&mut self, key: &str, value: Value);
    /// Сохранить изменения на постоянный носитель
    fn save(&mut self) -> Result<()>;
}

/// Хранилище в JSON-файле
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl JsonFileStore {
    /// Открыть файл; отсутствующий или повреждённый файл даёт пустое хранилище
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    log::warn!("Settings file {} is not a JSON object, ignoring", path.display());
                    Map::new()
                }
                Err(e) => {
                    log::warn!("Failed to parse settings file {}: {}", path.display(), e);
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                log::warn!("Failed to read settings file {}: {}", path.display(), e);
                Map::new()
            }
        };
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn save(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(&Value::Object(self.values.clone()))?;
        fs::write(&self.path, content)?;
        log::debug!("Settings saved to {}", self.path.display());
        Ok(())
    }
}

/// Хранилище в памяти
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, Value>,
    /// Сколько раз вызывался `save`
    pub saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn save(&mut self) -> Result<()> {
        self.saves += 1;
        Ok(())
    }
}

/// Ключи старого формата, по которым он узнаётся
const LEGACY_KEYS: [&str; 3] = ["server", "ref_audio", "gen_text"];

/// Поля `ModelSettings`, которые переносятся из плоского формата
const MODEL_KEYS: [&str; 11] = [
    "server",
    "ref_audio",
    "ref_text",
    "gen_text",
    "remove_silences",
    "randomize_seed",
    "seed",
    "speed",
    "nfe_steps",
    "crossfade",
    "auto_save_dir",
];

/// Загрузить настройки всех вариантов модели
pub fn load_model_settings(store: &dyn SettingsStore) -> HashMap<ModelVariant, ModelSettings> {
    let has_variant_keys = ModelVariant::ALL
        .iter()
        .any(|variant| store.get(variant.as_str()).is_some());

    let mut settings = HashMap::new();
    for variant in ModelVariant::ALL {
        let value = if has_variant_keys {
            store.get(variant.as_str())
        } else if variant == ModelVariant::F5tts {
            legacy_settings(store)
        } else {
            None
        };

        let mut model = match value {
            Some(value) => serde_json::from_value::<ModelSettings>(value).unwrap_or_else(|e| {
                log::warn!("Failed to parse {} settings, using defaults: {}", variant, e);
                ModelSettings::default()
            }),
            None => ModelSettings::default(),
        };

        // ссылка на удалённый локальный файл не переживает перезапуск
        if !model.ref_audio.is_empty() && ReferenceAudio::parse(&model.ref_audio) == ReferenceAudio::None {
            log::info!("Reference audio {} no longer exists, clearing", model.ref_audio);
            model.ref_audio.clear();
        }
        settings.insert(variant, model);
    }
    settings
}

fn legacy_settings(store: &dyn SettingsStore) -> Option<Value> {
    let mut legacy = Map::new();
    for key in MODEL_KEYS {
        if let Some(value) = store.get(key) {
            legacy.insert(key.to_string(), value);
        }
    }
    if LEGACY_KEYS.iter().any(|key| legacy.contains_key(*key)) {
        log::info!("Migrating legacy flat settings into {}", ModelVariant::F5tts);
        Some(Value::Object(legacy))
    } else {
        None
    }
}

/// Записать настройки всех вариантов и сохранить хранилище
pub fn save_model_settings(
    store: &mut dyn SettingsStore,
    settings: &HashMap<ModelVariant, ModelSettings>,
) -> Result<()> {
    for variant in ModelVariant::ALL {
        if let Some(model) = settings.get(&variant) {
            store.set(variant.as_str(), serde_json::to_value(model)?);
        }
    }
    store.save()
}
