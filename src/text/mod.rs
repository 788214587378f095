//! Модуль подготовки текста для TTS
//!
//! Разбиение длинного текста на фрагменты и замена чисел словами.

pub mod chunker;
pub mod numbers;

pub use chunker::chunk_text;
pub use numbers::format_numbers;
