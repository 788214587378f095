//! Модуль для работы с TTS
//!
//! Клиент Gradio API F5-TTS: загрузка референса, отправка задач, опрос
//! результата и оркестрация многофрагментной генерации.

pub mod client;
pub mod models;
pub mod orchestrator;
pub mod response;
pub mod upload;

pub use client::{GradioClient, SpeechBackend};
pub use models::{
    ChunkResult, FileDescriptor, GenerationOutput, GenerationRequest, JobHandle, MergedAudio,
    ReferenceAudio,
};
pub use orchestrator::JobOrchestrator;
pub use response::{parse_poll_response, JobStatus};
pub use upload::ReferenceUploader;
