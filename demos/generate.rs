//! Пример генерации речи через сервер F5-TTS
//!
//! ```text
//! cargo run --example generate -- input.txt [reference.wav] [output.wav]
//! ```
//!
//! Адрес сервера берётся из `F5TTS_SERVER` (по умолчанию `http://127.0.0.1:7860`).

use std::path::PathBuf;

use anyhow::{bail, Context};
use tts_stitch::notification::ConsoleProgressObserver;
use tts_stitch::settings::JsonFileStore;
use tts_stitch::text::format_numbers;
use tts_stitch::{ClientConfig, ModelSettings, ModelVariant, Session, SessionEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let input = match args.next() {
        Some(path) => PathBuf::from(path),
        None => bail!("usage: generate <input.txt> [reference audio] [output.wav]"),
    };
    let reference = args.next();
    let output = PathBuf::from(args.next().unwrap_or_else(|| "output.wav".to_string()));

    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    println!("Пример 1: генерация через TtsStitch");
    let mut settings = ModelSettings {
        server: std::env::var("F5TTS_SERVER").unwrap_or_else(|_| ModelSettings::default().server),
        ..ModelSettings::default()
    };
    if let Some(reference) = &reference {
        if reference.starts_with("http") {
            settings.ref_audio = reference.clone();
        } else {
            settings.set_reference_audio(PathBuf::from(reference).as_path());
        }
    }

    let mut stitch = tts_stitch::TtsStitch::new(ClientConfig::default(), ModelVariant::F5tts);
    stitch.add_observer(Box::new(ConsoleProgressObserver::with_prefix("[f5tts] ")));
    let request = tts_stitch::GenerationRequest::from_settings(&settings, format_numbers(&text));
    let result = stitch.generate(&request).await?;
    println!("Готово: {}", result.path().display());

    println!("Пример 2: генерация через сессию с сохранением настроек");
    let store = JsonFileStore::open("tts_stitch_settings.json");
    let mut session = Session::new(store, ClientConfig::default());
    *session.settings_mut(ModelVariant::F5tts) = ModelSettings {
        gen_text: format_numbers(&text).into_owned(),
        ..settings
    };

    session.start(ModelVariant::F5tts)?;
    while session.is_busy(ModelVariant::F5tts) {
        match session.next_event().await {
            Some(SessionEvent::Status { text, .. }) => println!("status: {}", text),
            Some(SessionEvent::Failed { detail, .. }) => bail!("generation failed: {}", detail),
            Some(_) => {}
            None => break,
        }
    }

    let saved = session.save_output(ModelVariant::F5tts, &output)?;
    session.persist()?;
    println!("Сохранено в {}", saved.display());
    Ok(())
}
