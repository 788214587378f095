//! Сценарии работы с Gradio API на заглушке сервера

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use serde_json::Value;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use tts_stitch::tts::{
    GenerationOutput, GenerationRequest, GradioClient, JobOrchestrator, ReferenceAudio,
    SpeechBackend,
};
use tts_stitch::{ClientConfig, ModelVariant, SynthesisParams, TtsStitchError};

const CALL: &str = "/gradio_api/call/basic_tts";

fn config() -> ClientConfig {
    ClientConfig {
        poll_interval_ms: 10,
        max_poll_attempts: 5,
        ..ClientConfig::default()
    }
}

fn client() -> GradioClient {
    GradioClient::new(config(), ModelVariant::F5tts).unwrap()
}

fn request(server: &MockServer, reference: ReferenceAudio, text: &str) -> GenerationRequest {
    GenerationRequest::new(
        server.uri(),
        reference,
        Some("reference words".to_string()),
        text,
        SynthesisParams {
            seed: 42,
            randomize_seed: false,
            ..SynthesisParams::default()
        },
    )
}

fn wav_bytes(frames: u32) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            writer.write_sample((i % 100) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn completed_lines(audio_path: &str, transcribed: &str) -> String {
    format!(
        "{{\"msg\":\"process_starts\"}}\n{{\"msg\":\"process_completed\",\"output\":{{\"data\":[{{\"path\":\"{}\",\"url\":null}},null,\"{}\"]}}}}\n",
        audio_path, transcribed
    )
}

async fn mount_event_id(server: &MockServer, id: &str, times: Option<u64>) {
    let mock = Mock::given(method("POST"))
        .and(path(CALL))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{{\"event_id\":\"{}\"}}", id)));
    match times {
        Some(n) => mock.up_to_n_times(n).mount(server).await,
        None => mock.mount(server).await,
    }
}

async fn submitted_payloads(server: &MockServer) -> Vec<Vec<Value>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r: &&Request| r.method.as_str() == "POST" && r.url.path() == CALL)
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["data"].as_array().unwrap().clone()
        })
        .collect()
}

#[tokio::test]
async fn test_event_stream_completion_downloads_audio() {
    let server = MockServer::start().await;
    mount_event_id(&server, "abc", None).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/abc", CALL)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(completed_lines("/tmp/gradio/out.wav", "hello reference")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gradio_api/file=/tmp/gradio/out.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wav_bytes(1600)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client();
    let request = request(&server, ReferenceAudio::Remote("https://voices.example/r.wav".into()), "Hi.");
    let descriptor = assert_ok!(client.resolve_reference(&request).await);
    let result = assert_ok!(client.synthesize(0, &request, &descriptor).await);

    assert_eq!(result.transcribed_text.as_deref(), Some("hello reference"));
    assert_eq!(std::fs::read(&result.path).unwrap(), wav_bytes(1600));
    std::fs::remove_file(&result.path).unwrap();

    let payloads = submitted_payloads(&server).await;
    assert_eq!(payloads.len(), 1);
    let data = &payloads[0];
    assert_eq!(data.len(), 9);
    assert_eq!(data[0]["path"], "https://voices.example/r.wav");
    assert_eq!(data[1], "reference words");
    assert_eq!(data[2], "Hi.");
    assert_eq!(data[5], 42);
}

#[tokio::test]
async fn test_pending_polls_until_legacy_complete_block() {
    let server = MockServer::start().await;
    mount_event_id(&server, "slow", None).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/slow", CALL)))
        .respond_with(ResponseTemplate::new(200).set_body_string("event: heartbeat\ndata: null\n\n"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    let audio_url = format!("{}/gradio_api/file=/tmp/gradio/slow.wav", server.uri());
    Mock::given(method("GET"))
        .and(path(format!("{}/slow", CALL)))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "event: complete\ndata: [{{\"path\": \"/tmp/gradio/slow.wav\", \"url\": \"{}\"}}, null, \"\"]\n\n",
            audio_url
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gradio_api/file=/tmp/gradio/slow.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wav_bytes(10)))
        .mount(&server)
        .await;

    let client = client();
    let request = request(&server, ReferenceAudio::Remote("https://voices.example/r.wav".into()), "Hi.");
    let descriptor = client.resolve_reference(&request).await.unwrap();
    let result = assert_ok!(client.synthesize(3, &request, &descriptor).await);

    assert_eq!(result.index, 3);
    assert_eq!(result.transcribed_text, None);
    std::fs::remove_file(&result.path).unwrap();
}

#[tokio::test]
async fn test_error_event_with_url_reference_retries_once_then_fails() {
    let server = MockServer::start().await;
    mount_event_id(&server, "abc", None).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/abc", CALL)))
        .respond_with(ResponseTemplate::new(200).set_body_string("event: error\ndata: null\n\n"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/voices/ref.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3fake".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/gradio_api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"["/tmp/gradio/up/ref.mp3"]"#))
        .expect(1)
        .mount(&server)
        .await;

    let client = client();
    let reference_url = format!("{}/voices/ref.mp3", server.uri());
    let request = request(&server, ReferenceAudio::Remote(reference_url.clone()), "Hi.");
    let descriptor = client.resolve_reference(&request).await.unwrap();

    let result = client.synthesize(0, &request, &descriptor).await;
    assert!(matches!(result, Err(TtsStitchError::JobFailed(_))));

    let payloads = submitted_payloads(&server).await;
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[0][0]["path"], reference_url.as_str());
    assert_eq!(payloads[1][0]["path"], "/tmp/gradio/up/ref.mp3");
    assert_eq!(payloads[1][0]["mime_type"], "audio/mpeg");
    assert_eq!(payloads[0][2], payloads[1][2]);
}

#[tokio::test]
async fn test_fallback_success_returns_audio() {
    let server = MockServer::start().await;
    mount_event_id(&server, "first", Some(1)).await;
    mount_event_id(&server, "second", None).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/first", CALL)))
        .respond_with(ResponseTemplate::new(200).set_body_string("event: error\ndata: \"bad url\"\n\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/second", CALL)))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":["/tmp/gradio/ok.wav"]}"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/voices/ref.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wav_bytes(10)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/gradio_api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"files":[{"path":"/tmp/gradio/up/ref.wav"}]}"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gradio_api/file=/tmp/gradio/ok.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wav_bytes(320)))
        .mount(&server)
        .await;

    let client = client();
    let request = request(
        &server,
        ReferenceAudio::Remote(format!("{}/voices/ref.wav", server.uri())),
        "Hi.",
    );
    let descriptor = client.resolve_reference(&request).await.unwrap();
    let result = assert_ok!(client.synthesize(0, &request, &descriptor).await);

    assert_eq!(std::fs::read(&result.path).unwrap(), wav_bytes(320));
    std::fs::remove_file(&result.path).unwrap();
}

#[tokio::test]
async fn test_error_event_with_local_reference_does_not_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gradio_api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"["/tmp/gradio/local.wav"]"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CALL))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"event_id":"x"}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/x", CALL)))
        .respond_with(ResponseTemplate::new(200).set_body_string("event: error\ndata: null\n\n"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("local.wav");
    std::fs::write(&local, wav_bytes(10)).unwrap();

    let client = client();
    let request = request(&server, ReferenceAudio::Local(local), "Hi.");
    let descriptor = client.resolve_reference(&request).await.unwrap();
    assert_eq!(descriptor.path, "/tmp/gradio/local.wav");

    let result = client.synthesize(0, &request, &descriptor).await;
    assert!(matches!(result, Err(TtsStitchError::JobFailed(_))));
}

#[tokio::test]
async fn test_exhausted_polls_time_out() {
    let server = MockServer::start().await;
    mount_event_id(&server, "never", None).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/never", CALL)))
        .respond_with(ResponseTemplate::new(200).set_body_string("event: heartbeat\ndata: null\n\n"))
        .expect(5)
        .mount(&server)
        .await;

    let client = client();
    let request = request(&server, ReferenceAudio::Remote("https://voices.example/r.wav".into()), "Hi.");
    let descriptor = client.resolve_reference(&request).await.unwrap();

    let error = assert_err!(client.synthesize(0, &request, &descriptor).await);
    match error {
        TtsStitchError::JobTimeout { event_id, attempts } => {
            assert_eq!(event_id, "never");
            assert_eq!(attempts, 5);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_error_status_polls_are_not_parsed() {
    let server = MockServer::start().await;
    mount_event_id(&server, "broken", None).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/broken", CALL)))
        .respond_with(ResponseTemplate::new(500).set_body_string(r#"{"data":["/tmp/gradio/stale.wav"]}"#))
        .expect(5)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gradio_api/file=/tmp/gradio/stale.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wav_bytes(10)))
        .expect(0)
        .mount(&server)
        .await;

    let client = client();
    let request = request(&server, ReferenceAudio::Remote("https://voices.example/r.wav".into()), "Hi.");
    let descriptor = client.resolve_reference(&request).await.unwrap();

    let error = assert_err!(client.synthesize(0, &request, &descriptor).await);
    assert!(matches!(error, TtsStitchError::JobTimeout { attempts: 5, .. }));
}

#[tokio::test]
async fn test_missing_event_id_is_submission_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CALL))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"detail":"queue full"}"#))
        .mount(&server)
        .await;

    let client = client();
    let request = request(&server, ReferenceAudio::Remote("https://voices.example/r.wav".into()), "Hi.");
    let descriptor = client.resolve_reference(&request).await.unwrap();

    let result = client.synthesize(0, &request, &descriptor).await;
    assert!(matches!(result, Err(TtsStitchError::JobSubmission(_))));
}

#[tokio::test]
async fn test_long_text_end_to_end_uploads_once_and_merges() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gradio_api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"["/tmp/gradio/voice.wav"]"#))
        .expect(1)
        .mount(&server)
        .await;
    mount_event_id(&server, "job", None).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/job", CALL)))
        .respond_with(ResponseTemplate::new(200).set_body_string(completed_lines("/tmp/gradio/chunk.wav", "")))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gradio_api/file=/tmp/gradio/chunk.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wav_bytes(8000)))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let voice = dir.path().join("voice.wav");
    std::fs::write(&voice, wav_bytes(100)).unwrap();

    let paragraph = "Words go on and on. ".repeat(116);
    let text = vec![paragraph.trim_end(); 3].join("\n\n");
    assert!(text.chars().count() > 6000);

    let config = ClientConfig {
        temp_dir: Some(dir.path().to_path_buf()),
        ..config()
    };
    let backend = Arc::new(GradioClient::new(config.clone(), ModelVariant::E2tts).unwrap());
    let orchestrator = JobOrchestrator::new(backend, config);

    let output = assert_ok!(
        orchestrator
            .generate(&request(&server, ReferenceAudio::Local(voice), &text), None)
            .await
    );

    match output {
        GenerationOutput::Merged { audio, transcribed_text } => {
            assert_eq!(audio.chunk_count, 3);
            assert_eq!(audio.duration, Duration::from_millis(1500));
            assert_eq!(transcribed_text, None);
        }
        other => panic!("expected merged output, got {:?}", other),
    }

    let payloads = submitted_payloads(&server).await;
    assert_eq!(payloads.len(), 3);
    for data in &payloads {
        assert_eq!(data[0], payloads[0][0]);
        assert_eq!(data[1], "reference words");
    }

    let leftovers: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("f5tts_chunk_"))
        .collect();
    assert!(leftovers.is_empty(), "chunk files left: {:?}", leftovers);
}
