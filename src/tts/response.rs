//! Разбор ответов Gradio API
//!
//! Сервер не имеет стабильной схемы: разные сборки отвечают чистым JSON,
//! потоком JSON-строк или SSE старого формата. Весь разбор сосредоточен здесь,
//! остальной код видит только [`JobStatus`].

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref QUOTED_TOKEN: Regex = Regex::new(r#""([^"]+)""#).unwrap();
    static ref QUOTED_AUDIO_PATH: Regex =
        Regex::new(r#"(?i)"([^"]+\.(?:mp3|wav|flac|m4a|ogg))""#).unwrap();
}

/// Маркер ошибки в потоке событий
const ERROR_MARKER: &str = "event: error";
const COMPLETE_MARKER: &str = "event: complete";

/// Состояние удалённой задачи после одного опроса
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Результата пока нет
    Pending,
    /// Аудио готово
    Completed {
        audio_ref: String,
        transcribed_text: Option<String>,
    },
    /// Сервер сообщил об ошибке
    Failed { message: String },
}

/// Идентификатор события из ответа на отправку задачи.
///
/// JSON-объект: поля `event_id`, `eventId` или `event`. Всё остальное,
/// включая JSON другого вида: второй токен в кавычках (как в
/// `{"event_id":"<id>"}`), либо первый, если он один.
pub fn extract_event_id(body: &str) -> Option<String> {
    if let Ok(Value::Object(json)) = serde_json::from_str::<Value>(body) {
        return ["event_id", "eventId", "event"]
            .iter()
            .find_map(|key| match json.get(*key) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            });
    }

    let tokens: Vec<&str> = QUOTED_TOKEN
        .captures_iter(body)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    match tokens.as_slice() {
        [_, second, ..] => Some(second.to_string()),
        [only] => Some(only.to_string()),
        [] => None,
    }
}

/// Разобрать тело ответа на опрос задачи.
///
/// Формы пробуются по порядку, побеждает первая успешная:
/// 1. JSON-объект с `data: [...]`;
/// 2. JSON-строки, одна из которых `msg == "process_completed"`;
/// 3. SSE-блок `event: complete` + `data: [...]`.
pub fn parse_poll_response(body: &str) -> JobStatus {
    if let Some(status) = parse_plain_json(body)
        .or_else(|| parse_json_lines(body))
        .or_else(|| parse_legacy_sse(body))
    {
        return status;
    }

    if body.contains(ERROR_MARKER) {
        return JobStatus::Failed {
            message: error_message(body),
        };
    }

    JobStatus::Pending
}

fn parse_plain_json(body: &str) -> Option<JobStatus> {
    let json: Value = serde_json::from_str(body.trim()).ok()?;
    let first = json.get("data")?.as_array()?.first()?;
    let audio_ref = match first {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Object(_) => audio_ref_from_object(first)?,
        _ => return None,
    };
    Some(JobStatus::Completed {
        audio_ref,
        transcribed_text: None,
    })
}

fn parse_json_lines(body: &str) -> Option<JobStatus> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.strip_prefix("data:").map(str::trim).unwrap_or(line))
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter(|msg| msg.get("msg").and_then(Value::as_str) == Some("process_completed"))
        .find_map(|msg| {
            let data = msg.get("output")?.get("data")?.as_array()?;
            completed_from_data(data)
        })
}

fn parse_legacy_sse(body: &str) -> Option<JobStatus> {
    let mut lines = body.lines().map(str::trim);
    while let Some(line) = lines.next() {
        if line != COMPLETE_MARKER {
            continue;
        }
        for next in lines.by_ref() {
            if let Some(payload) = next.strip_prefix("data:") {
                let data: Vec<Value> = serde_json::from_str(payload.trim()).ok()?;
                return completed_from_data(&data);
            }
            if next.starts_with("event:") {
                break;
            }
        }
    }
    None
}

/// Элемент 0: аудио, элемент 2: распознанный текст референса
fn completed_from_data(data: &[Value]) -> Option<JobStatus> {
    let audio_ref = match data.first()? {
        Value::String(s) if !s.is_empty() => s.clone(),
        obj @ Value::Object(_) => audio_ref_from_object(obj)?,
        _ => return None,
    };
    let transcribed_text = data
        .get(2)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Some(JobStatus::Completed {
        audio_ref,
        transcribed_text,
    })
}

fn audio_ref_from_object(obj: &Value) -> Option<String> {
    ["url", "path", "filepath"]
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn error_message(body: &str) -> String {
    let mut lines = body.lines().map(str::trim);
    while let Some(line) = lines.next() {
        if line == ERROR_MARKER {
            if let Some(payload) = lines.next().and_then(|l| l.strip_prefix("data:")) {
                let payload = payload.trim();
                if !payload.is_empty() && payload != "null" {
                    return payload.to_string();
                }
            }
        }
    }
    "server returned an error event without details".to_string()
}

/// Превратить ссылку на аудио из ответа в абсолютный URL
pub fn resolve_audio_url(server: &str, audio_ref: &str) -> String {
    let audio_ref = audio_ref.trim();
    let lower = audio_ref.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return audio_ref.to_string();
    }
    if audio_ref.starts_with("/file=") || audio_ref.starts_with("/gradio_api/") {
        return format!("{}{}", server, audio_ref);
    }
    file_url(server, audio_ref)
}

/// URL файла из кэша сервера
pub fn file_url(server: &str, path: &str) -> String {
    format!("{}/gradio_api/file={}", server, path)
}

/// Путь к файлу из ответа `/gradio_api/upload`.
///
/// Поддерживаются `["path"]`, `{"files": [{"path": ...}]}`, `{"files": ["..."]}`,
/// `{"path": ...}` и обычный текст с путём в кавычках.
pub fn parse_upload_response(body: &str) -> Option<String> {
    let trimmed = body.trim();
    let path = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => items.first().and_then(Value::as_str).map(str::to_string),
        Ok(Value::Object(obj)) => {
            match obj.get("files").and_then(Value::as_array).and_then(|f| f.first()) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(file @ Value::Object(_)) => ["path", "filepath"]
                    .iter()
                    .find_map(|key| file.get(*key).and_then(Value::as_str))
                    .map(str::to_string),
                _ => obj.get("path").and_then(Value::as_str).map(str::to_string),
            }
        }
        Ok(Value::String(s)) => Some(s),
        _ => QUOTED_AUDIO_PATH
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string()),
    }?;

    let path = path.trim_matches(|c| c == '"' || c == '\'').trim().to_string();
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}
