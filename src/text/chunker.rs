//! Разбиение длинного текста на фрагменты
//!
//! Сервер генерирует не больше нескольких минут речи за запрос, поэтому
//! длинный текст режется на фрагменты: сначала по абзацам, затем по
//! предложениям и, в крайнем случае, по словам. Слова никогда не разрываются.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Result, TtsStitchError};

lazy_static! {
    static ref PARAGRAPH_BREAK: Regex = Regex::new(r"\n\s*\n").unwrap();
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Разбить текст на упорядоченные фрагменты не длиннее `max_chars` символов.
///
/// Текст, который помещается целиком, возвращается одним фрагментом (с
/// обрезанными пробелами по краям). Длиннее `max_chars` может оказаться только
/// фрагмент из одного слова, которое само длиннее лимита.
pub fn chunk_text(text: &str, max_chars: usize) -> Result<Vec<String>> {
    if max_chars == 0 {
        return Err(TtsStitchError::Chunking(
            "chunk size must be at least one character".to_string(),
        ));
    }

    let trimmed = text.trim();
    if char_len(trimmed) <= max_chars {
        return Ok(vec![trimmed.to_string()]);
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in PARAGRAPH_BREAK.split(trimmed) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if char_len(paragraph) > max_chars {
            flush(&mut chunks, &mut current);
            split_paragraph(paragraph, max_chars, &mut chunks);
        } else if current.is_empty() {
            current.push_str(paragraph);
        } else if char_len(&current) + 2 + char_len(paragraph) <= max_chars {
            current.push_str("\n\n");
            current.push_str(paragraph);
        } else {
            flush(&mut chunks, &mut current);
            current.push_str(paragraph);
        }
    }
    flush(&mut chunks, &mut current);

    if chunks.is_empty() {
        chunks.push(trimmed.to_string());
    }
    Ok(chunks)
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    let piece = current.trim();
    if !piece.is_empty() {
        chunks.push(piece.to_string());
    }
    current.clear();
}

fn split_paragraph(paragraph: &str, max_chars: usize, chunks: &mut Vec<String>) {
    let mut current = String::new();

    for sentence in split_sentences(paragraph) {
        if char_len(&current) + char_len(sentence) <= max_chars {
            current.push_str(sentence);
            continue;
        }

        flush(chunks, &mut current);

        if char_len(sentence.trim_end()) > max_chars {
            let mut line = String::new();
            for word in sentence.split_whitespace() {
                if line.is_empty() {
                    line.push_str(word);
                } else if char_len(&line) + 1 + char_len(word) <= max_chars {
                    line.push(' ');
                    line.push_str(word);
                } else {
                    chunks.push(std::mem::take(&mut line));
                    line.push_str(word);
                }
            }
            // хвост продолжает накапливаться со следующими предложениями
            current = line;
            if sentence.ends_with(char::is_whitespace) {
                current.push(' ');
            }
        } else {
            current.push_str(sentence);
        }
    }

    flush(chunks, &mut current);
}

/// Предложения вместе с завершающей пунктуацией и пробелами после неё
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = paragraph.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        // "?!", "..." и т.п. остаются с предложением
        while let Some(&(_, next)) = chars.peek() {
            if matches!(next, '.' | '!' | '?') {
                chars.next();
            } else {
                break;
            }
        }
        match chars.peek() {
            Some(&(_, next)) if next.is_whitespace() => {
                while let Some(&(_, ws)) = chars.peek() {
                    if ws.is_whitespace() {
                        chars.next();
                    } else {
                        break;
                    }
                }
                let end = chars.peek().map(|&(i, _)| i).unwrap_or(paragraph.len());
                sentences.push(&paragraph[start..end]);
                start = end;
            }
            _ => {}
        }
    }

    if start < paragraph.len() {
        sentences.push(&paragraph[start..]);
    }
    sentences
}
