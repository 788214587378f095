//! Модуль для работы с аудио
//!
//! Склейка фрагментов в один файл. Семплы конкатенируются строго в порядке
//! входных файлов, без переходов между ними. WAV читается через `hound`,
//! остальные форматы декодируются `symphonia`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::probe::Hint;

use crate::error::{Result, TtsStitchError};
use crate::tts::models::MergedAudio;
use crate::utils::temp::remove_if_exists;

/// Interleaved семплы в исходном представлении
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    /// Целочисленный PCM из WAV, разрядность берётся из `wav_spec`
    Int(Vec<i32>),
    /// Значения в диапазоне [-1.0, 1.0]
    Float(Vec<f32>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::Int(v) => v.len(),
            Samples::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Декодированный файл
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Samples,
    /// Исходный формат, если файл был WAV
    pub wav_spec: Option<WavSpec>,
}

impl DecodedAudio {
    pub fn frames(&self) -> u64 {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() as u64 / self.channels as u64
        }
    }

    pub fn duration(&self) -> Duration {
        frames_to_duration(self.frames(), self.sample_rate)
    }
}

fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = frames as u128 * 1_000_000_000 / sample_rate as u128;
    Duration::from_nanos(nanos as u64)
}

fn merge_error(path: &Path, what: impl std::fmt::Display) -> TtsStitchError {
    TtsStitchError::Merge(format!("{}: {}", path.display(), what))
}

/// Декодировать файл в PCM
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    let is_wav = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);
    if is_wav {
        decode_wav(path)
    } else {
        decode_with_symphonia(path)
    }
}

fn decode_wav(path: &Path) -> Result<DecodedAudio> {
    let mut reader = WavReader::open(path).map_err(|e| merge_error(path, e))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        SampleFormat::Int => Samples::Int(
            reader
                .samples::<i32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| merge_error(path, e))?,
        ),
        SampleFormat::Float => Samples::Float(
            reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| merge_error(path, e))?,
        ),
    };

    Ok(DecodedAudio {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        samples,
        wav_spec: Some(spec),
    })
}

fn decode_with_symphonia(path: &Path) -> Result<DecodedAudio> {
    let file = File::open(path).map_err(|e| merge_error(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &Default::default(), &Default::default())
        .map_err(|e| merge_error(path, format!("unrecognized format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| merge_error(path, "no audio track"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &Default::default())
        .map_err(|e| merge_error(path, format!("no decoder: {}", e)))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(merge_error(path, e)),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // битый пакет пропускаем, как делает сам декодер
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet in {}: {}", path.display(), e);
            }
            Err(e) => return Err(merge_error(path, e)),
        }
    }

    if sample_rate == 0 || channels == 0 {
        return Err(merge_error(path, "stream has no audio parameters"));
    }

    Ok(DecodedAudio {
        sample_rate,
        channels,
        samples: Samples::Float(samples),
        wav_spec: None,
    })
}

/// Склеить файлы в `output` в заданном порядке.
///
/// Все входы должны совпадать по частоте и числу каналов. Формат выхода
/// берётся из первого WAV-входа; для сжатых входов пишется 16-битный PCM.
pub fn merge(paths: &[PathBuf], output: &Path) -> Result<MergedAudio> {
    let first_path = paths
        .first()
        .ok_or_else(|| TtsStitchError::Merge("nothing to merge".to_string()))?;

    let first = decode_file(first_path)?;
    let spec = first.wav_spec.unwrap_or(WavSpec {
        channels: first.channels,
        sample_rate: first.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    });

    let mut writer = WavWriter::create(output, spec).map_err(|e| merge_error(output, e))?;
    let mut total_frames = 0u64;

    let mut write_all = |audio: &DecodedAudio, path: &Path| -> Result<()> {
        if audio.sample_rate != spec.sample_rate || audio.channels != spec.channels {
            return Err(merge_error(
                path,
                format!(
                    "{} Hz/{} ch does not match {} Hz/{} ch",
                    audio.sample_rate, audio.channels, spec.sample_rate, spec.channels
                ),
            ));
        }
        write_samples(&mut writer, &spec, audio).map_err(|e| merge_error(output, e))?;
        total_frames += audio.frames();
        Ok(())
    };

    write_all(&first, first_path)?;
    for path in &paths[1..] {
        let audio = decode_file(path)?;
        write_all(&audio, path)?;
    }

    writer.finalize().map_err(|e| merge_error(output, e))?;

    let merged = MergedAudio {
        path: output.to_path_buf(),
        duration: frames_to_duration(total_frames, spec.sample_rate),
        chunk_count: paths.len(),
    };
    log::info!(
        "Merged {} files into {} ({:.2}s)",
        merged.chunk_count,
        output.display(),
        merged.duration.as_secs_f64()
    );
    Ok(merged)
}

/// Записать семплы в формате `spec`; целые той же разрядности копируются как есть
fn write_samples<W>(writer: &mut WavWriter<W>, spec: &WavSpec, audio: &DecodedAudio) -> hound::Result<()>
where
    W: std::io::Write + std::io::Seek,
{
    let source_bits = audio
        .wav_spec
        .map(|s| s.bits_per_sample)
        .unwrap_or(spec.bits_per_sample);

    match (&audio.samples, spec.sample_format) {
        (Samples::Int(samples), SampleFormat::Int) if source_bits == spec.bits_per_sample => {
            for &s in samples {
                writer.write_sample(s)?;
            }
        }
        (Samples::Int(samples), SampleFormat::Int) => {
            let (from, to) = (int_scale(source_bits), int_scale(spec.bits_per_sample));
            for &s in samples {
                writer.write_sample(quantize(s as f64 / from, to))?;
            }
        }
        (Samples::Int(samples), SampleFormat::Float) => {
            let from = int_scale(source_bits);
            for &s in samples {
                writer.write_sample((s as f64 / from) as f32)?;
            }
        }
        (Samples::Float(samples), SampleFormat::Int) => {
            let to = int_scale(spec.bits_per_sample);
            for &s in samples {
                writer.write_sample(quantize(s as f64, to))?;
            }
        }
        (Samples::Float(samples), SampleFormat::Float) => {
            for &s in samples {
                writer.write_sample(s)?;
            }
        }
    }
    Ok(())
}

fn int_scale(bits: u16) -> f64 {
    (1i64 << (bits - 1)) as f64
}

fn quantize(value: f64, scale: f64) -> i32 {
    (value * scale).round().clamp(-scale, scale - 1.0) as i32
}

/// Склеить и удалить исходные файлы; при ошибке исходники остаются
pub fn merge_and_remove_sources(paths: &[PathBuf], output: &Path) -> Result<MergedAudio> {
    let merged = merge(paths, output)?;
    for path in paths {
        if let Err(e) = remove_if_exists(path) {
            log::warn!("Could not remove chunk file {}: {}", path.display(), e);
        }
    }
    Ok(merged)
}
