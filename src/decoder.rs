use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::backend::{AudioBackend, BufferId, PcmData};
use crate::error::{DecodeError, SoundError};

/// Decode a sound file and upload it to the backend.
///
/// Any failure, whether reading, decoding or uploading, is reported as
/// `SoundError::DecodeFailure` for `path`.
pub fn decode_and_upload<B: AudioBackend>(backend: &mut B, path: &Path) -> Result<BufferId, SoundError> {
    let pcm = decode_file(path).map_err(|e| SoundError::DecodeFailure {
        path: path.display().to_string(),
        source: Box::new(e),
    })?;

    backend
        .create_buffer_from_pcm(&pcm)
        .map_err(|e| SoundError::DecodeFailure {
            path: path.display().to_string(),
            source: Box::new(e),
        })
}

/// Decode any supported audio file into interleaved 16-bit PCM.
pub fn decode_file(path: &Path) -> Result<PcmData, DecodeError> {
    let is_wav = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    let pcm = if is_wav {
        decode_wav(path)?
    } else {
        decode_compressed(path)?
    };

    if pcm.is_empty() {
        return Err(DecodeError::Empty);
    }

    tracing::debug!(
        "Decoded {}: {} channels, {} Hz, {} frames",
        path.display(),
        pcm.channels,
        pcm.sample_rate,
        pcm.frames()
    );
    Ok(pcm)
}

fn decode_wav(path: &Path) -> Result<PcmData, DecodeError> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, _) => reader
            .into_samples::<f32>()
            .map(|s| s.map(f32_to_i16))
            .collect::<Result<Vec<_>, _>>()?,
        (hound::SampleFormat::Int, 8) => reader
            .into_samples::<i8>()
            .map(|s| s.map(|v| (v as i16) << 8))
            .collect::<Result<Vec<_>, _>>()?,
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()?,
        (hound::SampleFormat::Int, bits) => {
            let shift = bits.saturating_sub(16);
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(PcmData::new(spec.channels, spec.sample_rate, samples))
}

fn decode_compressed(path: &Path) -> Result<PcmData, DecodeError> {
    // Open the media source
    let src = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    // Create a probe hint using the file extension
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();

    let probed = symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
    let mut format = probed.format;

    // Find the first audio track with a known (decodable) codec
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;

    let dec_opts: DecoderOptions = Default::default();
    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &dec_opts)?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                // End of stream
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                // Track list changed mid-stream; keep what was decoded so far
                tracing::warn!("Decoder reset requested for {}, truncating", path.display());
                break;
            }
            Err(err) => return Err(err.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = decoded.spec();
                if sample_rate.is_none() {
                    sample_rate = Some(spec.rate);
                }
                if channels.is_none() {
                    channels = Some(spec.channels.count() as u16);
                }
                append_interleaved(&mut samples, &decoded);
            }
            Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => {
                // Skip packets that fail to decode
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }

    let sample_rate = sample_rate.ok_or(DecodeError::MissingParameter("sample rate"))?;
    let channels = channels.ok_or(DecodeError::MissingParameter("channel count"))?;

    Ok(PcmData::new(channels, sample_rate, samples))
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Append decoded samples in interleaved order (L, R, L, R, ...)
fn append_interleaved(out: &mut Vec<i16>, decoded: &AudioBufferRef) {
    let num_channels = decoded.spec().channels.count();
    let num_frames = decoded.frames();
    out.reserve(num_channels * num_frames);

    for frame in 0..num_frames {
        for ch in 0..num_channels {
            let sample = match decoded {
                AudioBufferRef::F32(buf) => f32_to_i16(buf.chan(ch)[frame]),
                AudioBufferRef::F64(buf) => (buf.chan(ch)[frame].clamp(-1.0, 1.0) * i16::MAX as f64) as i16,
                AudioBufferRef::S16(buf) => buf.chan(ch)[frame],
                AudioBufferRef::S32(buf) => (buf.chan(ch)[frame] >> 16) as i16,
                AudioBufferRef::U8(buf) => (buf.chan(ch)[frame] as i16 - 128) * 256,
                AudioBufferRef::U16(buf) => (buf.chan(ch)[frame] as i32 - 32768) as i16,
                AudioBufferRef::U24(buf) => (((buf.chan(ch)[frame].inner() as i32) - 8_388_608) >> 8) as i16,
                AudioBufferRef::U32(buf) => ((buf.chan(ch)[frame] as i64 - 2_147_483_648) >> 16) as i16,
                AudioBufferRef::S24(buf) => (buf.chan(ch)[frame].inner() >> 8) as i16,
                AudioBufferRef::S8(buf) => (buf.chan(ch)[frame] as i16) << 8,
            };
            out.push(sample);
        }
    }
}
