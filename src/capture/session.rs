//! State of one scan from start to finish.

use super::messages::Progress;
use crate::adapter::{FrameFormat, ScanParameters};
use crate::error::{AppResult, ScanError};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Growable accumulator for the pixel data of one session.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Upper bound for the up-front reservation; larger scans grow on demand.
    const MAX_RESERVE: usize = 64 * 1024 * 1024;

    /// Buffer reserving room for `expected` bytes, up to a fixed cap.
    pub fn with_expected(expected: Option<usize>) -> Self {
        let capacity = expected.unwrap_or(0).min(Self::MAX_RESERVE);
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Append received bytes.
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Bytes collected.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Take the collected bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

/// Pixel data of a completed scan, owned by the caller.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    /// Id of the session that produced the image
    pub session: Uuid,
    /// Device the image came from
    pub device: String,
    /// Geometry of the first frame
    pub geometry: ScanParameters,
    /// Frames received; three for a three-pass color scan
    pub frames: usize,
    /// Pixel data of all frames in arrival order
    pub data: Vec<u8>,
    /// Completion time
    pub captured_at: DateTime<Utc>,
    lines: usize,
}

impl CapturedImage {
    /// Lines actually received, counting a trailing partial line.
    ///
    /// May differ from the announced height; devices that can't tell the
    /// height in advance announce none.
    pub fn lines(&self) -> usize {
        self.lines
    }
}

/// Runtime state of one scan.
///
/// Created when the scan starts and consumed when it finishes; its buffer is
/// dropped with it unless the scan completes.
#[derive(Debug)]
pub struct CaptureSession {
    /// Unique id, attached to every log line of the session
    pub id: Uuid,
    device: String,
    first: Option<ScanParameters>,
    current: Option<ScanParameters>,
    frames: usize,
    frame_bytes: usize,
    first_frame_bytes: usize,
    buffer: FrameBuffer,
}

impl CaptureSession {
    /// Session for `device` with an empty buffer.
    pub fn new(device: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            device: device.to_string(),
            first: None,
            current: None,
            frames: 0,
            frame_bytes: 0,
            first_frame_bytes: 0,
            buffer: FrameBuffer::default(),
        }
    }

    /// Frames begun so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Bytes received over all frames.
    pub fn total_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Accept the geometry of the next frame.
    pub fn begin_frame(&mut self, params: ScanParameters) -> AppResult<()> {
        check_frame(self.first.as_ref(), &params)
            .map_err(|reason| ScanError::FrameAccept { reason })?;

        if self.first.is_none() {
            self.first = Some(params);
            self.buffer = FrameBuffer::with_expected(params.expected_bytes());
        } else if self.frames == 1 {
            self.first_frame_bytes = self.frame_bytes;
        }
        self.current = Some(params);
        self.frames += 1;
        self.frame_bytes = 0;
        Ok(())
    }

    /// Append a chunk of the running frame and report progress.
    pub fn append(&mut self, bytes: &[u8]) -> Progress {
        self.buffer.append(bytes);
        self.frame_bytes += bytes.len();
        self.progress()
    }

    fn progress(&self) -> Progress {
        match self.current.and_then(|p| p.expected_bytes()) {
            Some(expected) if expected > 0 => {
                let percent = (self.frame_bytes as u128 * 100 / expected as u128).min(100);
                Progress::Percent(percent as u8)
            }
            _ => Progress::Bytes(self.buffer.len()),
        }
    }

    /// Hand the buffer over; an empty buffer is a failure, not an empty image.
    pub fn finish(self) -> AppResult<CapturedImage> {
        let geometry = self.first.ok_or(ScanError::NoData)?;
        if self.buffer.is_empty() {
            return Err(ScanError::NoData);
        }

        let first_frame_bytes = if self.frames == 1 {
            self.frame_bytes
        } else {
            self.first_frame_bytes
        };
        let lines = match geometry.bytes_per_line {
            0 => 0,
            bpl => first_frame_bytes.div_ceil(bpl),
        };

        Ok(CapturedImage {
            session: self.id,
            device: self.device,
            geometry,
            frames: self.frames,
            data: self.buffer.into_inner(),
            captured_at: Utc::now(),
            lines,
        })
    }
}

/// Checks that a frame can be decoded and, for follow-up frames, that it fits
/// the frames before it.
pub fn check_frame(first: Option<&ScanParameters>, next: &ScanParameters) -> Result<(), String> {
    if let FrameFormat::Other(id) = next.format {
        return Err(format!("unknown frame format {}", id));
    }
    if !matches!(next.depth, 1 | 8 | 16) {
        return Err(format!(
            "unsupported image depth {} bits per pixel",
            next.depth
        ));
    }
    if next.pixels_per_line == 0 || next.bytes_per_line == 0 {
        return Err("frame has no pixels".to_string());
    }
    if matches!(next.format, FrameFormat::Gray | FrameFormat::Rgb) && !next.last_frame {
        return Err(format!("{:?} frame must be the last frame", next.format));
    }

    if let Some(first) = first {
        if !next.format.is_single_channel() || !first.format.is_single_channel() {
            return Err(format!(
                "unexpected {:?} frame after {:?} frame",
                next.format, first.format
            ));
        }
        if next.pixels_per_line != first.pixels_per_line || next.depth != first.depth {
            return Err(format!(
                "frame geometry changed from {}px/{}bit to {}px/{}bit",
                first.pixels_per_line, first.depth, next.pixels_per_line, next.depth
            ));
        }
    }
    Ok(())
}
