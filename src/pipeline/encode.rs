//! Transcoding: raw intermediate → final MP3/MP4 through an external encoder.
//!
//! We shell out to the system `ffmpeg` binary rather than linking libav*:
//! no native dev headers are needed to build, and the argument profiles stay
//! byte-for-byte what the artifacts have always been encoded with.
//!
//! [`MediaEncoder`] is the seam the dispatcher talks to. It does two things:
//! open a pipe that raw BGR frames are written into (the video
//! intermediate), and transcode a finished intermediate with a fixed
//! [`TranscodeProfile`].

use crate::config::ConversionMode;
use crate::error::Pdf2MediaError;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use tracing::{debug, info};

/// Geometry of a raw video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoFormat {
    /// Bytes in one packed `bgr24` frame.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Fixed encoder argument profile for each final artifact type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeProfile {
    /// Wind soundscape.
    WindMp3,
    /// BPM pulse train.
    BpmMp3,
    /// All video modes.
    H264,
}

impl TranscodeProfile {
    /// The profile every artifact of `mode` is encoded with.
    pub fn for_mode(mode: ConversionMode) -> Self {
        match mode {
            ConversionMode::Wind => TranscodeProfile::WindMp3,
            ConversionMode::Bpm => TranscodeProfile::BpmMp3,
            ConversionMode::Rgb | ConversionMode::Clouds | ConversionMode::Text | ConversionMode::Slideshow => {
                TranscodeProfile::H264
            }
        }
    }

    /// Output arguments placed between `-i <input>` and the output path.
    pub fn args(self) -> &'static [&'static str] {
        match self {
            TranscodeProfile::WindMp3 => &["-ab", "192k"],
            TranscodeProfile::BpmMp3 => &["-vn", "-ar", "48000", "-ac", "2", "-b:a", "320k"],
            TranscodeProfile::H264 => &["-c:v", "libx264", "-pix_fmt", "yuv420p"],
        }
    }
}

/// Receives raw frames for the video intermediate.
pub trait FrameSink: Send {
    /// Append one packed `bgr24` frame.
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), Pdf2MediaError>;

    /// Close the stream and wait for the intermediate to be fully written.
    fn finish(self: Box<Self>) -> Result<(), Pdf2MediaError>;
}

/// The external encoder.
pub trait MediaEncoder: Send + Sync {
    /// Start writing a raw video intermediate at `path`.
    fn open_raw_video(&self, path: &Path, format: VideoFormat) -> Result<Box<dyn FrameSink>, Pdf2MediaError>;

    /// Encode `input` into `output` with `profile`.
    fn transcode(&self, input: &Path, output: &Path, profile: TranscodeProfile) -> Result<(), Pdf2MediaError>;
}

/// [`MediaEncoder`] driving an `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-y", "-hide_banner", "-loglevel", "error"]);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> Pdf2MediaError {
        Pdf2MediaError::EncoderSpawnFailed {
            program: self.program.display().to_string(),
            detail: e.to_string(),
        }
    }

    /// Arguments for piping `bgr24` frames into an MPEG-4 intermediate.
    pub fn raw_video_args(format: VideoFormat) -> Vec<String> {
        vec![
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "bgr24".into(),
            "-s".into(),
            format!("{}x{}", format.width, format.height),
            "-r".into(),
            format.fps.to_string(),
            "-i".into(),
            "pipe:0".into(),
            "-an".into(),
            "-c:v".into(),
            "mpeg4".into(),
            "-q:v".into(),
            "2".into(),
        ]
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl MediaEncoder for FfmpegEncoder {
    fn open_raw_video(&self, path: &Path, format: VideoFormat) -> Result<Box<dyn FrameSink>, Pdf2MediaError> {
        let mut cmd = self.command();
        cmd.args(Self::raw_video_args(format))
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        debug!("Spawning raw video encoder: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Pdf2MediaError::Internal("failed to open ffmpeg stdin".into()))?;

        Ok(Box::new(FfmpegFrameSink {
            output: path.to_path_buf(),
            frame_len: format.frame_len(),
            child: Some(child),
            stdin: Some(stdin),
        }))
    }

    fn transcode(&self, input: &Path, output: &Path, profile: TranscodeProfile) -> Result<(), Pdf2MediaError> {
        let mut cmd = self.command();
        cmd.arg("-i")
            .arg(input)
            .args(profile.args())
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        info!("Transcoding {} → {} ({:?})", input.display(), output.display(), profile);
        debug!("Encoder command: {:?}", cmd);

        let result = cmd.output().map_err(|e| self.spawn_error(e))?;
        if !result.status.success() {
            return Err(Pdf2MediaError::EncoderFailed {
                output: output.to_path_buf(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

struct FfmpegFrameSink {
    output: PathBuf,
    frame_len: usize,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl FrameSink for FfmpegFrameSink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), Pdf2MediaError> {
        if frame.len() != self.frame_len {
            return Err(Pdf2MediaError::Internal(format!(
                "frame size mismatch: got {} bytes, expected {}",
                frame.len(),
                self.frame_len
            )));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(Pdf2MediaError::Internal("raw video stream already closed".into()));
        };
        stdin
            .write_all(frame)
            .map_err(|e| Pdf2MediaError::render(&self.output, format!("encoder pipe closed: {e}")))
    }

    fn finish(mut self: Box<Self>) -> Result<(), Pdf2MediaError> {
        drop(self.stdin.take());
        let child = self
            .child
            .take()
            .ok_or_else(|| Pdf2MediaError::Internal("raw video encoder already finished".into()))?;
        let output = child
            .wait_with_output()
            .map_err(|e| Pdf2MediaError::render(&self.output, format!("waiting for encoder: {e}")))?;
        if !output.status.success() {
            return Err(Pdf2MediaError::EncoderFailed {
                output: self.output.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl Drop for FfmpegFrameSink {
    fn drop(&mut self) {
        // An abandoned sink (render error, cancellation) must not leave a
        // zombie encoder behind.
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_match_fixed_arguments() {
        assert_eq!(TranscodeProfile::WindMp3.args(), &["-ab", "192k"]);
        assert_eq!(
            TranscodeProfile::BpmMp3.args(),
            &["-vn", "-ar", "48000", "-ac", "2", "-b:a", "320k"]
        );
        assert_eq!(
            TranscodeProfile::H264.args(),
            &["-c:v", "libx264", "-pix_fmt", "yuv420p"]
        );
    }

    #[test]
    fn raw_video_args_describe_the_pipe() {
        let args = FfmpegEncoder::raw_video_args(VideoFormat {
            width: 520,
            height: 520,
            fps: 25,
        });
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pix_fmt bgr24 -s 520x520 -r 25 -i pipe:0"));
        assert!(joined.ends_with("-c:v mpeg4 -q:v 2"));
    }

    #[test]
    fn frame_len_is_three_bytes_per_pixel() {
        let f = VideoFormat {
            width: 600,
            height: 225,
            fps: 30,
        };
        assert_eq!(f.frame_len(), 600 * 225 * 3);
    }

    #[test]
    fn missing_binary_is_spawn_failure() {
        let enc = FfmpegEncoder::new("/nonexistent/ffmpeg-binary");
        let err = enc
            .transcode(Path::new("a.wav"), Path::new("a.mp3"), TranscodeProfile::BpmMp3)
            .unwrap_err();
        assert!(matches!(err, Pdf2MediaError::EncoderSpawnFailed { .. }));
    }
}
