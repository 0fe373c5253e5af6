use std::{fmt, path::Path, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::*;

/// Ways the ffprobe description of a file can fail to make sense.
#[derive(Debug, Deserialize, Serialize, Clone, Error)]
pub enum VideoInfoError {
    #[error("ffprobe output is not valid json: {0}")]
    JsonError(String),
    #[error("ffprobe reported a malformed integer: {0}")]
    ParseIntError(String),
    #[error("ffprobe reported a malformed number: {0}")]
    ParseFloatError(String),
    #[error("unsupported rotation: {0}")]
    Rotation(String),
    #[error("invalid frame rate: {0}")]
    FrameRate(String),
}

impl From<serde_json::Error> for VideoInfoError {
    fn from(e: serde_json::Error) -> Self {
        // serde_json quotes the offending input, which can be huge.
        Self::JsonError(e.to_string().chars().take(500).collect())
    }
}

impl From<std::num::ParseIntError> for VideoInfoError {
    fn from(e: std::num::ParseIntError) -> Self {
        Self::ParseIntError(e.to_string())
    }
}

impl From<std::num::ParseFloatError> for VideoInfoError {
    fn from(e: std::num::ParseFloatError) -> Self {
        Self::ParseFloatError(e.to_string())
    }
}

/// A frame rate as the rational number ffprobe reports, e.g. `30000/1001`.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize, Hash)]
pub struct FrameRate {
    num: u32,
    den: u32,
}

impl FrameRate {
    /// Returns `None` if either part is zero (ffprobe reports `0/0` for unknown rates).
    pub fn new(num: u32, den: u32) -> Option<Self> {
        (num != 0 && den != 0).then_some(Self { num, den })
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn den(&self) -> u32 {
        self.den
    }

    pub fn as_f64(&self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self { num: 25, den: 1 }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for FrameRate {
    type Err = VideoInfoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (num, den) = match s.split_once('/') {
            Some((num, den)) => (num.trim().parse()?, den.trim().parse()?),
            None => (s.parse()?, 1),
        };

        Self::new(num, den).ok_or_else(|| VideoInfoError::FrameRate(s.to_string()))
    }
}

// Stream width/height are stored unrotated, but ffmpeg rotates every decoded frame
// according to the display matrix.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug, Copy, Serialize, Deserialize, Hash, Default)]
enum Rotation {
    #[default]
    Upright,
    QuarterTurn,
    HalfTurn,
    ThreeQuarterTurn,
}
use Rotation::*;

/// The video metadata that can be obtained by using ffprobe.
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct VideoInfo {
    resolution: (u32, u32),
    frame_rate: Option<FrameRate>,
    duration: Option<Duration>,
    num_frames: Option<u64>,
    file_size: Option<u64>,
    pix_fmt: Option<String>,
    codec_name: Option<String>,
}

impl VideoInfo {
    /// Use ffprobe to get the resolution (and other properties) of the first video stream in a file.
    ///
    /// # errors
    /// * The file does not exist, cannot be read, or is not recognized by ffprobe
    /// * The file contains no video stream
    /// * The video stream does not declare a non-zero width and height
    /// * The output from ffprobe could not be parsed as JSON
    pub fn new<P>(src_path: P) -> Result<Self, FfmpegError>
    where
        P: AsRef<Path>,
    {
        Self::with_timeout(src_path, Duration::from_secs(FFPROBE_TIMEOUT_SECS))
    }

    pub fn with_timeout<P>(src_path: P, timeout: Duration) -> Result<Self, FfmpegError>
    where
        P: AsRef<Path>,
    {
        let src_path = src_path.as_ref();

        // ffprobe would also fail here, but checking first gives a far clearer message.
        if !src_path.is_file() {
            return Err(FfmpegError::FileNotFound(src_path.display().to_string()));
        }

        let stats_string = get_video_stats_with_timeout(src_path, timeout)?;
        let info = Self::from_ffprobe_json(&stats_string)?;

        debug!(target: "probe",
            "{}: {}x{} @ {} fps ({} frames declared)",
            src_path.display(),
            info.resolution.0,
            info.resolution.1,
            info.frame_rate.map(|r| r.to_string()).unwrap_or_else(|| "?".to_string()),
            info.num_frames.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string()),
        );

        Ok(info)
    }

    /// Parse the output of `ffprobe -show_format -show_streams -print_format json`.
    pub fn from_ffprobe_json(stats_string: &str) -> Result<Self, FfmpegError> {
        let stats_parsed: Value =
            serde_json::from_str(stats_string).map_err(VideoInfoError::from)?;

        let video_stream = Self::first_video(&stats_parsed).ok_or(FfmpegError::NoVideoStream)?;

        // quarter turns swap the axes of the decoded frames
        let rotation = Self::rotation(video_stream)?;

        let resolution = {
            let width = Self::u32_field(video_stream, "width").unwrap_or(0);
            let height = Self::u32_field(video_stream, "height").unwrap_or(0);
            if width == 0 || height == 0 {
                return Err(FfmpegError::InvalidResolution);
            }

            if matches!(rotation, Upright | HalfTurn) {
                (width, height)
            } else {
                (height, width)
            }
        };

        // r_frame_rate of a variable rate stream is often a timebase multiple such as 90000/1,
        // so it is only used when no average is known.
        let frame_rate = ["avg_frame_rate", "r_frame_rate"]
            .iter()
            .filter_map(|field| video_stream[*field].as_str())
            .find_map(|rate| rate.parse::<FrameRate>().ok());

        // ffprobe writes "N/A" when it cannot work the duration out.
        let duration = [&video_stream["duration"], &stats_parsed["format"]["duration"]]
            .iter()
            .filter_map(|d| d.as_str())
            .filter_map(|d| d.parse::<f64>().ok())
            .find(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64);

        let num_frames = match &video_stream["nb_frames"] {
            Value::String(n) => n.parse().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        };

        let file_size = match &stats_parsed["format"]["size"] {
            Value::String(s) => Some(s.parse().map_err(VideoInfoError::from)?),
            _ => None,
        };

        Ok(VideoInfo {
            resolution,
            frame_rate,
            duration,
            num_frames,
            file_size,
            pix_fmt: video_stream["pix_fmt"].as_str().map(str::to_string),
            codec_name: video_stream["codec_name"].as_str().map(str::to_string),
        })
    }

    /// Width and height of the frames ffmpeg will decode, i.e. after any rotation is applied.
    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn frame_rate(&self) -> Option<FrameRate> {
        self.frame_rate
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// The number of frames, if the container declares it.
    pub fn num_frames(&self) -> Option<u64> {
        self.num_frames
    }

    /// The size of the file in bytes
    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    pub fn pix_fmt(&self) -> Option<&str> {
        self.pix_fmt.as_deref()
    }

    pub fn codec_name(&self) -> Option<&str> {
        self.codec_name.as_deref()
    }

    fn rotation(video_stream: &Value) -> Result<Rotation, VideoInfoError> {
        //extract the rotation from the JSON. Older ffprobe versions put it in the stream tags.
        let rotation = video_stream
            .get("side_data_list")
            .and_then(|list| list.as_array())
            .and_then(|list| list.iter().find_map(|side_data| side_data.get("rotation")))
            .or_else(|| video_stream.get("tags").and_then(|tags| tags.get("rotate")));

        //if the rotation is found, it may either be a JSON String or JSON number, so unify
        //them here.
        let rotation = match rotation {
            None => None,
            Some(Value::Number(val)) => val.as_i64(),
            Some(Value::String(val)) => Some(val.trim().parse::<i64>()?),
            Some(other) => return Err(VideoInfoError::Rotation(other.to_string())),
        };

        match rotation {
            None | Some(0) => Ok(Upright),
            Some(90) | Some(-270) => Ok(QuarterTurn),
            Some(180) | Some(-180) => Ok(HalfTurn),
            Some(-90) | Some(270) => Ok(ThreeQuarterTurn),
            Some(other) => Err(VideoInfoError::Rotation(other.to_string())),
        }
    }

    fn first_video(stats_parsed: &Value) -> Option<&Value> {
        stats_parsed["streams"]
            .as_array()?
            .iter()
            .find(|s| s["codec_type"].as_str() == Some("video"))
    }

    fn u32_field(stream: &Value, field_name: &str) -> Option<u32> {
        stream[field_name]
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
    }
}
