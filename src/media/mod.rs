//! Media tooling: ffprobe inspection and ffmpeg HLS transcoding.

pub mod probe;
pub mod transcode;

pub use probe::{MediaMetadata, ProbeError, is_video_file, probe_media_file};
pub use transcode::{
    FfmpegTranscoder, HlsSettings, MockTranscoder, TranscodeError, Transcoder,
};
