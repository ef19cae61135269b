// 播放器核心模块

pub mod riff;
pub mod demuxer;
pub mod demuxer_source;
pub mod decoder;
pub mod frame_buffer;
pub mod audio_output;
pub mod display;
pub mod playback_thread;
pub mod manager;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use demuxer::{ContainerHeader, Demuxer, MainHeader, VideoStreamInfo};
pub use demuxer_source::DemuxerSource;
pub use decoder::MjpegDecoder;
pub use frame_buffer::{frame_buffer_pair, FrameBuffer, FrameConsumer, FrameProducer};
pub use audio_output::{AudioFeed, AudioSink, CpalAudioSink, NullAudioSink};
pub use display::{DisplaySink, NullDisplay};
pub use manager::{PlaybackManager, PlayerCallbacks};
