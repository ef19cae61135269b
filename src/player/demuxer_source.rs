use crate::core::{FrameChunk, Result};
use crate::player::demuxer::ContainerHeader;

/// Demuxer 数据源抽象接口
///
/// 播放线程只通过这个 trait 访问容器，测试中可以换成内存数据源。
/// 所有读取共享同一个游标，因此同一时刻只能有一个读取者。
pub trait DemuxerSource: Send {
    /// 读取下一个视频块
    ///
    /// 返回：
    /// - Ok(Some(chunk)): 成功读取一帧（借用内部缓冲区，下次读取前有效）
    /// - Ok(None): 到达数据区末尾
    /// - Err(e): 读取错误
    fn read_video_chunk(&mut self) -> Result<Option<FrameChunk<'_>>>;

    /// 读取下一个音频块，返回写入 dest 的字节数
    fn read_audio_chunk(&mut self, dest: &mut [u8]) -> Result<Option<usize>>;

    /// 读取下一个视频块之前交错的音频块；遇到视频块时返回 None 且不消费它
    fn read_interleaved_audio_chunk(&mut self, dest: &mut [u8]) -> Result<Option<usize>>;

    /// Seek 到指定帧号
    fn seek(&mut self, frame_index: u32) -> Result<()>;

    /// 回到第 0 帧
    fn rewind(&mut self) -> Result<()>;

    /// 获取容器头信息
    fn header(&self) -> &ContainerHeader;

    /// 下一次读取的帧号
    fn current_frame(&self) -> u32;

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;
}
