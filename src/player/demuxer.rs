use crate::core::{AudioFormat, FrameChunk, PlayerError, Result, VideoChunkKind};
use crate::player::demuxer_source::DemuxerSource;
use crate::player::riff::{ChunkTag, FourCc, StreamKind};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const MAX_LIST_DEPTH: usize = 8;

/// avih 主头
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MainHeader {
    pub micro_sec_per_frame: u32,
    pub max_bytes_per_sec: u32,
    pub total_frames: u32,
    pub streams: u32,
    pub suggested_buffer_size: u32,
    pub width: u32,
    pub height: u32,
}

/// 视频流描述（strh + strf/BITMAPINFOHEADER）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoStreamInfo {
    pub handler: FourCc,
    pub scale: u32,
    pub rate: u32,
    pub length: u32,
    pub width: u32,
    pub height: u32,
    pub bit_count: u16,
    pub compression: FourCc,
    pub format_found: bool,
}

/// 解析后的容器头，打开后不再变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub main: MainHeader,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioFormat>,
    pub payload_offset: u64,
    pub payload_len: u64,
}

impl ContainerHeader {
    /// 帧间隔（微秒）：主头优先，其次视频流 rate/scale；都为 0 时返回 0
    pub fn frame_interval_us(&self) -> u32 {
        if self.main.micro_sec_per_frame > 0 {
            return self.main.micro_sec_per_frame;
        }
        match self.video {
            Some(v) if v.rate > 0 && v.scale > 0 => {
                let us = (v.scale as u64 * 1_000_000 + v.rate as u64 / 2) / v.rate as u64;
                us.min(u32::MAX as u64) as u32
            }
            _ => 0,
        }
    }

    /// 帧率（四舍五入），帧间隔为 0 时使用 default_fps
    pub fn fps_or(&self, default_fps: u16) -> u16 {
        let interval = self.frame_interval_us() as u64;
        if interval == 0 {
            return default_fps;
        }
        let fps = (1_000_000 + interval / 2) / interval;
        fps.clamp(1, u16::MAX as u64) as u16
    }

    /// 总帧数：主头优先，其次视频流长度
    pub fn frame_count(&self) -> u32 {
        if self.main.total_frames > 0 {
            return self.main.total_frames;
        }
        self.video.map(|v| v.length).unwrap_or(0)
    }

    /// 画面尺寸：视频流格式优先，其次主头
    pub fn dimensions(&self) -> (u32, u32) {
        match self.video {
            Some(v) if v.format_found => (v.width, v.height),
            _ => (self.main.width, self.main.height),
        }
    }
}

/// 解封装器 - 负责读取 AVI 文件并分离音视频块
///
/// 头部解析在打开时一次完成；之后所有读取共享一个文件游标，
/// 游标只在 payload（movi）区内前进。
pub struct Demuxer<R> {
    reader: R,
    header: ContainerHeader,
    cursor: u64,
    payload_end: u64,
    current_frame: u32,
    chunk_buf: Vec<u8>,
    source_path: String,
}

impl Demuxer<BufReader<File>> {
    /// 打开媒体文件
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("正在打开文件: {}", path.display());

        let file = File::open(path)?;
        Demuxer::from_reader(BufReader::new(file), path.display().to_string())
    }
}

impl<R: Read + Seek> Demuxer<R> {
    /// 从任意可 seek 的数据源解析容器
    pub fn from_reader(reader: R, source_path: impl Into<String>) -> Result<Self> {
        let mut demuxer = Self {
            reader,
            header: ContainerHeader {
                main: MainHeader::default(),
                video: None,
                audio: None,
                payload_offset: 0,
                payload_len: 0,
            },
            cursor: 0,
            payload_end: 0,
            current_frame: 0,
            chunk_buf: Vec::new(),
            source_path: source_path.into(),
        };

        demuxer.reader.seek(SeekFrom::Start(0))?;
        demuxer.parse_header().map_err(|e| match e {
            PlayerError::IoError(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                PlayerError::InvalidFormat("头部数据被截断".to_string())
            }
            other => other,
        })?;

        demuxer.payload_end = demuxer.header.payload_offset + demuxer.header.payload_len;
        demuxer.reposition(demuxer.header.payload_offset)?;

        let (width, height) = demuxer.header.dimensions();
        info!(
            "✅ AVI 打开成功: {}x{}, {} 帧, 帧间隔 {}us, movi @{} ({} 字节)",
            width,
            height,
            demuxer.header.frame_count(),
            demuxer.header.frame_interval_us(),
            demuxer.header.payload_offset,
            demuxer.header.payload_len
        );
        if let Some(audio) = demuxer.header.audio {
            info!(
                "🔊 音频流: {} Hz, {} 声道, {} bit, format=0x{:04X}",
                audio.sample_rate, audio.channels, audio.bits_per_sample, audio.format_tag
            );
        }

        Ok(demuxer)
    }

    // ==================== 头部解析 ====================

    fn parse_header(&mut self) -> Result<()> {
        let riff = self.read_fourcc()?;
        let riff_size = self.read_u32()?;
        let form = self.read_fourcc()?;
        if riff != FourCc::RIFF {
            return Err(PlayerError::InvalidFormat(format!("外层标签不是 RIFF: {}", riff)));
        }
        if form != FourCc::AVI {
            return Err(PlayerError::InvalidFormat(format!("RIFF 格式标签不是 AVI: {}", form)));
        }
        debug!("RIFF AVI, 声明大小 {} 字节", riff_size);

        let mut current_stream = None;
        loop {
            let (tag, size) = match self.read_chunk_header() {
                Ok(header) => header,
                Err(PlayerError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            };
            let body_start = self.cursor;

            if ChunkTag::classify(tag, current_stream) == ChunkTag::ListContainer {
                if self.parse_list(size, 0, &mut current_stream)? {
                    return Ok(());
                }
            }
            self.reposition(padded_end(body_start, size))?;
        }

        Err(PlayerError::InvalidFormat("未找到 movi 数据区".to_string()))
    }

    /// 解析 LIST 块；找到 movi 时返回 true（此时游标停在 movi 数据起点）
    fn parse_list(
        &mut self,
        list_size: u32,
        depth: usize,
        current_stream: &mut Option<StreamKind>,
    ) -> Result<bool> {
        if depth >= MAX_LIST_DEPTH {
            return Err(PlayerError::InvalidFormat("LIST 嵌套过深".to_string()));
        }
        if list_size < 4 {
            return Err(PlayerError::InvalidFormat(format!("LIST 大小无效: {}", list_size)));
        }

        let list_type = self.read_fourcc()?;
        if list_type == FourCc::MOVI {
            self.header.payload_offset = self.cursor;
            self.header.payload_len = (list_size - 4) as u64;
            info!(
                "找到 'movi' 数据区: offset {}, size {}",
                self.header.payload_offset, self.header.payload_len
            );
            return Ok(true);
        }

        let list_end = self.cursor + (list_size - 4) as u64;
        while self.cursor + 8 <= list_end {
            let (tag, size) = self.read_chunk_header()?;
            let body_start = self.cursor;

            match ChunkTag::classify(tag, *current_stream) {
                ChunkTag::MainHeader => self.parse_avih(size)?,
                ChunkTag::StreamHeader => *current_stream = self.parse_strh(size)?,
                ChunkTag::StreamFormatVideo => self.parse_strf_video(size)?,
                ChunkTag::StreamFormatAudio => self.parse_strf_audio(size)?,
                ChunkTag::ListContainer => {
                    if self.parse_list(size, depth + 1, current_stream)? {
                        return Ok(true);
                    }
                }
                ChunkTag::VideoChunk { .. } | ChunkTag::AudioChunk | ChunkTag::Unknown(_) => {
                    debug!("跳过头部块 {} ({} 字节)", tag, size);
                }
            }

            self.reposition(padded_end(body_start, size))?;
        }

        Ok(false)
    }

    fn parse_avih(&mut self, size: u32) -> Result<()> {
        require_size("avih", size, 40)?;
        let micro_sec_per_frame = self.read_u32()?;
        let max_bytes_per_sec = self.read_u32()?;
        let _padding_granularity = self.read_u32()?;
        let _flags = self.read_u32()?;
        let total_frames = self.read_u32()?;
        let _initial_frames = self.read_u32()?;
        let streams = self.read_u32()?;
        let suggested_buffer_size = self.read_u32()?;
        let width = self.read_u32()?;
        let height = self.read_u32()?;

        self.header.main = MainHeader {
            micro_sec_per_frame,
            max_bytes_per_sec,
            total_frames,
            streams,
            suggested_buffer_size,
            width,
            height,
        };
        info!(
            "AVI Header: {}x{}, {} 帧, {} 个流, {}us/帧",
            width, height, total_frames, streams, micro_sec_per_frame
        );
        Ok(())
    }

    /// 返回后续 strf 应按哪种流解析；只采集第一条视频流和第一条音频流
    fn parse_strh(&mut self, size: u32) -> Result<Option<StreamKind>> {
        require_size("strh", size, 48)?;
        let fcc_type = self.read_fourcc()?;
        let handler = self.read_fourcc()?;
        let _flags = self.read_u32()?;
        let _priority_language = self.read_u32()?;
        let _initial_frames = self.read_u32()?;
        let scale = self.read_u32()?;
        let rate = self.read_u32()?;
        let _start = self.read_u32()?;
        let length = self.read_u32()?;

        match StreamKind::from(fcc_type) {
            StreamKind::Video if self.header.video.is_none() => {
                info!("视频流: {} 帧, rate={}/{}, handler={}", length, rate, scale, handler);
                self.header.video = Some(VideoStreamInfo {
                    handler,
                    scale,
                    rate,
                    length,
                    width: 0,
                    height: 0,
                    bit_count: 0,
                    compression: handler,
                    format_found: false,
                });
                Ok(Some(StreamKind::Video))
            }
            StreamKind::Audio if self.header.audio.is_none() => {
                info!("音频流: rate={}/{}", rate, scale);
                Ok(Some(StreamKind::Audio))
            }
            other => {
                warn!("⚠️  忽略额外的流: {:?}", other);
                Ok(None)
            }
        }
    }

    fn parse_strf_video(&mut self, size: u32) -> Result<()> {
        require_size("strf(video)", size, 20)?;
        let _bi_size = self.read_u32()?;
        let width = self.read_u32()? as i32;
        let height = self.read_u32()? as i32;
        let _planes = self.read_u16()?;
        let bit_count = self.read_u16()?;
        let compression = self.read_fourcc()?;

        if let Some(video) = self.header.video.as_mut() {
            video.width = width.unsigned_abs();
            video.height = height.unsigned_abs(); // 负高度表示自上而下存储
            video.bit_count = bit_count;
            video.compression = compression;
            video.format_found = true;
        }
        info!(
            "视频格式: {}x{}, {}-bit, compression={}",
            width.unsigned_abs(),
            height.unsigned_abs(),
            bit_count,
            compression
        );
        Ok(())
    }

    fn parse_strf_audio(&mut self, size: u32) -> Result<()> {
        require_size("strf(audio)", size, 16)?;
        let format = AudioFormat {
            format_tag: self.read_u16()?,
            channels: self.read_u16()?,
            sample_rate: self.read_u32()?,
            avg_bytes_per_sec: self.read_u32()?,
            block_align: self.read_u16()?,
            bits_per_sample: self.read_u16()?,
        };
        info!(
            "音频格式: {} Hz, {} ch, {}-bit, format=0x{:04X}",
            format.sample_rate, format.channels, format.bits_per_sample, format.format_tag
        );
        self.header.audio = Some(format);
        Ok(())
    }

    // ==================== payload 读取 ====================

    /// 读取下一个 payload 块头；到达 movi 末尾或文件末尾时返回 None
    ///
    /// 'LIST rec ' 分组会被展开（只消费列表头），其他 LIST 整体跳过。
    fn next_payload_chunk(&mut self) -> Result<Option<(ChunkTag, FourCc, u32)>> {
        loop {
            if self.cursor + 8 > self.payload_end {
                return Ok(None);
            }
            let (tag, size) = match self.read_chunk_header() {
                Ok(header) => header,
                Err(PlayerError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None)
                }
                Err(e) => return Err(e),
            };

            if self.cursor + size as u64 > self.payload_end {
                return Err(PlayerError::InvalidFormat(format!(
                    "块 {} ({} 字节) 超出 movi 数据区",
                    tag, size
                )));
            }

            match ChunkTag::classify_payload(tag) {
                ChunkTag::ListContainer => {
                    if size < 4 {
                        return Err(PlayerError::InvalidFormat(format!("LIST 大小无效: {}", size)));
                    }
                    let list_type = self.read_fourcc()?;
                    if list_type != FourCc::REC {
                        self.skip_body(size - 4)?;
                        self.skip_padding(size)?;
                    }
                }
                kind => return Ok(Some((kind, tag, size))),
            }
        }
    }

    /// 读取下一个视频块（压缩或非压缩），其余块按声明大小跳过
    pub fn read_next_video_chunk(&mut self) -> Result<Option<FrameChunk<'_>>> {
        loop {
            let Some((kind, tag, size)) = self.next_payload_chunk()? else {
                return Ok(None);
            };

            match kind {
                ChunkTag::VideoChunk { compressed } => {
                    if size == 0 {
                        debug!("跳过空视频块 {}（丢帧标记）", tag);
                        continue;
                    }
                    self.fill_chunk_buf(size)?;
                    self.skip_padding(size)?;

                    let frame_index = self.current_frame;
                    self.current_frame += 1;
                    let pts_us = frame_index as u64 * self.header.frame_interval_us() as u64;
                    let kind = if compressed {
                        VideoChunkKind::Compressed
                    } else {
                        VideoChunkKind::Uncompressed
                    };

                    return Ok(Some(FrameChunk {
                        data: &self.chunk_buf,
                        frame_index,
                        pts_us,
                        kind,
                    }));
                }
                _ => {
                    self.skip_body(size)?;
                    self.skip_padding(size)?;
                }
            }
        }
    }

    /// 读取下一个音频块到 dest；超出 dest 的部分跳过，绝不写出缓冲区
    pub fn read_next_audio_chunk(&mut self, dest: &mut [u8]) -> Result<Option<usize>> {
        loop {
            let Some((kind, _tag, size)) = self.next_payload_chunk()? else {
                return Ok(None);
            };

            match kind {
                ChunkTag::AudioChunk => return self.read_audio_body(size, dest).map(Some),
                _ => {
                    self.skip_body(size)?;
                    self.skip_padding(size)?;
                }
            }
        }
    }

    /// 读取下一个视频块之前的音频块；遇到视频块时把游标退回到它的块头并返回 None
    pub fn read_interleaved_audio_chunk(&mut self, dest: &mut [u8]) -> Result<Option<usize>> {
        loop {
            let Some((kind, _tag, size)) = self.next_payload_chunk()? else {
                return Ok(None);
            };

            match kind {
                ChunkTag::AudioChunk => return self.read_audio_body(size, dest).map(Some),
                ChunkTag::VideoChunk { .. } if size > 0 => {
                    self.reposition(self.cursor - 8)?;
                    return Ok(None);
                }
                _ => {
                    self.skip_body(size)?;
                    self.skip_padding(size)?;
                }
            }
        }
    }

    /// 线性 seek：回到 movi 起点，逐块跳过视频块直到目标帧（不建索引）
    ///
    /// 失败时游标与帧号恢复到 seek 之前的位置。
    pub fn seek(&mut self, frame_index: u32) -> Result<()> {
        let saved_cursor = self.cursor;
        let saved_frame = self.current_frame;

        match self.scan_to_frame(frame_index) {
            Ok(true) => {
                debug!("Seek 完成: 帧 {} @ offset {}", frame_index, self.cursor);
                Ok(())
            }
            Ok(false) => {
                let available = self.current_frame;
                self.reposition(saved_cursor)?;
                self.current_frame = saved_frame;
                Err(PlayerError::SeekOutOfRange { target: frame_index, available })
            }
            Err(e) => {
                self.reposition(saved_cursor)?;
                self.current_frame = saved_frame;
                Err(e)
            }
        }
    }

    fn scan_to_frame(&mut self, frame_index: u32) -> Result<bool> {
        self.rewind()?;
        while self.current_frame < frame_index {
            let Some((kind, _tag, size)) = self.next_payload_chunk()? else {
                return Ok(false);
            };
            if matches!(kind, ChunkTag::VideoChunk { .. }) && size > 0 {
                self.current_frame += 1;
            }
            self.skip_body(size)?;
            self.skip_padding(size)?;
        }
        Ok(true)
    }

    /// 回到 movi 起点（帧 0）
    pub fn rewind(&mut self) -> Result<()> {
        self.reposition(self.header.payload_offset)?;
        self.current_frame = 0;
        Ok(())
    }

    /// 下一次读取将返回的帧号
    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn description(&self) -> String {
        self.source_path.clone()
    }

    // ==================== 底层读取 ====================

    fn fill_chunk_buf(&mut self, size: u32) -> Result<()> {
        let size = size as usize;
        self.chunk_buf.clear();
        self.chunk_buf.try_reserve(size).map_err(|e| {
            PlayerError::AllocationError(format!("无法分配 {} 字节的帧缓冲: {}", size, e))
        })?;
        self.chunk_buf.resize(size, 0);
        self.reader.read_exact(&mut self.chunk_buf)?;
        self.cursor += size as u64;
        Ok(())
    }

    fn read_audio_body(&mut self, size: u32, dest: &mut [u8]) -> Result<usize> {
        let read_len = (size as usize).min(dest.len());
        self.read_exact(&mut dest[..read_len])?;
        self.skip_body(size - read_len as u32)?;
        self.skip_padding(size)?;
        Ok(read_len)
    }

    fn read_chunk_header(&mut self) -> Result<(FourCc, u32)> {
        let tag = self.read_fourcc()?;
        let size = self.read_u32()?;
        Ok((tag, size))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf)?;
        self.cursor += buf.len() as u64;
        Ok(())
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_fourcc(&mut self) -> Result<FourCc> {
        self.read_u32().map(FourCc)
    }

    fn skip_body(&mut self, len: u32) -> Result<()> {
        if len > 0 {
            self.reader.seek(SeekFrom::Current(len as i64))?;
            self.cursor += len as u64;
        }
        Ok(())
    }

    fn skip_padding(&mut self, size: u32) -> Result<()> {
        self.skip_body(size & 1)
    }

    fn reposition(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.cursor = offset;
        Ok(())
    }
}

/// 块结束位置（含奇数大小的填充字节）
fn padded_end(body_start: u64, size: u32) -> u64 {
    body_start + size as u64 + (size & 1) as u64
}

fn require_size(what: &str, size: u32, min: u32) -> Result<()> {
    if size < min {
        return Err(PlayerError::InvalidFormat(format!(
            "{} 块过小: {} 字节（至少 {}）",
            what, size, min
        )));
    }
    Ok(())
}

// 实现 DemuxerSource trait
impl<R: Read + Seek + Send> DemuxerSource for Demuxer<R> {
    fn read_video_chunk(&mut self) -> Result<Option<FrameChunk<'_>>> {
        self.read_next_video_chunk()
    }

    fn read_audio_chunk(&mut self, dest: &mut [u8]) -> Result<Option<usize>> {
        self.read_next_audio_chunk(dest)
    }

    fn read_interleaved_audio_chunk(&mut self, dest: &mut [u8]) -> Result<Option<usize>> {
        Demuxer::read_interleaved_audio_chunk(self, dest)
    }

    fn seek(&mut self, frame_index: u32) -> Result<()> {
        Demuxer::seek(self, frame_index)
    }

    fn rewind(&mut self) -> Result<()> {
        Demuxer::rewind(self)
    }

    fn header(&self) -> &ContainerHeader {
        &self.header
    }

    fn current_frame(&self) -> u32 {
        self.current_frame
    }

    fn description(&self) -> String {
        format!("AVI Demuxer: {}", self.source_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::test_fixtures::{jpeg_frame, AviBuilder};
    use std::io::Cursor;

    fn open(bytes: Vec<u8>) -> Result<Demuxer<Cursor<Vec<u8>>>> {
        Demuxer::from_reader(Cursor::new(bytes), "memory")
    }

    #[test]
    fn test_header_fields_round_trip() {
        let bytes = AviBuilder::new(160, 120, 66_667)
            .with_audio(22_050, 1, 16)
            .frames(3)
            .build();
        let demuxer = open(bytes).unwrap();
        let header = demuxer.header();

        assert_eq!(header.main.micro_sec_per_frame, 66_667);
        assert_eq!(header.frame_count(), 3);
        assert_eq!(header.dimensions(), (160, 120));
        assert_eq!(header.fps_or(30), 15);
        let video = header.video.unwrap();
        assert_eq!(video.compression, FourCc::MJPG);
        let audio = header.audio.unwrap();
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.bits_per_sample, 16);
        assert_eq!(audio.block_align, 2);
    }

    #[test]
    fn test_sequential_reads_are_strictly_increasing() {
        let bytes = AviBuilder::new(16, 16, 40_000).with_audio(8_000, 1, 16).frames(10).build();
        let mut demuxer = open(bytes).unwrap();

        let mut last_pts = 0;
        for expected in 0..10u32 {
            let chunk = demuxer.read_next_video_chunk().unwrap().unwrap();
            assert_eq!(chunk.frame_index, expected);
            assert!(chunk.pts_us >= last_pts);
            assert_eq!(chunk.pts_us, expected as u64 * 40_000);
            assert!(!chunk.is_empty());
            last_pts = chunk.pts_us;
        }
        assert!(demuxer.read_next_video_chunk().unwrap().is_none());
    }

    #[test]
    fn test_video_payload_matches_fixture() {
        let frame = jpeg_frame(16, 16, 200);
        let bytes = AviBuilder::new(16, 16, 40_000).frame_data(vec![frame.clone()]).build();
        let mut demuxer = open(bytes).unwrap();

        let chunk = demuxer.read_next_video_chunk().unwrap().unwrap();
        assert_eq!(chunk.data, &frame[..]);
        assert_eq!(chunk.kind, VideoChunkKind::Compressed);
    }

    #[test]
    fn test_seek_then_read_returns_target() {
        let bytes = AviBuilder::new(16, 16, 66_667).with_audio(8_000, 1, 16).frames(150).build();
        let mut demuxer = open(bytes).unwrap();

        demuxer.seek(75).unwrap();
        assert_eq!(demuxer.current_frame(), 75);
        let chunk = demuxer.read_next_video_chunk().unwrap().unwrap();
        assert_eq!(chunk.frame_index, 75);

        // 向后 seek 同样有效
        demuxer.seek(3).unwrap();
        assert_eq!(demuxer.read_next_video_chunk().unwrap().unwrap().frame_index, 3);

        demuxer.seek(0).unwrap();
        assert_eq!(demuxer.read_next_video_chunk().unwrap().unwrap().frame_index, 0);
    }

    #[test]
    fn test_seek_every_frame() {
        let bytes = AviBuilder::new(8, 8, 40_000).with_audio(8_000, 1, 16).frames(12).build();
        let mut demuxer = open(bytes).unwrap();
        for n in 0..12 {
            demuxer.seek(n).unwrap();
            assert_eq!(demuxer.read_next_video_chunk().unwrap().unwrap().frame_index, n);
        }
    }

    #[test]
    fn test_seek_out_of_range_restores_cursor() {
        let bytes = AviBuilder::new(8, 8, 40_000).frames(5).build();
        let mut demuxer = open(bytes).unwrap();
        demuxer.read_next_video_chunk().unwrap();
        demuxer.read_next_video_chunk().unwrap();

        let err = demuxer.seek(9).unwrap_err();
        assert!(matches!(err, PlayerError::SeekOutOfRange { target: 9, available: 5 }));
        assert_eq!(demuxer.current_frame(), 2);
        assert_eq!(demuxer.read_next_video_chunk().unwrap().unwrap().frame_index, 2);
    }

    #[test]
    fn test_audio_read_truncates_to_dest() {
        let bytes = AviBuilder::new(8, 8, 40_000)
            .with_audio(8_000, 1, 16)
            .audio_chunk_len(101)
            .frames(2)
            .build();
        let mut demuxer = open(bytes).unwrap();

        let mut small = [0u8; 40];
        assert_eq!(demuxer.read_next_audio_chunk(&mut small).unwrap(), Some(40));
        // 剩余 61 字节及填充字节被跳过，下一个音频块仍然可以对齐读取
        let mut large = [0u8; 512];
        assert_eq!(demuxer.read_next_audio_chunk(&mut large).unwrap(), Some(101));
        assert_eq!(demuxer.read_next_audio_chunk(&mut large).unwrap(), None);
    }

    #[test]
    fn test_interleaved_audio_stops_before_video() {
        // 布局: [wb] [dc] [wb] [dc]
        let bytes = AviBuilder::new(8, 8, 40_000).with_audio(8_000, 1, 16).frames(2).build();
        let mut demuxer = open(bytes).unwrap();
        let mut buf = [0u8; 4096];

        assert!(demuxer.read_interleaved_audio_chunk(&mut buf).unwrap().is_some());
        assert!(demuxer.read_interleaved_audio_chunk(&mut buf).unwrap().is_none());
        assert_eq!(demuxer.read_next_video_chunk().unwrap().unwrap().frame_index, 0);
        assert!(demuxer.read_interleaved_audio_chunk(&mut buf).unwrap().is_some());
        assert_eq!(demuxer.read_next_video_chunk().unwrap().unwrap().frame_index, 1);
        assert!(demuxer.read_interleaved_audio_chunk(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_odd_sized_chunks_are_padded() {
        let frames = vec![vec![0xFF, 0xD8, 0x01], vec![0xFF, 0xD8, 0x02, 0x03, 0x04]];
        let bytes = AviBuilder::new(8, 8, 40_000).frame_data(frames).build();
        let mut demuxer = open(bytes).unwrap();

        assert_eq!(demuxer.read_next_video_chunk().unwrap().unwrap().data, &[0xFF, 0xD8, 0x01]);
        assert_eq!(
            demuxer.read_next_video_chunk().unwrap().unwrap().data,
            &[0xFF, 0xD8, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn test_rec_lists_and_zero_length_chunks() {
        let bytes = AviBuilder::new(8, 8, 40_000)
            .with_audio(8_000, 1, 16)
            .frames(4)
            .rec_lists(true)
            .drop_marker_after(1)
            .build();
        let mut demuxer = open(bytes).unwrap();

        for expected in 0..4 {
            let chunk = demuxer.read_next_video_chunk().unwrap().unwrap();
            assert_eq!(chunk.frame_index, expected);
        }
        assert!(demuxer.read_next_video_chunk().unwrap().is_none());
    }

    #[test]
    fn test_wrong_signature_is_invalid_format() {
        let mut bytes = AviBuilder::new(8, 8, 40_000).frames(1).build();
        bytes[0..4].copy_from_slice(b"RIFX");
        assert!(matches!(open(bytes), Err(PlayerError::InvalidFormat(_))));

        let mut bytes = AviBuilder::new(8, 8, 40_000).frames(1).build();
        bytes[8..12].copy_from_slice(b"WAVE");
        assert!(matches!(open(bytes), Err(PlayerError::InvalidFormat(_))));
    }

    #[test]
    fn test_missing_payload_is_invalid_format() {
        let bytes = AviBuilder::new(8, 8, 40_000).frames(1).without_payload().build();
        assert!(matches!(open(bytes), Err(PlayerError::InvalidFormat(_))));
    }

    #[test]
    fn test_truncated_file_is_invalid_format() {
        let bytes = AviBuilder::new(8, 8, 40_000).frames(1).build();
        assert!(matches!(open(bytes[..30].to_vec()), Err(PlayerError::InvalidFormat(_))));
        assert!(matches!(open(b"RIF".to_vec()), Err(PlayerError::InvalidFormat(_))));
    }

    #[test]
    fn test_short_payload_read_is_io_error() {
        let mut bytes = AviBuilder::new(8, 8, 40_000).frames(1).build();
        let len = bytes.len();
        bytes.truncate(len - 4);
        // movi 声明的大小不变，但文件被截断
        let mut demuxer = open(bytes).unwrap();
        let result = demuxer.read_next_video_chunk();
        assert!(matches!(result, Err(PlayerError::IoError(_))));
    }

    #[test]
    fn test_zero_interval_falls_back() {
        let bytes = AviBuilder::new(8, 8, 0).stream_rate(25, 1).frames(1).build();
        let demuxer = open(bytes).unwrap();
        assert_eq!(demuxer.header().frame_interval_us(), 40_000);
        assert_eq!(demuxer.header().fps_or(15), 25);

        let bytes = AviBuilder::new(8, 8, 0).stream_rate(0, 0).frames(1).build();
        let demuxer = open(bytes).unwrap();
        assert_eq!(demuxer.header().frame_interval_us(), 0);
        assert_eq!(demuxer.header().fps_or(15), 15);
    }

    #[test]
    fn test_open_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.avi");
        std::fs::write(&path, AviBuilder::new(8, 8, 40_000).frames(2).build()).unwrap();

        let mut demuxer = Demuxer::open(&path).unwrap();
        assert_eq!(demuxer.header().frame_count(), 2);
        assert!(demuxer.read_next_video_chunk().unwrap().is_some());

        let missing = Demuxer::open(dir.path().join("missing.avi"));
        assert!(matches!(missing, Err(PlayerError::IoError(_))));
    }
}
