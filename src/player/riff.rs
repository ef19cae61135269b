// RIFF/AVI 块标签

use std::fmt;

/// 4 字节块标签（小端读入的 u32）
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub u32);

impl FourCc {
    pub const RIFF: FourCc = FourCc::from_bytes(*b"RIFF");
    pub const AVI: FourCc = FourCc::from_bytes(*b"AVI ");
    pub const LIST: FourCc = FourCc::from_bytes(*b"LIST");
    pub const HDRL: FourCc = FourCc::from_bytes(*b"hdrl");
    pub const STRL: FourCc = FourCc::from_bytes(*b"strl");
    pub const MOVI: FourCc = FourCc::from_bytes(*b"movi");
    pub const REC: FourCc = FourCc::from_bytes(*b"rec ");
    pub const AVIH: FourCc = FourCc::from_bytes(*b"avih");
    pub const STRH: FourCc = FourCc::from_bytes(*b"strh");
    pub const STRF: FourCc = FourCc::from_bytes(*b"strf");
    pub const VIDS: FourCc = FourCc::from_bytes(*b"vids");
    pub const AUDS: FourCc = FourCc::from_bytes(*b"auds");
    pub const MJPG: FourCc = FourCc::from_bytes(*b"MJPG");

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        FourCc(u32::from_le_bytes(bytes))
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// 后两个字符（payload 块的类型后缀，如 "dc" / "wb"）
    pub fn suffix(self) -> [u8; 2] {
        let b = self.to_bytes();
        [b[2], b[3]]
    }

    /// 前两个字符为十进制流编号（"00dc" -> 0）
    pub fn stream_number(self) -> Option<u8> {
        let b = self.to_bytes();
        if b[0].is_ascii_digit() && b[1].is_ascii_digit() {
            Some((b[0] - b'0') * 10 + (b[1] - b'0'))
        } else {
            None
        }
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc(\"{}\")", self)
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.to_bytes() {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// strh 中的流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Other(FourCc),
}

impl From<FourCc> for StreamKind {
    fn from(tag: FourCc) -> Self {
        match tag {
            FourCc::VIDS => StreamKind::Video,
            FourCc::AUDS => StreamKind::Audio,
            other => StreamKind::Other(other),
        }
    }
}

/// 块标签分类
///
/// strf 的含义取决于它前面的 strh，所以分类时需要传入当前流类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkTag {
    MainHeader,
    StreamHeader,
    StreamFormatVideo,
    StreamFormatAudio,
    ListContainer,
    VideoChunk { compressed: bool },
    AudioChunk,
    Unknown(FourCc),
}

impl ChunkTag {
    pub fn classify(tag: FourCc, current_stream: Option<StreamKind>) -> Self {
        match tag {
            FourCc::LIST => ChunkTag::ListContainer,
            FourCc::AVIH => ChunkTag::MainHeader,
            FourCc::STRH => ChunkTag::StreamHeader,
            FourCc::STRF => match current_stream {
                Some(StreamKind::Video) => ChunkTag::StreamFormatVideo,
                Some(StreamKind::Audio) => ChunkTag::StreamFormatAudio,
                _ => ChunkTag::Unknown(tag),
            },
            _ => Self::classify_payload(tag),
        }
    }

    /// payload 区只看后缀，流编号不参与（单视频流 + 单音频流）
    pub fn classify_payload(tag: FourCc) -> Self {
        if tag == FourCc::LIST {
            return ChunkTag::ListContainer;
        }
        match &tag.suffix() {
            b"dc" => ChunkTag::VideoChunk { compressed: true },
            b"db" => ChunkTag::VideoChunk { compressed: false },
            b"wb" => ChunkTag::AudioChunk,
            _ => ChunkTag::Unknown(tag),
        }
    }
}

/// 已知的 JPEG 类视频压缩标签
pub fn is_jpeg_compression(tag: FourCc) -> bool {
    matches!(
        &tag.to_bytes(),
        b"MJPG" | b"mjpg" | b"JPEG" | b"jpeg" | b"AVRn" | b"AVDJ" | b"dmb1"
    )
}
