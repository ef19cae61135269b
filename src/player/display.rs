use crate::core::Result;
use crate::player::frame_buffer::FrameBuffer;

/// 显示输出端（外部协作者），负责把就绪的 RGB565 帧送到屏幕
pub trait DisplaySink: Send {
    fn present(&mut self, frame: &FrameBuffer) -> Result<()>;
}

/// 不输出任何画面
#[derive(Debug, Default)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn present(&mut self, _frame: &FrameBuffer) -> Result<()> {
        Ok(())
    }
}
