use crate::core::{Result, StreamInfo, StreamKind};
use ffmpeg_next as ffmpeg;

/// 一次读包的结果
///
/// 读到文件末尾是正常结束（`EndOfStream`），和 I/O 错误（`Err`）必须区分开
pub enum ReadOutcome {
    Packet(ffmpeg::Packet),
    EndOfStream,
}

/// 数据包来源抽象接口
///
/// 解码线程独占实现者，其他线程不会访问它
pub trait PacketSource: Send {
    /// 读取下一个数据包（packet 带有流索引）
    fn read_packet(&mut self) -> Result<ReadOutcome>;

    /// 被选中参与播放的流
    fn streams(&self) -> &[StreamInfo];

    /// 获取描述信息（用于日志）
    fn description(&self) -> String;

    fn stream_of(&self, kind: StreamKind) -> Option<&StreamInfo> {
        self.streams().iter().find(|s| s.kind == kind)
    }
}
