//! I/O 请求: 一个操作, 一个起始字节偏移, 以及按顺序排列的若干段.
//!
//! 宿主负责把自己的原生 I/O 表示翻译成这里的段列表.
//! 每个段借用一块外部缓冲区: 读请求把数据拷进去, 写请求从里面拷出来.

use super::SECTOR_SHIFT;

/// 宿主请求队列里可能出现的操作. 本设备只支持 Read 和 Write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReqOp {
    Read,
    Write,
    Flush,
    Discard,
    WriteZeroes,
}

/// One contiguous chunk of a request's data.
pub struct Segment<'a> {
    buf: &'a mut [u8],
}

impl<'a> Segment<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn buf(&self) -> &[u8] {
        &*self.buf
    }

    pub fn buf_mut(&mut self) -> &mut [u8] {
        &mut *self.buf
    }
}

impl<'a> From<&'a mut [u8]> for Segment<'a> {
    fn from(buf: &'a mut [u8]) -> Self {
        Self::new(buf)
    }
}

impl<'a> From<&'a mut Vec<u8>> for Segment<'a> {
    fn from(buf: &'a mut Vec<u8>) -> Self {
        Self::new(buf.as_mut_slice())
    }
}

pub struct Request<'a> {
    op: ReqOp,
    /// 起始字节偏移
    offset: u64,
    segments: Vec<Segment<'a>>,
}

impl<'a> Request<'a> {
    pub fn new(op: ReqOp, offset: u64, segments: Vec<Segment<'a>>) -> Self {
        Self {
            op,
            offset,
            segments,
        }
    }

    pub fn read(offset: u64, segments: Vec<Segment<'a>>) -> Self {
        Self::new(ReqOp::Read, offset, segments)
    }

    pub fn write(offset: u64, segments: Vec<Segment<'a>>) -> Self {
        Self::new(ReqOp::Write, offset, segments)
    }

    /// 请求位置以 512 字节扇区给出时使用
    ///
    /// 换算成字节溢出时偏移取 u64::MAX, 由存储报告越界, 而不是回绕到一个较小的偏移.
    pub fn at_sector(op: ReqOp, sector: u64, segments: Vec<Segment<'a>>) -> Self {
        let offset = sector
            .checked_mul(1 << SECTOR_SHIFT)
            .unwrap_or(u64::MAX);
        Self::new(op, offset, segments)
    }

    pub fn op(&self) -> ReqOp {
        self.op
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn segments(&self) -> &[Segment<'a>] {
        &self.segments
    }

    /// 所有段的总字节数
    pub fn total_len(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    /// 消费请求, 交出段列表 (分发器逐段处理)
    pub(crate) fn into_parts(self) -> (ReqOp, u64, Vec<Segment<'a>>) {
        (self.op, self.offset, self.segments)
    }
}
