//! 请求分发: 实际处理 I/O 的地方
//!
//! 游标从请求的起始偏移开始, 按顺序处理每个段:
//! 先检查 cursor + len 是否超出容量, 超出则立即放弃整个请求;
//! 然后根据操作在后备存储和段缓冲区之间拷贝; 最后游标前进 len.
//!
//! 已经拷贝完的段不会回滚.

use log::{trace, warn};

use super::{Device, DiskError, ReqOp, Request, Result};

/// 请求的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(DiskError),
}

/// 结束请求时报告给宿主的状态.
/// 越界和不支持的操作对上层来说是同一种 I/O 错误.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlkStatus {
    Ok,
    IoErr,
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }

    pub fn status(&self) -> BlkStatus {
        match self {
            Outcome::Completed => BlkStatus::Ok,
            Outcome::Failed(_) => BlkStatus::IoErr,
        }
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            Outcome::Completed => Ok(()),
            Outcome::Failed(err) => Err(err),
        }
    }
}

/// 数据拷贝的方向
enum Direction {
    /// 存储 -> 段缓冲区
    ToBuffer,
    /// 段缓冲区 -> 存储
    ToStore,
}

/// Execute one request against the device's backing store.
pub fn dispatch(device: &mut Device, request: Request<'_>) -> Outcome {
    let segment_count = request.segments().len();
    let (op, offset, mut segments) = request.into_parts();

    // 只有已发布的设备才有可用的存储
    let store = match device.online_store() {
        Some(store) => store,
        None => return Outcome::Failed(DiskError::Offline),
    };

    // 不支持的操作不会访问存储
    let direction = match op {
        ReqOp::Read => Direction::ToBuffer,
        ReqOp::Write => Direction::ToStore,
        other => {
            warn!("unsupported request operation {:?}", other);
            return Outcome::Failed(DiskError::Unsupported(other));
        }
    };

    // 游标从请求的起始偏移开始
    let mut cursor = offset;
    // 按顺序处理每个段, 段的长度就是其缓冲区的长度
    for segment in segments.iter_mut() {
        let len = segment.len();
        // 存储在拷贝之前检查 [cursor, cursor + len) 是否超出容量,
        // 超出时什么都不拷贝, 直接返回 OutOfRange
        let copied = match direction {
            // 读: 存储 [cursor, cursor + len) -> 段缓冲区
            Direction::ToBuffer => store.read_into(cursor, segment.buf_mut()),
            // 写: 段缓冲区 -> 存储 [cursor, cursor + len)
            Direction::ToStore => store.write(cursor, segment.buf()),
        };
        if let Err(err) = copied {
            // 放弃整个请求, 之前已经拷贝的段保留, 不回滚
            warn!("{:?} request at {} aborted: {}", op, offset, err);
            return Outcome::Failed(err);
        }
        // 拷贝成功说明 cursor + len <= 容量, 这里不会溢出
        cursor += len as u64;
    }

    trace!(
        "{:?} request at {} completed, {} segments, {} bytes",
        op,
        offset,
        segment_count,
        cursor - offset
    );
    Outcome::Completed
}
