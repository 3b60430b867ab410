use super::{DeviceState, ReqOp};

pub type Result<T> = std::result::Result<T, DiskError>;

/// 设备生命周期和请求分发中可能出现的所有错误
///
/// 生命周期错误 (分配, 注册, 发布) 在返回之前都已经回滚了已获取的资源;
/// 请求错误 (越界, 不支持的操作) 只影响当前请求, 设备保持可用.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiskError {
    #[error("failed to allocate {bytes} bytes of backing store")]
    AllocationFailure { bytes: usize },

    #[error("no minor number available")]
    Exhausted,

    #[error("host refused to register block device {0:?}")]
    RegistrationFailed(String),

    #[error("host rejected the device description: {0}")]
    Rejected(String),

    #[error("range {offset}+{len} exceeds device capacity {capacity}")]
    OutOfRange {
        offset: u64,
        len: usize,
        capacity: usize,
    },

    #[error("unsupported request operation {0:?}")]
    Unsupported(ReqOp),

    #[error("buffer of {len} bytes is not one block of {block_size} bytes")]
    BlockLength { len: usize, block_size: usize },

    #[error("device is not published")]
    Offline,

    #[error("invalid device configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot {action} a device in state {state:?}")]
    InvalidState {
        state: DeviceState,
        action: &'static str,
    },
}

impl DiskError {
    /// 只在启动阶段出现的错误
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            DiskError::AllocationFailure { .. }
                | DiskError::Exhausted
                | DiskError::RegistrationFailed(_)
                | DiskError::Rejected(_)
                | DiskError::InvalidConfig(_)
                | DiskError::InvalidState { .. }
        )
    }
}
