//! 内存块设备 (ramdisk) 的核心: 后备存储, 请求分发, 设备生命周期.
//!
//! 层次结构 (自底向上):
//! - [`BackingStore`]: 一段固定大小, 初始化为 0 的连续内存, 即设备的全部容量
//! - [`dispatch`]: 把一个 I/O 请求拆成若干段, 逐段检查容量并拷贝
//! - [`Device`]: 负责分配存储, 向宿主注册/发布设备, 并按相反顺序拆除
//!
//! 宿主 (块设备注册, minor 号分配, 请求队列) 通过 [`Host`] trait 抽象出来.

mod bitmap;
mod block_dev;
mod config;
mod dispatch;
mod error;
mod host;
mod ramdisk;
mod request;
mod store;

extern crate log;

/// 扇区大小, 请求位置以扇区为单位时用它换算字节偏移
pub const SECTOR_SIZE: usize = 512;
/// SECTOR_SIZE 的以 2 为底的对数
pub const SECTOR_SHIFT: u32 = 9;
/// Host page size, used as both logical and physical block size
pub const PAGE_SIZE: usize = 4096;
/// 设备名
pub const RAMDISK_DISK_NAME: &str = "ramdisk";
/// 40 MiB
pub const RAMDISK_CAPACITY_BYTES: usize = 40 << 20;
/// 每个请求最多的段数
pub const RAMDISK_MAX_SEGMENTS: usize = 32;
/// 64 KiB
pub const RAMDISK_MAX_SEGMENT_SIZE: usize = 64 << 10;
/// 宿主请求队列深度, 对本设备仅作为描述信息
pub const RAMDISK_QUEUE_DEPTH: usize = 128;
/// 宿主可分配的 minor 号数量上限
pub const MINOR_POOL_SIZE: usize = 256;

pub use bitmap::Bitmap;
pub use block_dev::BlockDevice;
pub use config::DeviceConfig;
pub use dispatch::{dispatch, BlkStatus, Outcome};
pub use error::{DiskError, Result};
pub use host::{DiskDescriptor, Host, HostEvent, Identity, MemHost};
pub use ramdisk::{Device, DeviceState};
pub use request::{ReqOp, Request, Segment};
pub use store::BackingStore;
