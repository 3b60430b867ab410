//! 宿主接口层
//!
//! 块设备的注册和命名, minor 号的分配, 以及设备描述 (容量, 块大小, 段限制) 的发布
//! 都由宿主环境提供, 这里只定义契约 [`Host`].
//!
//! [`MemHost`] 是一个进程内的宿主实现, 只做契约要求的簿记工作,
//! 并可以注入失败, 用来测试设备生命周期的回滚路径.

use std::sync::Arc;

use lazy_static::*;
use log::{debug, warn};
use spin::Mutex;

use super::{Bitmap, DiskError, Result, MINOR_POOL_SIZE};

/// 宿主授予的设备身份: 注册得到的 major 号加上分配到的 minor 号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    pub major: u32,
    pub minor: u32,
}

/// 发布给宿主的完整设备描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskDescriptor {
    pub name: String,
    pub identity: Identity,
    /// 容量 (512 字节扇区)
    pub capacity_sectors: u64,
    pub logical_block_size: usize,
    pub physical_block_size: usize,
    pub max_segments: usize,
    pub max_segment_size: usize,
    pub queue_depth: usize,
    /// 本设备只占一个 minor, 不支持分区
    pub minors: u32,
}

/// The host environment a block device is registered with.
pub trait Host: Send + Sync {
    /// 注册块设备名, 返回 major 号
    fn register(&self, name: &str) -> Result<u32>;
    fn unregister(&self, major: u32, name: &str);

    fn allocate_minor(&self) -> Result<u32>;
    fn release_minor(&self, minor: u32);

    /// 宿主接受描述之后设备即对外可见
    fn publish(&self, descriptor: &DiskDescriptor) -> Result<()>;
    fn unpublish(&self, identity: Identity);
}

lazy_static! {
    /// 进程范围内共享的 minor 号池, 所有 MemHost::new() 创建的宿主都从这里分配
    static ref RAMDISK_INDICES: Arc<Mutex<Bitmap>> =
        Arc::new(Mutex::new(Bitmap::new(MINOR_POOL_SIZE)));
}

/// MemHost 记录下的每一次宿主调用, 用于检查生命周期的顺序
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Register { name: String, major: u32 },
    Unregister { major: u32 },
    AllocateMinor(u32),
    ReleaseMinor(u32),
    Publish(Identity),
    Unpublish(Identity),
}

#[derive(Default)]
struct Faults {
    refuse_register: bool,
    reject_publish: Option<String>,
}

#[derive(Default)]
struct HostState {
    next_major: u32,
    /// (major, name)
    registered: Vec<(u32, String)>,
    published: Vec<DiskDescriptor>,
    events: Vec<HostEvent>,
    faults: Faults,
}

/// In-process host bookkeeping with fault injection.
pub struct MemHost {
    state: Mutex<HostState>,
    minors: Arc<Mutex<Bitmap>>,
}

/// 动态分配的第一个 major 号
const FIRST_DYNAMIC_MAJOR: u32 = 240;

impl MemHost {
    /// 使用进程范围的 minor 号池
    pub fn new() -> Self {
        Self::with_minor_pool(Arc::clone(&RAMDISK_INDICES))
    }

    /// 使用一个只有 limit 个号的私有 minor 号池, limit 为 0 时分配必然失败
    pub fn with_minor_limit(limit: usize) -> Self {
        Self::with_minor_pool(Arc::new(Mutex::new(Bitmap::new(limit))))
    }

    fn with_minor_pool(minors: Arc<Mutex<Bitmap>>) -> Self {
        Self {
            state: Mutex::new(HostState {
                next_major: FIRST_DYNAMIC_MAJOR,
                ..Default::default()
            }),
            minors,
        }
    }

    /// 之后的 register 调用都会失败
    pub fn refuse_registration(&self) {
        self.state.lock().faults.refuse_register = true;
    }

    /// 之后的 publish 调用都会以 reason 被拒绝
    pub fn reject_publish(&self, reason: impl Into<String>) {
        self.state.lock().faults.reject_publish = Some(reason.into());
    }

    /// 清除所有注入的失败
    pub fn heal(&self) {
        self.state.lock().faults = Faults::default();
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.state.lock().events.clone()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.state.lock().registered.iter().any(|(_, n)| n == name)
    }

    pub fn published(&self) -> Vec<DiskDescriptor> {
        self.state.lock().published.clone()
    }

    pub fn minors_in_use(&self) -> usize {
        self.minors.lock().allocated()
    }
}

impl Default for MemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for MemHost {
    fn register(&self, name: &str) -> Result<u32> {
        let mut state = self.state.lock();
        if state.faults.refuse_register || state.registered.iter().any(|(_, n)| n == name) {
            return Err(DiskError::RegistrationFailed(name.to_string()));
        }
        let major = state.next_major;
        state.next_major += 1;
        state.registered.push((major, name.to_string()));
        state.events.push(HostEvent::Register {
            name: name.to_string(),
            major,
        });
        debug!("host: {} registered with major {}", name, major);
        Ok(major)
    }

    fn unregister(&self, major: u32, name: &str) {
        let mut state = self.state.lock();
        let before = state.registered.len();
        state.registered.retain(|(m, n)| !(*m == major && n == name));
        if state.registered.len() == before {
            warn!("host: unregister of unknown block device {} ({})", name, major);
            return;
        }
        state.events.push(HostEvent::Unregister { major });
    }

    fn allocate_minor(&self) -> Result<u32> {
        let minor = {
            let mut minors = self.minors.lock();
            match minors.alloc() {
                Some(minor) => minor as u32,
                None => {
                    warn!("host: all {} minor numbers are in use", minors.maximum());
                    return Err(DiskError::Exhausted);
                }
            }
        };
        self.state.lock().events.push(HostEvent::AllocateMinor(minor));
        Ok(minor)
    }

    fn release_minor(&self, minor: u32) {
        if !self.minors.lock().dealloc(minor as usize) {
            warn!("host: release of unallocated minor {}", minor);
            return;
        }
        self.state.lock().events.push(HostEvent::ReleaseMinor(minor));
    }

    fn publish(&self, descriptor: &DiskDescriptor) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.faults.reject_publish {
            return Err(DiskError::Rejected(reason.clone()));
        }
        let identity = descriptor.identity;
        if !state
            .registered
            .iter()
            .any(|(m, n)| *m == identity.major && *n == descriptor.name)
        {
            return Err(DiskError::Rejected(format!(
                "major {} is not registered as {:?}",
                identity.major, descriptor.name
            )));
        }
        if !self.minors.lock().is_allocated(identity.minor as usize) {
            return Err(DiskError::Rejected(format!(
                "minor {} was never allocated",
                identity.minor
            )));
        }
        if state.published.iter().any(|d| d.identity == identity) {
            return Err(DiskError::Rejected(format!("{:?} already published", identity)));
        }
        if descriptor.capacity_sectors == 0 {
            return Err(DiskError::Rejected("zero capacity".into()));
        }
        state.published.push(descriptor.clone());
        state.events.push(HostEvent::Publish(identity));
        debug!("host: {} published as {:?}", descriptor.name, identity);
        Ok(())
    }

    fn unpublish(&self, identity: Identity) {
        let mut state = self.state.lock();
        let before = state.published.len();
        state.published.retain(|d| d.identity != identity);
        if state.published.len() == before {
            warn!("host: unpublish of unknown device {:?}", identity);
            return;
        }
        state.events.push(HostEvent::Unpublish(identity));
    }
}
