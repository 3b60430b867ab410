//! 设备生命周期
//!
//! Uninitialized -> Allocated -> Registered -> Published -> Unpublished -> Released
//!
//! 启动时依次获取三种资源: 后备存储, 宿主身份 (major + minor), 发布.
//! 每种资源放在各自的 Option 槽位里, 任何一步失败都按获取的相反顺序释放已经拿到的资源,
//! 然后设备回到 Uninitialized. 停止时同样按相反顺序释放, 没有拿到的资源直接跳过.

use std::sync::Arc;

use log::{error, info};

use super::{
    dispatch, BackingStore, DeviceConfig, DiskDescriptor, DiskError, Host, Identity, Outcome,
    Request, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    Allocated,
    Registered,
    Published,
    Unpublished,
    Released,
}

/// The single memory-backed block device.
pub struct Device {
    config: DeviceConfig,
    host: Arc<dyn Host>,
    state: DeviceState,
    store: Option<BackingStore>,
    /// 注册块设备名得到的 major 号
    major: Option<u32>,
    identity: Option<Identity>,
    published: bool,
}

impl Device {
    /// 检查配置并创建一个尚未启动的设备
    pub fn new(host: Arc<dyn Host>, config: DeviceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            host,
            state: DeviceState::Uninitialized,
            store: None,
            major: None,
            identity: None,
            published: false,
        })
    }

    /// new + start
    pub fn start_with(host: Arc<dyn Host>, config: DeviceConfig) -> Result<Self> {
        let mut device = Self::new(host, config)?;
        device.start()?;
        Ok(device)
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state != DeviceState::Uninitialized {
            return Err(DiskError::InvalidState {
                state: self.state,
                action: "start",
            });
        }
        if let Err(err) = self.acquire() {
            error!("{}: start failed, rolling back: {}", self.config.name, err);
            self.release_all();
            self.state = DeviceState::Uninitialized;
            return Err(err);
        }
        info!("{} is successfully started", self.config.name);
        Ok(())
    }

    fn acquire(&mut self) -> Result<()> {
        // 后备存储
        self.store = Some(BackingStore::allocate(self.config.capacity)?);
        self.state = DeviceState::Allocated;
        info!(
            "{}: {} bytes of backing store allocated",
            self.config.name, self.config.capacity
        );

        // 宿主身份
        let major = self.host.register(&self.config.name)?;
        self.major = Some(major);
        let minor = self.host.allocate_minor()?;
        let identity = Identity { major, minor };
        self.identity = Some(identity);
        self.state = DeviceState::Registered;
        info!("{}: registered as {}:{}", self.config.name, major, minor);

        // 发布
        self.host.publish(&self.descriptor(identity))?;
        self.published = true;
        self.state = DeviceState::Published;
        Ok(())
    }

    /// 停止设备. 在任何状态下调用都是安全的, 对没有启动过的设备什么都不做.
    pub fn stop(&mut self) {
        match self.state {
            DeviceState::Uninitialized | DeviceState::Released => return,
            _ => {}
        }
        self.release_all();
        self.state = DeviceState::Released;
        info!("{} is successfully removed", self.config.name);
    }

    /// 按获取的相反顺序释放所有已获取的资源
    ///
    /// 每一步只在对应的资源确实拿到过时才执行, 没拿到的直接跳过, 这不是错误.
    fn release_all(&mut self) {
        // 1. 先撤销发布, 之后宿主不再把请求交给这个设备
        if self.published {
            if let Some(identity) = self.identity {
                self.host.unpublish(identity);
            }
            self.published = false;
            self.state = DeviceState::Unpublished;
        }
        // 2. 归还 minor 号
        if let Some(identity) = self.identity.take() {
            self.host.release_minor(identity.minor);
        }
        // 3. 注销块设备名 (major 号). minor 分配失败时只会走到这里
        if let Some(major) = self.major.take() {
            self.host.unregister(major, &self.config.name);
        }
        // 4. 最后释放后备存储, 此时已经没有任何人能访问它
        if let Some(store) = self.store.take() {
            store.release();
        }
    }

    fn descriptor(&self, identity: Identity) -> DiskDescriptor {
        DiskDescriptor {
            name: self.config.name.clone(),
            identity,
            capacity_sectors: self.config.capacity_sectors(),
            logical_block_size: self.config.logical_block_size,
            physical_block_size: self.config.physical_block_size,
            max_segments: self.config.max_segments,
            max_segment_size: self.config.max_segment_size,
            queue_depth: self.config.queue_depth,
            minors: 1,
        }
    }

    pub fn dispatch(&mut self, request: Request<'_>) -> Outcome {
        dispatch(self, request)
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    pub fn is_allocated(&self) -> bool {
        self.store.is_some()
    }

    /// 只有已发布的设备才接受请求
    pub(crate) fn online_store(&mut self) -> Option<&mut BackingStore> {
        if self.published {
            self.store.as_mut()
        } else {
            None
        }
    }
}

impl Drop for Device {
    /// 忘记调用 stop 的设备在 drop 时同样会按相反顺序释放资源
    fn drop(&mut self) {
        self.stop();
    }
}
