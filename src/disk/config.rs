use super::{
    DiskError, Result, PAGE_SIZE, RAMDISK_CAPACITY_BYTES, RAMDISK_DISK_NAME,
    RAMDISK_MAX_SEGMENTS, RAMDISK_MAX_SEGMENT_SIZE, RAMDISK_QUEUE_DEPTH, SECTOR_SIZE,
};

/// 设备的不可变配置, 启动时确定, 之后不再改变.
///
/// Default 即固定的出厂参数: 40 MiB, 页大小的块, 32 段, 每段 64 KiB, 队列深度 128.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub name: String,
    /// 容量 (字节)
    pub capacity: usize,
    pub logical_block_size: usize,
    pub physical_block_size: usize,
    pub max_segments: usize,
    pub max_segment_size: usize,
    /// 仅供宿主参考
    pub queue_depth: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: RAMDISK_DISK_NAME.to_string(),
            capacity: RAMDISK_CAPACITY_BYTES,
            logical_block_size: PAGE_SIZE,
            physical_block_size: PAGE_SIZE,
            max_segments: RAMDISK_MAX_SEGMENTS,
            max_segment_size: RAMDISK_MAX_SEGMENT_SIZE,
            queue_depth: RAMDISK_QUEUE_DEPTH,
        }
    }
}

impl DeviceConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// 同时设置逻辑块和物理块大小
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.logical_block_size = block_size;
        self.physical_block_size = block_size;
        self
    }

    pub fn with_max_segments(mut self, max_segments: usize) -> Self {
        self.max_segments = max_segments;
        self
    }

    pub fn with_max_segment_size(mut self, max_segment_size: usize) -> Self {
        self.max_segment_size = max_segment_size;
        self
    }

    /// 容量换算成 512 字节扇区数
    pub fn capacity_sectors(&self) -> u64 {
        (self.capacity / SECTOR_SIZE) as u64
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(DiskError::InvalidConfig(reason));
        if self.name.is_empty() {
            return invalid("empty disk name".into());
        }
        if !self.logical_block_size.is_power_of_two() || self.logical_block_size < SECTOR_SIZE {
            return invalid(format!(
                "logical block size {} is not a power of two >= {}",
                self.logical_block_size, SECTOR_SIZE
            ));
        }
        if self.physical_block_size < self.logical_block_size
            || self.physical_block_size % self.logical_block_size != 0
        {
            return invalid(format!(
                "physical block size {} is not a multiple of logical block size {}",
                self.physical_block_size, self.logical_block_size
            ));
        }
        if self.capacity == 0 || self.capacity % self.logical_block_size != 0 {
            return invalid(format!(
                "capacity {} is not a positive multiple of {}",
                self.capacity, self.logical_block_size
            ));
        }
        if self.max_segments == 0 || self.max_segment_size == 0 {
            return invalid("segment limits must be positive".into());
        }
        Ok(())
    }
}
