use crate::disk::{BlockDevice, Device, DiskError, Request, Result, Segment};
use spin::Mutex;

/// 把 ramdisk 包装成 RamBlock 类型, 为它实现 BlockDevice 接口.
///
/// 分发器本身不加锁, 这里用一把互斥锁把所有块读写串行化,
/// 每次读写都变成一个只有一个段的请求, 起始位置为 block_id * 块大小.
pub struct RamBlock(pub Mutex<Device>);

impl RamBlock {
    pub fn new(device: Device) -> Self {
        Self(Mutex::new(device))
    }

    /// 取回设备, 例如为了 stop 它
    pub fn into_inner(self) -> Device {
        self.0.into_inner()
    }
}

/// 块在设备上的字节偏移, 同时检查 buf 恰好是一个块
fn block_offset(device: &Device, block_id: usize, len: usize) -> Result<u64> {
    let block_size = device.config().logical_block_size;
    if len != block_size {
        return Err(DiskError::BlockLength { len, block_size });
    }
    // 溢出时交给存储报告越界
    Ok((block_id as u64).saturating_mul(block_size as u64))
}

impl BlockDevice for RamBlock {
    /// 读取一个块
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<()> {
        let mut device = self.0.lock();
        let offset = block_offset(&device, block_id, buf.len())?;
        device
            .dispatch(Request::read(offset, vec![Segment::new(buf)]))
            .into_result()
    }

    /// 写一个块. 请求的段借用可变缓冲区, 所以先拷贝一份.
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<()> {
        let mut device = self.0.lock();
        let offset = block_offset(&device, block_id, buf.len())?;
        let mut data = buf.to_vec();
        device
            .dispatch(Request::write(offset, vec![Segment::from(&mut data)]))
            .into_result()
    }

    fn block_size(&self) -> usize {
        self.0.lock().config().logical_block_size
    }

    fn num_blocks(&self) -> usize {
        let device = self.0.lock();
        device.capacity() / device.config().logical_block_size
    }
}
