//! 块设备接口层
//!
//! 文件系统一类的上层只以块为单位随机读写, 不关心请求和段.
//! 实现了 BlockDevice trait 的设备可以直接被它们使用.

use std::any::Any;

use super::Result;

// 块与扇区
// 扇区 (Sector) 是请求位置的单位, 固定 512 字节.
// 块是设备对外声明的逻辑块, 大小等于一个或多个扇区 (这里默认是一页).

pub trait BlockDevice: Send + Sync + Any {
    /// 将编号为 block_id 的块读入 buf, buf 的长度必须是块大小
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<()>;

    /// 将 buf 写入编号为 block_id 的块
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<()>;

    fn block_size(&self) -> usize;

    fn num_blocks(&self) -> usize;
}
