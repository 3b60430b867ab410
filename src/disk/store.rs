//! 后备存储: 设备容量对应的一整块连续内存.
//!
//! 所有读写都是整段的, 要么整个区间被拷贝, 要么什么都不做.

use log::debug;

use super::{DiskError, Result};

/// A fixed-size, zero-initialized byte buffer holding the whole device.
pub struct BackingStore {
    data: Box<[u8]>,
}

impl BackingStore {
    /// 分配 capacity 字节并清零.
    ///
    /// 使用可失败的 try_reserve_exact, 内存不足时返回 AllocationFailure 而不是直接 abort.
    pub fn allocate(capacity: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| DiskError::AllocationFailure { bytes: capacity })?;
        data.resize(capacity, 0u8);
        debug!("backing store of {} bytes allocated", capacity);
        Ok(Self {
            data: data.into_boxed_slice(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// 检查 [offset, offset + len) 是否完全落在容量之内, 返回对应的下标区间
    fn range(&self, offset: u64, len: usize) -> Result<std::ops::Range<usize>> {
        let out_of_range = || DiskError::OutOfRange {
            offset,
            len,
            capacity: self.data.len(),
        };
        let start = usize::try_from(offset).map_err(|_| out_of_range())?;
        let end = start.checked_add(len).ok_or_else(out_of_range)?;
        if end > self.data.len() {
            return Err(out_of_range());
        }
        Ok(start..end)
    }

    /// 返回 [offset, offset + len) 的只读视图
    pub fn read(&self, offset: u64, len: usize) -> Result<&[u8]> {
        let range = self.range(offset, len)?;
        Ok(&self.data[range])
    }

    /// 把 [offset, offset + buf.len()) 拷贝到 buf 中
    pub fn read_into(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    /// 把 bytes 写到 offset 处
    pub fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let range = self.range(offset, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// 释放存储. 之后不可能再访问这段内存.
    pub fn release(self) {
        debug!("backing store of {} bytes released", self.data.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_store_is_zeroed() {
        let store = BackingStore::allocate(4096).unwrap();
        assert_eq!(store.capacity(), 4096);
        assert!(store.read(0, 4096).unwrap().iter().all(|b| *b == 0));
    }

    #[test]
    fn write_then_read_back() {
        let mut store = BackingStore::allocate(1024).unwrap();
        store.write(100, &[7u8; 50]).unwrap();
        let mut buf = [0u8; 52];
        store.read_into(99, &mut buf).unwrap();
        assert_eq!(buf[0], 0);
        assert!(buf[1..51].iter().all(|b| *b == 7));
        assert_eq!(buf[51], 0);
    }

    #[test]
    fn out_of_range_copies_nothing() {
        let mut store = BackingStore::allocate(1024).unwrap();
        let err = store.write(1000, &[1u8; 25]).unwrap_err();
        assert_eq!(
            err,
            DiskError::OutOfRange {
                offset: 1000,
                len: 25,
                capacity: 1024
            }
        );
        assert!(store.read(0, 1024).unwrap().iter().all(|b| *b == 0));

        // 末尾恰好对齐是合法的
        store.write(1000, &[1u8; 24]).unwrap();
        assert!(store.read(1024, 1).is_err());
        assert!(store.read(1024, 0).is_ok());
    }

    #[test]
    fn overflowing_offset_is_out_of_range() {
        let store = BackingStore::allocate(16).unwrap();
        assert!(matches!(
            store.read(u64::MAX, 2),
            Err(DiskError::OutOfRange { .. })
        ));
    }

    #[test]
    fn huge_allocation_fails_cleanly() {
        assert_eq!(
            BackingStore::allocate(usize::MAX).err(),
            Some(DiskError::AllocationFailure { bytes: usize::MAX })
        );
    }
}
