//! minor 号分配用的位图
//!
//! 每个 bit 代表一个 minor 号的分配状态, 0 意味着未分配, 1 意味着已经分配出去.
//! 位图按 64 bits 一组存放, 分配时找到第一个不是全 1 的组, 再用 trailing_ones 找到组内最低的 0.

type Bits64 = u64;

const GROUP_BITS: usize = 64;

pub struct Bitmap {
    groups: Vec<Bits64>,
    /// 可分配的 bit 数, 不一定是 64 的倍数
    bits: usize,
}

impl Bitmap {
    pub fn new(bits: usize) -> Self {
        Self {
            groups: vec![0; (bits + GROUP_BITS - 1) / GROUP_BITS],
            bits,
        }
    }

    /// 分配一个 bit, 返回其编号. 全部分配出去时返回 None.
    pub fn alloc(&mut self) -> Option<usize> {
        let (group_pos, inner_pos) = self
            .groups
            .iter()
            .enumerate()
            .find(|(_, bits64)| **bits64 != Bits64::MAX)
            .map(|(group_pos, bits64)| (group_pos, bits64.trailing_ones() as usize))?;
        let bit = group_pos * GROUP_BITS + inner_pos;
        // 最后一组里超出 bits 的部分不可用
        if bit >= self.bits {
            return None;
        }
        self.groups[group_pos] |= 1 << inner_pos;
        Some(bit)
    }

    /// 回收一个 bit. 回收未分配的 bit 返回 false.
    pub fn dealloc(&mut self, bit: usize) -> bool {
        if bit >= self.bits {
            return false;
        }
        let (group_pos, inner_pos) = decomposition(bit);
        if self.groups[group_pos] & (1 << inner_pos) == 0 {
            return false;
        }
        self.groups[group_pos] &= !(1 << inner_pos);
        true
    }

    pub fn is_allocated(&self, bit: usize) -> bool {
        if bit >= self.bits {
            return false;
        }
        let (group_pos, inner_pos) = decomposition(bit);
        self.groups[group_pos] & (1 << inner_pos) != 0
    }

    /// 已分配的 bit 数
    pub fn allocated(&self) -> usize {
        self.groups.iter().map(|g| g.count_ones() as usize).sum()
    }

    /// 可分配的最大数量
    pub fn maximum(&self) -> usize {
        self.bits
    }
}

/// 将 bit 编号分解为组编号和组内编号
fn decomposition(bit: usize) -> (usize, usize) {
    (bit / GROUP_BITS, bit % GROUP_BITS)
}
