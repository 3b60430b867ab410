//! ramdisk: 一个基于内存的块设备模拟器
//!
//! 固定容量的线性字节存储, 通过块 I/O 接口接受以字节偏移和长度寻址的读写请求,
//! 并保证任何请求都不能越过声明的容量.

pub mod device;
pub mod disk;
pub mod logger;

#[cfg(test)]
mod test;
