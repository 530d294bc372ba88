//! 缓冲区 I/O 接口（C1）。
//!
//! 缓冲区是一段可增长的字节区域，携带当前位置与最大容量，读写均为大端序。
//! 分配/释放内部机制刻意排除在外——[`BufferAllocator`] 只是引擎依赖的一个命名接口，
//! [`HeapBufferAllocator`] 则是本 crate 随附的最小可运行实现，供引擎与测试直接使用。
//!
//! 释放语义通过所有权建模而非显式调用：[`HeapBuffer`] 在被 drop 时向来源分配器回报一次释放，
//! "恰好释放一次"因此由 Rust 的移动语义自然保证，无需在调用点手工断言。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Result, VesperError};

/// 长度前缀字符串与 SERIALIZABLE 负载使用的无符号 16 位长度上限；
/// 超出即触发 [`VesperError::PayloadTooLarge`]。
pub const MAX_LENGTH_PREFIXED: usize = u16::MAX as usize;

/// 一段可写入、并在 [`HeapBuffer::flip`] 之后可读回的可增长字节区域。
///
/// 读写游标共用同一个 `position`：写侧受 `max_capacity` 约束，读侧受 `limit` 约束，
/// 对应 C1 描述的读写对称性。
#[derive(Debug)]
pub struct HeapBuffer {
    data: Vec<u8>,
    position: usize,
    limit: usize,
    max_capacity: usize,
    released_counter: Option<Arc<AtomicU64>>,
}

impl HeapBuffer {
    /// 构造一个预留 `initial_capacity` 字节、可增长至 `max_capacity` 的缓冲区。
    /// 不受任何分配器追踪，直接用于测试以及 [`HeapBufferAllocator::allocate`] 内部。
    pub fn with_capacity(initial_capacity: usize, max_capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(initial_capacity.min(max_capacity)),
            position: 0,
            limit: 0,
            max_capacity,
            released_counter: None,
        }
    }

    /// 将一段已有字节向量包装为只读缓冲区，从位置 0 开始消费
    /// （用于解码一条刚收到的线上消息）。
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let max_capacity = bytes.len();
        let limit = bytes.len();
        Self {
            data: bytes,
            position: 0,
            limit,
            max_capacity,
            released_counter: None,
        }
    }

    /// 从写模式切换到读模式：limit 取当前写位置，position 归零。
    /// `copy(v) = readObject(writeObject(v).flip())` 依赖此操作。
    pub fn flip(&mut self) -> &mut Self {
        self.limit = self.position;
        self.position = 0;
        self
    }

    /// `limit` 之前尚可读取的字节数。
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.position)
    }

    /// 已写入的字节数（翻转后即为可读长度）。
    pub fn len(&self) -> usize {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.limit == 0
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// `[0, limit)` 范围内当前可见的已写字节，不消费读游标。
    /// 供引擎的 BUFFER 标签拷贝路径使用。
    pub fn readable_slice(&self) -> &[u8] {
        &self.data[..self.limit]
    }

    fn ensure_writable(&mut self, additional: usize) -> Result<()> {
        let required = self.position + additional;
        if required > self.max_capacity {
            return Err(VesperError::BufferCapacity {
                requested: required,
                capacity: self.max_capacity,
            });
        }
        if required > self.data.len() {
            self.data.resize(required, 0);
        }
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.ensure_writable(1)?;
        self.data[self.position] = value;
        self.position += 1;
        self.limit = self.limit.max(self.position);
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_u24(&mut self, value: u32) -> Result<()> {
        debug_assert!(value <= 0x00FF_FFFF);
        let b = value.to_be_bytes();
        self.write_bytes(&b[1..4])
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_writable(bytes.len())?;
        self.data[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
        self.limit = self.limit.max(self.position);
        Ok(())
    }

    /// 写入一个长度前缀的 UTF-8 字符串；超过 65535 字节时返回
    /// [`VesperError::PayloadTooLarge`]。
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let bytes = value.as_bytes();
        if bytes.len() > MAX_LENGTH_PREFIXED {
            return Err(VesperError::PayloadTooLarge { len: bytes.len() });
        }
        self.write_u16(bytes.len() as u16)?;
        self.write_bytes(bytes)
    }

    /// 读游标越过 `limit` 属于缓冲区 I/O 层面的下溢，不是引擎的"未知类型"错误，
    /// 因此归类为 [`VesperError::BufferUnderflow`]，与写侧的 `BufferCapacity` 对称。
    fn ensure_readable(&self, needed: usize) -> Result<()> {
        if self.remaining() < needed {
            return Err(VesperError::BufferUnderflow {
                requested: needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure_readable(1)?;
        let v = self.data[self.position];
        self.position += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_into(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        let mut buf = [0u8; 3];
        self.read_into(&mut buf)?;
        Ok(u32::from_be_bytes([0, buf[0], buf[1], buf[2]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_into(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    pub fn read_into(&mut self, dst: &mut [u8]) -> Result<()> {
        self.ensure_readable(dst.len())?;
        dst.copy_from_slice(&self.data[self.position..self.position + dst.len()]);
        self.position += dst.len();
        Ok(())
    }

    /// 以 `Vec<u8>` 形式读取 `len` 字节的拥有所有权副本。
    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        self.ensure_readable(len)?;
        let v = self.data[self.position..self.position + len].to_vec();
        self.position += len;
        Ok(v)
    }

    /// 读取一个由 [`HeapBuffer::write_string`] 写入的长度前缀 UTF-8 字符串。
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_vec(len)?;
        String::from_utf8(bytes)
            .map_err(|e| VesperError::unknown_type(format!("invalid UTF-8 in CLASS name: {e}")))
    }
}

impl Drop for HeapBuffer {
    fn drop(&mut self) {
        if let Some(counter) = &self.released_counter {
            counter.fetch_add(1, Ordering::AcqRel);
        }
    }
}

/// 引擎依赖的一个命名协作者，负责分配缓冲区；池化策略、复用、分块等内部实现
/// 均不在本 crate 关注范围内，交由调用方自行提供。
pub trait BufferAllocator: Send + Sync {
    /// 分配一段全新的、空的、可写缓冲区。
    fn allocate(&self, initial_capacity: usize, max_capacity: usize) -> HeapBuffer;

    /// 分配/释放计数的即时快照，用于"净增量为零"不变式与基础可观测性。
    fn stats(&self) -> AllocatorStats;
}

/// 一个分配器生命周期内分配/释放计数的快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub allocated: u64,
    pub released: u64,
}

impl AllocatorStats {
    /// 当前尚未释放的缓冲区数量（某次调用产生的全部缓冲区离开作用域后应归零）。
    pub fn outstanding(self) -> i64 {
        self.allocated as i64 - self.released as i64
    }
}

/// 默认的无池化堆分配器：每次调用都分配一个全新的 `Vec<u8>`。
/// "缓冲区分配器内部实现超出范围"的忠实占位——生产部署预期提供自己的池化实现。
#[derive(Clone, Default)]
pub struct HeapBufferAllocator {
    allocated: Arc<AtomicU64>,
    released: Arc<AtomicU64>,
}

impl HeapBufferAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BufferAllocator for HeapBufferAllocator {
    fn allocate(&self, initial_capacity: usize, max_capacity: usize) -> HeapBuffer {
        self.allocated.fetch_add(1, Ordering::AcqRel);
        let mut buf = HeapBuffer::with_capacity(initial_capacity, max_capacity);
        buf.released_counter = Some(Arc::clone(&self.released));
        buf
    }

    fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            allocated: self.allocated.load(Ordering::Acquire),
            released: self.released.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_flip_then_read_round_trips() {
        let mut buf = HeapBuffer::with_capacity(8, 64);
        buf.write_u8(0x02).unwrap();
        buf.write_i32(42).unwrap();
        buf.flip();
        assert_eq!(buf.read_u8().unwrap(), 0x02);
        assert_eq!(buf.read_i32().unwrap(), 42);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn write_beyond_max_capacity_fails() {
        let mut buf = HeapBuffer::with_capacity(1, 2);
        buf.write_u8(1).unwrap();
        buf.write_u8(2).unwrap();
        let err = buf.write_u8(3).unwrap_err();
        assert!(matches!(err, VesperError::BufferCapacity { .. }));
    }

    #[test]
    fn read_past_limit_yields_buffer_underflow() {
        let mut buf = HeapBuffer::with_capacity(4, 4);
        buf.write_u8(1).unwrap();
        buf.flip();
        let _ = buf.read_u8().unwrap();
        let err = buf.read_u8().unwrap_err();
        assert!(matches!(err, VesperError::BufferUnderflow { .. }));
    }

    #[test]
    fn allocator_net_delta_is_zero_after_drop() {
        let allocator = HeapBufferAllocator::new();
        {
            let _buf = allocator.allocate(16, 16);
            assert_eq!(allocator.stats().outstanding(), 1);
        }
        assert_eq!(allocator.stats().outstanding(), 0);
    }

    #[test]
    fn string_round_trip() {
        let mut buf = HeapBuffer::with_capacity(16, 256);
        buf.write_string("a.b.Foo").unwrap();
        buf.flip();
        assert_eq!(buf.read_string().unwrap(), "a.b.Foo");
    }
}
