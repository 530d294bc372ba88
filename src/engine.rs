//! 序列化引擎（C6）：调度编码/解码、写出帧标签、维护每引擎的编解码器缓存。
//!
//! 引擎本身不是线程安全的，也没有任何挂起点——这里的每个操作都是同步的（§5）。
//! 跨执行上下文共享靠 [`Engine::fork`]，而不是隐式拷贝：每个 fork 都有独立的
//! 编解码器缓存，因此携带每引擎状态的编解码器永远不会在多个 fork 间共享；
//! 注册表则做深拷贝，变更不会互相串扰。

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::buffer::{BufferAllocator, HeapBuffer};
use crate::codec::DynCodec;
use crate::config::EngineConfig;
use crate::error::{Result, VesperError};
use crate::registry::{ResolvedType, SerializerRegistry};
use crate::typeid::TypeHandle;
use crate::wire::{select_id_tag, FramingTag};

/// 持有一个 [`SerializerRegistry`]、一个 [`BufferAllocator`]、一个编解码器缓存，
/// 以及一个用于 CLASS 帧载荷的名字缓存（见 §3 对 Engine 的定义）。
pub struct Engine {
    registry: SerializerRegistry,
    allocator: Arc<dyn BufferAllocator>,
    codec_cache: HashMap<TypeHandle, Arc<dyn DynCodec>>,
    name_cache: HashMap<String, TypeHandle>,
    config: EngineConfig,
}

impl Engine {
    /// 用默认的基础/标准解析器外加 `config` 上声明的额外解析器构建一个引擎。
    pub fn new(allocator: Arc<dyn BufferAllocator>, config: EngineConfig) -> Result<Self> {
        let registry = SerializerRegistry::with_defaults(&config.resolvers)?;
        Ok(Self::with_registry(registry, allocator, config))
    }

    /// 围绕一个已经配置好的注册表构建引擎（例如从另一个引擎的
    /// [`Engine::registry`] 取得并进一步定制之后再使用）。
    pub fn with_registry(
        registry: SerializerRegistry,
        allocator: Arc<dyn BufferAllocator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            allocator,
            codec_cache: HashMap::new(),
            name_cache: HashMap::new(),
            config,
        }
    }

    /// 结构化克隆：深拷贝注册表、复制名字缓存，编解码器缓存则留空，
    /// 让 fork 在首次使用时自行实例化各自的编解码器。故意不实现 `Clone`——
    /// fork 是一个有意义的操作（每个 worker 一次），而不是隐式拷贝。
    pub fn fork(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            allocator: Arc::clone(&self.allocator),
            codec_cache: HashMap::new(),
            name_cache: self.name_cache.clone(),
            config: self.config.clone(),
        }
    }

    pub fn registry(&self) -> &SerializerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SerializerRegistry {
        &mut self.registry
    }

    pub fn allocator(&self) -> &Arc<dyn BufferAllocator> {
        &self.allocator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 按本引擎的配置分配一块新缓冲区，可直接作为 [`Engine::write_object`]
    /// 的 `out` 参数使用。
    pub fn allocate_buffer(&self) -> HeapBuffer {
        self.allocator
            .allocate(self.config.initial_buffer_capacity(), self.config.max_frame_size())
    }

    fn codec_for(&mut self, resolved: &ResolvedType) -> Arc<dyn DynCodec> {
        if let Some(codec) = self.codec_cache.get(&resolved.handle) {
            return Arc::clone(codec);
        }
        let codec = resolved.factory.create(resolved.handle);
        self.codec_cache.insert(resolved.handle, Arc::clone(&codec));
        codec
    }

    /// 只写出单字节 NULL 标签。
    pub fn write_null(&mut self, out: &mut HeapBuffer) -> Result<()> {
        out.write_u8(FramingTag::Null.byte())
    }

    /// `v` 本身就是一个缓冲区：写出 BUFFER 标签，再原样拷贝其可读字节
    /// （嵌套缓冲区不携带独立的长度前缀——`out` 载荷的剩余部分*就是*它的内容）。
    pub fn write_buffer_value(&mut self, value: &HeapBuffer, out: &mut HeapBuffer) -> Result<()> {
        out.write_u8(FramingTag::Buffer.byte())?;
        out.write_bytes(value.readable_slice())
    }

    /// 写出一个已注册的非空值。若 `T` 既没有 id 也没有类名绑定，
    /// 返回 [`VesperError::UnregisteredType`]（写侧永远不会走 SERIALIZABLE
    /// 逃生通道——见 Design Notes）。
    pub fn write_object<T: Send + 'static>(&mut self, value: &T, out: &mut HeapBuffer) -> Result<()> {
        self.write_dyn(value, out)
    }

    /// `None` 编码为 NULL；`Some(v)` 转交给 [`Engine::write_object`]。
    pub fn write_opt<T: Send + 'static>(
        &mut self,
        value: Option<&T>,
        out: &mut HeapBuffer,
    ) -> Result<()> {
        match value {
            None => self.write_null(out),
            Some(v) => self.write_object(v, out),
        }
    }

    /// 写出一个具体类型只有运行时才知道的值（例如 RPC 处理器装箱后的响应）。
    /// 分发方式与 [`Engine::write_object`] 完全一致，只是没有静态类型参数。
    pub fn write_any(&mut self, value: &dyn Any, out: &mut HeapBuffer) -> Result<()> {
        self.write_dyn(value, out)
    }

    fn write_dyn(&mut self, value: &dyn Any, out: &mut HeapBuffer) -> Result<()> {
        if let Some(buf) = value.downcast_ref::<HeapBuffer>() {
            return self.write_buffer_value(buf, out);
        }
        let handle = TypeHandle::of_val(value);
        let resolved = self
            .registry
            .lookup(handle)
            .ok_or_else(|| VesperError::unregistered(format!("{handle:?}")))?;
        let codec = self.codec_for(&resolved);
        if let Some(id) = resolved.id {
            let tag = select_id_tag(id.value());
            trace!(id = id.value(), ?tag, "writing id-framed value");
            out.write_u8(tag.byte())?;
            match tag {
                FramingTag::Id8 => out.write_u8(id.value() as u8)?,
                FramingTag::Id16 => out.write_u16(id.value() as u16)?,
                FramingTag::Id24 => out.write_u24(id.value())?,
                FramingTag::Id32 => out.write_i32(id.value() as i32)?,
                _ => unreachable!("select_id_tag only returns id-bearing tags"),
            }
        } else if let Some(name) = &resolved.name {
            trace!(name, "writing class-framed value");
            out.write_u8(FramingTag::Class.byte())?;
            out.write_string(name)?;
        } else {
            return Err(VesperError::unregistered(format!("{handle:?}")));
        }
        codec.write_dyn(value, out, self)
    }

    /// 读取一个已注册的非空 `T` 类型值。
    pub fn read_object<T: Send + 'static>(&mut self, input: &mut HeapBuffer) -> Result<T> {
        match self.read_dyn(input)? {
            None => Err(VesperError::unknown_type("expected a value, found NULL")),
            Some(boxed) => boxed
                .downcast::<T>()
                .map(|b| *b)
                .map_err(|_| VesperError::unknown_type("decoded value does not match requested type")),
        }
    }

    /// 读取一个可能被编码为 NULL 的值。
    pub fn read_opt<T: Send + 'static>(&mut self, input: &mut HeapBuffer) -> Result<Option<T>> {
        match self.read_dyn(input)? {
            None => Ok(None),
            Some(boxed) => boxed
                .downcast::<T>()
                .map(|b| Some(*b))
                .map_err(|_| VesperError::unknown_type("decoded value does not match requested type")),
        }
    }

    fn read_dyn(&mut self, input: &mut HeapBuffer) -> Result<Option<Box<dyn Any + Send>>> {
        Ok(self.read_any(input)?.map(|(_, value)| value))
    }

    /// 与 [`Engine::read_dyn`] 类似，但同时返回解析出的类型句柄——
    /// [`crate::rpc`] 需要据此按解码出的请求具体类型查找处理器。
    pub fn read_any(&mut self, input: &mut HeapBuffer) -> Result<Option<(TypeHandle, Box<dyn Any + Send>)>> {
        let tag_byte = input.read_u8()?;
        let tag = FramingTag::from_byte(tag_byte)?;
        match tag {
            FramingTag::Null => Ok(None),
            FramingTag::Buffer => {
                let remaining = input.remaining();
                let bytes = input.read_vec(remaining)?;
                Ok(Some((
                    TypeHandle::of::<HeapBuffer>(),
                    Box::new(HeapBuffer::from_bytes(bytes)),
                )))
            }
            FramingTag::Id8 => {
                let id = input.read_u8()? as u32;
                self.read_by_id(id, input).map(Some)
            }
            FramingTag::Id16 => {
                let id = input.read_u16()? as u32;
                self.read_by_id(id, input).map(Some)
            }
            FramingTag::Id24 => {
                let id = input.read_u24()?;
                self.read_by_id(id, input).map(Some)
            }
            FramingTag::Id32 => {
                let raw = input.read_i32()?;
                if raw < 0 {
                    return Err(VesperError::unknown_type(
                        "negative type id read in ID32 framing",
                    ));
                }
                self.read_by_id(raw as u32, input).map(Some)
            }
            FramingTag::Class => {
                let name = input.read_string()?;
                self.read_by_name(name, input).map(Some)
            }
            FramingTag::Serializable => {
                let len = input.read_u16()? as usize;
                let bytes = input.read_vec(len)?;
                match &self.config.serializable_codec {
                    Some(codec) => codec
                        .decode(&bytes)
                        .map(|boxed| Some((TypeHandle::of::<()>(), boxed))),
                    None => Err(VesperError::PlatformSerializationFailure {
                        reason: "the SERIALIZABLE escape hatch has no codec configured".into(),
                        cause: None,
                    }),
                }
            }
        }
    }

    fn read_by_id(&mut self, id: u32, input: &mut HeapBuffer) -> Result<(TypeHandle, Box<dyn Any + Send>)> {
        let resolved = self
            .registry
            .lookup_by_id(id)
            .ok_or_else(|| VesperError::unknown_type(format!("no type registered for id {id}")))?;
        let codec = self.codec_for(&resolved);
        let value = codec.read_dyn(resolved.handle, input, self)?;
        Ok((resolved.handle, value))
    }

    fn read_by_name(&mut self, name: String, input: &mut HeapBuffer) -> Result<(TypeHandle, Box<dyn Any + Send>)> {
        let handle = match self.name_cache.get(&name) {
            Some(handle) => *handle,
            None => {
                let resolved = self
                    .registry
                    .lookup_by_name(&name)
                    .ok_or_else(|| VesperError::ClassNotFound { name: name.clone() })?;
                self.name_cache.insert(name.clone(), resolved.handle);
                resolved.handle
            }
        };
        let resolved = self
            .registry
            .lookup(handle)
            .ok_or(VesperError::ClassNotFound { name })?;
        let codec = self.codec_for(&resolved);
        let value = codec.read_dyn(handle, input, self)?;
        Ok((handle, value))
    }

    /// `copy(v) = readObject(writeObject(v).flip())`。中间缓冲区从本引擎的
    /// 分配器取得，往返完成后即（经由 `Drop`）释放。
    pub fn copy<T: Send + 'static>(&mut self, value: &T) -> Result<T> {
        let mut buf = self.allocate_buffer();
        self.write_object(value, &mut buf)?;
        buf.flip();
        self.read_object(&mut buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::HeapBufferAllocator;

    fn test_engine() -> Engine {
        Engine::new(Arc::new(HeapBufferAllocator::new()), EngineConfig::default()).unwrap()
    }

    #[test]
    fn s1_primitive_round_trip_int_at_id_10() {
        let mut engine = test_engine();
        engine
            .registry_mut()
            .register_with_id::<i32>(10, crate::codec::single::<i32, crate::codec::builtins::IntCodec>(crate::codec::builtins::IntCodec))
            .unwrap();
        let mut buf = engine.allocate_buffer();
        engine.write_object(&42i32, &mut buf).unwrap();
        buf.flip();
        assert_eq!(buf.readable_slice(), &[0x02, 0x0A, 0x00, 0x00, 0x00, 0x2A]);
        let value: i32 = engine.read_object(&mut buf).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn s2_null_encodes_to_single_byte() {
        let mut engine = test_engine();
        let mut buf = engine.allocate_buffer();
        engine.write_null(&mut buf).unwrap();
        buf.flip();
        assert_eq!(buf.readable_slice(), &[0x00]);
        let value = engine.read_opt::<i32>(&mut buf).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn s7_width_selection_by_id_magnitude() {
        let mut engine = test_engine();
        for (id, expected_tag) in [(1u32, 0x02u8), (1_000, 0x03), (1_000_000, 0x04)] {
            let mut sub = engine.fork();
            sub.registry_mut()
                .register_with_id::<i32>(id, crate::codec::single::<i32, crate::codec::builtins::IntCodec>(crate::codec::builtins::IntCodec))
                .unwrap();
            let mut buf = sub.allocate_buffer();
            sub.write_object(&7i32, &mut buf).unwrap();
            buf.flip();
            assert_eq!(buf.readable_slice()[0], expected_tag, "id {id}");
        }
    }

    #[test]
    fn copy_round_trips_and_releases_intermediate_buffer() {
        let allocator = Arc::new(HeapBufferAllocator::new());
        let mut engine = Engine::new(allocator.clone(), EngineConfig::default()).unwrap();
        let copied: i32 = engine.copy(&7i32).unwrap();
        assert_eq!(copied, 7);
        assert_eq!(allocator.stats().outstanding(), 0);
    }

    #[test]
    fn fork_has_independent_registry_and_empty_codec_cache() {
        let mut engine = test_engine();
        engine
            .registry_mut()
            .register_with_id::<i32>(50, crate::codec::single::<i32, crate::codec::builtins::IntCodec>(crate::codec::builtins::IntCodec))
            .unwrap();
        let mut fork = engine.fork();
        fork.registry_mut()
            .register_with_id::<i64>(51, crate::codec::single::<i64, crate::codec::builtins::LongCodec>(crate::codec::builtins::LongCodec))
            .unwrap();
        assert!(engine.registry().lookup_by_id(51).is_none());
        assert!(fork.registry().lookup_by_id(50).is_some());
    }

    #[test]
    fn unregistered_type_fails_to_encode() {
        struct NotRegistered;
        let mut engine = test_engine();
        let mut buf = engine.allocate_buffer();
        let err = engine.write_object(&NotRegistered, &mut buf).unwrap_err();
        assert!(matches!(err, VesperError::UnregisteredType { .. }));
    }
}
