//! 编解码器契约（C2）与编解码器工厂（C3）。
//!
//! [`Codec<T>`] 是一对纯粹的、只推进缓冲区游标的读写函数，对应一个具体类型；
//! 它永远不触碰帧标签或标识符头部，那是引擎自己的职责。[`DynCodec`] 是
//! 引擎实际存放在按引擎分配的缓存中的对象安全、类型擦除形态，由
//! [`TypedCodecAdapter`] 从一个带类型的 [`Codec<T>`] 桥接而来。[`CodecFactory`]
//! 在某个具体 [`TypeHandle`] 首次被用到时构造对应的 [`DynCodec`]；基础/容器
//! 编解码器*本体*的目录本身超出范围，这里只随附足以端到端验证引擎的一小撮。

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::buffer::HeapBuffer;
use crate::engine::Engine;
use crate::error::{Result, VesperError};
use crate::typeid::TypeHandle;

/// 类型 `T` 的读写对。实现者可以递归调用 `engine.write_object` /
/// `engine.read_object` 处理嵌套值，但不得自行写出帧标签或标识符。
pub trait Codec<T>: Send + Sync {
    fn write(&self, value: &T, out: &mut HeapBuffer, engine: &mut Engine) -> Result<()>;
    fn read(&self, handle: TypeHandle, input: &mut HeapBuffer, engine: &mut Engine) -> Result<T>;
}

/// [`Codec`] 的对象安全、类型擦除形态，在引擎的编解码器缓存中以 [`TypeHandle`]
/// 为键存放。
pub trait DynCodec: Send + Sync {
    fn write_dyn(&self, value: &dyn Any, out: &mut HeapBuffer, engine: &mut Engine) -> Result<()>;
    fn read_dyn(
        &self,
        handle: TypeHandle,
        input: &mut HeapBuffer,
        engine: &mut Engine,
    ) -> Result<Box<dyn Any + Send>>;
}

/// 将一个带静态类型的 [`Codec<T>`] 桥接为引擎实际存放的对象安全 [`DynCodec`]，
/// 两侧都通过 `dyn Any` 向下转型。
pub struct TypedCodecAdapter<T, C> {
    inner: C,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C> TypedCodecAdapter<T, C>
where
    T: Send + 'static,
    C: Codec<T>,
{
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<T, C> DynCodec for TypedCodecAdapter<T, C>
where
    T: Send + 'static,
    C: Codec<T>,
{
    fn write_dyn(&self, value: &dyn Any, out: &mut HeapBuffer, engine: &mut Engine) -> Result<()> {
        let typed = value.downcast_ref::<T>().ok_or_else(|| {
            VesperError::unknown_type(format!(
                "codec type mismatch: expected {}",
                std::any::type_name::<T>()
            ))
        })?;
        self.inner.write(typed, out, engine)
    }

    fn read_dyn(
        &self,
        handle: TypeHandle,
        input: &mut HeapBuffer,
        engine: &mut Engine,
    ) -> Result<Box<dyn Any + Send>> {
        let value = self.inner.read(handle, input, engine)?;
        Ok(Box::new(value))
    }
}

/// 在某个具体类型句柄首次被用到时构造一个 [`DynCodec`] 实例。一个工厂可以服务
/// 多个类型句柄（例如一个按元素类型参数化的共享泛型容器编解码器），这也是
/// 句柄作为参数传入而非在注册时就烘焙进工厂的原因。
pub trait CodecFactory: Send + Sync {
    fn create(&self, handle: TypeHandle) -> Arc<dyn DynCodec>;
}

impl<F> CodecFactory for F
where
    F: Fn(TypeHandle) -> Arc<dyn DynCodec> + Send + Sync,
{
    fn create(&self, handle: TypeHandle) -> Arc<dyn DynCodec> {
        (self)(handle)
    }
}

/// 将一个已经构造好的 [`Codec<T>`] 包装为一个忽略句柄、始终返回同一个适配器的工厂。
/// 这是具体（非泛型）类型经由 [`crate::resolver`] 注册时的常见用法。
pub fn single<T, C>(codec: C) -> Arc<dyn CodecFactory>
where
    T: Send + 'static,
    C: Codec<T> + Clone + 'static,
{
    let adapter = Arc::new(TypedCodecAdapter::<T, C>::new(codec));
    Arc::new(move |_handle: TypeHandle| adapter.clone() as Arc<dyn DynCodec>)
}

pub mod builtins {
    //! 足以验证引擎及其可测试性质的最小基础编解码器目录；生产部署预期通过
    //! [`CodecFactory`] 提供自己更丰富的容器/日期时间编解码器。
    use super::*;

    #[derive(Clone, Copy, Default)]
    pub struct BoolCodec;
    impl Codec<bool> for BoolCodec {
        fn write(&self, value: &bool, out: &mut HeapBuffer, _engine: &mut Engine) -> Result<()> {
            out.write_u8(if *value { 1 } else { 0 })
        }
        fn read(&self, _h: TypeHandle, input: &mut HeapBuffer, _engine: &mut Engine) -> Result<bool> {
            Ok(input.read_u8()? != 0)
        }
    }

    #[derive(Clone, Copy, Default)]
    pub struct ByteCodec;
    impl Codec<u8> for ByteCodec {
        fn write(&self, value: &u8, out: &mut HeapBuffer, _engine: &mut Engine) -> Result<()> {
            out.write_u8(*value)
        }
        fn read(&self, _h: TypeHandle, input: &mut HeapBuffer, _engine: &mut Engine) -> Result<u8> {
            input.read_u8()
        }
    }

    #[derive(Clone, Copy, Default)]
    pub struct ShortCodec;
    impl Codec<i16> for ShortCodec {
        fn write(&self, value: &i16, out: &mut HeapBuffer, _engine: &mut Engine) -> Result<()> {
            out.write_bytes(&value.to_be_bytes())
        }
        fn read(&self, _h: TypeHandle, input: &mut HeapBuffer, _engine: &mut Engine) -> Result<i16> {
            let mut buf = [0u8; 2];
            input.read_into(&mut buf)?;
            Ok(i16::from_be_bytes(buf))
        }
    }

    #[derive(Clone, Copy, Default)]
    pub struct IntCodec;
    impl Codec<i32> for IntCodec {
        fn write(&self, value: &i32, out: &mut HeapBuffer, _engine: &mut Engine) -> Result<()> {
            out.write_i32(*value)
        }
        fn read(&self, _h: TypeHandle, input: &mut HeapBuffer, _engine: &mut Engine) -> Result<i32> {
            input.read_i32()
        }
    }

    #[derive(Clone, Copy, Default)]
    pub struct LongCodec;
    impl Codec<i64> for LongCodec {
        fn write(&self, value: &i64, out: &mut HeapBuffer, _engine: &mut Engine) -> Result<()> {
            out.write_bytes(&value.to_be_bytes())
        }
        fn read(&self, _h: TypeHandle, input: &mut HeapBuffer, _engine: &mut Engine) -> Result<i64> {
            let mut buf = [0u8; 8];
            input.read_into(&mut buf)?;
            Ok(i64::from_be_bytes(buf))
        }
    }

    #[derive(Clone, Copy, Default)]
    pub struct FloatCodec;
    impl Codec<f32> for FloatCodec {
        fn write(&self, value: &f32, out: &mut HeapBuffer, _engine: &mut Engine) -> Result<()> {
            out.write_bytes(&value.to_be_bytes())
        }
        fn read(&self, _h: TypeHandle, input: &mut HeapBuffer, _engine: &mut Engine) -> Result<f32> {
            let mut buf = [0u8; 4];
            input.read_into(&mut buf)?;
            Ok(f32::from_be_bytes(buf))
        }
    }

    #[derive(Clone, Copy, Default)]
    pub struct DoubleCodec;
    impl Codec<f64> for DoubleCodec {
        fn write(&self, value: &f64, out: &mut HeapBuffer, _engine: &mut Engine) -> Result<()> {
            out.write_bytes(&value.to_be_bytes())
        }
        fn read(&self, _h: TypeHandle, input: &mut HeapBuffer, _engine: &mut Engine) -> Result<f64> {
            let mut buf = [0u8; 8];
            input.read_into(&mut buf)?;
            Ok(f64::from_be_bytes(buf))
        }
    }

    #[derive(Clone, Copy, Default)]
    pub struct CharCodec;
    impl Codec<char> for CharCodec {
        fn write(&self, value: &char, out: &mut HeapBuffer, _engine: &mut Engine) -> Result<()> {
            out.write_u16(*value as u16)
        }
        fn read(&self, _h: TypeHandle, input: &mut HeapBuffer, _engine: &mut Engine) -> Result<char> {
            let code = input.read_u16()?;
            char::from_u32(code as u32)
                .ok_or_else(|| VesperError::unknown_type("invalid char code unit"))
        }
    }

    #[derive(Clone, Copy, Default)]
    pub struct StringCodec;
    impl Codec<String> for StringCodec {
        fn write(&self, value: &String, out: &mut HeapBuffer, _engine: &mut Engine) -> Result<()> {
            out.write_string(value)
        }
        fn read(
            &self,
            _h: TypeHandle,
            input: &mut HeapBuffer,
            _engine: &mut Engine,
        ) -> Result<String> {
            input.read_string()
        }
    }

    /// 长度前缀的原始字节数组——JDK/标准解析器随附绑定的"装箱"容器构件。
    #[derive(Clone, Copy, Default)]
    pub struct ByteArrayCodec;
    impl Codec<Vec<u8>> for ByteArrayCodec {
        fn write(&self, value: &Vec<u8>, out: &mut HeapBuffer, _engine: &mut Engine) -> Result<()> {
            if value.len() > crate::buffer::MAX_LENGTH_PREFIXED {
                return Err(VesperError::PayloadTooLarge { len: value.len() });
            }
            out.write_u16(value.len() as u16)?;
            out.write_bytes(value)
        }
        fn read(
            &self,
            _h: TypeHandle,
            input: &mut HeapBuffer,
            _engine: &mut Engine,
        ) -> Result<Vec<u8>> {
            let len = input.read_u16()? as usize;
            input.read_vec(len)
        }
    }
}
