//! 类型解析器（C4）：对一个全新注册表执行的批量注册函数。
//!
//! 默认应用两个——[`primitive_resolver`] 与 [`standard_resolver`]——
//! 既可以在构造时通过 [`crate::registry::SerializerRegistry::with_defaults`] 传入，
//! 也可以之后通过 `resolve` 追加。这里的固定 id 是本 crate 自己的约定
//! （原始 JDK 内置 id 无法移植到 Rust 的类型系统），跨版本保持稳定。
//!
//! id 刻意从 40 起步，为规范场景用例自行选定的 id（S1 的 10、S5/S6 的 20/21、
//! S7 的 1/1000/1000000）留出空间，避免 `Engine::new` 默认装配的类型与调用方
//! 后续显式注册的场景类型发生 id 冲突。

use crate::codec::builtins::{
    BoolCodec, ByteArrayCodec, ByteCodec, CharCodec, DoubleCodec, FloatCodec, IntCodec, LongCodec,
    ShortCodec, StringCodec,
};
use crate::codec::single;
use crate::error::Result;
use crate::registry::SerializerRegistry;

pub mod ids {
    pub const BOOLEAN: u32 = 40;
    pub const BYTE: u32 = 41;
    pub const SHORT: u32 = 42;
    pub const INT: u32 = 43;
    pub const LONG: u32 = 44;
    pub const FLOAT: u32 = 45;
    pub const DOUBLE: u32 = 46;
    pub const CHAR: u32 = 47;
    pub const STRING: u32 = 48;
    pub const BYTE_ARRAY: u32 = 49;
}

/// 基础标量类型的固定 id 绑定。
pub fn primitive_resolver(registry: &mut SerializerRegistry) -> Result<()> {
    registry.register_with_id::<bool>(ids::BOOLEAN, single::<bool, BoolCodec>(BoolCodec))?;
    registry.register_with_id::<u8>(ids::BYTE, single::<u8, ByteCodec>(ByteCodec))?;
    registry.register_with_id::<i16>(ids::SHORT, single::<i16, ShortCodec>(ShortCodec))?;
    registry.register_with_id::<i32>(ids::INT, single::<i32, IntCodec>(IntCodec))?;
    registry.register_with_id::<i64>(ids::LONG, single::<i64, LongCodec>(LongCodec))?;
    registry.register_with_id::<f32>(ids::FLOAT, single::<f32, FloatCodec>(FloatCodec))?;
    registry.register_with_id::<f64>(ids::DOUBLE, single::<f64, DoubleCodec>(DoubleCodec))?;
    registry.register_with_id::<char>(ids::CHAR, single::<char, CharCodec>(CharCodec))?;
    registry.register_with_id::<String>(ids::STRING, single::<String, StringCodec>(StringCodec))?;
    Ok(())
}

/// 本 crate 随附的少量容器/标准类型的固定 id 绑定；更丰富的集合与日期时间
/// 编解码器留给调用方自己的解析器（编解码器目录本身不在范围内）。
pub fn standard_resolver(registry: &mut SerializerRegistry) -> Result<()> {
    registry.register_with_id::<Vec<u8>>(
        ids::BYTE_ARRAY,
        single::<Vec<u8>, ByteArrayCodec>(ByteArrayCodec),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_avoid_reserved_range() {
        let registry = SerializerRegistry::with_defaults(&[]).unwrap();
        for (_, id) in registry.ids() {
            assert!(!crate::typeid::is_reserved(id));
        }
    }

    #[test]
    fn defaults_leave_scenario_ids_free() {
        let registry = SerializerRegistry::with_defaults(&[]).unwrap();
        for id in [1u32, 10, 11, 20, 21, 1000, 1_000_000] {
            assert!(
                registry.lookup_by_id(id).is_none(),
                "id {id} should remain free for scenario-level registration"
            );
        }
    }
}
