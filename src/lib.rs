//! `vesper-core`：一个面向分布式协调框架的多态对象序列化引擎。
//!
//! 本 crate 围绕调用方实际会接触到的七个组件组织：
//!
//! - [`buffer`] —— 缓冲区 I/O（C1）：可增长的、带 position/limit 的字节区域，
//!   以及它们所来自的分配器接口。
//! - [`codec`] —— 编解码器契约与工厂（C2/C3）：`Codec<T>`、类型擦除的
//!   `DynCodec`，以及 `CodecFactory`。
//! - [`resolver`] —— 类型解析器（C4）：内置基础类型与标准类型的批量注册。
//! - [`registry`] —— 序列化器注册表（C5）：id/名字/类型索引，外加声明式的
//!   祖先回退链。
//! - [`engine`] —— 序列化引擎（C6）：带标签线上格式的读写调度。
//! - [`rpc`] —— 本地 RPC 连接层（C7）。
//! - [`config`] —— 环境配置，可选地从 TOML/JSON 加载。
//! - [`error`] —— 本 crate 统一的错误类型。
//!
//! Non-goals：跨版本 schema 演进、规范化/确定性编码、加密或压缩、流式局部
//! 对象、零拷贝缓冲区别名。各模块覆盖的具体行为见其自身文档。

pub mod buffer;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod resolver;
pub mod registry;
pub mod rpc;
pub mod typeid;
pub mod wire;

mod future;

pub use buffer::{AllocatorStats, BufferAllocator, HeapBuffer, HeapBufferAllocator};
pub use codec::{Codec, CodecFactory, DynCodec};
pub use config::{EngineConfig, EngineSettings, OpaqueSerializableCodec};
pub use engine::Engine;
pub use error::{Result, VesperError};
pub use registry::{Resolver, ResolvedType, SerializerRegistry};
pub use rpc::{LocalConnection, Membership, ThreadContext};
pub use typeid::{TypeHandle, TypeId};
pub use wire::FramingTag;
