//! 统一错误域。
//!
//! `vesper-core` 的三个耦合子系统（注册表、引擎、本地连接）共享同一个错误枚举，
//! 这样调用方只需要匹配一种类型即可覆盖注册、编解码与 RPC 路径上的所有失败模式。
//! 错误码沿用 `codes` 模块中的稳定字符串常量，便于日志与指标按 code 聚合。

use std::borrow::Cow;

/// 稳定错误码常量，供日志/指标按字符串聚合，不随消息措辞变化。
pub mod codes {
    pub const UNREGISTERED_TYPE: &str = "vesper.engine.unregistered_type";
    pub const UNKNOWN_TAG: &str = "vesper.engine.unknown_tag";
    pub const UNKNOWN_TYPE: &str = "vesper.engine.unknown_type";
    pub const CLASS_NOT_FOUND: &str = "vesper.engine.class_not_found";
    pub const PLATFORM_SERIALIZATION_FAILURE: &str = "vesper.engine.platform_serialization_failure";
    pub const PAYLOAD_TOO_LARGE: &str = "vesper.engine.payload_too_large";
    pub const BUFFER_CAPACITY: &str = "vesper.buffer.capacity_exceeded";
    pub const BUFFER_UNDERFLOW: &str = "vesper.buffer.underflow";
    pub const CONFIGURATION_ERROR: &str = "vesper.registry.configuration_error";
    pub const CONNECTION_CLOSED: &str = "vesper.rpc.connection_closed";
    pub const NO_HANDLER: &str = "vesper.rpc.no_handler";
    pub const SERVICE_ERROR: &str = "vesper.rpc.service_error";
}

/// `vesper-core` 范围内所有可恢复/致命失败的统一表示。
///
/// 每个变体对应规范第 7 节定义的一个错误类别；`code()` 返回的字符串取自
/// [`codes`]，用于跨进程日志关联，`Display` 实现则面向人类阅读。
#[derive(Debug, thiserror::Error)]
pub enum VesperError {
    /// 编码时类型既未按 id/类名注册，也未声明平台可序列化逃生舱。
    #[error("type `{type_name}` is not registered with this serializer")]
    UnregisteredType { type_name: Cow<'static, str> },

    /// 解码时读到的帧标签不在已定义集合内。
    #[error("unknown framing tag 0x{tag:02x}")]
    UnknownTag { tag: u8 },

    /// id 或类名未能解析到任何已注册的编解码器。
    #[error("no codec registered for {description}")]
    UnknownType { description: Cow<'static, str> },

    /// CLASS 帧的名字在名字缓存与注册表中都找不到。
    #[error("class `{name}` could not be resolved to a registered type")]
    ClassNotFound { name: String },

    /// SERIALIZABLE 逃生舱两侧的平台序列化失败。
    #[error("platform serialization failed: {reason}")]
    PlatformSerializationFailure {
        reason: Cow<'static, str>,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    /// SERIALIZABLE 负载或 CLASS 名称超出无符号 16 位长度前缀可表达的范围。
    #[error("payload of {len} bytes exceeds the 65535 byte length-prefix limit")]
    PayloadTooLarge { len: usize },

    /// 写入超出缓冲区 maxCapacity。
    #[error("write of {requested} bytes exceeds buffer capacity {capacity}")]
    BufferCapacity { requested: usize, capacity: usize },

    /// 读游标越过 limit：请求的字节数超过缓冲区当前可读长度。
    #[error("buffer underflow: requested {requested} bytes, {available} available")]
    BufferUnderflow { requested: usize, available: usize },

    /// 保留 id 区间冲突，或 id/type-handle 已被占用。
    #[error("registry configuration error: {reason}")]
    ConfigurationError { reason: Cow<'static, str> },

    /// 连接已关闭后仍尝试分发。
    #[error("connection is closed")]
    ConnectionClosed,

    /// 请求的 type-handle 没有安装处理器。
    #[error("no handler installed for the request type")]
    NoHandler,

    /// 处理器执行失败，经状态字节 0 往返传回调用方。
    #[error("service error: {0}")]
    ServiceError(String),
}

impl VesperError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnregisteredType { .. } => codes::UNREGISTERED_TYPE,
            Self::UnknownTag { .. } => codes::UNKNOWN_TAG,
            Self::UnknownType { .. } => codes::UNKNOWN_TYPE,
            Self::ClassNotFound { .. } => codes::CLASS_NOT_FOUND,
            Self::PlatformSerializationFailure { .. } => codes::PLATFORM_SERIALIZATION_FAILURE,
            Self::PayloadTooLarge { .. } => codes::PAYLOAD_TOO_LARGE,
            Self::BufferCapacity { .. } => codes::BUFFER_CAPACITY,
            Self::BufferUnderflow { .. } => codes::BUFFER_UNDERFLOW,
            Self::ConfigurationError { .. } => codes::CONFIGURATION_ERROR,
            Self::ConnectionClosed => codes::CONNECTION_CLOSED,
            Self::NoHandler => codes::NO_HANDLER,
            Self::ServiceError(_) => codes::SERVICE_ERROR,
        }
    }

    pub(crate) fn unregistered(type_name: impl Into<Cow<'static, str>>) -> Self {
        Self::UnregisteredType {
            type_name: type_name.into(),
        }
    }

    pub(crate) fn unknown_type(description: impl Into<Cow<'static, str>>) -> Self {
        Self::UnknownType {
            description: description.into(),
        }
    }

    pub(crate) fn configuration(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::ConfigurationError {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VesperError>;

// 静态断言：VesperError 必须保持 Send + Sync + 'static，否则无法安全地
// 在本地连接的线程上下文之间传递失败结果。不引入额外 crate，直接借助
// 函数指针在编译期触发类型检查。
#[allow(dead_code)]
fn assert_error_is_send_sync() {
    fn assert<T: std::error::Error + Send + Sync + 'static>() {}
    assert::<VesperError>();
}
