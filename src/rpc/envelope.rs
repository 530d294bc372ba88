//! RPC 信封：`envelope := u8 status, message`，`status ∈ {0,1}`
//! （1 = 响应，0 = 错误响应），叠加在引擎已有的线上语法（§6）之上。

use crate::buffer::HeapBuffer;
use crate::engine::Engine;
use crate::error::{Result, VesperError};

const STATUS_ERROR: u8 = 0;
const STATUS_RESPONSE: u8 = 1;

/// 编码一个成功响应：`1` 紧跟引擎帧化后的值。
pub fn write_response<T: Send + 'static>(
    engine: &mut Engine,
    value: &T,
    out: &mut HeapBuffer,
) -> Result<()> {
    out.write_u8(STATUS_RESPONSE)?;
    engine.write_object(value, out)
}

/// 编码一个失败响应：`0` 紧跟错误消息，以普通字符串帧化，
/// 这样对端无需注册原始错误类型也能完成往返。
pub fn write_error(engine: &mut Engine, message: &str, out: &mut HeapBuffer) -> Result<()> {
    out.write_u8(STATUS_ERROR)?;
    engine.write_object(&message.to_string(), out)
}

/// 一个解码后的 RPC 结果。
pub enum Outcome<T> {
    Response(T),
    Error(String),
}

/// 读取状态字节，再据此分支解码载荷。
pub fn read_outcome<T: Send + 'static>(engine: &mut Engine, input: &mut HeapBuffer) -> Result<Outcome<T>> {
    let status = input.read_u8()?;
    match status {
        STATUS_RESPONSE => Ok(Outcome::Response(engine.read_object::<T>(input)?)),
        STATUS_ERROR => Ok(Outcome::Error(engine.read_object::<String>(input)?)),
        other => Err(VesperError::unknown_type(format!(
            "invalid RPC envelope status byte {other}"
        ))),
    }
}
