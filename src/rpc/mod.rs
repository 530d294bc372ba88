//! 本地 RPC 连接层（C7，§4.7）：一对 [`LocalConnection`] 端点通过进程内的
//! [`ThreadContext`] 队列交换引擎帧化的请求，而非真实传输层。

mod connection;
mod context;
mod envelope;

pub use connection::{LocalConnection, Membership};
pub use context::ThreadContext;
pub use envelope::{read_outcome, write_error, write_response, Outcome};
