//! 引擎公共 API 与 RPC 连接层共用的小型 future/stream 类型别名。

use std::future::Future;
use std::pin::Pin;

/// 一个装箱的、`Send` 的 future——本 crate 里每个异步边界
/// （send/receive 的完成、调度处理器的结果）返回的都是这个形状。
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
