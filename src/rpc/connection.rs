//! 本地 RPC 连接（C7）：两个进程内端点通过 [`crate::rpc::envelope`]
//! 定义的信封交换引擎帧化的请求与响应。
//!
//! 每次请求恰好有两个挂起点（§5）：调用跨到对端的 `receive`，回复再跨回来。
//! 挂起点之后的每个延续都运行在等待开始时绑定的那个 [`ThreadContext`] 上，
//! 绝不是"恰好是哪个线程把它唤醒的"——这正是 `ThreadContext` 存在的全部理由。

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use crate::buffer::HeapBuffer;
use crate::engine::Engine;
use crate::error::{Result, VesperError};
use crate::future::BoxFuture;
use crate::typeid::TypeHandle;

use super::context::ThreadContext;
use super::envelope::{self, Outcome};

type HandlerFn =
    Arc<dyn Fn(Box<dyn Any + Send>) -> BoxFuture<'static, Result<Box<dyn Any + Send>>> + Send + Sync>;

/// 一份共享的端点名册，用于在无需每个对端都持有强引用的情况下，
/// 摘除一个已关闭连接的成员资格。
pub type Membership = Arc<Mutex<Vec<Weak<LocalConnection>>>>;

/// 本地（进程内）RPC 通道的一个端点。
///
/// 一个连接拥有自己的 [`Engine`]（这样请求/响应编解码器就不会在端点之间竞态），
/// 以及一个 [`ThreadContext`]，自身 `send` 调用的每个延续都会被调度回这个
/// 上下文上。处理器则运行在安装它们时所指定的上下文上，那可能是本连接自己的，
/// 也可能是多个连接共享的另一个上下文。
pub struct LocalConnection {
    context: Arc<ThreadContext>,
    engine: Mutex<Engine>,
    peer: RwLock<Option<Weak<LocalConnection>>>,
    handlers: Mutex<HashMap<TypeHandle, (HandlerFn, Arc<ThreadContext>)>>,
    membership: Mutex<Option<Membership>>,
    close_listeners: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
    exception_listeners: Mutex<Vec<Box<dyn Fn(&VesperError) + Send + Sync>>>,
    closed: AtomicBool,
}

impl LocalConnection {
    /// 构建一个独立端点。发送任何东西之前，先调用 [`LocalConnection::connect`]
    /// 将它与对端配对。
    pub fn new(context: Arc<ThreadContext>, engine: Engine) -> Arc<Self> {
        Arc::new(Self {
            context,
            engine: Mutex::new(engine),
            peer: RwLock::new(None),
            handlers: Mutex::new(HashMap::new()),
            membership: Mutex::new(None),
            close_listeners: Mutex::new(Vec::new()),
            exception_listeners: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// 将两个端点互相指定为对方的对端，使得 `a.send(..)` 到达 `b.receive(..)`，
    /// 反之亦然。
    pub fn connect(a: &Arc<Self>, b: &Arc<Self>) {
        *a.peer.write().unwrap() = Some(Arc::downgrade(b));
        *b.peer.write().unwrap() = Some(Arc::downgrade(a));
    }

    /// 将本连接登记到一份共享名册中，[`LocalConnection::close`] 时自动摘除。
    pub fn join(self: &Arc<Self>, membership: Membership) {
        membership.lock().unwrap().push(Arc::downgrade(self));
        *self.membership.lock().unwrap() = Some(membership);
    }

    pub fn on_close(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.close_listeners.lock().unwrap().push(Box::new(listener));
    }

    pub fn on_exception(&self, listener: impl Fn(&VesperError) + Send + Sync + 'static) {
        self.exception_listeners
            .lock()
            .unwrap()
            .push(Box::new(listener));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn notify_exception(&self, err: &VesperError) {
        for listener in self.exception_listeners.lock().unwrap().iter() {
            listener(err);
        }
    }

    pub fn context(&self) -> &Arc<ThreadContext> {
        &self.context
    }

    /// 为 `Req` 类型的请求安装处理器，每次触发都运行在 `handler_context` 上。
    /// 传入 `None` 即卸载。
    pub fn handler<Req, Resp, F, Fut>(&self, handler_context: Arc<ThreadContext>, f: Option<F>)
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Resp>> + Send + 'static,
    {
        let handle = TypeHandle::of::<Req>();
        match f {
            None => {
                self.handlers.lock().unwrap().remove(&handle);
            }
            Some(f) => {
                let wrapped: HandlerFn = Arc::new(move |boxed: Box<dyn Any + Send>| {
                    let req = match boxed.downcast::<Req>() {
                        Ok(req) => *req,
                        Err(_) => {
                            return Box::pin(async {
                                Err(VesperError::unknown_type(
                                    "decoded request does not match the installed handler's type",
                                ))
                            })
                        }
                    };
                    let fut = f(req);
                    Box::pin(async move {
                        let response = fut.await?;
                        Ok(Box::new(response) as Box<dyn Any + Send>)
                    })
                });
                self.handlers
                    .lock()
                    .unwrap()
                    .insert(handle, (wrapped, handler_context));
            }
        }
    }

    /// 编码 `request`，转交给已连接的对端，并以解码后的响应兑现。若对端处理器
    /// 返回了错误，则兑现为 [`VesperError::ServiceError`]；若没有存活的对端，
    /// 则兑现为 [`VesperError::ConnectionClosed`]。
    pub fn send<Req, Resp>(self: &Arc<Self>, request: Req) -> BoxFuture<'static, Result<Resp>>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        if self.is_closed() {
            return Box::pin(async { Err(VesperError::ConnectionClosed) });
        }
        let peer = match self.peer.read().unwrap().as_ref().and_then(Weak::upgrade) {
            Some(peer) => peer,
            None => return Box::pin(async { Err(VesperError::ConnectionClosed) }),
        };

        let mut request_buf = {
            let engine = self.engine.lock().unwrap();
            engine.allocate_buffer()
        };
        if let Err(e) = self
            .engine
            .lock()
            .unwrap()
            .write_object(&request, &mut request_buf)
        {
            return Box::pin(async move { Err(e) });
        }
        request_buf.flip();

        let this = Arc::clone(self);
        Box::pin(async move {
            let response_buf = peer.receive(request_buf).await?;
            let rx = this.context.schedule(move || -> Result<Resp> {
                let mut response_buf = response_buf;
                let mut engine = this.engine.lock().unwrap();
                match envelope::read_outcome::<Resp>(&mut engine, &mut response_buf)? {
                    Outcome::Response(value) => Ok(value),
                    Outcome::Error(message) => Err(VesperError::ServiceError(message)),
                }
            });
            rx.await.map_err(|_| VesperError::ConnectionClosed)?
        })
    }

    /// 解码一个进入的请求，分发给匹配的处理器，并将结果编码进响应缓冲区。
    /// 请求缓冲区在解码完成后、处理器运行之前即（经由 `Drop`）释放。
    pub fn receive(self: &Arc<Self>, request_buf: HeapBuffer) -> BoxFuture<'static, Result<HeapBuffer>> {
        if self.is_closed() {
            return Box::pin(async { Err(VesperError::ConnectionClosed) });
        }
        let this = Arc::clone(self);
        Box::pin(async move {
            let decode_target = Arc::clone(&this);
            let rx = this.context.schedule(move || -> Result<(TypeHandle, Box<dyn Any + Send>)> {
                let mut buf = request_buf;
                let mut engine = decode_target.engine.lock().unwrap();
                match engine.read_any(&mut buf)? {
                    Some(pair) => Ok(pair),
                    None => Err(VesperError::unknown_type("RPC request decoded as NULL")),
                }
            });
            let (handle, boxed) = match rx.await.map_err(|_| VesperError::ConnectionClosed)? {
                Ok(pair) => pair,
                Err(err) => {
                    this.notify_exception(&err);
                    return Err(err);
                }
            };

            let handler_entry = this.handlers.lock().unwrap().get(&handle).cloned();
            let Some((handler_fn, handler_context)) = handler_entry else {
                return Self::encode_error(&this, &VesperError::NoHandler.to_string());
            };

            let rx = handler_context.schedule(move || futures::executor::block_on(handler_fn(boxed)));
            let outcome = rx.await.map_err(|_| VesperError::ConnectionClosed)?;

            match outcome {
                Ok(response) => Self::encode_response_dyn(&this, response),
                Err(err) => Self::encode_error(&this, &err.to_string()),
            }
        })
    }

    fn encode_response_dyn(this: &Arc<Self>, response: Box<dyn Any + Send>) -> Result<HeapBuffer> {
        let mut engine = this.engine.lock().unwrap();
        let mut buf = engine.allocate_buffer();
        buf.write_u8(1)?;
        engine.write_any(response.as_ref(), &mut buf)?;
        Ok(buf)
    }

    fn encode_error(this: &Arc<Self>, message: &str) -> Result<HeapBuffer> {
        let mut engine = this.engine.lock().unwrap();
        let mut buf = engine.allocate_buffer();
        envelope::write_error(&mut engine, message, &mut buf)?;
        Ok(buf)
    }

    /// 关闭本端点，将关闭级联到对端，并在本连接自己的上下文上运行一次
    /// 每个已注册的关闭监听器。幂等：对一个已关闭的连接再次关闭是空操作。
    pub fn close(self: &Arc<Self>) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(membership) = self.membership.lock().unwrap().take() {
            let mut roster = membership.lock().unwrap();
            roster.retain(|weak| match weak.upgrade() {
                Some(arc) => !Arc::ptr_eq(&arc, self),
                None => false,
            });
        }
        let listeners = std::mem::take(&mut *self.close_listeners.lock().unwrap());
        self.context.execute(move || {
            for listener in &listeners {
                listener();
            }
        });
        if let Some(peer) = self.peer.read().unwrap().as_ref().and_then(Weak::upgrade) {
            peer.close();
        }
    }
}
