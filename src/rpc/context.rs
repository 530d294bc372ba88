//! 线程上下文是一个携带专属引擎的单线程执行环境——用于在连接层
//! 序列化处理器与延续的执行（§4.7、§5）。建模为一个专用 OS 线程不断
//! 从任务队列中取任务执行，因此"运行在等待开始时绑定的那个上下文上"
//! 自然成立，而不需要检测是哪个线程调用进来的。

use std::sync::mpsc;
use std::thread::JoinHandle;

use futures::channel::oneshot;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// 一个专属的单线程执行器。每次 [`ThreadContext::schedule`] 调用都会在本
/// 上下文唯一的工作线程上按调度顺序执行其闭包。
pub struct ThreadContext {
    sender: mpsc::Sender<Job>,
    worker: Option<JoinHandle<()>>,
    name: String,
}

impl ThreadContext {
    /// 启动工作线程。`name` 用作 OS 线程名，也会出现在 `tracing` span 里。
    pub fn spawn(name: impl Into<String>) -> Self {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>();
        let thread_name = name.clone();
        let worker = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let _span = tracing::debug_span!("thread_context", name = %thread_name).entered();
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })
            .expect("failed to spawn thread context worker");
        Self {
            sender,
            worker: Some(worker),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 即发即弃：在本上下文的线程上运行 `job`。
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        // 若上下文已关闭（worker 已消失），任务会被静默丢弃；需要感知这一点
        // 的调用方应改用 `schedule`。
        let _ = self.sender.send(Box::new(job));
    }

    /// 在本上下文的线程上运行 `job`，并在任务完成后用其结果兑现返回的 future。
    pub fn schedule<T, F>(&self, job: F) -> oneshot::Receiver<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.execute(move || {
            let _ = tx.send(job());
        });
        rx
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        // 直接 drop `sender` 字段需要从 `&mut self` 中移出，做不到；
        // 这里改为等所有发送端（包括交给各连接的克隆）都消失后 worker
        // 自然退出，若本实例是最后持有者则在此 join。
        if let Some(worker) = self.worker.take() {
            drop(std::mem::replace(&mut self.sender, mpsc::channel().0));
            let _ = worker.join();
        }
    }
}
