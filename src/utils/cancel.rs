//! 协作式取消
//!
//! Ctrl-C 只翻转标志，处理流程在批次和文件之间检查它；正在进行的请求会先完成。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

/// 取消令牌，克隆后共享同一个状态
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// 请求取消（可重复调用）
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// 等待取消发生
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // 发送端由 self 持有，wait_for 不会因通道关闭而返回错误
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// 后台监听 Ctrl-C，收到信号后取消
    pub fn cancel_on_ctrl_c(&self) -> tokio::task::JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("⚠️ 无法监听 Ctrl-C 信号: {}", e);
                        return;
                    }
                    warn!("🛑 收到中断信号，当前批次完成后停止并保存进度...");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        })
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
