// 该文件是 CogCoach 项目的一部分。
// src/engine/abort.rs - 外部中断
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use crossbeam_channel::{Receiver, Sender, bounded};

/// 创建一对中断句柄与中断信号
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
  let flag = Arc::new(AtomicBool::new(false));
  let (tx, rx) = bounded(1);
  (
    AbortHandle {
      flag: flag.clone(),
      waker: tx.clone(),
    },
    AbortSignal {
      flag,
      waker: rx,
      _keepalive: tx,
    },
  )
}

/// 发起中断的一端，可在信号处理函数等任意线程中调用
#[derive(Debug, Clone)]
pub struct AbortHandle {
  flag: Arc<AtomicBool>,
  waker: Sender<()>,
}

impl AbortHandle {
  /// 请求中断，重复调用无副作用
  pub fn abort(&self) {
    if !self.flag.swap(true, Ordering::SeqCst) {
      let _ = self.waker.try_send(());
    }
  }
}

/// 引擎持有的一端
#[derive(Debug, Clone)]
pub struct AbortSignal {
  flag: Arc<AtomicBool>,
  waker: Receiver<()>,
  // 保证通道永不断开，否则 select 会反复就绪
  _keepalive: Sender<()>,
}

impl Default for AbortSignal {
  fn default() -> Self {
    Self::never()
  }
}

impl AbortSignal {
  /// 不会被触发的信号
  pub fn never() -> Self {
    abort_pair().1
  }

  pub fn is_aborted(&self) -> bool {
    self.flag.load(Ordering::SeqCst)
  }

  pub(crate) fn waker(&self) -> &Receiver<()> {
    &self.waker
  }
}
