//! 指令队列
//!
//! 单生产者（链路线程）只追加，单消费者（导航线程）只移除队首。
//! 一条消息解码出的所有指令在同一把锁内入队。

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;
use walker_protocol::Instruction;

/// 线程安全的 FIFO 指令队列
#[derive(Debug, Default)]
pub struct InstructionQueue {
    inner: Mutex<VecDeque<Instruction>>,
    available: Condvar,
}

impl InstructionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加单条指令
    pub fn push(&self, instruction: Instruction) {
        self.inner.lock().push_back(instruction);
        self.available.notify_all();
    }

    /// 原子地追加一批指令，返回追加的条数
    ///
    /// 消费者永远看不到"半条消息"。
    pub fn extend(&self, instructions: impl IntoIterator<Item = Instruction>) -> usize {
        let added = {
            let mut queue = self.inner.lock();
            let before = queue.len();
            queue.extend(instructions);
            queue.len() - before
        };
        if added > 0 {
            self.available.notify_all();
        }
        added
    }

    /// 当前队首（不移除）
    pub fn peek(&self) -> Option<Instruction> {
        self.inner.lock().front().copied()
    }

    /// 移除并返回队首
    pub fn pop_head(&self) -> Option<Instruction> {
        self.inner.lock().pop_front()
    }

    /// 等待队首出现，最多等待 `timeout`
    ///
    /// 队列非空时立即返回。超时后仍为空则返回 `None`。
    pub fn wait_for_head(&self, timeout: Duration) -> Option<Instruction> {
        let mut queue = self.inner.lock();
        if queue.is_empty() {
            let _ = self.available.wait_for(&mut queue, timeout);
        }
        queue.front().copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// 按执行顺序复制当前队列内容
    pub fn snapshot(&self) -> Vec<Instruction> {
        self.inner.lock().iter().copied().collect()
    }
}
