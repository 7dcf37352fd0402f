//! 帧循环
//!
//! 单线程协作式调度：宿主每个动画 tick 调用一次引擎的 `tick(now)`。
//! 回调失败（`Err` 或 panic）只影响该回调本身，其余回调和渲染照常执行。

use crate::core::error::CallbackError;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::time::Duration;

/// 传给每帧回调的信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// 自循环启动以来的时间
    pub elapsed: Duration,
    /// 距上一帧的秒数
    pub delta: f32,
    /// 帧序号（从 0 开始）
    pub frame: u64,
}

/// 每帧回调
pub type FrameCallback = Box<dyn FnMut(&FrameInfo) -> Result<(), CallbackError>>;

struct Entry {
    id: u64,
    callback: FrameCallback,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    entries: Vec<Entry>,
    running: bool,
    removed_while_running: HashSet<u64>,
}

/// 回调注册表
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    state: Rc<RefCell<RegistryState>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册回调，返回只移除该回调的令牌
    pub fn register(&self, callback: FrameCallback) -> Unsubscribe {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.entries.push(Entry { id, callback });
        Unsubscribe {
            id,
            state: Rc::downgrade(&self.state),
        }
    }

    pub fn len(&self) -> usize {
        let state = self.state.borrow();
        state
            .entries
            .iter()
            .filter(|entry| !state.removed_while_running.contains(&entry.id))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 依次执行所有回调，返回失败数量
    ///
    /// 回调内部可以注册或注销回调；新注册的回调从下一帧开始执行。
    pub fn run(&self, info: &FrameInfo) -> usize {
        let mut batch = {
            let mut state = self.state.borrow_mut();
            state.running = true;
            std::mem::take(&mut state.entries)
        };

        let mut failures = 0;
        for entry in batch.iter_mut() {
            if self.state.borrow().removed_while_running.contains(&entry.id) {
                continue;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (entry.callback)(info)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    failures += 1;
                    tracing::warn!(target: "chronos::frame", callback = entry.id, %error, "frame callback failed");
                }
                Err(_) => {
                    failures += 1;
                    tracing::warn!(target: "chronos::frame", callback = entry.id, "frame callback panicked");
                }
            }
        }

        let mut state = self.state.borrow_mut();
        state.running = false;
        let removed = std::mem::take(&mut state.removed_while_running);
        batch.retain(|entry| !removed.contains(&entry.id));
        let added = std::mem::take(&mut state.entries);
        batch.extend(added);
        state.entries = batch;
        failures
    }

    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        if state.running {
            let ids: Vec<u64> = state.entries.iter().map(|e| e.id).collect();
            state.removed_while_running.extend(ids);
        }
        state.entries.clear();
    }
}

fn remove(state: &RefCell<RegistryState>, id: u64) -> bool {
    let mut state = state.borrow_mut();
    let before = state.entries.len();
    state.entries.retain(|entry| entry.id != id);
    let removed = state.entries.len() != before;
    if state.running && !removed {
        // 正在执行的批次不在 entries 中
        return state.removed_while_running.insert(id);
    }
    removed
}

/// 注销令牌
///
/// drop 不会注销回调，必须显式调用 `unsubscribe()`。
#[must_use = "dropping the token keeps the callback registered"]
#[derive(Debug)]
pub struct Unsubscribe {
    id: u64,
    state: Weak<RefCell<RegistryState>>,
}

impl Unsubscribe {
    /// 移除对应的回调；回调已不存在时返回 `false`
    pub fn unsubscribe(self) -> bool {
        match self.state.upgrade() {
            Some(state) => remove(&state, self.id),
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct LoopFlags {
    running: Cell<bool>,
    in_frame: Cell<bool>,
    stop_requested: Cell<bool>,
}

/// 循环控制句柄（可克隆，可在回调内使用）
#[derive(Debug, Clone, Default)]
pub struct LoopHandle {
    flags: Rc<LoopFlags>,
}

impl LoopHandle {
    /// 启动循环；已在运行时返回 `false`
    pub fn start(&self) -> bool {
        self.flags.stop_requested.set(false);
        if self.flags.running.get() {
            return false;
        }
        self.flags.running.set(true);
        true
    }

    /// 停止循环；帧内调用时推迟到当前帧结束
    pub fn stop(&self) {
        if self.flags.in_frame.get() {
            self.flags.stop_requested.set(true);
        } else {
            self.flags.running.set(false);
        }
    }

    pub fn is_running(&self) -> bool {
        self.flags.running.get()
    }

    pub fn stop_pending(&self) -> bool {
        self.flags.stop_requested.get()
    }
}

/// 帧循环状态
#[derive(Default)]
pub struct FrameLoop {
    callbacks: CallbackRegistry,
    handle: LoopHandle,
    started_at: Option<Duration>,
    last_tick: Option<Duration>,
    frame: u64,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn start(&mut self) -> bool {
        let started = self.handle.start();
        if started {
            self.last_tick = None;
        }
        started
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// 开始一帧；循环未运行时返回 `None`
    pub fn begin(&mut self, now: Duration) -> Option<FrameInfo> {
        if !self.handle.is_running() {
            return None;
        }
        let started_at = *self.started_at.get_or_insert(now);
        let delta = self
            .last_tick
            .map(|last| now.saturating_sub(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_tick = Some(now);
        self.handle.flags.in_frame.set(true);

        let info = FrameInfo {
            elapsed: now.saturating_sub(started_at),
            delta,
            frame: self.frame,
        };
        self.frame += 1;
        Some(info)
    }

    /// 结束一帧，应用帧内请求的停止
    pub fn end(&mut self) {
        let flags = &self.handle.flags;
        flags.in_frame.set(false);
        if flags.stop_requested.replace(false) {
            flags.running.set(false);
            tracing::debug!(target: "chronos::frame", frame = self.frame, "render loop stopped at tick boundary");
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }
}
