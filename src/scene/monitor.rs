//! 性能监视器
//!
//! 按固定窗口统计平均帧率：低于下界发出 `Decline`，高于上界发出 `Incline`。
//! 两次事件之间有冷却时间；方向反复翻转超过上限后发出一次 `Fallback`
//! 并停止调整，避免 DPR 在两档之间来回抖动。

use crate::config::MonitorConfig;
use std::time::Duration;

/// 监视器事件
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MonitorEvent {
    /// 性能有余量，可以提高画质
    Incline { fps: f32 },
    /// 性能不足，需要降低画质
    Decline { fps: f32 },
    /// 翻转次数超过上限，停止自适应
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// 帧率监视器
#[derive(Debug)]
pub struct PerformanceMonitor {
    config: MonitorConfig,
    window_start: Option<Duration>,
    frames: u32,
    last_event: Option<Duration>,
    last_direction: Option<Direction>,
    flipflops: u32,
    fallen_back: bool,
    last_fps: Option<f32>,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            window_start: None,
            frames: 0,
            last_event: None,
            last_direction: None,
            flipflops: 0,
            fallen_back: false,
            last_fps: None,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// 记录一帧；窗口结束且满足条件时返回事件
    pub fn record_frame(&mut self, now: Duration) -> Option<MonitorEvent> {
        if self.fallen_back {
            return None;
        }
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        let elapsed = now.saturating_sub(start);
        if elapsed < Duration::from_millis(self.config.sample_window_ms) {
            return None;
        }

        let fps = self.frames as f32 / elapsed.as_secs_f32();
        self.window_start = Some(now);
        self.frames = 0;
        self.last_fps = Some(fps);

        let direction = if fps < self.config.lower_fps {
            Direction::Down
        } else if fps > self.config.upper_fps {
            Direction::Up
        } else {
            return None;
        };

        let cooldown = Duration::from_millis(self.config.cooldown_ms);
        if let Some(last) = self.last_event {
            if now.saturating_sub(last) < cooldown {
                return None;
            }
        }

        if self.last_direction.is_some_and(|last| last != direction) {
            self.flipflops += 1;
            if self.flipflops >= self.config.flipflops {
                self.fallen_back = true;
                tracing::warn!(
                    target: "chronos::monitor",
                    flipflops = self.flipflops,
                    "performance monitor fell back, adaptive quality disabled"
                );
                return Some(MonitorEvent::Fallback);
            }
        }
        self.last_direction = Some(direction);
        self.last_event = Some(now);

        let event = match direction {
            Direction::Up => MonitorEvent::Incline { fps },
            Direction::Down => MonitorEvent::Decline { fps },
        };
        tracing::debug!(target: "chronos::monitor", ?event, "performance monitor event");
        Some(event)
    }

    pub fn flipflops(&self) -> u32 {
        self.flipflops
    }

    pub fn is_fallen_back(&self) -> bool {
        self.fallen_back
    }

    /// 最近一个窗口的平均帧率
    pub fn last_fps(&self) -> Option<f32> {
        self.last_fps
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}
