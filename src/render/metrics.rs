//! 性能指标采样
//!
//! 每帧累计，每个采样窗口（默认 1000ms）物化一次并重置后端计数器。

use super::context::GpuContext;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 性能指标
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// 窗口内的平均帧率
    pub fps: f32,
    /// 平均帧时间（毫秒）
    pub frame_time: f32,
    /// 已分配的 GPU 内存（字节）
    pub memory_used: u64,
    /// 显存预算（字节）
    pub memory_total: u64,
    /// 窗口内平均每帧绘制调用
    pub draw_calls: u64,
    /// 窗口内平均每帧三角形数
    pub triangles: u64,
    pub geometries: u32,
    pub textures: u32,
    pub programs: u32,
}

/// 指标采样器
#[derive(Debug)]
pub struct MetricsSampler {
    window: Duration,
    memory_total: u64,
    window_start: Option<Duration>,
    frames: u32,
    latest: PerformanceMetrics,
    samples: u64,
}

impl MetricsSampler {
    pub fn new(window: Duration, memory_total: u64) -> Self {
        Self {
            window,
            memory_total,
            window_start: None,
            frames: 0,
            latest: PerformanceMetrics {
                memory_total,
                ..PerformanceMetrics::default()
            },
            samples: 0,
        }
    }

    /// 记录一帧；窗口结束时物化指标并返回 `true`
    pub fn record_frame(&mut self, now: Duration, gpu: &mut GpuContext) -> bool {
        // 第一帧只确定窗口起点，之后的帧落在 (start, now] 内
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            gpu.reset_counters();
            return false;
        };
        self.frames += 1;

        let elapsed = now.saturating_sub(start);
        if elapsed < self.window {
            return false;
        }

        let elapsed_ms = elapsed.as_secs_f32() * 1000.0;
        let frames = self.frames.max(1);
        let counters = gpu.counters();
        let memory = gpu.memory_info();

        self.latest = PerformanceMetrics {
            fps: frames as f32 * 1000.0 / elapsed_ms,
            frame_time: elapsed_ms / frames as f32,
            memory_used: memory.bytes,
            memory_total: self.memory_total,
            draw_calls: counters.draw_calls / frames as u64,
            triangles: counters.triangles / frames as u64,
            geometries: memory.buffers,
            textures: memory.textures,
            programs: memory.programs,
        };
        gpu.reset_counters();
        self.window_start = Some(now);
        self.frames = 0;
        self.samples += 1;

        tracing::trace!(
            target: "chronos::metrics",
            fps = self.latest.fps,
            draw_calls = self.latest.draw_calls,
            "metrics sampled"
        );
        true
    }

    /// 最近一次采样的副本
    pub fn latest(&self) -> PerformanceMetrics {
        self.latest
    }

    /// 已完成的采样窗口数
    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::NullBackend;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_samples_once_per_window() {
        let mut gpu = GpuContext::new(Box::new(NullBackend::new()));
        let mut sampler = MetricsSampler::new(ms(1000), 1024);

        let mut sampled = 0;
        for frame in 0..=120 {
            if sampler.record_frame(ms(frame * 16), &mut gpu) {
                sampled += 1;
            }
        }
        // 0..=1920ms 只覆盖一个完整窗口
        assert_eq!(sampled, 1);
        assert_eq!(sampler.samples(), 1);

        let metrics = sampler.latest();
        assert!(metrics.fps > 55.0 && metrics.fps < 70.0);
        assert_eq!(metrics.memory_total, 1024);
        assert_eq!(sampler.latest(), metrics);
    }

    #[test]
    fn test_first_window_counts_frames_like_later_windows() {
        let mut gpu = GpuContext::new(Box::new(NullBackend::new()));
        let mut sampler = MetricsSampler::new(ms(1000), 0);

        // 每 10ms 一帧：两个窗口都应为 100 fps
        for t in (0..=2000).step_by(10) {
            sampler.record_frame(ms(t), &mut gpu);
        }
        assert_eq!(sampler.samples(), 2);
        assert_eq!(sampler.latest().fps, 100.0);

        let mut fresh = MetricsSampler::new(ms(1000), 0);
        for t in (0..=1000).step_by(10) {
            fresh.record_frame(ms(t), &mut gpu);
        }
        assert_eq!(fresh.samples(), 1);
        assert_eq!(fresh.latest().fps, 100.0);
        assert_eq!(fresh.latest().frame_time, 10.0);
    }

    #[test]
    fn test_initial_metrics_are_empty() {
        let sampler = MetricsSampler::new(ms(1000), 0);
        assert_eq!(sampler.latest(), PerformanceMetrics::default());
    }
}
