//! 归一化进度动画控制器

/// 动画控制器
///
/// `progress` 在 `[0, 1]` 内；循环模式到终点后从头开始，否则停在终点。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationController {
    duration: f32,
    progress: f32,
    speed: f32,
    looping: bool,
    playing: bool,
}

impl AnimationController {
    /// `duration` 单位为秒
    pub fn new(duration: f32, looping: bool) -> Self {
        Self {
            duration: duration.max(f32::EPSILON),
            progress: 0.0,
            speed: 1.0,
            looping,
            playing: false,
        }
    }

    pub fn play(&mut self) {
        if !self.looping && self.progress >= 1.0 {
            self.progress = 0.0;
        }
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn reset(&mut self) {
        self.progress = 0.0;
        self.playing = false;
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed.max(0.0);
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// 推进 `delta` 秒，返回当前进度
    pub fn advance(&mut self, delta: f32) -> f32 {
        if !self.playing {
            return self.progress;
        }
        self.progress += delta * self.speed / self.duration;
        if self.progress >= 1.0 {
            if self.looping {
                self.progress = self.progress.fract();
            } else {
                self.progress = 1.0;
                self.playing = false;
            }
        }
        self.progress
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_shot_stops_at_end() {
        let mut animation = AnimationController::new(2.0, false);
        assert_eq!(animation.advance(1.0), 0.0);
        animation.play();
        assert_eq!(animation.advance(1.0), 0.5);
        assert_eq!(animation.advance(5.0), 1.0);
        assert!(!animation.is_playing());
        animation.play();
        assert_eq!(animation.progress(), 0.0);
    }

    #[test]
    fn test_loop_wraps_with_speed() {
        let mut animation = AnimationController::new(1.0, true);
        animation.set_speed(2.0);
        animation.play();
        let progress = animation.advance(0.75);
        assert!((progress - 0.5).abs() < 1e-6);
        assert!(animation.is_playing());
        animation.reset();
        assert_eq!(animation.progress(), 0.0);
        assert!(!animation.is_playing());
    }
}
