use std::time::{Duration, Instant};

/// 每帧的性能统计，只读地提供给外部显示
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EngineStats {
    /// 上一帧的总时间（毫秒）
    pub frame_time_ms: f32,
    pub triangle_count: usize,
    pub drawcall_count: usize,
    /// 遍历场景图构建 draw context 的时间（毫秒）
    pub scene_update_time_ms: f32,
    /// 录制几何 pass 的时间（毫秒）
    pub mesh_draw_time_ms: f32,
}

impl EngineStats {
    /// 几何 pass 开始录制前清空计数
    #[inline]
    pub fn reset_draw_counters(&mut self) {
        self.triangle_count = 0;
        self.drawcall_count = 0;
    }

    #[inline]
    pub fn record_draw(&mut self, index_count: u32) {
        self.drawcall_count += 1;
        self.triangle_count += index_count as usize / 3;
    }
}

#[derive(Debug)]
pub struct Timer {
    last_tick: Instant,

    delta_time: Duration,
    total_time: Duration,
}

impl Default for Timer {
    fn default() -> Self {
        Self {
            last_tick: Instant::now(),
            delta_time: Duration::ZERO,
            total_time: Duration::ZERO,
        }
    }
}

impl Timer {
    /// 每帧开始的时候调用
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_tick);
        self.last_tick = now;
        self.total_time += self.delta_time;
    }

    #[inline]
    pub fn delta_time(&self) -> Duration {
        self.delta_time
    }

    /// 上一帧的时间（毫秒）
    #[inline]
    pub fn delta_time_ms(&self) -> f32 {
        self.delta_time.as_secs_f32() * 1000.0
    }

    /// 上一帧的时间（秒）
    #[inline]
    pub fn delta_time_s(&self) -> f32 {
        self.delta_time.as_secs_f32()
    }

    #[inline]
    pub fn total_time_s(&self) -> f32 {
        self.total_time.as_secs_f32()
    }
}

/// 测量一段代码的耗时（毫秒）
#[inline]
pub fn measure_ms<R>(func: impl FnOnce() -> R) -> (R, f32) {
    let start = Instant::now();
    let result = func();
    (result, start.elapsed().as_secs_f32() * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_draw_counts_triangles() {
        let mut stats = EngineStats::default();
        stats.record_draw(36);
        stats.record_draw(6);
        assert_eq!(stats.drawcall_count, 2);
        assert_eq!(stats.triangle_count, 14);

        stats.reset_draw_counters();
        assert_eq!(stats.drawcall_count, 0);
        assert_eq!(stats.triangle_count, 0);
    }

    #[test]
    fn test_timer_accumulates() {
        let mut timer = Timer::default();
        std::thread::sleep(Duration::from_millis(2));
        timer.tick();
        let first = timer.delta_time();
        assert!(first >= Duration::from_millis(2));
        timer.tick();
        assert!(timer.total_time_s() >= first.as_secs_f32());
        assert!((timer.delta_time_s() * 1000.0 - timer.delta_time_ms()).abs() < 1e-3);
    }

    #[test]
    fn test_measure_returns_result() {
        let (value, ms) = measure_ms(|| 21 * 2);
        assert_eq!(value, 42);
        assert!(ms >= 0.0);
    }
}
