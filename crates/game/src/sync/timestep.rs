use std::time::Duration;

const MAX_FRAME: f32 = 0.25;

#[derive(Debug, Clone)]
pub struct FixedTimestep {
    tick_rate: u32,
    dt: f32,
    accumulator: f32,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f32,
            accumulator: 0.0,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f32(self.dt)
    }

    pub fn accumulate(&mut self, delta: f32) {
        self.accumulator += delta.min(MAX_FRAME);
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }

    pub fn until_next(&self) -> Duration {
        Duration::from_secs_f32((self.dt - self.accumulator).max(0.0))
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}
