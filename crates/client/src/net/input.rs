use clap::ValueEnum;

use arena::InputSample;

/// Canned driving patterns for a headless client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Script {
    Idle,
    #[default]
    Forward,
    Circle,
    Zigzag,
}

impl Script {
    /// Input for client tick `tick`. Zigzag flips steering once per second.
    pub fn sample(self, tick: u32, tick_rate: u32) -> InputSample {
        match self {
            Script::Idle => InputSample::IDLE,
            Script::Forward => InputSample::forward(),
            Script::Circle => InputSample::new(true, false, false, true, false),
            Script::Zigzag => {
                let second = tick / tick_rate.max(1);
                let left = second % 2 == 0;
                InputSample::new(true, false, left, !left, false)
            }
        }
    }
}
