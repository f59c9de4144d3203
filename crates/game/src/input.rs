use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InputFlags: u8 {
        const FORWARD = 1 << 0;
        const BACK = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        const HANDBRAKE = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InputSample {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub handbrake: bool,
}

impl InputSample {
    pub const IDLE: Self = Self {
        forward: false,
        back: false,
        left: false,
        right: false,
        handbrake: false,
    };

    pub fn new(forward: bool, back: bool, left: bool, right: bool, handbrake: bool) -> Self {
        Self {
            forward,
            back,
            left,
            right,
            handbrake,
        }
    }

    pub fn forward() -> Self {
        Self {
            forward: true,
            ..Self::IDLE
        }
    }

    /// Forward wins over back.
    pub fn throttle(&self) -> f32 {
        match (self.forward, self.back) {
            (true, _) => 1.0,
            (false, true) => -1.0,
            (false, false) => 0.0,
        }
    }

    /// Positive turns left. Holding both directions cancels out.
    pub fn steer(&self) -> f32 {
        match (self.left, self.right) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.to_flags().is_empty()
    }

    pub fn to_flags(&self) -> InputFlags {
        let mut flags = InputFlags::empty();
        flags.set(InputFlags::FORWARD, self.forward);
        flags.set(InputFlags::BACK, self.back);
        flags.set(InputFlags::LEFT, self.left);
        flags.set(InputFlags::RIGHT, self.right);
        flags.set(InputFlags::HANDBRAKE, self.handbrake);
        flags
    }

    pub fn from_flags(flags: InputFlags) -> Self {
        Self {
            forward: flags.contains(InputFlags::FORWARD),
            back: flags.contains(InputFlags::BACK),
            left: flags.contains(InputFlags::LEFT),
            right: flags.contains(InputFlags::RIGHT),
            handbrake: flags.contains(InputFlags::HANDBRAKE),
        }
    }

    pub fn from_bits(bits: u8) -> Self {
        Self::from_flags(InputFlags::from_bits_truncate(bits))
    }

    pub fn bits(&self) -> u8 {
        self.to_flags().bits()
    }
}
