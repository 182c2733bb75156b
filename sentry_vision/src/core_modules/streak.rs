/// A frame counter that never grows past `ceiling`.
///
/// Incrementing a counter that already sits at its ceiling drops it back to
/// `reset_to` instead of growing further. Callers pick `reset_to` so that every
/// threshold they compare against stays satisfied after the wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaturatingCounter {
    value: u32,
    ceiling: u32,
    reset_to: u32,
}

impl SaturatingCounter {
    pub fn new(ceiling: u32, reset_to: u32) -> Self {
        Self {
            value: 0,
            ceiling,
            reset_to: reset_to.min(ceiling),
        }
    }

    pub fn get(&self) -> u32 {
        self.value
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn increment(&mut self) -> u32 {
        if self.value < self.ceiling {
            self.value += 1;
        } else {
            self.value = self.reset_to;
        }
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }
}
