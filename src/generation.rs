/// Request number within one data stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Admits only responses newer than anything already applied.
///
/// `invalidate` marks every outstanding request as superseded, which is how
/// a filter change drops responses that were computed for the old filter.
#[derive(Debug, Default)]
pub struct GenerationGate {
    issued: u64,
    applied: u64,
}

impl GenerationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> Generation {
        self.issued += 1;
        Generation(self.issued)
    }

    pub fn invalidate(&mut self) {
        self.applied = self.issued;
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation.0 > self.applied
    }

    pub fn admit(&mut self, generation: Generation) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.applied = generation.0;
        true
    }

    pub fn outstanding(&self) -> u64 {
        self.issued - self.applied
    }
}
