//! Weighted choice between queue classes.
//!
//! Smooth weighted round robin: every pick adds each class's weight to its
//! running score, the highest score wins and pays back the total. With
//! weights 6:3:1 any window of ten picks holds exactly six critical, three
//! default and one low, interleaved rather than bunched.

use super::QueueClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueWeights {
    pub critical: u32,
    pub default: u32,
    pub low: u32,
}

impl Default for QueueWeights {
    fn default() -> Self {
        Self {
            critical: 6,
            default: 3,
            low: 1,
        }
    }
}

impl QueueWeights {
    pub fn get(&self, class: QueueClass) -> u32 {
        match class {
            QueueClass::Critical => self.critical,
            QueueClass::Default => self.default,
            QueueClass::Low => self.low,
        }
    }

    pub fn total(&self) -> u32 {
        self.critical + self.default + self.low
    }
}

#[derive(Debug, Clone)]
pub struct WeightedSelector {
    weights: QueueWeights,
    scores: [i64; 3],
}

impl WeightedSelector {
    /// All-zero weights fall back to equal shares.
    pub fn new(weights: QueueWeights) -> Self {
        let weights = if weights.total() == 0 {
            QueueWeights {
                critical: 1,
                default: 1,
                low: 1,
            }
        } else {
            weights
        };
        Self {
            weights,
            scores: [0; 3],
        }
    }

    /// Class that should be served next.
    pub fn pick(&mut self) -> QueueClass {
        let total = i64::from(self.weights.total());
        let mut best = QueueClass::Critical;
        for class in QueueClass::ALL {
            let i = class.index();
            self.scores[i] += i64::from(self.weights.get(class));
            if self.scores[i] > self.scores[best.index()] {
                best = class;
            }
        }
        self.scores[best.index()] -= total;
        best
    }

    /// Order in which to try the classes for one claim: the picked class
    /// first, then the rest by priority, so an empty preferred class never
    /// leaves a worker idle.
    pub fn claim_order(&mut self) -> [QueueClass; 3] {
        let first = self.pick();
        let mut order = [first; 3];
        let mut slot = 1;
        for class in QueueClass::ALL {
            if class != first {
                order[slot] = class;
                slot += 1;
            }
        }
        order
    }
}
