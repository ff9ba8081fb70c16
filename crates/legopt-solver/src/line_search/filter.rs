//! Filter of (cost, violation) pairs

/// Non-dominated pairs visited by earlier accepted steps
#[derive(Debug, Clone)]
pub struct LineSearchFilter {
    entries: Vec<(f64, f64)>,
    margin: f64,
}

impl LineSearchFilter {
    /// `margin` is the sufficient-decrease margin γ.
    pub fn new(margin: f64) -> Self {
        Self {
            entries: Vec::new(),
            margin,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[(f64, f64)] {
        &self.entries
    }

    /// Accepted if, against every entry, the cost drops by `γ·v_j` or the
    /// violation by the factor `1 − γ`.
    pub fn is_accepted(&self, cost: f64, violation: f64) -> bool {
        if !cost.is_finite() || !violation.is_finite() {
            return false;
        }
        self.entries.iter().all(|&(c_j, v_j)| {
            cost < c_j - self.margin * v_j || violation < (1.0 - self.margin) * v_j
        })
    }

    /// Insert a pair and drop the entries it dominates.
    pub fn augment(&mut self, cost: f64, violation: f64) {
        self.entries
            .retain(|&(c_j, v_j)| !(cost <= c_j && violation <= v_j));
        self.entries.push((cost, violation));
    }
}
