use std::collections::HashMap;
use std::fmt;

use crate::error::{BayesError, Result};
use crate::theorem;

/// Transition statistics of one node: the context sitting between a
/// predecessor A and a successor B.
///
/// `update` must be called from the successor's side, i.e. once B is known.
pub trait NodeLogger {
    fn id(&self) -> u64;

    /// Posterior probability that the next node is `to_b` given the
    /// incoming node (or flow) `from_a`.
    fn predict(&self, from_a: u64, to_b: u64) -> f64 {
        theorem::bayes(
            self.prior_p_to_b(to_b),
            self.prior_p_from_a_to_b(from_a, to_b),
            self.prior_p_not_from_a_to_b(from_a, to_b),
        )
    }

    fn prior_p_to_b(&self, to_b: u64) -> f64;
    fn prior_p_from_a_to_b(&self, from_a: u64, to_b: u64) -> f64;
    fn prior_p_not_from_a_to_b(&self, from_a: u64, to_b: u64) -> f64;
    fn update(&mut self, from_a: u64, to_b: u64);
}

/// In-memory transition log. Counters only ever grow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeLog {
    node_id: u64,
    from_a_to_b: HashMap<u64, HashMap<u64, u64>>,
    from_a: HashMap<u64, u64>,
    to_b: HashMap<u64, u64>,
    total_accesses: u64,
}

impl NodeLog {
    pub fn new(node_id: u64) -> Self {
        Self { node_id, ..Default::default() }
    }

    /// Rebuilds a log from persisted counters, rejecting inconsistent ones.
    pub fn from_parts(
        node_id: u64,
        from_a_to_b: HashMap<u64, HashMap<u64, u64>>,
        from_a: HashMap<u64, u64>,
        to_b: HashMap<u64, u64>,
        total_accesses: u64,
    ) -> Result<Self> {
        let log = Self { node_id, from_a_to_b, from_a, to_b, total_accesses };
        log.check_consistency()?;
        Ok(log)
    }

    pub fn total_accesses(&self) -> u64 {
        self.total_accesses
    }

    pub fn from_a_count(&self, from_a: u64) -> u64 {
        self.from_a.get(&from_a).copied().unwrap_or(0)
    }

    pub fn to_b_count(&self, to_b: u64) -> u64 {
        self.to_b.get(&to_b).copied().unwrap_or(0)
    }

    pub fn from_a_to_b_count(&self, from_a: u64, to_b: u64) -> u64 {
        self.from_a_to_b
        .get(&from_a)
        .and_then(|row| row.get(&to_b))
        .copied()
        .unwrap_or(0)
    }

    pub fn from_a_map(&self) -> &HashMap<u64, u64> {
        &self.from_a
    }

    pub fn to_b_map(&self) -> &HashMap<u64, u64> {
        &self.to_b
    }

    pub fn from_a_to_b_map(&self) -> &HashMap<u64, HashMap<u64, u64>> {
        &self.from_a_to_b
    }

    /// Verifies `sum(to_b) == sum(from_a) == total_accesses` and that no joint
    /// count exceeds either of its marginals.
    pub fn check_consistency(&self) -> Result<()> {
        let sum_to_b: u64 = self.to_b.values().sum();
        let sum_from_a: u64 = self.from_a.values().sum();

        if sum_to_b != self.total_accesses || sum_from_a != self.total_accesses {
            return Err(BayesError::decode(format!(
                "node {}: counters disagree (to_b {}, from_a {}, total {})",
                self.node_id, sum_to_b, sum_from_a, self.total_accesses
            )));
        }

        for (a, row) in &self.from_a_to_b {
            for (b, n) in row {
                if *n > self.from_a_count(*a) || *n > self.to_b_count(*b) {
                    return Err(BayesError::decode(format!(
                        "node {}: joint count {} for {} -> {} exceeds its marginals",
                        self.node_id, n, a, b
                    )));
                }
            }
        }

        Ok(())
    }

    fn ratio(&self, count: u64) -> f64 {
        if self.total_accesses == 0 {
            return 0.0;
        }
        count as f64 / self.total_accesses as f64
    }
}

impl NodeLogger for NodeLog {
    fn id(&self) -> u64 {
        self.node_id
    }

    fn prior_p_to_b(&self, to_b: u64) -> f64 {
        self.ratio(self.to_b_count(to_b))
    }

    // Joint estimate: normalised by every access of the node, not by from_a.
    fn prior_p_from_a_to_b(&self, from_a: u64, to_b: u64) -> f64 {
        self.ratio(self.from_a_to_b_count(from_a, to_b))
    }

    fn prior_p_not_from_a_to_b(&self, from_a: u64, to_b: u64) -> f64 {
        let not_b = self
        .from_a_count(from_a)
        .saturating_sub(self.from_a_to_b_count(from_a, to_b));
        self.ratio(not_b)
    }

    fn update(&mut self, from_a: u64, to_b: u64) {
        *self.from_a.entry(from_a).or_insert(0) += 1;
        *self.to_b.entry(to_b).or_insert(0) += 1;
        *self.from_a_to_b.entry(from_a).or_default().entry(to_b).or_insert(0) += 1;
        self.total_accesses += 1;
    }
}

impl fmt::Display for NodeLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node_id)
    }
}
