use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::collections::HashSet;

use super::{collect_axes, constraints, ExplorationPlan, ParameterSpace};
use crate::error::ExplorationError;
use crate::value::Value;

const MAX_ATTEMPTS: usize = 10_000;

impl ParameterSpace {
    /// Random parameter combinations (Monte Carlo sampling).
    ///
    /// Samples up to `count` distinct combinations from the space. Sampling
    /// stops early when the space is exhausted or after a fixed number of
    /// attempts, so the plan may hold fewer runs than requested.
    pub fn sample_random(&self, count: usize, seed: u64) -> Result<ExplorationPlan, ExplorationError> {
        let axes = collect_axes(self.axes.clone())?;
        if axes.iter().any(|(_, values)| values.is_empty()) {
            return Err(ExplorationError::Empty);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut rows: Vec<Vec<Value>> = Vec::new();
        let mut seen: HashSet<Vec<usize>> = HashSet::new();
        let space_size = self.size();
        let mut attempts = 0;

        while rows.len() < count && attempts < MAX_ATTEMPTS && seen.len() < space_size {
            attempts += 1;
            let picks: Vec<usize> = axes
                .iter()
                .map(|(_, values)| rng.gen_range(0..values.len()))
                .collect();
            if !seen.insert(picks.clone()) {
                continue;
            }

            let row: Vec<Value> = picks
                .iter()
                .zip(&axes)
                .map(|(&pick, (_, values))| values[pick].clone())
                .collect();
            if constraints::is_valid_combination(&self.constraints, &axes, &row) {
                rows.push(row);
            }
        }

        ExplorationPlan::from_rows(self.paths(), rows)
    }
}
