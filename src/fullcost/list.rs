//! Weighted sums of cost terms.

use super::{CostState, DataPool, FullCost};
use crate::image::Size2D;
use crate::plugin::{split_chain, Registry};
use crate::trace::trace_debug;
use crate::transform::Transform;
use crate::util::{VoxRegError, VoxRegResult};

/// Ordered list of cost terms; the total is `Σ wᵢ Cᵢ`.
#[derive(Default)]
pub struct FullCostList {
    terms: Vec<Box<dyn FullCost>>,
}

impl FullCostList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from a `a+b` chain of full-cost descriptors.
    pub fn parse(registry: &Registry, chain: &str) -> VoxRegResult<Self> {
        let mut list = Self::new();
        for member in split_chain(chain)? {
            list.push(registry.produce_full_cost(&member)?);
        }
        Ok(list)
    }

    pub fn push(&mut self, term: Box<dyn FullCost>) {
        self.terms.push(term);
    }

    /// Moves the terms of `other` to the end of this list.
    pub fn append(&mut self, mut other: FullCostList) {
        self.terms.append(&mut other.terms);
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.terms.iter().map(|t| t.name()).collect()
    }

    /// Creates the per-run state of every term.
    pub fn reinit(&self, pool: &DataPool) -> VoxRegResult<CostListState> {
        let mut terms = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            terms.push(StateEntry {
                name: term.name(),
                weight: term.weight(),
                state: term.reinit(pool)?,
            });
        }
        Ok(CostListState { terms })
    }
}

struct StateEntry {
    name: &'static str,
    weight: f64,
    state: Box<dyn CostState>,
}

/// Per-run state of a [`FullCostList`].
pub struct CostListState {
    terms: Vec<StateEntry>,
}

impl CostListState {
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Full-resolution size all sized terms agree on.
    pub fn full_size(&self) -> VoxRegResult<Size2D> {
        let mut size: Option<(Size2D, &str)> = None;
        for entry in &self.terms {
            let Some(s) = entry.state.full_size() else {
                continue;
            };
            match size {
                None => size = Some((s, entry.name)),
                Some((known, first)) if known != s => {
                    return Err(VoxRegError::invalid(format!(
                        "cost terms disagree on the image size: {first} has {known}, {} has {s}",
                        entry.name
                    )));
                }
                Some(_) => {}
            }
        }
        size.map(|(s, _)| s).ok_or_else(|| {
            VoxRegError::invalid("no cost term determines the image size")
        })
    }

    pub fn set_size(&mut self, size: Size2D, transform: &dyn Transform) -> VoxRegResult<()> {
        for entry in &mut self.terms {
            entry.state.set_size(size, transform)?;
        }
        Ok(())
    }

    /// Weighted total `Σ wᵢ Cᵢ`.
    pub fn cost_value(&self, transform: &dyn Transform) -> VoxRegResult<f64> {
        let mut total = 0.0;
        for entry in &self.terms {
            total += entry.weight * entry.state.value(transform)?;
        }
        Ok(total)
    }

    /// Unweighted value of term `index`.
    pub fn term_value(&self, index: usize, transform: &dyn Transform) -> VoxRegResult<f64> {
        let entry = self.terms.get(index).ok_or_else(|| {
            VoxRegError::invalid(format!(
                "cost term {index} out of range, list has {}",
                self.terms.len()
            ))
        })?;
        entry.state.value(transform)
    }

    /// Weighted total; `gradient` receives `Σ wᵢ ∇Cᵢ`.
    pub fn evaluate(&self, transform: &dyn Transform, gradient: &mut [f64]) -> VoxRegResult<f64> {
        gradient.fill(0.0);
        let mut scratch = vec![0.0; gradient.len()];
        let mut total = 0.0;
        for entry in &self.terms {
            scratch.fill(0.0);
            let value = entry.state.evaluate(transform, &mut scratch)?;
            for (g, s) in gradient.iter_mut().zip(&scratch) {
                *g += entry.weight * s;
            }
            trace_debug!("cost_term", term = entry.name, value = value);
            total += entry.weight * value;
        }
        Ok(total)
    }
}
