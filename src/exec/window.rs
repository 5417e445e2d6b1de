//! Moving-window aggregation.
//!
//! A `MovingAggregate` keeps the rows of the current frame and a running
//! transition state. Rows entering the frame go through the moving transition
//! function (or the plain one when the aggregate has no moving variant). Rows
//! leaving it go through the inverse transition when there is one; otherwise,
//! or when the inverse refuses the row, the state is rebuilt from the frame.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::AggregateDescriptor;
use crate::config::EngineConfig;
use crate::datum::{Datum, Oid};
use crate::error::{AggError, AggResult};
use crate::exec::dispatch::{advance, retreat, run_final, Advance, Retreat};
use crate::procs::{ProcHandle, TransValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovingPhase {
    Empty,
    Accumulating,
    /// At least one row has left the frame.
    Sliding,
    Finalized,
}

/// Work done by a moving aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    pub forward: u64,
    pub inverse: u64,
    pub recomputes: u64,
}

#[derive(Debug, Clone)]
struct FrameRow {
    args: Vec<Datum>,
    /// Whether the transition function consumed the row (strict functions skip NULLs).
    contributed: bool,
}

#[derive(Debug, Clone)]
pub struct MovingAggregate {
    desc: Arc<AggregateDescriptor>,
    moving: bool,
    transfn: ProcHandle,
    invfn: Option<ProcHandle>,
    finalfn: Option<ProcHandle>,
    final_extra: bool,
    transtype: Oid,
    initial: TransValue,
    frame: VecDeque<FrameRow>,
    state: TransValue,
    contributing: usize,
    slid: bool,
    finalized: bool,
    stats: WindowStats,
}

impl MovingAggregate {
    pub fn new(desc: Arc<AggregateDescriptor>) -> AggResult<Self> {
        if desc.is_ordered_set() {
            return Err(AggError::invalid(desc.aggfnoid, "ordered-set aggregates cannot be used as window aggregates"));
        }
        let moving = desc.has_moving();
        let (transfn, invfn, finalfn, final_extra, transtype, initial) = match desc.mtransfn {
            Some(mtrans) => (
                mtrans,
                desc.minvtransfn,
                desc.mfinalfn,
                desc.moving_final_extra,
                desc.mtranstype.unwrap_or(desc.transtype),
                desc.moving_initial_state(),
            ),
            None => (desc.transfn, None, desc.finalfn, desc.final_extra, desc.transtype, desc.initial_state()),
        };
        debug!(target: "pgagg::window", "window over aggregate {} (moving={})", desc.aggfnoid, moving);
        Ok(Self {
            state: initial.clone(),
            desc,
            moving,
            transfn,
            invfn,
            finalfn,
            final_extra,
            transtype,
            initial,
            frame: VecDeque::new(),
            contributing: 0,
            slid: false,
            finalized: false,
            stats: WindowStats::default(),
        })
    }

    pub fn descriptor(&self) -> &Arc<AggregateDescriptor> { &self.desc }

    /// True when the aggregate's moving-aggregate functions are in use.
    pub fn is_moving(&self) -> bool { self.moving }

    pub fn phase(&self) -> MovingPhase {
        if self.finalized {
            MovingPhase::Finalized
        } else if self.slid {
            MovingPhase::Sliding
        } else if self.frame.is_empty() {
            MovingPhase::Empty
        } else {
            MovingPhase::Accumulating
        }
    }

    pub fn stats(&self) -> WindowStats { self.stats }

    pub fn frame_len(&self) -> usize { self.frame.len() }

    pub fn state(&self) -> &TransValue { &self.state }

    fn check_open(&self) -> AggResult<()> {
        if self.finalized {
            return Err(AggError::Finalized { aggfnoid: self.desc.aggfnoid });
        }
        Ok(())
    }

    fn enter(&mut self, args: &[Datum]) -> AggResult<bool> {
        let applied = advance(&self.transfn, self.transtype, &mut self.state, args)? == Advance::Applied;
        self.stats.forward += 1;
        if applied {
            self.contributing += 1;
        }
        Ok(applied)
    }

    /// Add a row at the trailing edge of the frame.
    pub fn push_back(&mut self, args: Vec<Datum>) -> AggResult<()> {
        self.check_open()?;
        let contributed = self.enter(&args)?;
        self.frame.push_back(FrameRow { args, contributed });
        Ok(())
    }

    /// Add a row at the leading edge. Aggregates without an inverse may be
    /// order sensitive, so their state is rebuilt in frame order.
    pub fn push_front(&mut self, args: Vec<Datum>) -> AggResult<()> {
        self.check_open()?;
        if self.invfn.is_some() || self.frame.is_empty() {
            let contributed = self.enter(&args)?;
            self.frame.push_front(FrameRow { args, contributed });
            return Ok(());
        }
        self.frame.push_front(FrameRow { args, contributed: false });
        if let Err(e) = self.recompute() {
            self.frame.pop_front();
            return Err(e);
        }
        Ok(())
    }

    /// Remove the oldest row. `Ok(None)` when the frame is empty.
    pub fn pop_front(&mut self) -> AggResult<Option<Vec<Datum>>> {
        self.check_open()?;
        let Some(row) = self.frame.pop_front() else { return Ok(None) };
        match self.leave(&row) {
            Ok(()) => Ok(Some(row.args)),
            Err(e) => {
                self.frame.push_front(row);
                Err(e)
            }
        }
    }

    /// Remove the newest row. `Ok(None)` when the frame is empty.
    pub fn pop_back(&mut self) -> AggResult<Option<Vec<Datum>>> {
        self.check_open()?;
        let Some(row) = self.frame.pop_back() else { return Ok(None) };
        match self.leave(&row) {
            Ok(()) => Ok(Some(row.args)),
            Err(e) => {
                self.frame.push_back(row);
                Err(e)
            }
        }
    }

    /// Take a row that was already removed from `frame` out of the state.
    fn leave(&mut self, row: &FrameRow) -> AggResult<()> {
        if !row.contributed {
            self.slid = true;
            return Ok(());
        }
        if self.contributing <= 1 {
            self.state = self.initial.clone();
            self.contributing = 0;
            self.slid = true;
            return Ok(());
        }
        let outcome = match self.invfn {
            Some(inv) => retreat(&inv, self.transtype, &mut self.state, &row.args)?,
            None => Retreat::Unsafe,
        };
        match outcome {
            Retreat::Applied => {
                self.contributing -= 1;
                self.stats.inverse += 1;
            }
            Retreat::Skipped | Retreat::Unsafe => {
                if self.invfn.is_some() {
                    debug!(target: "pgagg::window", "aggregate {} inverse refused; recomputing {} rows", self.desc.aggfnoid, self.frame.len());
                }
                self.recompute()?;
            }
        }
        self.slid = true;
        Ok(())
    }

    /// Rebuild the state from the rows in the frame, committing only when
    /// every row was accepted.
    fn recompute(&mut self) -> AggResult<()> {
        let mut state = self.initial.clone();
        let mut flags = Vec::with_capacity(self.frame.len());
        for row in &self.frame {
            flags.push(advance(&self.transfn, self.transtype, &mut state, &row.args)? == Advance::Applied);
        }
        self.stats.forward += flags.len() as u64;
        self.stats.recomputes += 1;
        self.contributing = flags.iter().filter(|c| **c).count();
        for (row, contributed) in self.frame.iter_mut().zip(flags) {
            row.contributed = contributed;
        }
        self.state = state;
        Ok(())
    }

    /// Result for the current frame; the aggregate stays usable.
    pub fn evaluate(&self) -> AggResult<Datum> {
        self.check_open()?;
        run_final(&self.desc, self.finalfn.as_ref(), self.final_extra, &self.state)
    }

    /// Final result; no rows may enter or leave afterwards.
    pub fn finish(&mut self) -> AggResult<Datum> {
        let result = self.evaluate()?;
        self.finalized = true;
        Ok(result)
    }
}

/// Window frame in rows around the current row. `None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSpec {
    Rows { preceding: Option<usize>, following: Option<usize> },
}

impl FrameSpec {
    /// `ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW`
    pub fn running() -> Self { FrameSpec::Rows { preceding: None, following: Some(0) } }

    fn bounds(&self, i: usize, n: usize) -> (usize, usize) {
        match *self {
            FrameSpec::Rows { preceding, following } => {
                let lo = preceding.map(|p| i.saturating_sub(p)).unwrap_or(0);
                let hi = following.map(|f| i.saturating_add(f).saturating_add(1).min(n)).unwrap_or(n);
                (lo, hi)
            }
        }
    }
}

/// Evaluate `desc` over a ROWS frame for every row of `rows`.
pub fn sliding_window(desc: &Arc<AggregateDescriptor>, rows: &[Vec<Datum>], frame: FrameSpec) -> AggResult<(Vec<Datum>, WindowStats)> {
    let mut agg = MovingAggregate::new(Arc::clone(desc))?;
    let mut out = Vec::with_capacity(rows.len());
    let (mut lo, mut hi) = (0usize, 0usize);
    for i in 0..rows.len() {
        let (target_lo, target_hi) = frame.bounds(i, rows.len());
        // slide the start forward before including new rows
        while lo < target_lo && lo < hi {
            agg.pop_front()?;
            lo += 1;
        }
        lo = lo.max(target_lo);
        hi = hi.max(lo);
        while hi < target_hi {
            agg.push_back(rows[hi].clone())?;
            hi += 1;
        }
        out.push(agg.evaluate()?);
    }
    Ok((out, agg.stats()))
}

/// Window evaluation with logging of recompute-heavy aggregates.
#[derive(Debug, Clone, Copy)]
pub struct WindowEvaluator {
    pub recompute_warn_threshold: u64,
}

impl Default for WindowEvaluator {
    fn default() -> Self { Self::from_config(&EngineConfig::default()) }
}

impl WindowEvaluator {
    pub fn from_config(cfg: &EngineConfig) -> Self { Self { recompute_warn_threshold: cfg.recompute_warn_threshold } }

    pub fn evaluate(&self, desc: &Arc<AggregateDescriptor>, rows: &[Vec<Datum>], frame: FrameSpec) -> AggResult<(Vec<Datum>, WindowStats)> {
        let (values, stats) = sliding_window(desc, rows, frame)?;
        if stats.recomputes > self.recompute_warn_threshold {
            warn!(
                target: "pgagg::window",
                "aggregate {} recomputed its frame {} times over {} rows; no usable inverse transition",
                desc.aggfnoid, stats.recomputes, rows.len()
            );
        } else {
            debug!(target: "pgagg::window", "aggregate {} window: {:?}", desc.aggfnoid, stats);
        }
        Ok((values, stats))
    }
}

#[cfg(test)]
#[path = "window_tests.rs"]
mod window_tests;
