//! Randomized simulation of compiled specifications
//!
//! The simulator drives the compiled graph through multi-step runs: invoke
//! `init`, shift, check the invariant, then repeat `step`/shift/check up to
//! the step bound, over many runs or until a violation is found. A run
//! whose `init` or `step` returns false or fails is dropped, not reported
//! as a deadlock.
//!
//! Randomness enters only through `oneOf` and `actionAny`, both drawn from
//! the context's seeded generator; the seed is part of every verdict so a
//! failing run can be replayed deterministically.

use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use serde::Serialize;

use quint_core::ErrorReport;

use crate::compile::CompiledModule;
use crate::computable::{Computable, EvalCtx};
use crate::error::EvalResult;
use crate::register::RegisterId;
use crate::rng::SeededRng;
use crate::value::Value;

/// An ordered list of state records observed across one run; each record
/// has one field per state variable with its post-shift value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trace {
    pub states: Vec<Value>,
}

impl Trace {
    /// Rebuild a trace from the `_lastTrace` list value.
    pub fn from_value(value: &Value) -> Trace {
        match value {
            Value::List(states) => Trace {
                states: states.iter().cloned().collect(),
            },
            _ => Trace::default(),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::list(self.states.clone())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, state) in self.states.iter().enumerate() {
            writeln!(f, "State {}:", i + 1)?;
            match state {
                Value::Record(fields) => {
                    for (name, value) in fields.iter() {
                        writeln!(f, "  {name} = {value}")?;
                    }
                }
                other => writeln!(f, "  {other}")?,
            }
        }
        Ok(())
    }
}

/// Simulation knobs. The operator names refer to entries of the compiled
/// context.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of runs to attempt.
    pub runs: usize,
    /// Maximum steps per run after the initial state.
    pub steps: usize,
    /// Explicit seed; `None` seeds from entropy.
    pub seed: Option<u64>,
    pub init: String,
    pub step: String,
    pub invariant: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            runs: 100,
            steps: 20,
            seed: None,
            init: "init".to_string(),
            step: "step".to_string(),
            invariant: "inv".to_string(),
        }
    }
}

/// Counters accumulated while simulating.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestStats {
    /// Runs attempted (including dropped ones).
    pub runs_executed: usize,
    /// Step attempts across all runs.
    pub steps_executed: usize,
    pub elapsed_secs: f64,
    /// The seed actually used; replaying with it reproduces the verdict.
    pub seed: u64,
}

/// The verdict of a simulation.
#[derive(Debug)]
pub enum TestResult {
    /// No invariant violation was found.
    Passed(TestStats),
    /// The invariant evaluated to false; the trace leads to the violation.
    Violation {
        invariant: String,
        trace: Trace,
        stats: TestStats,
    },
    /// Compilation errors, a missing operator, or a hard runtime error.
    Failed {
        errors: Vec<ErrorReport>,
        stats: TestStats,
    },
}

impl TestResult {
    pub fn is_passed(&self) -> bool {
        matches!(self, TestResult::Passed(_))
    }

    pub fn stats(&self) -> &TestStats {
        match self {
            TestResult::Passed(stats) => stats,
            TestResult::Violation { stats, .. } => stats,
            TestResult::Failed { stats, .. } => stats,
        }
    }
}

#[derive(Default)]
struct RunCounters {
    runs: usize,
    steps: usize,
}

/// Drive a compiled module through randomized runs.
pub struct Simulator<'a> {
    module: &'a CompiledModule,
    config: SimulationConfig,
}

impl<'a> Simulator<'a> {
    pub fn new(module: &'a CompiledModule, config: SimulationConfig) -> Self {
        Simulator { module, config }
    }

    pub fn run(&self) -> TestResult {
        let rng = match self.config.seed {
            Some(seed) => SeededRng::new(seed),
            None => SeededRng::from_entropy(),
        };
        let seed = rng.seed();
        let started = Instant::now();

        let mut stats = TestStats {
            seed,
            ..TestStats::default()
        };

        if !self.module.compile_errors.is_empty() {
            stats.elapsed_secs = started.elapsed().as_secs_f64();
            return TestResult::Failed {
                errors: self.module.compile_errors.clone(),
                stats,
            };
        }

        let mut missing = Vec::new();
        let init = self.resolve(&self.config.init, &mut missing);
        let step = self.resolve(&self.config.step, &mut missing);
        let inv = self.resolve(&self.config.invariant, &mut missing);
        let (Some(init), Some(step), Some(inv)) = (init, step, inv) else {
            stats.elapsed_secs = started.elapsed().as_secs_f64();
            return TestResult::Failed {
                errors: missing,
                stats,
            };
        };

        let mut ctx = self.module.new_ctx(rng);
        let last_trace = self.module.last_trace_register();
        let mut counters = RunCounters::default();
        let outcome = simulate(
            &mut ctx,
            self.config.runs,
            self.config.steps,
            &init,
            &step,
            &inv,
            last_trace,
            &mut counters,
        );

        stats.runs_executed = counters.runs;
        stats.steps_executed = counters.steps;
        stats.elapsed_secs = started.elapsed().as_secs_f64();

        match outcome {
            Ok(true) => TestResult::Passed(stats),
            Ok(false) => {
                let trace = ctx
                    .regs
                    .peek(last_trace)
                    .map(Trace::from_value)
                    .unwrap_or_default();
                TestResult::Violation {
                    invariant: self.config.invariant.clone(),
                    trace,
                    stats,
                }
            }
            Err(e) => {
                ctx.log_error(&e);
                TestResult::Failed {
                    errors: ctx.runtime_errors,
                    stats,
                }
            }
        }
    }

    fn resolve(&self, name: &str, missing: &mut Vec<ErrorReport>) -> Option<Rc<Computable>> {
        let found = self.module.computable(name);
        if found.is_none() {
            missing.push(ErrorReport::new(
                format!("operator {name} not found in module {}", self.module.module_name),
                Vec::new(),
            ));
        }
        found
    }
}

/// Entry point for the `_test` opcode: same loop, counters discarded.
/// Returns `Ok(true)` iff no invariant violation was found.
pub fn run_graph(
    ctx: &mut EvalCtx,
    runs: usize,
    steps: usize,
    init: &Rc<Computable>,
    step: &Rc<Computable>,
    inv: &Rc<Computable>,
    last_trace: RegisterId,
) -> EvalResult<bool> {
    let mut counters = RunCounters::default();
    simulate(ctx, runs, steps, init, step, inv, last_trace, &mut counters)
}

/// The simulation loop.
///
/// Per run: restore the outer snapshot, invoke `init` (false or failure
/// drops the run), shift, record, check the invariant, then up to `steps`
/// iterations of `step`/shift/record/check. Dropped runs are not
/// violations; their partial trace still counts as the last executed
/// trace. After all runs the outer snapshot is restored and `_lastTrace`
/// receives the last executed trace.
#[allow(clippy::too_many_arguments)]
fn simulate(
    ctx: &mut EvalCtx,
    runs: usize,
    steps: usize,
    init: &Rc<Computable>,
    step: &Rc<Computable>,
    inv: &Rc<Computable>,
    last_trace: RegisterId,
    counters: &mut RunCounters,
) -> EvalResult<bool> {
    let outer = ctx.regs.snapshot();
    let mut last_executed = Value::list(Vec::new());

    let outcome = simulate_runs(ctx, runs, steps, init, step, inv, &mut last_executed, counters);

    ctx.regs.restore(&outer);
    ctx.regs.write(last_trace, last_executed);
    outcome.map(|violation| !violation)
}

/// The run loop proper. Returns whether a violation was found; the caller
/// restores the outer snapshot even when an invariant evaluation fails
/// hard.
#[allow(clippy::too_many_arguments)]
fn simulate_runs(
    ctx: &mut EvalCtx,
    runs: usize,
    steps: usize,
    init: &Rc<Computable>,
    step: &Rc<Computable>,
    inv: &Rc<Computable>,
    last_executed: &mut Value,
    counters: &mut RunCounters,
) -> EvalResult<bool> {
    let run_start = ctx.regs.snapshot();
    let mut violation = false;

    'runs: for _ in 0..runs {
        counters.runs += 1;
        ctx.regs.restore(&run_start);
        let mut trace: Vec<Value> = Vec::new();

        let initialized = match init.eval(ctx) {
            Ok(v) => v.as_bool(),
            Err(e) => {
                ctx.log_error(&e);
                false
            }
        };
        if !initialized {
            *last_executed = Value::list(trace);
            continue;
        }

        ctx.regs.shift();
        trace.push(ctx.regs.state_record());
        *last_executed = Value::list(trace.clone());

        if !inv.eval(ctx)?.as_bool() {
            violation = true;
            break;
        }

        for _ in 0..steps {
            counters.steps += 1;
            let stepped = match step.eval(ctx) {
                Ok(v) => v.as_bool(),
                Err(e) => {
                    ctx.log_error(&e);
                    false
                }
            };
            if !stepped {
                // Not a deadlock: the run is dropped, the search goes on.
                *last_executed = Value::list(trace);
                continue 'runs;
            }

            ctx.regs.shift();
            trace.push(ctx.regs.state_record());
            *last_executed = Value::list(trace.clone());

            if !inv.eval(ctx)?.as_bool() {
                violation = true;
                break 'runs;
            }
        }
    }

    Ok(violation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_display_lists_states_in_order() {
        let trace = Trace {
            states: vec![
                Value::record(vec![("x", Value::int(0))]),
                Value::record(vec![("x", Value::int(1))]),
            ],
        };
        let display = format!("{trace}");
        assert!(display.contains("State 1"));
        assert!(display.contains("State 2"));
        assert!(display.contains("x = 0"));
        assert!(display.contains("x = 1"));
    }

    #[test]
    fn trace_round_trips_through_its_value_form() {
        let trace = Trace {
            states: vec![Value::record(vec![("n", Value::int(5))])],
        };
        assert_eq!(Trace::from_value(&trace.to_value()), trace);
    }

    #[test]
    fn non_list_values_yield_an_empty_trace() {
        assert!(Trace::from_value(&Value::int(3)).is_empty());
    }
}
