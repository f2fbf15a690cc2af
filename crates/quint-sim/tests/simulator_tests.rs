//! End-to-end scenarios: compiled modules driven through actions, runs and
//! the randomized simulator.

use quint_core::ir::{Def, Module, OpQualifier, Type};
use quint_core::IrBuilder;
use quint_sim::compile::{compile, CompiledModule, ConstBindings};
use quint_sim::error::EvalError;
use quint_sim::register::VarPair;
use quint_sim::rng::SeededRng;
use quint_sim::simulator::{SimulationConfig, Simulator, TestResult};
use quint_sim::value::Value;

fn compile_ok(module: &Module) -> CompiledModule {
    let compiled = compile(module, &ConstBindings::default());
    assert!(
        compiled.compile_errors.is_empty(),
        "compile errors: {:?}",
        compiled.compile_errors
    );
    compiled
}

fn var_pair<'a>(compiled: &'a CompiledModule, name: &str) -> &'a VarPair {
    compiled
        .vars
        .iter()
        .find(|pair| &*pair.name == name)
        .expect("variable not declared")
}

// ============================================================================
// Counter: a var driven through guarded actions
// ============================================================================

/// var n: int
/// Init        = n' = 1
/// OnEven      = all { n % 2 == 0, n' = n / 2 }
/// OnDivByThree = all { n % 3 == 0, n' = 2 * n }
/// OnPositive  = all { n > 0, n' = n + 1 }
/// Next        = any { OnEven, OnDivByThree, OnPositive }
fn counter_module(b: &IrBuilder) -> Module {
    let init = b.action("Init", b.app("assign", vec![b.name("n"), b.int(1)]));
    let on_even = b.action(
        "OnEven",
        b.app(
            "actionAll",
            vec![
                b.app(
                    "eq",
                    vec![b.app("imod", vec![b.name("n"), b.int(2)]), b.int(0)],
                ),
                b.app(
                    "assign",
                    vec![b.name("n"), b.app("idiv", vec![b.name("n"), b.int(2)])],
                ),
            ],
        ),
    );
    let on_div_three = b.action(
        "OnDivByThree",
        b.app(
            "actionAll",
            vec![
                b.app(
                    "eq",
                    vec![b.app("imod", vec![b.name("n"), b.int(3)]), b.int(0)],
                ),
                b.app(
                    "assign",
                    vec![b.name("n"), b.app("imul", vec![b.int(2), b.name("n")])],
                ),
            ],
        ),
    );
    let on_positive = b.action(
        "OnPositive",
        b.app(
            "actionAll",
            vec![
                b.app("igt", vec![b.name("n"), b.int(0)]),
                b.app(
                    "assign",
                    vec![b.name("n"), b.app("iadd", vec![b.name("n"), b.int(1)])],
                ),
            ],
        ),
    );
    let next = b.action(
        "Next",
        b.app(
            "actionAny",
            vec![b.name("OnEven"), b.name("OnDivByThree"), b.name("OnPositive")],
        ),
    );
    let positive = b.val("Positive", b.app("igt", vec![b.name("n"), b.int(0)]));
    let below_four = b.val("BelowFour", b.app("ilt", vec![b.name("n"), b.int(4)]));
    let chain = Def::Op(b.op_def(
        OpQualifier::Run,
        "Chain",
        &[],
        b.app(
            "then",
            vec![
                b.name("Init"),
                b.name("OnPositive"),
                b.name("OnPositive"),
                b.name("OnDivByThree"),
                b.name("OnEven"),
            ],
        ),
    ));
    let deterministic_test = b.val(
        "DeterministicTest",
        b.app(
            "_test",
            vec![
                b.int(1),
                b.int(3),
                b.name("Init"),
                b.name("OnPositive"),
                b.name("Positive"),
            ],
        ),
    );
    let random_test = b.val(
        "RandomTest",
        b.app(
            "_test",
            vec![
                b.int(3),
                b.int(5),
                b.name("Init"),
                b.name("Next"),
                b.name("Positive"),
            ],
        ),
    );

    b.module(
        "Counter",
        vec![
            b.var_decl("n", b.int_type()),
            init,
            on_even,
            on_div_three,
            on_positive,
            next,
            positive,
            below_four,
            chain,
            deterministic_test,
            random_test,
        ],
    )
}

#[test]
fn counter_chain_runs_to_completion() {
    let b = IrBuilder::new();
    let module = counter_module(&b);
    let compiled = compile_ok(&module);
    let mut ctx = compiled.new_ctx(SeededRng::new(7));

    let result = compiled.eval_name(&mut ctx, "Chain").unwrap();
    assert_eq!(result, Value::Bool(true));

    // After Init.then(OnPositive).then(OnPositive).then(OnDivByThree)
    // .then(OnEven) the states seen are 1, 2, 3, 6 with 3 pending.
    let n = var_pair(&compiled, "n");
    assert_eq!(ctx.regs.read(n.current).unwrap(), Value::int(6));
    assert_eq!(ctx.regs.read(n.next).unwrap(), Value::int(3));

    ctx.regs.shift();
    assert_eq!(ctx.regs.read(n.current).unwrap(), Value::int(3));
}

#[test]
fn test_opcode_records_the_trace() {
    let b = IrBuilder::new();
    let module = counter_module(&b);
    let compiled = compile_ok(&module);
    let mut ctx = compiled.new_ctx(SeededRng::new(11));

    let verdict = compiled.eval_name(&mut ctx, "DeterministicTest").unwrap();
    assert_eq!(verdict, Value::Bool(true));

    let trace = ctx
        .regs
        .peek(compiled.last_trace_register())
        .expect("the test leaves a trace");
    let expected: Vec<Value> = [1, 2, 3, 4]
        .iter()
        .map(|&i| Value::record(vec![("n", Value::int(i))]))
        .collect();
    assert_eq!(trace, &Value::list(expected));
}

#[test]
fn seeded_runs_are_reproducible() {
    let b = IrBuilder::new();
    let module = counter_module(&b);
    let compiled = compile_ok(&module);

    let run_once = |seed: u64| {
        let mut ctx = compiled.new_ctx(SeededRng::new(seed));
        let verdict = compiled.eval_name(&mut ctx, "RandomTest").unwrap();
        let trace = ctx
            .regs
            .peek(compiled.last_trace_register())
            .cloned()
            .expect("the test leaves a trace");
        (verdict, trace)
    };

    let (verdict_a, trace_a) = run_once(42);
    let (verdict_b, trace_b) = run_once(42);
    assert_eq!(verdict_a, verdict_b);
    assert_eq!(trace_a, trace_b);
}

#[test]
fn simulator_finds_an_invariant_violation() {
    let b = IrBuilder::new();
    let module = counter_module(&b);
    let compiled = compile_ok(&module);

    let config = SimulationConfig {
        runs: 5,
        steps: 10,
        seed: Some(3),
        init: "Init".to_string(),
        step: "OnPositive".to_string(),
        invariant: "BelowFour".to_string(),
    };
    match Simulator::new(&compiled, config).run() {
        TestResult::Violation {
            invariant,
            trace,
            stats,
        } => {
            assert_eq!(invariant, "BelowFour");
            // states 1, 2, 3 satisfy the invariant; 4 violates it
            assert_eq!(trace.len(), 4);
            assert_eq!(
                trace.states.last(),
                Some(&Value::record(vec![("n", Value::int(4))]))
            );
            assert_eq!(stats.seed, 3);
        }
        other => panic!("expected a violation, got {other:?}"),
    }
}

#[test]
fn simulator_passes_when_no_violation_exists() {
    let b = IrBuilder::new();
    let module = counter_module(&b);
    let compiled = compile_ok(&module);

    let config = SimulationConfig {
        runs: 20,
        steps: 10,
        seed: Some(5),
        init: "Init".to_string(),
        step: "Next".to_string(),
        invariant: "Positive".to_string(),
    };
    let result = Simulator::new(&compiled, config).run();
    assert!(result.is_passed(), "unexpected verdict: {result:?}");
    assert_eq!(result.stats().runs_executed, 20);
}

#[test]
fn disabled_step_drops_the_run_without_deadlock_error() {
    let b = IrBuilder::new();
    let stuck = b.action("Stuck", b.bool(false));
    let init = b.action("Init", b.app("assign", vec![b.name("n"), b.int(0)]));
    let inv = b.val("Inv", b.bool(true));
    let module = b.module(
        "M",
        vec![b.var_decl("n", b.int_type()), init, stuck, inv],
    );
    let compiled = compile_ok(&module);

    let config = SimulationConfig {
        runs: 4,
        steps: 10,
        seed: Some(1),
        init: "Init".to_string(),
        step: "Stuck".to_string(),
        invariant: "Inv".to_string(),
    };
    let result = Simulator::new(&compiled, config).run();
    assert!(result.is_passed(), "dropped runs are not violations");
    assert_eq!(result.stats().runs_executed, 4);
}

// ============================================================================
// Assignment and restoration semantics
// ============================================================================

#[test]
fn assignment_writes_next_state_only() {
    let b = IrBuilder::new();
    let act = b.action(
        "AssignFive",
        b.app(
            "actionAll",
            vec![
                b.app("assign", vec![b.name("n"), b.int(5)]),
                b.app("eq", vec![b.name("n"), b.name("n")]),
            ],
        ),
    );
    let module = b.module("M", vec![b.var_decl("n", b.int_type()), act]);
    let compiled = compile_ok(&module);
    let mut ctx = compiled.new_ctx(SeededRng::new(0));

    let n = var_pair(&compiled, "n");
    ctx.regs.write(n.current, Value::int(3));

    let result = compiled.eval_name(&mut ctx, "AssignFive").unwrap();
    assert_eq!(result, Value::Bool(true));
    assert_eq!(ctx.regs.read(n.current).unwrap(), Value::int(3));
    assert_eq!(ctx.regs.read(n.next).unwrap(), Value::int(5));

    ctx.regs.shift();
    assert_eq!(ctx.regs.read(n.current).unwrap(), Value::int(5));
}

#[test]
fn any_commits_the_single_succeeding_branch() {
    let b = IrBuilder::new();
    let act = b.action(
        "Choose",
        b.app(
            "actionAny",
            vec![
                b.app(
                    "actionAll",
                    vec![
                        b.app("assign", vec![b.name("n"), b.int(1)]),
                        b.bool(false),
                    ],
                ),
                b.app(
                    "actionAll",
                    vec![b.app("assign", vec![b.name("n"), b.int(2)])],
                ),
            ],
        ),
    );
    let module = b.module("M", vec![b.var_decl("n", b.int_type()), act]);
    let compiled = compile_ok(&module);
    let mut ctx = compiled.new_ctx(SeededRng::new(9));

    let n = var_pair(&compiled, "n");
    ctx.regs.write(n.current, Value::int(0));

    let result = compiled.eval_name(&mut ctx, "Choose").unwrap();
    assert_eq!(result, Value::Bool(true));
    assert_eq!(ctx.regs.read(n.next).unwrap(), Value::int(2));
}

#[test]
fn failed_all_restores_next_state() {
    let b = IrBuilder::new();
    let act = b.action(
        "Broken",
        b.app(
            "actionAll",
            vec![
                b.app("assign", vec![b.name("n"), b.int(1)]),
                b.app(
                    "eq",
                    vec![b.app("idiv", vec![b.int(1), b.int(0)]), b.int(0)],
                ),
            ],
        ),
    );
    let module = b.module("M", vec![b.var_decl("n", b.int_type()), act]);
    let compiled = compile_ok(&module);
    let mut ctx = compiled.new_ctx(SeededRng::new(0));

    let result = compiled.eval_name(&mut ctx, "Broken").unwrap();
    assert_eq!(result, Value::Bool(false));

    let n = var_pair(&compiled, "n");
    assert!(ctx.regs.peek(n.next).is_none(), "assignment was rolled back");
    assert!(!ctx.runtime_errors.is_empty(), "the failure was logged");
}

#[test]
fn and_or_short_circuit_before_diverging_operands() {
    let b = IrBuilder::new();
    let diverge = |b: &IrBuilder| {
        b.app(
            "eq",
            vec![b.app("idiv", vec![b.int(1), b.int(0)]), b.int(0)],
        )
    };
    let module = b.module(
        "M",
        vec![
            b.val("ShortAnd", b.app("and", vec![b.bool(false), diverge(&b)])),
            b.val("ShortOr", b.app("or", vec![b.bool(true), diverge(&b)])),
            b.val("FailingAnd", b.app("and", vec![b.bool(true), diverge(&b)])),
        ],
    );
    let compiled = compile_ok(&module);
    let mut ctx = compiled.new_ctx(SeededRng::new(0));

    assert_eq!(
        compiled.eval_name(&mut ctx, "ShortAnd").unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        compiled.eval_name(&mut ctx, "ShortOr").unwrap(),
        Value::Bool(true)
    );
    assert!(
        ctx.runtime_errors.is_empty(),
        "short-circuited operands are never evaluated"
    );

    assert_eq!(
        compiled.eval_name(&mut ctx, "FailingAnd").unwrap(),
        Value::Bool(false)
    );
    assert!(!ctx.runtime_errors.is_empty(), "the coerced failure is logged");
}

#[test]
fn fold_is_deterministic_over_set_literals() {
    let sum_of = |order: &[i64]| {
        let b = IrBuilder::new();
        let set = b.app("Set", order.iter().map(|&v| b.int(v)).collect());
        let add = b.lambda(&["a", "x"], b.app("iadd", vec![b.name("a"), b.name("x")]));
        let module = b.module("M", vec![b.val("Sum", b.app("fold", vec![set, b.int(0), add]))]);
        let compiled = compile_ok(&module);
        let mut ctx = compiled.new_ctx(SeededRng::new(0));
        compiled.eval_name(&mut ctx, "Sum").unwrap()
    };

    assert_eq!(sum_of(&[1, 2, 3, 4, 5]), Value::int(15));
    assert_eq!(sum_of(&[5, 3, 1, 2, 4]), Value::int(15));
}

// ============================================================================
// Auction: maps, records and parameterized actions in a run
// ============================================================================

fn auction_module(b: &IrBuilder) -> Module {
    let balances_type = || Type::Fun {
        id: b.id(),
        arg: Box::new(b.str_type()),
        res: Box::new(b.int_type()),
    };
    let auction_type = b.rec_type(vec![
        ("highestBidder", b.str_type()),
        ("highestBid", b.int_type()),
    ]);

    let fix_init = b.action(
        "fixInit",
        b.app(
            "actionAll",
            vec![
                b.app(
                    "assign",
                    vec![
                        b.name("balances"),
                        b.app(
                            "Map",
                            vec![
                                b.app("Tup", vec![b.str("alice"), b.int(21)]),
                                b.app("Tup", vec![b.str("bob"), b.int(20)]),
                            ],
                        ),
                    ],
                ),
                b.app(
                    "assign",
                    vec![
                        b.name("pendingReturns"),
                        b.app(
                            "Map",
                            vec![
                                b.app("Tup", vec![b.str("alice"), b.int(0)]),
                                b.app("Tup", vec![b.str("bob"), b.int(0)]),
                            ],
                        ),
                    ],
                ),
                b.app(
                    "assign",
                    vec![
                        b.name("auctionState"),
                        b.app(
                            "Rec",
                            vec![
                                b.str("highestBidder"),
                                b.str(""),
                                b.str("highestBid"),
                                b.int(0),
                            ],
                        ),
                    ],
                ),
            ],
        ),
    );

    let highest_bidder = |b: &IrBuilder| {
        b.app(
            "field",
            vec![b.name("auctionState"), b.str("highestBidder")],
        )
    };
    let highest_bid =
        |b: &IrBuilder| b.app("field", vec![b.name("auctionState"), b.str("highestBid")]);

    let bid = Def::Op(b.op_def(
        OpQualifier::Action,
        "bid",
        &["sender", "amount"],
        b.app(
            "actionAll",
            vec![
                b.app("igt", vec![b.name("amount"), highest_bid(b)]),
                b.app(
                    "assign",
                    vec![
                        b.name("balances"),
                        b.app(
                            "setBy",
                            vec![
                                b.name("balances"),
                                b.name("sender"),
                                b.lambda(
                                    &["x"],
                                    b.app("isub", vec![b.name("x"), b.name("amount")]),
                                ),
                            ],
                        ),
                    ],
                ),
                b.app(
                    "assign",
                    vec![
                        b.name("pendingReturns"),
                        b.app(
                            "ite",
                            vec![
                                b.app("eq", vec![highest_bidder(b), b.str("")]),
                                b.name("pendingReturns"),
                                b.app(
                                    "setBy",
                                    vec![
                                        b.name("pendingReturns"),
                                        highest_bidder(b),
                                        b.lambda(
                                            &["x"],
                                            b.app("iadd", vec![b.name("x"), highest_bid(b)]),
                                        ),
                                    ],
                                ),
                            ],
                        ),
                    ],
                ),
                b.app(
                    "assign",
                    vec![
                        b.name("auctionState"),
                        b.app(
                            "Rec",
                            vec![
                                b.str("highestBidder"),
                                b.name("sender"),
                                b.str("highestBid"),
                                b.name("amount"),
                            ],
                        ),
                    ],
                ),
            ],
        ),
    ));

    let pending_of = |b: &IrBuilder| {
        b.app("get", vec![b.name("pendingReturns"), b.name("sender")])
    };
    let withdraw = Def::Op(b.op_def(
        OpQualifier::Action,
        "withdraw",
        &["sender"],
        b.app(
            "actionAll",
            vec![
                b.app("igt", vec![pending_of(b), b.int(0)]),
                b.app(
                    "assign",
                    vec![
                        b.name("balances"),
                        b.app(
                            "setBy",
                            vec![
                                b.name("balances"),
                                b.name("sender"),
                                b.lambda(&["x"], b.app("iadd", vec![b.name("x"), pending_of(b)])),
                            ],
                        ),
                    ],
                ),
                b.app(
                    "assign",
                    vec![
                        b.name("pendingReturns"),
                        b.app(
                            "set",
                            vec![b.name("pendingReturns"), b.name("sender"), b.int(0)],
                        ),
                    ],
                ),
                b.app("assign", vec![b.name("auctionState"), b.name("auctionState")]),
            ],
        ),
    ));

    let scenario = Def::Op(b.op_def(
        OpQualifier::Run,
        "Scenario",
        &[],
        b.app(
            "then",
            vec![
                b.name("fixInit"),
                b.app("bid", vec![b.str("alice"), b.int(5)]),
                b.app("bid", vec![b.str("bob"), b.int(6)]),
                b.app("withdraw", vec![b.str("alice")]),
            ],
        ),
    ));

    b.module(
        "SimpleAuction",
        vec![
            b.var_decl("balances", balances_type()),
            b.var_decl("pendingReturns", balances_type()),
            b.var_decl("auctionState", auction_type),
            fix_init,
            bid,
            withdraw,
            scenario,
        ],
    )
}

#[test]
fn auction_outbid_bidder_withdraws_in_full() {
    let b = IrBuilder::new();
    let module = auction_module(&b);
    let compiled = compile_ok(&module);
    let mut ctx = compiled.new_ctx(SeededRng::new(1));

    let result = compiled.eval_name(&mut ctx, "Scenario").unwrap();
    assert_eq!(result, Value::Bool(true));
    ctx.regs.shift();

    let balances = ctx
        .regs
        .read(var_pair(&compiled, "balances").current)
        .unwrap();
    assert_eq!(
        balances.as_map().get(&Value::str("alice")),
        Some(&Value::int(21)),
        "alice got her outbid stake back"
    );
    assert_eq!(
        balances.as_map().get(&Value::str("bob")),
        Some(&Value::int(14))
    );

    let auction = ctx
        .regs
        .read(var_pair(&compiled, "auctionState").current)
        .unwrap();
    assert_eq!(
        auction.as_record().get("highestBidder"),
        Some(&Value::str("bob"))
    );
    assert_eq!(auction.as_record().get("highestBid"), Some(&Value::int(6)));
}

// ============================================================================
// Compile-time and runtime error surfaces
// ============================================================================

#[test]
fn unbound_constant_is_a_compile_error() {
    let b = IrBuilder::new();
    let module = b.module(
        "M",
        vec![
            b.const_decl("limit", b.int_type()),
            b.val("Uses", b.app("iadd", vec![b.name("limit"), b.int(1)])),
        ],
    );
    let compiled = compile(&module, &ConstBindings::default());
    assert!(!compiled.compile_errors.is_empty());
    assert!(compiled
        .compile_errors
        .iter()
        .any(|e| e.explanation.contains("Constant limit")));
}

#[test]
fn bound_constant_evaluates() {
    let b = IrBuilder::new();
    let module = b.module(
        "M",
        vec![
            b.const_decl("limit", b.int_type()),
            b.val("Uses", b.app("iadd", vec![b.name("limit"), b.int(1)])),
        ],
    );
    let mut consts = ConstBindings::default();
    consts.insert("limit".to_string(), Value::int(41));
    let compiled = compile(&module, &consts);
    assert!(compiled.compile_errors.is_empty());

    let mut ctx = compiled.new_ctx(SeededRng::new(0));
    assert_eq!(
        compiled.eval_name(&mut ctx, "Uses").unwrap(),
        Value::int(42)
    );
}

#[test]
fn temporal_definitions_fail_only_when_evaluated() {
    let b = IrBuilder::new();
    let module = b.module(
        "M",
        vec![Def::Op(b.op_def(
            OpQualifier::Temporal,
            "Liveness",
            &[],
            b.bool(true),
        ))],
    );
    let compiled = compile_ok(&module);

    let mut ctx = compiled.new_ctx(SeededRng::new(0));
    let err = compiled.eval_name(&mut ctx, "Liveness").unwrap_err();
    assert!(matches!(err, EvalError::Temporal { .. }));
}

#[test]
fn enumerating_the_infinite_int_set_fails_at_runtime() {
    let b = IrBuilder::new();
    let module = b.module(
        "M",
        vec![
            b.val("Size", b.app("size", vec![b.name("Int")])),
            b.val("Member", b.app("contains", vec![b.name("Nat"), b.int(3)])),
        ],
    );
    let compiled = compile_ok(&module);
    let mut ctx = compiled.new_ctx(SeededRng::new(0));

    let err = compiled.eval_name(&mut ctx, "Size").unwrap_err();
    assert!(matches!(err, EvalError::InfiniteSet { name: "Int", .. }));

    // Membership does not require enumeration.
    assert_eq!(
        compiled.eval_name(&mut ctx, "Member").unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn one_of_picks_members_and_fails_on_empty_sets() {
    let b = IrBuilder::new();
    let module = b.module(
        "M",
        vec![
            b.val(
                "Pick",
                b.app("oneOf", vec![b.app("to", vec![b.int(1), b.int(100)])]),
            ),
            b.val("Empty", b.app("oneOf", vec![b.app("Set", vec![])])),
        ],
    );
    let compiled = compile_ok(&module);
    let mut ctx = compiled.new_ctx(SeededRng::new(17));

    for _ in 0..20 {
        let picked = compiled.eval_name(&mut ctx, "Pick").unwrap();
        let n = picked.as_int();
        assert!(*n >= 1.into() && *n <= 100.into());
    }

    let err = compiled.eval_name(&mut ctx, "Empty").unwrap_err();
    assert!(matches!(err, EvalError::EmptySet { .. }));
}

#[test]
fn higher_order_operators_flow_through_parameters() {
    let b = IrBuilder::new();
    // def apply(f, x) = f(x); val Out = apply(x => x * 3, 14)
    let apply = Def::Op(b.op_def(
        OpQualifier::Def,
        "apply",
        &["f", "x"],
        b.app("f", vec![b.name("x")]),
    ));
    let triple = b.lambda(&["y"], b.app("imul", vec![b.name("y"), b.int(3)]));
    let module = b.module(
        "M",
        vec![apply, b.val("Out", b.app("apply", vec![triple, b.int(14)]))],
    );
    let compiled = compile_ok(&module);
    let mut ctx = compiled.new_ctx(SeededRng::new(0));
    assert_eq!(
        compiled.eval_name(&mut ctx, "Out").unwrap(),
        Value::int(42)
    );
}

#[test]
fn let_bound_recursion_terminates_with_its_base_case() {
    let b = IrBuilder::new();
    // let def fact(k) = if (k <= 1) 1 else k * fact(k - 1); fact(10)
    let fact = b.op_def(
        OpQualifier::Def,
        "fact",
        &["k"],
        b.app(
            "ite",
            vec![
                b.app("ilte", vec![b.name("k"), b.int(1)]),
                b.int(1),
                b.app(
                    "imul",
                    vec![
                        b.name("k"),
                        b.app("fact", vec![b.app("isub", vec![b.name("k"), b.int(1)])]),
                    ],
                ),
            ],
        ),
    );
    let expr = b.let_in(fact, b.app("fact", vec![b.int(10)]));
    let module = b.module("M", vec![b.val("Out", expr)]);
    let compiled = compile_ok(&module);
    let mut ctx = compiled.new_ctx(SeededRng::new(0));
    assert_eq!(
        compiled.eval_name(&mut ctx, "Out").unwrap(),
        Value::int(3_628_800)
    );
}

#[test]
fn unbounded_recursion_is_reported_not_crashed() {
    let b = IrBuilder::new();
    let looping = Def::Op(b.op_def(
        OpQualifier::Def,
        "spin",
        &["k"],
        b.app("spin", vec![b.name("k")]),
    ));
    let module = b.module(
        "M",
        vec![looping, b.val("Out", b.app("spin", vec![b.int(0)]))],
    );
    let compiled = compile_ok(&module);
    let mut ctx = compiled.new_ctx(SeededRng::new(0));
    let err = compiled.eval_name(&mut ctx, "Out").unwrap_err();
    assert!(matches!(err, EvalError::StackOverflow { .. }));
}

#[test]
fn repeated_composes_an_action_with_itself() {
    let b = IrBuilder::new();
    let inc = b.action(
        "Inc",
        b.app(
            "assign",
            vec![b.name("n"), b.app("iadd", vec![b.name("n"), b.int(1)])],
        ),
    );
    let init = b.action("Zero", b.app("assign", vec![b.name("n"), b.int(0)]));
    let run = Def::Op(b.op_def(
        OpQualifier::Run,
        "FiveSteps",
        &[],
        b.app(
            "then",
            vec![b.name("Zero"), b.app("repeated", vec![b.name("Inc"), b.int(5)])],
        ),
    ));
    let module = b.module("M", vec![b.var_decl("n", b.int_type()), init, inc, run]);
    let compiled = compile_ok(&module);
    let mut ctx = compiled.new_ctx(SeededRng::new(0));

    assert_eq!(
        compiled.eval_name(&mut ctx, "FiveSteps").unwrap(),
        Value::Bool(true)
    );
    ctx.regs.shift();
    let n = var_pair(&compiled, "n");
    assert_eq!(ctx.regs.read(n.current).unwrap(), Value::int(5));
}
