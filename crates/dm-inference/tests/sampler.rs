//! End-to-end sampler tests on small models with known answers.
//!
//! - initialization retries terminate at the configured cap
//! - moves keep the incremental joint consistent with a full recompute
//! - a conjugate model recovers its analytic posterior mean
//! - chains are independent of their template and of each other

use dm_core::Error;
use dm_graph::{Model, ModelBuilder, NodeId, Value};
use dm_inference::{
    Mcmc, McmcConfig, Monitor, Move, ScaleProposal, ScheduleType, SlideProposal, TraceMonitor,
    VectorElementSlideProposal, run_chains,
};
use dm_prob::Density;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// mu ~ Normal(0, 1); y ~ Normal(mu, 1) observed at 2.
/// Posterior: Normal(1, sqrt(1/2)).
fn normal_normal() -> (Model, NodeId) {
    let mut b = ModelBuilder::new();
    let zero = b.constant("zero", 0.0).unwrap();
    let one = b.constant("one", 1.0).unwrap();
    let mu = b.stochastic("mu", Density::Normal, &[zero, one], 0.0).unwrap();
    b.observed("y", Density::Normal, &[mu, one], 2.0).unwrap();
    (b.build().unwrap(), mu)
}

/// sigma ~ Exponential(1); theta[] ~ Normal(0, sigma); y ~ Normal(mean(theta), 1).
fn hierarchical() -> (Model, NodeId, NodeId) {
    let mut b = ModelBuilder::new();
    let zero = b.constant("zero", 0.0).unwrap();
    let one = b.constant("one", 1.0).unwrap();
    let sigma = b.stochastic("sigma", Density::Exponential, &[one], 1.0).unwrap();
    let theta = b.stochastic("theta", Density::Normal, &[zero, sigma], vec![0.0; 5]).unwrap();
    let m = b.deterministic("m", dm_graph::Function::Mean, &[theta]).unwrap();
    b.observed("y", Density::Normal, &[m, one], vec![0.4, 0.9, 0.1]).unwrap();
    (b.build().unwrap(), sigma, theta)
}

fn config(seed: u64) -> McmcConfig {
    McmcConfig { seed, ..McmcConfig::default() }
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

#[test]
fn test_initialization_gives_up_after_cap() {
    // x ~ Exponential(1) is always positive, y = -1 has no support under Exponential(x).
    let mut b = ModelBuilder::new();
    let one = b.constant("one", 1.0).unwrap();
    let x = b.stochastic("x", Density::Exponential, &[one], 1.0).unwrap();
    b.observed("y", Density::Exponential, &[x], -1.0).unwrap();
    let model = b.build().unwrap();
    let moves = vec![Move::new(ScaleProposal::new(x, 1.0).unwrap(), 1.0)];

    let mut mcmc = Mcmc::new(&model, &moves, &[], config(1)).unwrap();
    let err = mcmc.initialize_sampler().unwrap_err();
    assert!(matches!(err, Error::Computation(_)));
    assert!(err.to_string().contains("after 100 tries"), "{}", err);
    assert!(!mcmc.is_initialized());

    let cfg = McmcConfig { max_init_attempts: 7, ..config(1) };
    let mut mcmc = Mcmc::new(&model, &moves, &[], cfg).unwrap();
    assert!(mcmc.initialize_sampler().unwrap_err().to_string().contains("after 7 tries"));
}

#[test]
fn test_initialization_redraws_out_of_support_start() {
    // sd starts negative: Normal(0, sd) cannot be evaluated until sd is redrawn.
    let mut b = ModelBuilder::new();
    let zero = b.constant("zero", 0.0).unwrap();
    let one = b.constant("one", 1.0).unwrap();
    let sd = b.stochastic("sd", Density::Exponential, &[one], -1.0).unwrap();
    b.observed("y", Density::Normal, &[zero, sd], 0.3).unwrap();
    let model = b.build().unwrap();
    let moves = vec![Move::new(ScaleProposal::new(sd, 1.0).unwrap(), 1.0)];

    let mut mcmc = Mcmc::new(&model, &moves, &[], config(3)).unwrap();
    mcmc.initialize_sampler().unwrap();
    assert!(mcmc.model().value(sd).as_real().unwrap() > 0.0);
    assert!(mcmc.model_ln_probability().unwrap().is_finite());
    assert!(!mcmc.model().is_dirty());
}

#[test]
fn test_empty_move_list_is_a_configuration_error() {
    let (model, _) = normal_normal();
    let mut mcmc = Mcmc::new(&model, &[], &[], config(1)).unwrap();
    assert!(matches!(mcmc.initialize_sampler(), Err(Error::Configuration(_))));
}

#[test]
fn test_zero_weight_moves_are_a_configuration_error() {
    let (model, mu) = normal_normal();
    let moves = vec![Move::new(SlideProposal::new(mu, 1.0).unwrap(), 0.0)];
    let mut mcmc = Mcmc::new(&model, &moves, &[], config(1)).unwrap();
    let err = mcmc.initialize_sampler().unwrap_err();
    assert!(err.to_string().contains("zero moves per iteration"), "{}", err);
}

#[test]
fn test_next_cycle_requires_initialization() {
    let (model, mu) = normal_normal();
    let moves = vec![Move::new(SlideProposal::new(mu, 1.0).unwrap(), 1.0)];
    let mut mcmc = Mcmc::new(&model, &moves, &[], config(1)).unwrap();
    assert!(matches!(mcmc.next_cycle(true), Err(Error::Configuration(_))));
}

// ---------------------------------------------------------------------------
// Rebinding
// ---------------------------------------------------------------------------

#[test]
fn test_anonymous_target_cannot_be_rebound() {
    let mut b = ModelBuilder::new();
    let one = b.constant("one", 1.0).unwrap();
    let x = b.stochastic("", Density::Exponential, &[one], 1.0).unwrap();
    let model = b.build().unwrap();
    let moves = vec![Move::new(ScaleProposal::new(x, 1.0).unwrap(), 1.0)];
    let err = Mcmc::new(&model, &moves, &[], config(1)).unwrap_err();
    assert!(err.to_string().contains("variable name was lost"), "{}", err);
}

#[test]
fn test_move_bound_to_foreign_model_is_rejected() {
    let (model, _) = normal_normal();
    let moves = vec![Move::new(SlideProposal::new(NodeId(42), 1.0).unwrap(), 1.0)];
    assert!(matches!(Mcmc::new(&model, &moves, &[], config(1)), Err(Error::Configuration(_))));
}

#[test]
fn test_chain_does_not_touch_template() {
    let (model, mu) = normal_normal();
    let moves = vec![Move::new(SlideProposal::new(mu, 1.0).unwrap(), 1.0)];
    let mut mcmc = Mcmc::new(&model, &moves, &[], config(5)).unwrap();
    mcmc.initialize_sampler().unwrap();
    mcmc.run(200).unwrap();
    assert_eq!(model.value(mu), &Value::Real(0.0));
    assert_ne!(mcmc.model().value(mu), &Value::Real(0.0));
}

#[test]
fn test_cloned_chain_is_independent() {
    let (model, mu) = normal_normal();
    let moves = vec![Move::new(SlideProposal::new(mu, 1.0).unwrap(), 1.0)];
    let mut a = Mcmc::new(&model, &moves, &[], config(9)).unwrap();
    a.initialize_sampler().unwrap();
    a.run(50).unwrap();
    let mut b = a.try_clone().unwrap();
    assert!(b.is_initialized());
    assert_eq!(a.model().value(mu), b.model().value(mu));

    let before = a.model().value(mu).clone();
    b.run(50).unwrap();
    assert_eq!(a.model().value(mu), &before);
    // Identical RNG state: the copy replays what the original would do next.
    a.run(50).unwrap();
    assert_eq!(a.model().value(mu), b.model().value(mu));
}

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

#[test]
fn test_incremental_joint_stays_consistent() {
    let (model, sigma, theta) = hierarchical();
    let moves = vec![
        Move::new(ScaleProposal::new(sigma, 0.8).unwrap(), 1.0),
        Move::new(VectorElementSlideProposal::new(theta, 0.7).unwrap(), 3.0),
        Move::new(VectorElementSlideProposal::fixed(theta, 0, 0.2).unwrap(), 1.0),
    ];
    let cfg = McmcConfig { check_consistency: true, ..config(17) };
    let mut mcmc = Mcmc::new(&model, &moves, &[], cfg).unwrap();
    mcmc.initialize_sampler().unwrap();
    mcmc.run(300).unwrap();
    assert_eq!(mcmc.consistency_mismatches(), 0);
    assert_eq!(mcmc.generation(), 300);
    let summary = mcmc.operator_summary();
    assert_eq!(summary.len(), 3);
    let tried: u64 = summary.iter().map(|s| s.tried).sum();
    assert_eq!(tried, 300 * 5);
    assert!(summary.iter().all(|s| s.accepted <= s.tried));
}

#[test]
fn test_slide_past_support_of_scale_parameter_is_rejected() {
    // sigma ~ Exp(1); theta ~ Normal(0, sigma); y ~ Normal(theta, 1).
    // A wide slide on sigma regularly proposes sigma < 0, which must be a
    // plain rejection even though theta cannot be evaluated there.
    let mut b = ModelBuilder::new();
    let zero = b.constant("zero", 0.0).unwrap();
    let one = b.constant("one", 1.0).unwrap();
    let sigma = b.stochastic("sigma", Density::Exponential, &[one], 1.0).unwrap();
    let theta = b.stochastic("theta", Density::Normal, &[zero, sigma], 0.2).unwrap();
    b.observed("y", Density::Normal, &[theta, one], 0.5).unwrap();
    let model = b.build().unwrap();

    let moves = vec![
        Move::new(SlideProposal::new(sigma, 3.0).unwrap(), 1.0),
        Move::new(SlideProposal::new(theta, 1.0).unwrap(), 1.0),
    ];
    let trace = TraceMonitor::new(vec![sigma], 1);
    let sink = trace.sink();
    let monitors: Vec<Box<dyn Monitor>> = vec![Box::new(trace)];
    let cfg = McmcConfig { check_consistency: true, ..config(5) };
    let mut mcmc = Mcmc::new(&model, &moves, &monitors, cfg).unwrap();
    mcmc.initialize_sampler().unwrap();
    mcmc.run(500).unwrap();

    assert_eq!(mcmc.consistency_mismatches(), 0);
    let slide = &mcmc.operator_summary()[0];
    assert!(slide.tried > 0 && slide.accepted < slide.tried);
    let trace = sink.lock().unwrap();
    assert_eq!(trace.len(), 501);
    assert!(trace.rows.iter().all(|r| r.values[0] > 0.0 && r.posterior.is_finite()));
}

#[test]
fn test_failed_proposal_leaves_chain_at_kept_state() {
    // sigma ~ Normal(0, 1) admits negative values, so a negative proposal is
    // a genuine failure of theta ~ Normal(0, sigma) rather than a rejection.
    let mut b = ModelBuilder::new();
    let zero = b.constant("zero", 0.0).unwrap();
    let one = b.constant("one", 1.0).unwrap();
    let sigma = b.stochastic("sigma", Density::Normal, &[zero, one], 1.0).unwrap();
    b.stochastic("theta", Density::Normal, &[zero, sigma], 0.2).unwrap();
    let model = b.build().unwrap();
    let moves = vec![Move::new(SlideProposal::new(sigma, 10.0).unwrap(), 1.0)];
    let mut mcmc = Mcmc::new(&model, &moves, &[], config(9)).unwrap();
    mcmc.initialize_sampler().unwrap();

    let mut failure = None;
    for _ in 0..200 {
        let kept = mcmc.model().value(sigma).clone();
        if let Err(e) = mcmc.next_cycle(true) {
            failure = Some((e, kept));
            break;
        }
    }
    let (err, kept) = failure.expect("a negative sd should have been proposed");
    assert!(matches!(err, Error::Computation(_)), "{}", err);
    assert!(err.to_string().contains("'theta'"), "{}", err);

    assert!(!mcmc.model().is_dirty());
    assert!(mcmc.model().value(sigma).bit_eq(&kept));
    let cached = mcmc.model().cached_partition().total();
    let mut copy = mcmc.model().try_clone().unwrap();
    let full = copy.recompute_all().unwrap().total();
    assert!((cached - full).abs() < 1e-12);

    // The move is idle again; later cycles never trip over its state machine.
    for _ in 0..20 {
        if let Err(e) = mcmc.next_cycle(true) {
            assert!(!e.to_string().contains("called in state"), "{}", e);
        }
    }
}

#[test]
fn test_reinitialization_resets_generation() {
    let (model, mu) = normal_normal();
    let moves = vec![Move::new(SlideProposal::new(mu, 1.0).unwrap(), 1.0)];
    let mut mcmc = Mcmc::new(&model, &moves, &[], config(4)).unwrap();
    mcmc.initialize_sampler().unwrap();
    mcmc.run(25).unwrap();
    assert_eq!(mcmc.generation(), 25);
    mcmc.initialize_sampler().unwrap();
    assert_eq!(mcmc.generation(), 0);
}

#[test]
fn test_schedule_drives_number_of_proposals() {
    let (model, mu) = normal_normal();
    let moves = vec![
        Move::new(SlideProposal::new(mu, 1.0).unwrap(), 2.0),
        Move::new(SlideProposal::new(mu, 0.1).unwrap(), 3.0),
    ];
    for (schedule, per_iteration) in
        [(ScheduleType::Random, 5), (ScheduleType::Single, 1), (ScheduleType::Sequential, 2)]
    {
        let cfg = McmcConfig { schedule, ..config(2) };
        let mut mcmc = Mcmc::new(&model, &moves, &[], cfg).unwrap();
        mcmc.initialize_sampler().unwrap();
        mcmc.burnin(10, 0).unwrap();
        assert_eq!(mcmc.generation(), 0);
        let tried: u64 = mcmc.operator_summary().iter().map(|s| s.tried).sum();
        assert_eq!(tried, 10 * per_iteration, "{}", schedule);
    }
}

#[test]
fn test_strategy_description() {
    let (model, mu) = normal_normal();
    let moves = vec![
        Move::new(SlideProposal::new(mu, 1.0).unwrap(), 2.0),
        Move::new(ScaleProposal::new(mu, 1.0).unwrap(), 3.0),
    ];
    let mut mcmc = Mcmc::new(&model, &moves, &[], config(1)).unwrap();
    assert_eq!(
        mcmc.strategy_description(),
        "The simulator uses 2 different moves in a random move schedule with 5 moves per iteration"
    );
    mcmc.set_schedule_type(ScheduleType::Single);
    assert!(mcmc.strategy_description().contains("single move picked randomly"));
    assert!(mcmc.format_operator_summary().contains("Slide"));
}

#[test]
fn test_burnin_tunes_toward_target_acceptance() {
    let (model, mu) = normal_normal();
    // A far too wide window starts with a very low acceptance rate.
    let moves = vec![Move::new(SlideProposal::new(mu, 200.0).unwrap(), 1.0)];
    let mut mcmc = Mcmc::new(&model, &moves, &[], config(21)).unwrap();
    mcmc.burnin(5_000, 50).unwrap();
    mcmc.reset();
    mcmc.run(5_000).unwrap();
    let rate = mcmc.operator_summary()[0].acceptance_ratio();
    assert!(rate > 0.25 && rate < 0.65, "acceptance {}", rate);
}

// ---------------------------------------------------------------------------
// Posterior
// ---------------------------------------------------------------------------

fn posterior_mean(likelihood_heat: f64, seed: u64, n: u64) -> f64 {
    let (model, mu) = normal_normal();
    let moves = vec![Move::new(SlideProposal::new(mu, 2.0).unwrap(), 1.0).with_auto_tune(false)];
    let trace = TraceMonitor::new(vec![mu], 1);
    let sink = trace.sink();
    let monitors: Vec<Box<dyn Monitor>> = vec![Box::new(trace)];
    let mut mcmc = Mcmc::new(&model, &moves, &monitors, config(seed)).unwrap();
    mcmc.set_likelihood_heat(likelihood_heat);
    mcmc.initialize_sampler().unwrap();
    mcmc.burnin(1_000, 0).unwrap();
    mcmc.run(n).unwrap();
    let trace = sink.lock().unwrap();
    assert_eq!(trace.len() as u64, n + 1);
    trace.mean_sd("mu", 1).unwrap().0
}

#[test]
fn test_conjugate_posterior_mean() {
    let mean = posterior_mean(1.0, 2024, 100_000);
    assert!((mean - 1.0).abs() < 0.05, "posterior mean {}", mean);
}

#[test]
fn test_cold_likelihood_samples_prior() {
    let mean = posterior_mean(0.0, 7, 50_000);
    assert!(mean.abs() < 0.08, "prior mean {}", mean);
}

#[test]
fn test_prior_only_matches_cold_likelihood() {
    let (model, mu) = normal_normal();
    let moves = vec![Move::new(SlideProposal::new(mu, 2.0).unwrap(), 1.0)];
    let cfg = McmcConfig { prior_only: true, ..config(4) };
    let mut mcmc = Mcmc::new(&model, &moves, &[], cfg).unwrap();
    mcmc.initialize_sampler().unwrap();
    mcmc.run(10).unwrap();
    assert!(mcmc.model().cached_partition().likelihood == 0.0);
}

// ---------------------------------------------------------------------------
// Ensembles
// ---------------------------------------------------------------------------

#[test]
fn test_inactive_chain_stays_silent() {
    let (model, mu) = normal_normal();
    let moves = vec![Move::new(SlideProposal::new(mu, 1.0).unwrap(), 1.0)];
    let trace = TraceMonitor::new(vec![mu], 1);
    let sink = trace.sink();
    let monitors: Vec<Box<dyn Monitor>> = vec![Box::new(trace)];
    let mut mcmc = Mcmc::new(&model, &moves, &monitors, config(8)).unwrap();
    mcmc.set_chain_active(false);
    mcmc.initialize_sampler().unwrap();
    mcmc.run(25).unwrap();
    assert_eq!(mcmc.generation(), 25);
    assert!(sink.lock().unwrap().is_empty());
}

#[test]
fn test_run_chains_is_reproducible() {
    let (model, mu) = normal_normal();
    let moves = vec![Move::new(SlideProposal::new(mu, 1.0).unwrap(), 1.0)];
    let trace = TraceMonitor::new(vec![mu], 10);
    let sink = trace.sink();
    let monitors: Vec<Box<dyn Monitor>> = vec![Box::new(trace)];
    let cfg = config(100);

    let a = run_chains(&model, &moves, &monitors, &cfg, 3, 100, 200).unwrap();
    let rows_a = sink.lock().unwrap().rows.clone();
    let b = run_chains(&model, &moves, &monitors, &cfg, 3, 100, 200).unwrap();
    let rows_b = sink.lock().unwrap().rows.clone();

    assert_eq!(a.len(), 3);
    assert_eq!(a.iter().filter(|c| c.active).count(), 1);
    assert_eq!(a[1].seed, 101);
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.final_ln_probability.to_bits(), y.final_ln_probability.to_bits());
        assert_eq!(x.generations, 200);
    }
    // Only chain 0 writes: 200 / 10 + generation 0.
    assert_eq!(rows_a.len(), 21);
    assert_eq!(rows_a, rows_b);
}
