use artificer_core::{
    Action, ArtificerConfig, Environment, LinearPerception, ObjectKind, Regime, SandboxWorld,
};
use artificer_engine::{DecisionSource, EngineSnapshot, LiveEngine, TickEvent, TickReport};
use artificer_learn::TrainingState;

type SandboxEngine = LiveEngine<SandboxWorld, LinearPerception>;

fn engine(config: ArtificerConfig) -> SandboxEngine {
    LiveEngine::sandbox(config).expect("engine")
}

fn trace(engine: &mut SandboxEngine, ticks: usize) -> Vec<(Option<Action>, Regime, f32)> {
    (0..ticks)
        .map(|_| {
            let report = engine.tick();
            (report.action, report.regime, report.reward)
        })
        .collect()
}

/// Thresholds loose enough that the run reaches manufacture within a few hundred ticks.
fn fast_regime_config() -> ArtificerConfig {
    let mut config = ArtificerConfig::default();
    config.regime.min_explore_secs = 2.0;
    config.regime.exploit_error_threshold = 10.0;
    config.regime.manufacture_min_dwell_secs = 3.0;
    config.regime.stability_window_secs = 1.0;
    config.regime.max_novel_per_minute = 1.0e6;
    config.regime.max_prediction_error = 1.0e6;
    config.regime.max_resource_variance = 1.0e9;
    config
}

#[test]
fn seeded_runs_are_identical() {
    let config = ArtificerConfig {
        rng_seed: 42,
        ..ArtificerConfig::default()
    };
    let first = trace(&mut engine(config.clone()), 50);
    let second = trace(&mut engine(config), 50);
    assert_eq!(first.len(), 50);
    assert_eq!(first, second);
    assert!(first.iter().any(|(action, _, _)| action.is_some()));
}

#[test]
fn seeded_runs_match_through_manufacture() {
    let first = trace(&mut engine(fast_regime_config()), 300);
    let second = trace(&mut engine(fast_regime_config()), 300);
    assert_eq!(first, second);
}

#[test]
fn regime_progression_is_monotonic() {
    let config = fast_regime_config();
    let min_explore = config.regime.min_explore_secs;
    let mut engine = engine(config);
    let mut previous = Regime::Explore;
    let mut reports = Vec::new();
    for _ in 0..600 {
        let report = engine.tick();
        assert!(report.regime >= previous, "regressed from {previous} to {}", report.regime);
        for event in &report.events {
            if let TickEvent::RegimeChanged { from, to, reason } = event {
                assert!(to > from);
                assert!(!reason.is_empty());
                if *to == Regime::Exploit {
                    assert!(report.sim_time > min_explore);
                }
            }
        }
        previous = report.regime;
        reports.push(report);
    }
    assert_eq!(engine.regime(), Regime::Manufacture);
    assert_eq!(engine.regime_machine().transitions().len(), 2);

    let anchored = reports.iter().any(|report| {
        report
            .events
            .iter()
            .any(|event| matches!(event, TickEvent::AnchorEstablished { .. }))
    });
    assert!(anchored, "manufacture never established an anchor");
    assert!(
        reports
            .iter()
            .any(|report| report.source == DecisionSource::ControlOverride)
    );
}

#[test]
fn anchor_survives_manufacture() {
    let mut engine = engine(fast_regime_config());
    let mut anchor = None;
    for _ in 0..600 {
        engine.tick();
        anchor = engine.anchor();
        if anchor.is_some() {
            break;
        }
    }
    let anchor = anchor.expect("manufacture established an anchor");
    let kind = engine.env().object(anchor).expect("anchored object").kind;
    assert!(matches!(kind, ObjectKind::Raw | ObjectKind::Abrasive));

    for _ in 0..400 {
        let report = engine.tick();
        assert!(
            !report
                .events
                .iter()
                .any(|event| matches!(event, TickEvent::AnchorLost { .. })),
            "anchor lost at tick {}",
            report.tick.0
        );
        assert_eq!(engine.anchor(), Some(anchor));
    }
    assert_eq!(engine.regime(), Regime::Manufacture);
}

#[test]
fn default_thresholds_hold_explore_early() {
    let mut engine = engine(ArtificerConfig::default());
    for _ in 0..240 {
        let report = engine.tick();
        assert_eq!(report.regime, Regime::Explore);
    }
}

#[test]
fn snapshot_restore_resumes_identically() {
    let config = ArtificerConfig::default();
    let mut original = engine(config.clone());
    for _ in 0..40 {
        original.tick();
    }
    let world = original.env().clone();
    let snapshot = original.snapshot();
    let json = serde_json::to_string(&snapshot).expect("serialize snapshot");
    let decoded: EngineSnapshot = serde_json::from_str(&json).expect("deserialize snapshot");
    assert_eq!(decoded, snapshot);

    let mut restored =
        LiveEngine::restore(config, world, LinearPerception::default(), decoded).expect("restore");
    assert_eq!(restored.tick_count(), original.tick_count());

    let expected: Vec<TickReport> = (0..60).map(|_| original.tick()).collect();
    let actual: Vec<TickReport> = (0..60).map(|_| restored.tick()).collect();
    assert_eq!(expected, actual);
    assert_eq!(snapshot.tick.0, 40);
}

#[test]
fn frozen_model_keeps_weights() {
    let mut engine = engine(ArtificerConfig::default());
    engine.model_mut().set_frozen(true);
    let weights = *engine.model().weights();
    let bias = *engine.model().bias();
    let mut errors = 0_u64;
    for _ in 0..150 {
        if engine.tick().prediction_error.is_some() {
            errors += 1;
        }
    }
    assert!(errors > 0);
    assert_eq!(*engine.model().weights(), weights);
    assert_eq!(*engine.model().bias(), bias);
    assert_eq!(engine.model().samples(), errors);
}

#[test]
fn training_respects_budget() {
    let mut config = ArtificerConfig::default();
    config.training.budget_ms_per_sec = 0.1;
    let mut engine = engine(config);
    let mut limited = false;
    for _ in 0..200 {
        let report = engine.tick();
        limited |= report.events.contains(&TickEvent::TrainingRateLimited);
        assert!(report.training.ms_last_1s <= 0.1 + 0.05 + 1e-6);
    }
    assert!(limited);
    assert!(engine.scheduler().metrics(20.0, 0).steps_total > 0);
}

#[test]
fn training_error_does_not_stop_ticking() {
    let mut engine = engine(ArtificerConfig::default());
    for _ in 0..50 {
        engine.tick();
    }
    engine.scheduler_mut().record_error("host reported failure");
    let before = engine.scheduler().metrics(5.0, 0).steps_total;
    for _ in 0..100 {
        let report = engine.tick();
        assert!(matches!(report.training.state, TrainingState::Error(_)));
    }
    assert_eq!(engine.scheduler().metrics(15.0, 0).steps_total, before);
    assert_eq!(engine.tick_count().0, 150);

    engine.scheduler_mut().start();
    for _ in 0..20 {
        engine.tick();
    }
    assert!(engine.scheduler().metrics(17.0, 0).steps_total > before);
}

#[test]
fn random_agent_selection_runs() {
    let config = ArtificerConfig {
        deterministic: false,
        ..ArtificerConfig::default()
    };
    let mut engine = engine(config);
    let agents = engine.env().agents();
    for _ in 0..100 {
        let report = engine.tick();
        let agent = report.agent.expect("agent");
        assert!(agents.contains(&agent));
    }
}

#[test]
fn pressure_follows_previous_directive() {
    let mut engine = engine(ArtificerConfig::default());
    let mut directive = engine.tick().directive;
    for _ in 0..500 {
        let report = engine.tick();
        for event in &report.events {
            if let TickEvent::PopulationAdjusted { spawned, cleaned } = event {
                assert!(*spawned <= 1);
                assert!(*cleaned <= directive.debris_to_clean);
                if directive.spawn_probability == 0.0 {
                    assert_eq!(*spawned, 0);
                }
            }
        }
        assert!((0.0..=1.0).contains(&report.directive.spawn_probability));
        directive = report.directive;
    }
}
