use antenna_designer::feedback::{RetrainState, LEDGER_HEADER};
use antenna_designer::surrogate::{SurrogateInput, TransmissionLineSurrogate};
use antenna_designer::{
    BuildRequest, DesignConfig, DesignError, DesignLoop, DesignRequest, DesignResult, DesignStatus,
    FixedSet, ForwardSurrogate, Measurement, ParamName, RetrainConfig, Simulator, StorageConfig,
    Substrate, SurrogateSet, Target,
};
use proptest::prelude::*;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

/// Replays canned measurements and records what it was asked to build.
struct Scripted {
    replies: VecDeque<DesignResult<Measurement>>,
    seen: Vec<BuildRequest>,
}

impl Scripted {
    fn new(replies: impl IntoIterator<Item = DesignResult<Measurement>>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            seen: Vec::new(),
        }
    }
}

impl Simulator for Scripted {
    fn build_and_measure(&mut self, request: &BuildRequest) -> DesignResult<Measurement> {
        self.seen.push(request.clone());
        self.replies
            .pop_front()
            .unwrap_or_else(|| Ok(Measurement::absent()))
    }
}

/// Transmission-line physics with every resonance shifted up by `bias`.
struct Biased {
    physics: TransmissionLineSurrogate,
    bias: f64,
}

impl Simulator for Biased {
    fn build_and_measure(&mut self, request: &BuildRequest) -> DesignResult<Measurement> {
        let labels = self.physics.feed_labels().len();
        let index = request.parameters.feed_type_raw().round() as usize;
        let input = SurrogateInput::encode(&request.parameters, index, labels);
        let p = self.physics.predict(&input)?;
        Ok(Measurement::new(
            p.frequency_ghz * self.bias,
            p.bandwidth_mhz * self.bias,
            -18.0,
        ))
    }
}

/// Always misses the target by a wide margin.
struct AlwaysOff;

impl Simulator for AlwaysOff {
    fn build_and_measure(&mut self, _request: &BuildRequest) -> DesignResult<Measurement> {
        Ok(Measurement::new(3.0, 300.0, -9.0))
    }
}

fn config_in(dir: &Path) -> DesignConfig {
    DesignConfig::default().with_storage(StorageConfig::in_dir(dir))
}

fn analytic() -> SurrogateSet {
    SurrogateSet::with_forward(TransmissionLineSurrogate::default())
}

fn fr4_request() -> DesignRequest {
    DesignRequest::new(Target::new(2.4, 100.0).unwrap()).with_substrate(Substrate::Fr4)
}

#[test]
fn converges_on_second_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let mut design = DesignLoop::new(config_in(dir.path()), analytic()).unwrap();
    let mut sim = Scripted::new([
        Ok(Measurement::new(2.5, 90.0, -14.0)),
        Ok(Measurement::new(2.41, 95.0, -21.0)),
    ]);

    let request = fr4_request()
        .with_family("Microstrip Patch Array")
        .with_shape("Circular");
    let outcome = design.run(&request, &mut sim).unwrap();

    assert_eq!(outcome.status, DesignStatus::Converged);
    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(design.ledger().row_count(), 2);

    let first = &outcome.attempts[0];
    assert!(!first.within_tolerance);
    assert!(first.logged);
    assert!(first.corrected.patch_l() > first.proposal.patch_l());
    assert!(first.corrected.patch_w() >= first.proposal.patch_w());

    // The second build is exactly the first attempt's correction.
    assert_eq!(sim.seen[1].parameters, first.corrected);
    assert_eq!(outcome.parameters, first.corrected);
    assert!(outcome.attempts[1].within_tolerance);
    assert_eq!(sim.seen[0].substrate, Substrate::Fr4.name());
    for seen in &sim.seen {
        assert_eq!(seen.family, "Microstrip Patch Array");
        assert_eq!(seen.shape, "Circular");
    }
    assert_eq!(sim.seen[0].feed_type_label, outcome.feed_type_label);
}

#[test]
fn missing_measurement_degrades_without_logging() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let ledger_path = config.storage.ledger_path.clone();
    let mut design = DesignLoop::new(config, analytic()).unwrap();

    let mut sim = Scripted::new([Ok(Measurement::absent())]);
    let outcome = design.run(&fr4_request(), &mut sim).unwrap();
    assert_eq!(outcome.status, DesignStatus::Degraded);
    assert!(outcome.attempts.is_empty());
    assert_eq!(design.ledger().row_count(), 0);
    assert!(!ledger_path.exists());

    let mut failing = Scripted::new([Err(DesignError::MeasurementParse("empty export".into()))]);
    let outcome = design.run(&fr4_request(), &mut failing).unwrap();
    assert_eq!(outcome.status, DesignStatus::Degraded);
    assert!(!ledger_path.exists());
}

#[test]
fn feedback_pulls_a_biased_simulator_toward_target() {
    let dir = tempfile::tempdir().unwrap();
    let mut design = DesignLoop::new(config_in(dir.path()), analytic()).unwrap();
    let mut sim = Biased {
        physics: TransmissionLineSurrogate::default(),
        bias: 1.05,
    };

    let outcome = design.run(&fr4_request(), &mut sim).unwrap();
    assert_ne!(outcome.status, DesignStatus::Degraded);
    assert!(outcome.attempts.len() >= 2);

    let error = |m: &Measurement| (m.frequency_ghz.unwrap() - 2.4).abs();
    let first = error(&outcome.attempts[0].measurement);
    let last = error(outcome.last_measurement().unwrap());
    assert!(last < first, "first {} last {}", first, last);
    if outcome.status == DesignStatus::GaveUp {
        assert_eq!(outcome.attempts.len(), 5);
    }
}

#[test]
fn substrate_values_reach_the_simulator_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let mut design = DesignLoop::new(config_in(dir.path()), analytic()).unwrap();
    let mut sim = Scripted::new([
        Ok(Measurement::new(2.6, 60.0, -11.0)),
        Ok(Measurement::new(2.5, 70.0, -12.0)),
    ]);

    let outcome = design.run(&fr4_request(), &mut sim).unwrap();
    assert_eq!(outcome.status, DesignStatus::Degraded);
    assert_eq!(sim.seen.len(), 3);
    for request in &sim.seen {
        assert_eq!(request.parameters.eps_r(), 4.4);
        assert_eq!(request.parameters.substrate_h(), 0.0016);
    }
}

#[test]
fn ledger_header_is_written_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path()).with_max_attempts(3);
    let ledger_path = config.storage.ledger_path.clone();
    let mut design = DesignLoop::new(config, analytic()).unwrap();

    design.run(&fr4_request(), &mut AlwaysOff).unwrap();
    design.run(&fr4_request(), &mut AlwaysOff).unwrap();

    let text = fs::read_to_string(&ledger_path).unwrap();
    let header = LEDGER_HEADER.join(",");
    assert_eq!(text.lines().filter(|l| *l == header).count(), 1);
    assert_eq!(text.lines().count(), 7);
    assert_eq!(design.ledger().row_count(), 6);
}

#[test]
fn retraining_follows_ledger_growth_and_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path())
        .with_max_attempts(6)
        .with_retrain(RetrainConfig {
            hidden_layers: vec![8],
            epochs: 20,
            ..RetrainConfig::default()
        });
    let storage = config.storage.clone();

    let mut design = DesignLoop::new(config.clone(), analytic()).unwrap();
    let first = design.run(&fr4_request(), &mut AlwaysOff).unwrap();
    assert_eq!(first.status, DesignStatus::GaveUp);
    assert!(first.attempts.iter().all(|a| !a.retrain.retrained()));
    assert!(!storage.correction_model_path.exists());

    let second = design.run(&fr4_request(), &mut AlwaysOff).unwrap();
    let retrained: Vec<u32> = second
        .attempts
        .iter()
        .filter(|a| a.retrain.retrained())
        .map(|a| a.attempt)
        .collect();
    // Row 12 is the sixth attempt of the second request.
    assert_eq!(retrained, vec![6]);
    assert!(storage.correction_model_path.exists());
    assert_eq!(
        RetrainState::load(&storage.retrain_marker_path).last_retrain_rows,
        12
    );

    let resumed = DesignLoop::new(config, analytic()).unwrap();
    assert_eq!(resumed.ledger().row_count(), 12);
    assert_eq!(resumed.scheduler().state().last_retrain_rows, 12);
}

#[test]
fn missing_forward_model_fails_the_request() {
    let dir = tempfile::tempdir().unwrap();
    let mut design = DesignLoop::new(config_in(dir.path()), SurrogateSet::default()).unwrap();
    let err = design.run(&fr4_request(), &mut AlwaysOff).unwrap_err();
    assert!(matches!(err, DesignError::SurrogateUnavailable(_)));
}

fn fixed_subset() -> impl Strategy<Value = FixedSet> {
    (
        proptest::option::of(0.02f64..0.06),
        proptest::option::of(0.02f64..0.05),
        proptest::option::of(0.0005f64..0.003),
        proptest::option::of(2.0f64..10.0),
        proptest::option::of(0.001f64..0.006),
    )
        .prop_map(|(w, l, h, eps_r, feed)| {
            let mut fixed = FixedSet::new();
            for (name, value) in [
                (ParamName::PatchW, w),
                (ParamName::PatchL, l),
                (ParamName::SubstrateH, h),
                (ParamName::EpsR, eps_r),
                (ParamName::FeedWidth, feed),
            ] {
                if let Some(value) = value {
                    fixed.insert(name, value);
                }
            }
            fixed
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn fixed_values_are_reproduced_exactly(fixed in fixed_subset()) {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path()).with_max_attempts(2);
        let mut design = DesignLoop::new(config, analytic()).unwrap();
        let request = DesignRequest::new(Target::new(2.4, 100.0).unwrap())
            .with_fixed(fixed.clone());
        let mut sim = Scripted::new([
            Ok(Measurement::new(2.6, 80.0, -12.0)),
            Ok(Measurement::new(2.5, 85.0, -13.0)),
        ]);

        let outcome = design.run(&request, &mut sim).unwrap();
        prop_assert_eq!(sim.seen.len(), 2);
        for seen in &sim.seen {
            for (name, value) in fixed.iter() {
                prop_assert_eq!(seen.parameters.get(name), value);
            }
        }
        for attempt in &outcome.attempts {
            for (name, value) in fixed.iter() {
                prop_assert_eq!(attempt.corrected.get(name), value);
            }
        }
    }
}
