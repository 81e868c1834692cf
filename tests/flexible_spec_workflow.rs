use attriblib::{
    attribution::engine::{AttributionEngine, AttributionOutcome, DropReason},
    config::policy::PrivacyPolicy,
    errors::{RegistrationError, SpecError},
    events::{
        source::{SourceRegistration, SourceType},
        trigger::TriggerRegistration,
    },
    specs::report_spec::ReportSpec,
};
use rand::{rngs::StdRng, SeedableRng};

fn single_type_spec(num_windows: usize) -> String {
    let end_times: Vec<String> = (1..=num_windows)
        .map(|i| (i as u64 * 86_400).to_string())
        .collect();
    format!(
        r#"[{{"trigger_data": [0], "event_report_windows": {{"end_times": [{}]}},
             "summary_buckets": [1, 2, 3]}}]"#,
        end_times.join(", ")
    )
}

#[test]
fn information_gain_bound() {
    let policy = PrivacyPolicy::default();

    // 5 windows and 3 buckets over a single trigger data value, for two
    // trigger data values, leaks more than a navigation source may.
    let oversized = r#"[{"trigger_data": [0, 1],
        "event_report_windows": {"end_times": [3600, 7200, 10800, 14400, 18000]},
        "summary_buckets": [1, 2, 3]}]"#;
    let err =
        ReportSpec::from_json(oversized, 20, SourceType::Navigation, &policy)
            .unwrap_err();
    assert!(matches!(err, SpecError::InformationGainExceeded { .. }));

    let reduced = r#"[{"trigger_data": [0, 1],
        "event_report_windows": {"end_times": [3600, 7200]},
        "summary_buckets": [1, 2, 3]}]"#;
    let spec =
        ReportSpec::from_json(reduced, 20, SourceType::Navigation, &policy)
            .unwrap();
    assert_eq!(spec.privacy_params().num_states(), 100);

    // A single type with 5 windows stays well within the bound.
    let spec = ReportSpec::from_json(
        &single_type_spec(5),
        20,
        SourceType::Navigation,
        &policy,
    )
    .unwrap();
    assert_eq!(spec.privacy_params().num_states(), 56);
}

#[test]
fn duplicate_trigger_data_rejected() {
    let registration = SourceRegistration {
        trigger_specs: Some(
            r#"[{"trigger_data": [1, 3], "event_report_windows": {"end_times": [3600]}},
                {"trigger_data": [3, 4], "event_report_windows": {"end_times": [3600]}}]"#
                .to_string(),
        ),
        ..SourceRegistration::mock()
    };
    let engine = AttributionEngine::with_defaults(PrivacyPolicy::default());
    let mut rng = StdRng::seed_from_u64(0);
    assert!(matches!(
        engine.register_source(registration, &mut rng),
        Err(RegistrationError::Spec(SpecError::DuplicateTriggerData(3)))
    ));
}

#[test]
fn spec_round_trip() {
    let policy = PrivacyPolicy::default();
    let json = r#"[{"trigger_data": [1, 2], "event_report_windows": {"start_time": 600, "end_times": [3600, 86400]},
                    "summary_window_operator": "VALUE_SUM", "summary_buckets": [5, 10]},
                   {"trigger_data": [7], "event_report_windows": {"end_times": [172800]}}]"#;
    let spec =
        ReportSpec::from_json(json, 2, SourceType::Event, &policy).unwrap();
    let reparsed = ReportSpec::from_json(
        &spec.to_json(),
        spec.max_event_level_reports(),
        SourceType::Event,
        &policy,
    )
    .unwrap();
    assert_eq!(spec, reparsed);
}

#[test]
fn flexible_source_attribution() {
    let policy = PrivacyPolicy {
        event_noise_probability: 0.0,
        navigation_noise_probability: 0.0,
        // Flexible sources take their rate from the spec, so bound epsilon
        // high enough that randomized response practically never flips.
        privacy_epsilon: 100.0,
        ..PrivacyPolicy::default()
    };
    let engine = AttributionEngine::with_defaults(policy);
    let mut rng = StdRng::seed_from_u64(11);
    let mut source = engine
        .register_source(
            SourceRegistration {
                trigger_specs: Some(
                    r#"[{"trigger_data": [10, 20], "event_report_windows": {"end_times": [172800]}}]"#
                        .to_string(),
                ),
                max_event_level_reports: Some(2),
                ..SourceRegistration::mock()
            },
            &mut rng,
        )
        .unwrap()
        .source;

    // Undeclared 5 maps to the declared value at index 5 % 2.
    let trigger = engine
        .register_trigger(TriggerRegistration {
            event_triggers: r#"[{"trigger_data": "5"}]"#.to_string(),
            ..TriggerRegistration::mock()
        })
        .unwrap();
    let AttributionOutcome::Attributed { report, .. } =
        engine.attribute(&mut source, &trigger, &[]).unwrap()
    else {
        panic!("trigger was not attributed");
    };
    assert_eq!(report.trigger_data(), 20);
}

#[test]
fn filter_symmetry() {
    let engine = AttributionEngine::with_defaults(PrivacyPolicy {
        navigation_noise_probability: 0.0,
        ..PrivacyPolicy::default()
    });
    let mut rng = StdRng::seed_from_u64(2);
    let source = engine
        .register_source(
            SourceRegistration {
                filter_data: Some(r#"{"type": ["a", "b"]}"#.to_string()),
                ..SourceRegistration::mock()
            },
            &mut rng,
        )
        .unwrap()
        .source;

    let matching = engine
        .register_trigger(TriggerRegistration {
            filters: Some(r#"[{"type": ["b", "c"]}]"#.to_string()),
            ..TriggerRegistration::mock()
        })
        .unwrap();
    assert!(matches!(
        engine.attribute(&mut source.clone(), &matching, &[]).unwrap(),
        AttributionOutcome::Attributed { .. }
    ));

    let excluded = engine
        .register_trigger(TriggerRegistration {
            not_filters: Some(r#"[{"type": ["b", "c"]}]"#.to_string()),
            ..TriggerRegistration::mock()
        })
        .unwrap();
    assert_eq!(
        engine.attribute(&mut source.clone(), &excluded, &[]).unwrap(),
        AttributionOutcome::Dropped(DropReason::FilterMismatch)
    );
}
