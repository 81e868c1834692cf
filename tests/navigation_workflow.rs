use attriblib::{
    attribution::engine::{AttributionEngine, AttributionOutcome, DropReason},
    config::policy::PrivacyPolicy,
    events::{
        source::{SourceRegistration, SourceStatus},
        trigger::{TriggerRegistration, TriggerStatus},
    },
    reports::event_report::EventReportStatus,
    storage::{
        hashmap_store::HashMapMeasurementStore,
        traits::{MeasurementStore, MeasurementTables},
    },
};
use rand::{rngs::StdRng, SeedableRng};

const DAY: u64 = 86_400_000;
const HOUR: u64 = 3_600_000;

fn noiseless_policy() -> PrivacyPolicy {
    PrivacyPolicy {
        event_noise_probability: 0.0,
        navigation_noise_probability: 0.0,
        ..PrivacyPolicy::default()
    }
}

#[test]
fn main() {
    let _ = log4rs::init_file("logging_config.yaml", Default::default());

    // A click on an ad in a blog app, then a purchase in the advertiser's
    // app the next day.
    let engine = AttributionEngine::with_defaults(noiseless_policy());
    let store = HashMapMeasurementStore::new();
    let mut rng = StdRng::seed_from_u64(17);

    let source_id = engine
        .store_source(&store, SourceRegistration::mock(), &mut rng)
        .unwrap();

    // Raw trigger data 9 does not fit the 8 values of a navigation source.
    let trigger_id = engine
        .store_trigger(
            &store,
            TriggerRegistration {
                event_triggers: r#"[{"trigger_data": "9", "deduplication_key": "77"}]"#
                    .to_string(),
                ..TriggerRegistration::mock()
            },
        )
        .unwrap();

    let outcome = engine.process_trigger(&store, &trigger_id).unwrap();
    let AttributionOutcome::Attributed { report, replaced } = outcome else {
        panic!("trigger was not attributed");
    };
    assert_eq!(report.trigger_data(), 1);
    assert!(replaced.is_none());
    assert_eq!(report.source_id(), source_id);

    // First navigation window closes two days after the click.
    let source_time = SourceRegistration::mock().event_time;
    assert_eq!(report.report_time(), source_time + 2 * DAY + HOUR);

    store
        .run_in_read(|tables| {
            assert_eq!(
                tables.trigger(&trigger_id)?.status(),
                TriggerStatus::Attributed
            );
            assert!(tables.source(&source_id)?.has_event_report_dedup_key(77));
            assert_eq!(tables.event_reports_for_source(&source_id).len(), 1);
            Ok(())
        })
        .unwrap();

    // Same dedup key again: dropped, and the trigger is ignored.
    let duplicate_id = engine
        .store_trigger(
            &store,
            TriggerRegistration {
                id: "trigger-2".to_string(),
                event_triggers: r#"[{"trigger_data": "3", "deduplication_key": "77"}]"#
                    .to_string(),
                ..TriggerRegistration::mock()
            },
        )
        .unwrap();
    assert_eq!(
        engine.process_trigger(&store, &duplicate_id).unwrap(),
        AttributionOutcome::Dropped(DropReason::Deduplicated)
    );
    let status = store
        .run_in_read(|tables| Ok(tables.trigger(&duplicate_id)?.status()))
        .unwrap();
    assert_eq!(status, TriggerStatus::Ignored);

    // Processing a trigger twice is an error.
    assert!(engine.process_trigger(&store, &trigger_id).is_err());
}

#[test]
fn highest_priority_source_wins() {
    let engine = AttributionEngine::with_defaults(noiseless_policy());
    let store = HashMapMeasurementStore::new();
    let mut rng = StdRng::seed_from_u64(3);

    for (id, priority) in [("low", 1), ("high", 50), ("middle", 10)] {
        engine
            .store_source(
                &store,
                SourceRegistration {
                    id: id.to_string(),
                    priority,
                    ..SourceRegistration::mock()
                },
                &mut rng,
            )
            .unwrap();
    }
    engine
        .store_trigger(&store, TriggerRegistration::mock())
        .unwrap();

    let outcomes = engine.process_pending_triggers(&store).unwrap();
    assert_eq!(outcomes.len(), 1);
    let AttributionOutcome::Attributed { report, .. } = &outcomes[0] else {
        panic!("trigger was not attributed");
    };
    assert_eq!(report.source_id(), "high");

    store
        .run_in_read(|tables| {
            assert_eq!(tables.source("high")?.status(), SourceStatus::Active);
            assert_eq!(tables.source("low")?.status(), SourceStatus::Ignored);
            assert_eq!(tables.source("middle")?.status(), SourceStatus::Ignored);
            Ok(())
        })
        .unwrap();
}

#[test]
fn report_cap_and_replacement() {
    let engine = AttributionEngine::with_defaults(noiseless_policy());
    let store = HashMapMeasurementStore::new();
    let mut rng = StdRng::seed_from_u64(5);
    engine
        .store_source(&store, SourceRegistration::mock(), &mut rng)
        .unwrap();

    let mock = TriggerRegistration::mock();
    for (index, priority) in [0, 0, 0, 1].iter().enumerate() {
        engine
            .store_trigger(
                &store,
                TriggerRegistration {
                    id: format!("trigger-{index}"),
                    trigger_time: mock.trigger_time + index as u64,
                    event_triggers: format!(
                        r#"[{{"trigger_data": "2", "priority": "{priority}"}}]"#
                    ),
                    ..mock.clone()
                },
            )
            .unwrap();
    }

    let outcomes = engine.process_pending_triggers(&store).unwrap();
    assert_eq!(outcomes.len(), 4);
    let AttributionOutcome::Attributed { replaced, .. } = &outcomes[3] else {
        panic!("higher priority trigger was not attributed");
    };
    assert!(replaced.is_some());

    store
        .run_in_read(|tables| {
            let reports = tables.event_reports_for_source("source-1");
            assert_eq!(reports.len(), 4);
            let deleted = reports
                .iter()
                .filter(|r| r.status() == EventReportStatus::MarkedToDelete)
                .count();
            assert_eq!(deleted, 1);
            Ok(())
        })
        .unwrap();
}

#[test]
fn unmatched_and_expired() {
    let engine = AttributionEngine::with_defaults(noiseless_policy());
    let store = HashMapMeasurementStore::new();
    let mut rng = StdRng::seed_from_u64(9);
    engine
        .store_source(&store, SourceRegistration::mock(), &mut rng)
        .unwrap();

    let web_trigger = engine
        .store_trigger(
            &store,
            TriggerRegistration {
                attribution_destination: "https://other.com".to_string(),
                destination_type: attriblib::events::source::DestinationType::Web,
                ..TriggerRegistration::mock()
            },
        )
        .unwrap();
    assert_eq!(
        engine.process_trigger(&store, &web_trigger).unwrap(),
        AttributionOutcome::Dropped(DropReason::NoMatchingSource)
    );

    let expiry = SourceRegistration::mock().expiry_time;
    let marked = store
        .run_in_write(|tables| tables.mark_expired_sources(expiry))
        .unwrap();
    assert_eq!(marked, 1);
}
