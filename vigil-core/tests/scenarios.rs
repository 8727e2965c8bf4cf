//! End-to-end condition scenarios on the paused tokio clock

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, sleep};
use vigil_core::{
    AssessmentLevel, AuthoredRule, AuthoredRules, ChannelNotifier, Comparison, ConditionBuilder,
    ConditionCore, ConditionError, ConditionNotification, ConditionPredicate, ConditionState,
    EntityId, EventKind, PredicateContext, RescheduleableTimer, RuleMetric, ScenarioConfig,
    ScoringClock, SimEvent, TimerError, ViolationDelta,
};

/// Entities report "breach" or "clear" as learner actions.
struct Perimeter;

impl ConditionPredicate for Perimeter {
    fn kind(&self) -> &'static str {
        "perimeter"
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::LearnerAction]
    }

    fn violation_phrase(&self) -> &str {
        "breached the perimeter"
    }

    fn evaluate(
        &mut self,
        event: &SimEvent,
        ctx: &mut PredicateContext<'_>,
    ) -> Result<ViolationDelta, ConditionError> {
        let SimEvent::LearnerAction {
            entity: Some(entity),
            action,
        } = event
        else {
            return Ok(ViolationDelta::None);
        };
        let Some(subject) = ctx.resolve_subject(*entity) else {
            return Ok(ViolationDelta::None);
        };
        Ok(match action.as_str() {
            "breach" => ViolationDelta::Violating(subject),
            "clear" => ViolationDelta::Compliant(subject),
            _ => ViolationDelta::None,
        })
    }
}

fn breach(entity: u64) -> SimEvent {
    SimEvent::LearnerAction {
        entity: Some(EntityId::new(entity)),
        action: "breach".to_string(),
    }
}

fn clear(entity: u64) -> SimEvent {
    SimEvent::LearnerAction {
        entity: Some(EntityId::new(entity)),
        action: "clear".to_string(),
    }
}

fn start(builder: ConditionBuilder) -> (ConditionCore, UnboundedReceiver<ConditionNotification>) {
    let condition = builder.build();
    let (notifier, rx) = ChannelNotifier::new();
    condition.initialize(Arc::new(notifier)).unwrap();
    condition.start().unwrap();
    (condition, rx)
}

fn drain(rx: &mut UnboundedReceiver<ConditionNotification>) -> Vec<ConditionNotification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn single_subject_violates_then_recovers() {
    let (condition, mut rx) = start(ConditionCore::builder("perimeter", Perimeter));

    assert!(condition.handle_event(&breach(1)));
    assert_eq!(condition.assessment(), AssessmentLevel::BelowExpectation);

    sleep(Duration::from_secs(2)).await;
    assert!(!condition.handle_event(&breach(1)));

    sleep(Duration::from_secs(3)).await;
    assert!(condition.handle_event(&clear(1)));
    assert_eq!(condition.assessment(), AssessmentLevel::AtExpectation);
    assert_eq!(condition.assessment_explanation(), None);

    let report = condition.scoring_report();
    assert_eq!(report.global.count, 1);
    assert_eq!(report.global.duration, Duration::from_secs(5));
    assert!(!report.global.active);
    assert_eq!(report.subjects, vec![(EntityId::new(1), report.global)]);

    assert_eq!(drain(&mut rx).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn two_subjects_flip_the_level_twice() {
    let (condition, mut rx) = start(ConditionCore::builder("perimeter", Perimeter));

    let results = [
        condition.handle_event(&breach(1)),
        condition.handle_event(&breach(2)),
        condition.violator_count() == 2,
        condition.handle_event(&clear(1)),
        condition.assessment() == AssessmentLevel::BelowExpectation,
        condition.handle_event(&clear(2)),
    ];
    assert_eq!(results, [true, false, true, false, true, true]);
    assert_eq!(condition.violator_count(), 0);
    assert_eq!(condition.assessment(), AssessmentLevel::AtExpectation);

    let levels: Vec<_> = drain(&mut rx).iter().map(|n| n.update().level).collect();
    assert_eq!(
        levels,
        vec![
            AssessmentLevel::BelowExpectation,
            AssessmentLevel::AtExpectation
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn level_follows_violator_set_emptiness() {
    let (condition, _rx) = start(ConditionCore::builder("perimeter", Perimeter));
    let steps: [(SimEvent, usize); 8] = [
        (breach(3), 1),
        (breach(1), 2),
        (clear(3), 1),
        (breach(3), 2),
        (clear(1), 1),
        (clear(1), 1),
        (clear(3), 0),
        (clear(2), 0),
    ];

    let mut previous = 0;
    for (event, expected) in steps {
        let changed = condition.handle_event(&event);
        let size = condition.violator_count();
        assert_eq!(size, expected);

        let flipped = (previous == 0) != (size == 0);
        let expected_level = if size == 0 {
            AssessmentLevel::AtExpectation
        } else {
            AssessmentLevel::BelowExpectation
        };
        assert_eq!(condition.assessment(), expected_level);
        // Anonymous subjects share one explanation, so only flips are visible.
        assert_eq!(changed, flipped);
        previous = size;
    }
}

#[tokio::test(start_paused = true)]
async fn authored_rule_overrides_default_mapping() {
    let rules = AuthoredRules::new(
        "perimeter",
        vec![AuthoredRule::new(
            RuleMetric::Count,
            Comparison::Ge,
            2,
            AssessmentLevel::BelowExpectation,
        )],
    )
    .unwrap();
    let (condition, _rx) = start(ConditionCore::builder("perimeter", Perimeter).rules(rules));

    condition.handle_event(&breach(1));
    condition.handle_event(&clear(1));
    assert_eq!(condition.assessment(), AssessmentLevel::AtExpectation);

    condition.handle_event(&breach(1));
    // The explanation clears even though the level holds.
    assert!(condition.handle_event(&clear(1)));
    assert_eq!(condition.assessment_explanation(), None);

    // Two violation episodes: the rule keeps the level down after recovery.
    assert_eq!(condition.violator_count(), 0);
    assert_eq!(condition.assessment(), AssessmentLevel::BelowExpectation);
}

#[tokio::test(start_paused = true)]
async fn dwell_timer_reschedule_reports_cancelled_slide() {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fired);
    let timer = RescheduleableTimer::new("dwell", move |slide: u32| -> Result<(), TimerError> {
        sink.lock().unwrap().push(slide);
        Ok(())
    })
    .unwrap();

    assert!(!timer.schedule(Duration::from_secs(10), 1));
    sleep(Duration::from_secs(3)).await;

    // Leaving slide 1 early cancels its pending dwell task.
    assert_eq!(timer.reschedule(Duration::from_secs(10), 2), Some(1));
    assert!(timer.is_scheduled());

    sleep(Duration::from_secs(11)).await;
    assert_eq!(*fired.lock().unwrap(), vec![2]);
    assert!(!timer.is_scheduled());
}

#[tokio::test(start_paused = true)]
async fn double_stop_notifies_completion_once() {
    let (condition, mut rx) = start(ConditionCore::builder("perimeter", Perimeter));
    condition.handle_event(&breach(1));
    drain(&mut rx);

    assert!(condition.stop().unwrap());
    assert!(!condition.stop().unwrap());
    assert_eq!(condition.state(), ConditionState::Stopped);

    let completed = drain(&mut rx)
        .into_iter()
        .filter(|n| matches!(n, ConditionNotification::Completed(_)))
        .count();
    assert_eq!(completed, 1);
}

#[tokio::test(start_paused = true)]
async fn unchanged_level_is_not_notified() {
    let (condition, mut rx) = start(ConditionCore::builder("perimeter", Perimeter));

    assert!(condition.update_assessment(AssessmentLevel::AtExpectation));
    assert!(!condition.update_assessment(AssessmentLevel::AtExpectation));
    assert!(!condition.handle_event(&clear(1)));

    assert_eq!(drain(&mut rx).len(), 1);
}

#[test]
fn repeated_scoring_start_counts_once() {
    let t0 = Instant::now();
    let mut clock = ScoringClock::new();
    let subject = Some(EntityId::new(1));

    clock.start(subject, t0);
    clock.start(subject, t0 + Duration::from_secs(1));
    clock.end(subject, t0 + Duration::from_secs(4));

    assert_eq!(clock.count(subject), 1);
    assert_eq!(
        clock.duration(subject, t0 + Duration::from_secs(10)),
        Duration::from_secs(4)
    );
}

#[tokio::test(start_paused = true)]
async fn scenario_file_drives_named_members() {
    let scenario = ScenarioConfig::from_toml_str(
        r#"
        [[team]]
        name = "alpha"
        entity = 1

        [[team]]
        name = "bravo"
        entity = 2

        [[conditions]]
        name = "convoy speed"
        assessed_members = ["alpha", "bravo"]

        [conditions.params]
        kind = "speed_limit"
        max_speed_mps = 20.0

        [[conditions]]
        name = "keep out"

        [conditions.params]
        kind = "avoid_location"
        center = [0.0, 0.0, 0.0]
        radius_m = 50.0
        "#,
    )
    .unwrap();

    let conditions = scenario.build_conditions().unwrap();
    let (notifier, mut rx) = ChannelNotifier::new();
    let notifier = Arc::new(notifier);
    for condition in &conditions {
        condition.initialize(notifier.clone()).unwrap();
        condition.start().unwrap();
    }

    let event: SimEvent = serde_json::from_str(
        r#"{"type":"entity_state","entity":2,"position":[500.0,0.0,0.0],"velocity":[30.0,0.0,0.0]}"#,
    )
    .unwrap();
    for condition in &conditions {
        condition.handle_event(&event);
    }

    assert_eq!(conditions[0].assessment(), AssessmentLevel::BelowExpectation);
    assert_eq!(
        conditions[0].assessment_explanation().as_deref(),
        Some("{bravo} violated the speed limit")
    );
    assert_eq!(conditions[1].assessment(), AssessmentLevel::AtExpectation);

    let names: Vec<_> = drain(&mut rx)
        .iter()
        .map(|n| n.update().condition.clone())
        .collect();
    assert_eq!(names, vec!["convoy speed", "keep out"]);
}
