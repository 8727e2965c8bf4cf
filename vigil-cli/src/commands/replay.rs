//! Event log replay command
//!
//! An event log is JSON lines, one recorded event per line with its offset
//! from the start of the recording:
//!
//! ```text
//! {"offset_ms": 0, "event": {"type": "lifecycle", "phase": "started"}}
//! {"offset_ms": 1500, "event": {"type": "entity_state", "entity": 1, "velocity": [30.0, 0.0, 0.0]}}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};
use vigil_core::{
    AssessmentLevel, ChannelNotifier, ConditionCore, ConditionNotification, ScenarioConfig,
    SimEvent,
};

use super::format_duration;

/// Replay arguments
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Scenario file (TOML)
    pub scenario: PathBuf,

    /// Recorded events (JSON lines)
    pub events: PathBuf,

    /// Playback speed multiplier
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,

    /// Keep conditions running this long after the last event (milliseconds)
    #[arg(long, default_value_t = 0)]
    pub tail_ms: u64,

    /// Print notifications as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// One line of an event log
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordedEvent {
    pub offset_ms: u64,
    pub event: SimEvent,
}

/// Parse an event log, rejecting offsets that go backwards.
pub fn parse_event_log(content: &str) -> Result<Vec<RecordedEvent>> {
    let mut events: Vec<RecordedEvent> = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let recorded: RecordedEvent = serde_json::from_str(line)
            .with_context(|| format!("Invalid event on line {}", index + 1))?;
        if let Some(last) = events.last()
            && recorded.offset_ms < last.offset_ms
        {
            bail!(
                "Event on line {} goes back in time ({}ms after {}ms)",
                index + 1,
                recorded.offset_ms,
                last.offset_ms
            );
        }
        events.push(recorded);
    }

    Ok(events)
}

/// Slowest accepted playback speed
const MIN_SPEED: f64 = 0.001;

/// Wall-clock pacing of a replay
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    speed: f64,
    tail: Duration,
}

impl Pacing {
    pub fn new(speed: f64, tail: Duration) -> Result<Self> {
        if !speed.is_finite() || speed < MIN_SPEED {
            bail!(
                "Playback speed must be a number of at least {}, got {}",
                MIN_SPEED,
                speed
            );
        }
        Ok(Self { speed, tail })
    }

    fn scaled(&self, offset_ms: u64) -> Result<Duration> {
        let secs = Duration::from_millis(offset_ms).as_secs_f64() / self.speed;
        Duration::try_from_secs_f64(secs)
            .with_context(|| format!("Event offset {}ms is out of range at this speed", offset_ms))
    }

    /// Deadline for an event recorded `offset_ms` after `origin`.
    fn deadline(&self, origin: Instant, offset_ms: u64) -> Result<Instant> {
        origin
            .checked_add(self.scaled(offset_ms)?)
            .with_context(|| format!("Event offset {}ms is out of range", offset_ms))
    }
}

/// Run replay command
pub async fn run(args: ReplayArgs) -> Result<()> {
    let pacing = Pacing::new(args.speed, Duration::from_millis(args.tail_ms))?;
    let scenario = ScenarioConfig::load(&args.scenario)
        .with_context(|| format!("Failed to load scenario {}", args.scenario.display()))?;
    let content = std::fs::read_to_string(&args.events)
        .with_context(|| format!("Failed to read events {}", args.events.display()))?;
    let events = parse_event_log(&content)?;

    let conditions = scenario.build_conditions()?;
    let (notifier, mut rx) = ChannelNotifier::new();
    let notifier = Arc::new(notifier);
    for condition in &conditions {
        condition.initialize(notifier.clone())?;
        condition.start()?;
    }
    info!(
        conditions = conditions.len(),
        events = events.len(),
        speed = pacing.speed,
        "Replay started"
    );

    let json = args.json;
    replay(&conditions, &mut rx, &events, pacing, |notification| {
        print_notification(notification, json)
    })
    .await?;

    println!();
    println!("{}", summary_table(&conditions));
    Ok(())
}

/// Deliver recorded events on schedule, then stop every condition.
///
/// Notifications raised by timers between events are handed to
/// `on_notification` as they arrive.
pub async fn replay(
    conditions: &[ConditionCore],
    rx: &mut UnboundedReceiver<ConditionNotification>,
    events: &[RecordedEvent],
    pacing: Pacing,
    mut on_notification: impl FnMut(&ConditionNotification),
) -> Result<()> {
    let origin = Instant::now();

    for recorded in events {
        let deadline = pacing.deadline(origin, recorded.offset_ms)?;
        wait_until(rx, deadline, &mut on_notification).await;
        dispatch(conditions, &recorded.event);
        drain(rx, &mut on_notification);
    }

    if !pacing.tail.is_zero() {
        wait_until(rx, Instant::now() + pacing.tail, &mut on_notification).await;
    }

    for condition in conditions {
        if let Err(e) = condition.stop() {
            warn!(condition = condition.name(), error = %e, "Failed to stop condition");
        }
    }
    drain(rx, &mut on_notification);
    info!("Replay finished");
    Ok(())
}

async fn wait_until(
    rx: &mut UnboundedReceiver<ConditionNotification>,
    deadline: Instant,
    on_notification: &mut impl FnMut(&ConditionNotification),
) {
    loop {
        tokio::select! {
            biased;

            Some(notification) = rx.recv() => on_notification(&notification),
            _ = sleep_until(deadline) => break,
        }
    }
}

fn drain(
    rx: &mut UnboundedReceiver<ConditionNotification>,
    on_notification: &mut impl FnMut(&ConditionNotification),
) {
    while let Ok(notification) = rx.try_recv() {
        on_notification(&notification);
    }
}

/// Hand an event to every condition listening for its kind.
fn dispatch(conditions: &[ConditionCore], event: &SimEvent) {
    let kind = event.kind();
    let mut delivered = 0;
    for condition in conditions.iter().filter(|c| c.is_interested(kind)) {
        condition.handle_event(event);
        delivered += 1;
    }
    if delivered == 0 {
        warn!(%kind, "No condition listens for this event");
    } else {
        debug!(%kind, delivered, "Event dispatched");
    }
}

fn print_notification(notification: &ConditionNotification, json: bool) {
    if json {
        match serde_json::to_string(notification) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "Failed to serialize notification"),
        }
        return;
    }

    let update = notification.update();
    let label = match notification {
        ConditionNotification::AssessmentChanged(_) => "assessment",
        ConditionNotification::Completed(_) => "finished",
    };
    let mut line = format!(
        "[{}] {:<10} {}: {}",
        update.at.format("%H:%M:%S%.3f"),
        label,
        update.condition,
        update.level
    );
    if let Some(explanation) = &update.explanation {
        line.push_str(&format!(" ({})", explanation));
    }
    println!("{}", line);
}

fn summary_table(conditions: &[ConditionCore]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Condition").fg(Color::Cyan),
        Cell::new("State").fg(Color::Cyan),
        Cell::new("Assessment").fg(Color::Cyan),
        Cell::new("Violations").fg(Color::Cyan),
        Cell::new("Violation time").fg(Color::Cyan),
        Cell::new("Completion").fg(Color::Cyan),
    ]);

    for condition in conditions {
        let report = condition.scoring_report();
        let level = condition.assessment();
        let completion = report
            .completion_time
            .map(format_duration)
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(condition.name()),
            Cell::new(condition.state()),
            Cell::new(level).fg(level_color(level)),
            Cell::new(report.global.count),
            Cell::new(format_duration(report.global.duration)),
            Cell::new(completion),
        ]);
    }

    table
}

fn level_color(level: AssessmentLevel) -> Color {
    match level {
        AssessmentLevel::BelowExpectation => Color::Red,
        AssessmentLevel::AtExpectation => Color::Green,
        AssessmentLevel::AboveExpectation => Color::Blue,
        AssessmentLevel::Unknown => Color::Grey,
    }
}
