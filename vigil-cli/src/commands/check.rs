//! Scenario validation command

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use vigil_core::{ConditionCore, ScenarioConfig};

/// Check arguments
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Scenario file (TOML)
    pub scenario: PathBuf,
}

/// Run check command
pub fn run(args: CheckArgs) -> Result<()> {
    let scenario = ScenarioConfig::load(&args.scenario)
        .with_context(|| format!("Failed to load scenario {}", args.scenario.display()))?;
    let conditions = scenario.build_conditions()?;

    if conditions.is_empty() {
        println!("Scenario is valid but defines no conditions.");
        return Ok(());
    }

    println!("{}", conditions_table(&scenario, &conditions));
    println!(
        "{} condition(s), {} team member(s)",
        conditions.len(),
        scenario.team.len()
    );
    Ok(())
}

fn conditions_table(scenario: &ScenarioConfig, conditions: &[ConditionCore]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Condition").fg(Color::Cyan),
        Cell::new("Kind").fg(Color::Cyan),
        Cell::new("Listens to").fg(Color::Cyan),
        Cell::new("Assessed").fg(Color::Cyan),
        Cell::new("Rules").fg(Color::Cyan),
    ]);

    for (config, condition) in scenario.conditions.iter().zip(conditions) {
        let interests = condition
            .interests()
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let assessed = if config.assessed_members.is_empty() {
            "anyone".to_string()
        } else {
            config.assessed_members.join(", ")
        };

        table.add_row(vec![
            Cell::new(condition.name()),
            Cell::new(condition.kind()),
            Cell::new(interests),
            Cell::new(assessed),
            Cell::new(config.rules.len()),
        ]);
    }

    table
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SCENARIO: &str = r#"
        [[team]]
        name = "alpha"
        entity = 1

        [[conditions]]
        name = "convoy speed"
        assessed_members = ["alpha"]

        [conditions.params]
        kind = "speed_limit"
        max_speed_mps = 20.0

        [[conditions]]
        name = "slides"

        [conditions.params]
        kind = "slide_dwell"
        min_dwell_ms = 5000
    "#;

    #[test]
    fn table_lists_every_condition() {
        let scenario = ScenarioConfig::from_toml_str(SCENARIO).unwrap();
        let conditions = scenario.build_conditions().unwrap();

        let rendered = conditions_table(&scenario, &conditions).to_string();
        assert!(rendered.contains("convoy speed"));
        assert!(rendered.contains("speed_limit"));
        assert!(rendered.contains("alpha"));
        assert!(rendered.contains("slide_changed"));
        assert!(rendered.contains("anyone"));
    }

    #[test]
    fn demo_scenario_is_valid() {
        let scenario =
            ScenarioConfig::from_toml_str(include_str!("../../../demos/convoy.toml")).unwrap();
        let conditions = scenario.build_conditions().unwrap();
        assert_eq!(conditions.len(), 4);
        assert_eq!(scenario.team.len(), 2);
    }

    #[test]
    fn run_accepts_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCENARIO.as_bytes()).unwrap();

        let args = CheckArgs {
            scenario: file.path().to_path_buf(),
        };
        assert!(run(args).is_ok());
    }

    #[test]
    fn run_rejects_unknown_member() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCENARIO.replace("[\"alpha\"]", "[\"zulu\"]").as_bytes())
            .unwrap();

        let args = CheckArgs {
            scenario: file.path().to_path_buf(),
        };
        let error = run(args).unwrap_err();
        assert!(error.to_string().contains("zulu"));
    }

    #[test]
    fn run_reports_missing_file() {
        let args = CheckArgs {
            scenario: PathBuf::from("/nonexistent/scenario.toml"),
        };
        let error = run(args).unwrap_err();
        assert!(error.to_string().contains("Failed to load scenario"));
    }
}
