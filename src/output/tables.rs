use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::config::{PullSchedule, RefPullRule};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// The rule's regexp in green when enabled, "off" in red otherwise.
pub fn rule_cell(enabled: bool, regexp: &str) -> Cell {
    if enabled {
        Cell::new(regexp).fg(TableColor::Green)
    } else {
        Cell::new("off").fg(TableColor::Red)
    }
}

pub fn ref_rule_cell(rule: &RefPullRule) -> Cell {
    rule_cell(rule.enabled, &rule.regexp)
}

pub fn schedule_cell(schedule: &PullSchedule) -> Cell {
    let mut text = if schedule.scheduled {
        format!("every {}s", schedule.interval_seconds)
    } else {
        "never".to_string()
    };
    if schedule.on_init {
        text.push_str(", on start");
    }

    let color = if schedule.scheduled || schedule.on_init {
        TableColor::Green
    } else {
        TableColor::Yellow
    };
    Cell::new(text).fg(color)
}
