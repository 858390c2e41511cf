use std::fmt::Write;

use comfy_table::{Cell, Color as TableColor};

use super::styling::{bright_green, cyan, dim};
use super::tables::{create_table, ref_rule_cell, rule_cell, schedule_cell};
use crate::config::{Config, ProjectPull};

/// Prints what a configuration tracks and how often it polls.
///
/// Displays:
/// - Polling: the schedule of every pull kind
/// - Projects: explicit projects with their effective pull rules
/// - Wildcards: discovery patterns with their owner filter and pull rules
pub fn print_config_summary(config: &Config) {
    println!("{}", render_config_summary(config));
}

fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

fn pull_cells(pull: &ProjectPull) -> [Cell; 4] {
    [
        ref_rule_cell(&pull.refs.branches),
        ref_rule_cell(&pull.refs.tags),
        ref_rule_cell(&pull.refs.merge_requests),
        rule_cell(pull.environments.enabled, &pull.environments.regexp),
    ]
}

fn render_config_summary(config: &Config) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "{} {}",
        bright_green("✔ Configuration is valid"),
        dim(format!("({})", config.gitlab.url))
    );
    let _ = writeln!(
        output,
        "{} {}",
        cyan("Listening on"),
        config.server.listen_address
    );
    let webhook = if config.server.webhook.enabled {
        if config.server.webhook.secret_token.is_some() {
            "enabled, token protected"
        } else {
            "enabled"
        }
    } else {
        "disabled"
    };
    let _ = writeln!(output, "{} {webhook}\n", cyan("Webhook"));

    let mut polling = create_table();
    polling.set_header(create_cyan_header(&["Pull", "Schedule"]));
    for (name, schedule) in [
        ("projects from wildcards", &config.pull.projects_from_wildcards),
        ("refs from projects", &config.pull.refs_from_projects),
        ("environments from projects", &config.pull.environments_from_projects),
        ("metrics", &config.pull.metrics),
    ] {
        polling.add_row(vec![Cell::new(name), schedule_cell(schedule)]);
    }
    let _ = writeln!(output, "{polling}\n");

    let mut projects = create_table();
    projects.set_header(create_cyan_header(&[
        "Project",
        "Branches",
        "Tags",
        "Merge requests",
        "Environments",
    ]));
    for project in &config.projects {
        let mut row = vec![Cell::new(&project.name)];
        row.extend(pull_cells(&config.project_pull(project)));
        projects.add_row(row);
    }
    if config.projects.is_empty() {
        let _ = writeln!(output, "{}", dim("No projects configured"));
    } else {
        let _ = writeln!(output, "{projects}\n");
    }

    let mut wildcards = create_table();
    wildcards.set_header(create_cyan_header(&[
        "#",
        "Search",
        "Owner",
        "Branches",
        "Tags",
        "Merge requests",
        "Environments",
    ]));
    for (id, wildcard) in config.wildcards.iter().enumerate() {
        let owner = if wildcard.owner.kind.is_empty() {
            "any".to_string()
        } else {
            format!("{} {}", wildcard.owner.kind, wildcard.owner.name)
        };
        let mut row = vec![
            Cell::new(id),
            Cell::new(&wildcard.search),
            Cell::new(owner),
        ];
        row.extend(pull_cells(&wildcard.pull));
        wildcards.add_row(row);
    }
    if config.wildcards.is_empty() {
        let _ = writeln!(output, "{}", dim("No wildcards configured"));
    } else {
        let _ = writeln!(output, "{wildcards}");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProjectConfig, Wildcard, WildcardOwner};

    #[test]
    fn test_summary_lists_projects_and_wildcards() {
        let config = Config {
            projects: vec![ProjectConfig {
                name: "group/app".to_string(),
                pull: None,
            }],
            wildcards: vec![Wildcard {
                search: "api".to_string(),
                owner: WildcardOwner {
                    name: "platform".to_string(),
                    kind: "group".to_string(),
                    include_subgroups: true,
                },
                ..Wildcard::default()
            }],
            ..Config::default()
        };

        let summary = render_config_summary(&config);
        assert!(summary.contains("group/app"));
        assert!(summary.contains("group platform"));
        assert!(summary.contains("^(?:main|master)$"));
        assert!(summary.contains("every 30s"));
    }

    #[test]
    fn test_summary_of_empty_configuration() {
        let summary = render_config_summary(&Config::default());
        assert!(summary.contains("No projects configured"));
        assert!(summary.contains("No wildcards configured"));
    }
}
