//! Output formatting for simulation reports

use facet::Facet;
use owo_colors::OwoColorize;
use rulecast_core::{ActiveRuleChange, ChangeType, Inheritance};

use crate::simulate::{SimulationReport, StepOutcome};

/// Output format
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Render a simulation report in the specified format
pub fn render_report(report: &SimulationReport, format: OutputFormat, verbose: bool) -> String {
    match format {
        OutputFormat::Text => render_text(report, verbose),
        OutputFormat::Json => render_json(report),
    }
}

fn render_text(report: &SimulationReport, verbose: bool) -> String {
    let mut output = String::new();
    let registration = &report.registration;

    output.push('\n');
    output.push_str(&format!("{} Built-in profiles\n", "##".bold()));
    output.push('\n');
    for id in &registration.created {
        output.push_str(&format!("  {} created {}\n", "+".green().bold(), id.cyan()));
    }
    for id in &registration.updated {
        output.push_str(&format!("  {} updated {}\n", "~".yellow().bold(), id.cyan()));
    }
    for renamed in registration.renamed.iter().chain(&registration.demoted) {
        output.push_str(&format!(
            "  {} renamed '{}' to '{}'\n",
            "!".yellow().bold(),
            renamed.from,
            renamed.to
        ));
    }
    for assignment in &registration.defaults {
        output.push_str(&format!(
            "  {} default for {}: {}\n",
            "*".blue().bold(),
            assignment.language,
            assignment.profile.cyan()
        ));
    }
    if verbose {
        push_changes(&mut output, &registration.changes);
    } else if !registration.changes.is_empty() {
        output.push_str(&format!(
            "  {} active rule changes\n",
            registration.changes.len()
        ));
    }

    if !report.setup_changes.is_empty() {
        output.push('\n');
        output.push_str(&format!("{} Profile setup\n", "##".bold()));
        output.push('\n');
        push_changes(&mut output, &report.setup_changes);
    }

    if !report.steps.is_empty() {
        output.push('\n');
        output.push_str(&format!("{} Operations\n", "##".bold()));
    }
    for step in &report.steps {
        output.push('\n');
        output.push_str(&format!(
            "{} {}. {} {}\n",
            "->".blue().bold(),
            step.index,
            step.action.as_str().bold(),
            step.target.dimmed()
        ));
        match &step.outcome {
            StepOutcome::Changes(changes) if changes.is_empty() => {
                output.push_str(&format!("  {}\n", "no changes".dimmed()));
            }
            StepOutcome::Changes(changes) => push_changes(&mut output, changes),
            StepOutcome::Bulk(result) => {
                output.push_str(&format!(
                    "  {} succeeded, {} failed\n",
                    result.succeeded.green(),
                    result.failed.red()
                ));
                for error in &result.errors {
                    output.push_str(&format!(
                        "  {} {}: {}\n",
                        "!".yellow().bold(),
                        error.rule_id,
                        error.message
                    ));
                }
                push_changes(&mut output, &result.changes);
            }
            StepOutcome::Rejected(message) => {
                output.push_str(&format!("  {} {}\n", "✗".red().bold(), message.red()));
            }
        }
    }

    output.push('\n');
    output.push_str(&format!("{} Profiles\n", "##".bold()));
    output.push('\n');
    for profile in &report.profiles {
        let mut flags = Vec::new();
        if profile.is_built_in {
            flags.push("built-in");
        }
        if profile.is_default {
            flags.push("default");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        let parent = profile
            .parent
            .as_ref()
            .map(|p| format!(" < {p}"))
            .unwrap_or_default();
        output.push_str(&format!(
            "  {} ({}){}{}: {} active rules\n",
            profile.name.cyan().bold(),
            profile.language,
            parent.dimmed(),
            flags.yellow(),
            profile.active_rules.len()
        ));
        if verbose {
            for rule in &profile.active_rules {
                output.push_str(&format!(
                    "      {} {} {}\n",
                    rule.key.rule_id,
                    rule.severity,
                    inheritance_label(rule.inheritance)
                ));
            }
        }
    }

    let rejected = report.rejected();
    output.push('\n');
    if rejected == 0 {
        output.push_str(&format!(
            "{} {} operations applied\n",
            "✓".green().bold(),
            report.steps.len()
        ));
    } else {
        output.push_str(&format!(
            "{} {} of {} operations rejected\n",
            "!".yellow().bold(),
            rejected,
            report.steps.len()
        ));
    }

    output
}

fn push_changes(output: &mut String, changes: &[ActiveRuleChange]) {
    for change in changes {
        let marker = match change.change_type {
            ChangeType::Activated => "+".green().bold().to_string(),
            ChangeType::Deactivated => "-".red().bold().to_string(),
            ChangeType::Updated => "~".yellow().bold().to_string(),
        };
        output.push_str(&format!(
            "  {} {} {} {} {}",
            marker,
            change.key.profile_id.cyan(),
            change.key.rule_id,
            change.severity,
            inheritance_label(change.inheritance)
        ));
        if change.prioritized {
            output.push_str(" prioritized");
        }
        if !change.params.is_empty() {
            let params: Vec<String> = change
                .params
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            output.push_str(&format!(" ({})", params.join(", ")));
        }
        output.push('\n');
    }
}

fn inheritance_label(inheritance: Inheritance) -> String {
    match inheritance {
        Inheritance::None => String::new(),
        Inheritance::Inherited => "inherited".dimmed().to_string(),
        Inheritance::Overrides => "overrides".magenta().to_string(),
    }
}

/// JSON report structure
#[derive(Debug, Facet)]
struct JsonReport {
    registration: JsonRegistration,
    setup_changes: Vec<ActiveRuleChange>,
    steps: Vec<JsonStep>,
    profiles: Vec<JsonProfile>,
    rejected: usize,
}

#[derive(Debug, Facet)]
struct JsonRegistration {
    created: Vec<String>,
    updated: Vec<String>,
    renamed: Vec<JsonRename>,
    demoted: Vec<JsonRename>,
    defaults: Vec<JsonDefault>,
    changes: Vec<ActiveRuleChange>,
}

#[derive(Debug, Facet)]
struct JsonRename {
    profile: String,
    from: String,
    to: String,
}

#[derive(Debug, Facet)]
struct JsonDefault {
    language: String,
    profile: String,
}

#[derive(Debug, Facet)]
struct JsonStep {
    index: usize,
    action: String,
    target: String,
    rejected: Option<String>,
    succeeded: Option<usize>,
    failed: Option<usize>,
    errors: Vec<JsonBulkError>,
    changes: Vec<ActiveRuleChange>,
}

#[derive(Debug, Facet)]
struct JsonBulkError {
    rule: String,
    message: String,
}

#[derive(Debug, Facet)]
struct JsonProfile {
    id: String,
    name: String,
    language: String,
    parent: Option<String>,
    built_in: bool,
    default: bool,
    active_rules: Vec<JsonActiveRule>,
}

#[derive(Debug, Facet)]
struct JsonActiveRule {
    rule: String,
    severity: String,
    prioritized: bool,
    inheritance: String,
}

fn render_json(report: &SimulationReport) -> String {
    let registration = &report.registration;
    let rename = |r: &rulecast_core::registrar::RenamedProfile| JsonRename {
        profile: r.id.to_string(),
        from: r.from.clone(),
        to: r.to.clone(),
    };

    let json_report = JsonReport {
        registration: JsonRegistration {
            created: registration.created.iter().map(ToString::to_string).collect(),
            updated: registration.updated.iter().map(ToString::to_string).collect(),
            renamed: registration.renamed.iter().map(rename).collect(),
            demoted: registration.demoted.iter().map(rename).collect(),
            defaults: registration
                .defaults
                .iter()
                .map(|d| JsonDefault {
                    language: d.language.clone(),
                    profile: d.profile.to_string(),
                })
                .collect(),
            changes: registration.changes.clone(),
        },
        setup_changes: report.setup_changes.clone(),
        steps: report
            .steps
            .iter()
            .map(|step| {
                let (rejected, succeeded, failed, errors) = match &step.outcome {
                    StepOutcome::Changes(_) => (None, None, None, Vec::new()),
                    StepOutcome::Bulk(result) => (
                        None,
                        Some(result.succeeded),
                        Some(result.failed),
                        result
                            .errors
                            .iter()
                            .map(|e| JsonBulkError {
                                rule: e.rule_id.to_string(),
                                message: e.message.clone(),
                            })
                            .collect(),
                    ),
                    StepOutcome::Rejected(message) => (Some(message.clone()), None, None, Vec::new()),
                };
                JsonStep {
                    index: step.index,
                    action: step.action.as_str().to_string(),
                    target: step.target.clone(),
                    rejected,
                    succeeded,
                    failed,
                    errors,
                    changes: step.outcome.changes().to_vec(),
                }
            })
            .collect(),
        profiles: report
            .profiles
            .iter()
            .map(|p| JsonProfile {
                id: p.id.to_string(),
                name: p.name.clone(),
                language: p.language.clone(),
                parent: p.parent.as_ref().map(ToString::to_string),
                built_in: p.is_built_in,
                default: p.is_default,
                active_rules: p
                    .active_rules
                    .iter()
                    .map(|r| JsonActiveRule {
                        rule: r.key.rule_id.to_string(),
                        severity: r.severity.to_string(),
                        prioritized: r.prioritized,
                        inheritance: r.inheritance.to_string(),
                    })
                    .collect(),
            })
            .collect(),
        rejected: report.rejected(),
    };

    facet_json::to_string_pretty(&json_report).expect("JSON serialization failed")
}
