use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use measure_probe::compare::differ::count_diff_text;
use measure_probe::compare::{
    run_comparison, run_sweep, ComparisonRequest, MeasureComparison, RemoteEvaluation,
    RemoteReportLookup, SweepReport,
};
use measure_probe::config::{Config, ConfigOverrides, ServerEndpoint};
use measure_probe::fhir::resource::{
    expect_resource_type, Library, Measure, MeasureReport, Patient, PatientGroup, Subject,
};
use measure_probe::ops;
use measure_probe::ops::patients::PatientRoster;
use measure_probe::output::csv::{comparison_to_csv, sweep_to_csv};
use measure_probe::output::json::render_json;
use measure_probe::output::table::{
    render_comparison_table, render_groups_table, render_measures_table, render_patients_table,
    render_report_table, render_reports_table, render_requirements_table, render_sweep_table,
};
use measure_probe::server::run_server;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "measure-probe",
    about = "Clinical quality measure testing workbench for FHIR servers"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long = "knowledge-repo")]
    knowledge_repo: Option<String>,
    #[arg(long = "data-repo")]
    data_repo: Option<String>,
    #[arg(long)]
    evaluation: Option<String>,
    #[arg(long)]
    token: Option<String>,
    #[arg(long = "period-start")]
    period_start: Option<String>,
    #[arg(long = "period-end")]
    period_end: Option<String>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Compare {
        measure: String,
        #[arg(long)]
        patient: Option<String>,
        #[arg(long)]
        group: Option<String>,
        #[arg(long = "show-diff")]
        show_diff: bool,
    },
    Sweep {
        measure: String,
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    Evaluate {
        measure: String,
        #[arg(long)]
        patient: Option<String>,
        #[arg(long)]
        group: Option<String>,
    },
    Collect {
        measure: String,
        #[arg(long)]
        patient: Option<String>,
    },
    Submit {
        measure: String,
        #[arg(long)]
        patient: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    Requirements {
        measure: String,
    },
    Measures,
    Patients,
    Groups,
    Reports {
        measure: String,
        #[arg(long)]
        patient: Option<String>,
        #[arg(long)]
        group: Option<String>,
    },
    Report {
        id: String,
    },
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 3001)]
        port: u16,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides {
        knowledge_repo: cli.knowledge_repo.clone(),
        data_repo: cli.data_repo.clone(),
        evaluation: cli.evaluation.clone(),
        access_token: cli.token.clone(),
        period_start: cli.period_start.clone(),
        period_end: cli.period_end.clone(),
    });

    if matches!(cli.command, Commands::Config { .. }) {
        return handle_config_command(&cli.command, &config, &config_path);
    }
    if let Commands::Serve { host, port } = &cli.command {
        let bind = format!("{host}:{port}");
        let addr: SocketAddr = bind
            .parse()
            .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
        return run_server(config, addr).await;
    }

    match &cli.command {
        Commands::Compare {
            measure,
            patient,
            group,
            show_diff,
        } => {
            let server = require_endpoint(&config.servers.evaluation, "evaluation")?;
            let subject = resolve_subject(patient.as_deref(), group.as_deref())?;
            let request = ComparisonRequest {
                server: server.clone(),
                measure: measure.clone(),
                subject,
                period_start: config.period.start.clone(),
                period_end: config.period.end.clone(),
            };
            let reports = RemoteReportLookup {
                page_size: config.fetch.page_size,
            };
            let comparison = run_comparison(&RemoteEvaluation, &reports, &request).await?;
            print_comparison(&comparison, cli.output)?;
            if *show_diff && comparison.discrepancy {
                println!(
                    "{}",
                    count_diff_text(&comparison.evaluated, &comparison.reported)
                );
            }
        }
        Commands::Sweep {
            measure,
            group,
            limit,
        } => {
            let evaluation = require_endpoint(&config.servers.evaluation, "evaluation")?;
            let data_repo = require_endpoint(&config.servers.data_repo, "data repository")?;
            let mut roster: Vec<Patient> = match group {
                Some(group_id) => {
                    let group = ops::groups::fetch_group(data_repo, group_id).await?;
                    group
                        .member_patient_ids()?
                        .into_iter()
                        .map(roster_patient)
                        .collect()
                }
                None => {
                    ops::patients::fetch_patients(data_repo, config.fetch.page_size)
                        .await?
                        .patients
                }
            };
            if let Some(limit) = limit {
                roster.truncate((*limit).max(1));
            }
            info!("sweeping {} patients for {measure}", roster.len());

            let base = ComparisonRequest {
                server: evaluation.clone(),
                measure: measure.clone(),
                subject: None,
                period_start: config.period.start.clone(),
                period_end: config.period.end.clone(),
            };
            let reports = RemoteReportLookup {
                page_size: config.fetch.page_size,
            };
            let sweep = run_sweep(&RemoteEvaluation, &reports, &base, &roster).await;
            print_sweep(&sweep, cli.output)?;
        }
        Commands::Evaluate {
            measure,
            patient,
            group,
        } => {
            let server = require_endpoint(&config.servers.evaluation, "evaluation")?;
            let subject = resolve_subject(patient.as_deref(), group.as_deref())?;
            let report = ops::evaluate::evaluate_measure(
                server,
                measure,
                subject.as_ref(),
                &config.period.start,
                &config.period.end,
            )
            .await?;
            print_report(&report, cli.output)?;
        }
        Commands::Collect { measure, patient } => {
            let server = require_endpoint(&config.servers.evaluation, "evaluation")?;
            let parameters = ops::collect::fetch_collected(
                server,
                measure,
                &config.period.start,
                &config.period.end,
                patient.as_deref(),
            )
            .await?;
            info!(
                "collected {} resources for {measure}",
                ops::collect::collected_resource_count(&parameters)
            );
            println!("{}", render_json(&parameters)?);
        }
        Commands::Submit {
            measure,
            patient,
            file,
        } => {
            let data_repo = require_endpoint(&config.servers.data_repo, "data repository")?;
            let payload: Value = match file {
                Some(path) => {
                    let raw = fs::read_to_string(path)
                        .with_context(|| format!("reading payload from {}", path.display()))?;
                    let payload = serde_json::from_str(&raw)
                        .with_context(|| format!("parsing payload from {}", path.display()))?;
                    expect_resource_type(&payload, "Parameters")?;
                    payload
                }
                None => {
                    let evaluation =
                        require_endpoint(&config.servers.evaluation, "evaluation")?;
                    ops::collect::fetch_collected(
                        evaluation,
                        measure,
                        &config.period.start,
                        &config.period.end,
                        patient.as_deref(),
                    )
                    .await?
                }
            };
            let resources = ops::collect::collected_resource_count(&payload);
            ops::submit::submit_data(data_repo, measure, &payload).await?;
            println!("Submitted {resources} resources to {}", data_repo.base());
        }
        Commands::Requirements { measure } => {
            let server = require_endpoint(&config.servers.knowledge_repo, "knowledge repository")?;
            let library = ops::requirements::fetch_data_requirements(
                server,
                measure,
                &config.period.start,
                &config.period.end,
            )
            .await?;
            print_requirements(&library, cli.output)?;
        }
        Commands::Measures => {
            let server = require_endpoint(&config.servers.knowledge_repo, "knowledge repository")?;
            let measures = ops::measures::fetch_measures(server, config.fetch.page_size).await?;
            print_measures(&measures, cli.output)?;
        }
        Commands::Patients => {
            let server = require_endpoint(&config.servers.data_repo, "data repository")?;
            let roster = ops::patients::fetch_patients(server, config.fetch.page_size).await?;
            print_patients(&roster, cli.output)?;
        }
        Commands::Groups => {
            let server = require_endpoint(&config.servers.data_repo, "data repository")?;
            let groups = ops::groups::fetch_groups(server, config.fetch.page_size).await?;
            print_groups(&groups, cli.output)?;
        }
        Commands::Reports {
            measure,
            patient,
            group,
        } => {
            let server = require_endpoint(&config.servers.evaluation, "evaluation")?;
            let subject = resolve_subject(patient.as_deref(), group.as_deref())?;
            let reports = ops::reports::fetch_reports(
                server,
                measure,
                subject.as_ref(),
                &config.period.start,
                &config.period.end,
                config.fetch.page_size,
            )
            .await?;
            print_reports(&reports, cli.output)?;
        }
        Commands::Report { id } => {
            let server = require_endpoint(&config.servers.evaluation, "evaluation")?;
            let report = ops::reports::fetch_report(server, id).await?;
            print_report(&report, cli.output)?;
        }
        Commands::Config { .. } => {}
        Commands::Serve { .. } => unreachable!("serve command handled before dispatch"),
    }

    Ok(())
}

fn handle_config_command(command: &Commands, config: &Config, config_path: &PathBuf) -> Result<()> {
    let Commands::Config { init, show } = command else {
        return Ok(());
    };
    if *init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if *show || !*init {
        println!("{}", config_display_json(config)?);
    }
    Ok(())
}

/// Config as shown to the user. Tokens are masked here just like on the
/// REST `/v1/config` endpoint.
fn config_display_json(config: &Config) -> Result<String> {
    render_json(&config.redacted())
}

fn require_endpoint<'a>(endpoint: &'a ServerEndpoint, name: &'static str) -> Result<&'a ServerEndpoint> {
    if !endpoint.is_configured() {
        return Err(anyhow!("no {name} server configured"));
    }
    Ok(endpoint)
}

fn resolve_subject(patient: Option<&str>, group: Option<&str>) -> Result<Option<Subject>> {
    match (patient, group) {
        (Some(_), Some(_)) => Err(anyhow!("--patient and --group are mutually exclusive")),
        (Some(patient), None) => {
            let id = patient.strip_prefix("Patient/").unwrap_or(patient);
            if id.trim().is_empty() {
                return Err(anyhow!("--patient id cannot be empty"));
            }
            Ok(Some(Subject::Patient(id.to_string())))
        }
        (None, Some(group)) => {
            let id = group.strip_prefix("Group/").unwrap_or(group);
            if id.trim().is_empty() {
                return Err(anyhow!("--group id cannot be empty"));
            }
            Ok(Some(Subject::Group(id.to_string())))
        }
        (None, None) => Ok(None),
    }
}

fn roster_patient(id: String) -> Patient {
    Patient {
        resource_type: "Patient".to_string(),
        id,
        name: Vec::new(),
        birth_date: None,
    }
}

fn print_comparison(comparison: &MeasureComparison, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_comparison_table(comparison)),
        OutputFormat::Json => println!("{}", render_json(comparison)?),
        OutputFormat::Csv => println!("{}", comparison_to_csv(comparison)?),
    }
    Ok(())
}

fn print_sweep(sweep: &SweepReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_sweep_table(sweep)),
        OutputFormat::Json => println!("{}", render_json(sweep)?),
        OutputFormat::Csv => println!("{}", sweep_to_csv(sweep)?),
    }
    Ok(())
}

fn print_report(report: &MeasureReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_report_table(report)),
        OutputFormat::Json => println!("{}", render_json(report)?),
        OutputFormat::Csv => {
            warn!("CSV output for reports not implemented, using JSON");
            println!("{}", render_json(report)?);
        }
    }
    Ok(())
}

fn print_reports(reports: &[MeasureReport], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_reports_table(reports)),
        OutputFormat::Json => println!("{}", render_json(reports)?),
        OutputFormat::Csv => {
            warn!("CSV output for reports not implemented, using JSON");
            println!("{}", render_json(reports)?);
        }
    }
    Ok(())
}

fn print_measures(measures: &[Measure], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_measures_table(measures)),
        OutputFormat::Json => println!("{}", render_json(measures)?),
        OutputFormat::Csv => {
            warn!("CSV output for measures not implemented, using JSON");
            println!("{}", render_json(measures)?);
        }
    }
    Ok(())
}

fn print_patients(roster: &PatientRoster, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_patients_table(roster)),
        OutputFormat::Json => println!("{}", render_json(roster)?),
        OutputFormat::Csv => {
            warn!("CSV output for patients not implemented, using JSON");
            println!("{}", render_json(roster)?);
        }
    }
    Ok(())
}

fn print_groups(groups: &[PatientGroup], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_groups_table(groups)),
        OutputFormat::Json => println!("{}", render_json(groups)?),
        OutputFormat::Csv => {
            warn!("CSV output for groups not implemented, using JSON");
            println!("{}", render_json(groups)?);
        }
    }
    Ok(())
}

fn print_requirements(library: &Library, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_requirements_table(library)),
        OutputFormat::Json => println!("{}", render_json(library)?),
        OutputFormat::Csv => {
            warn!("CSV output for requirements not implemented, using JSON");
            println!("{}", render_json(library)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_display_masks_access_tokens() {
        let mut config = Config::default();
        config.servers.evaluation.access_token = Some("secret-token".to_string());
        let shown = config_display_json(&config).expect("config should render");
        assert!(!shown.contains("secret-token"));
        assert!(shown.contains("***"));
    }
}
