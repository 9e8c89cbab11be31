//! Developer CLI for CredKit.
//!
//! `credkit plan` evaluates the arbitration policy for a request and capability snapshot.
//! `credkit simulate` runs a full orchestrated request against scripted backends.

mod scripted;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use credkit_core::{
    ArbitrationConfig, ArbitrationPolicy, AuthenticatorStatus, BackendCapabilitySnapshot,
    CredentialRequestOrchestrator, EnumerationOutcome, PolicyDecision, RequestContext,
};
use eyre::{Result, WrapErr};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scripted::{Scenario, ScriptedCredentialManager, ScriptedLegacy, ScriptedSecurityChecker};

#[derive(Parser)]
#[command(name = "credkit", version, about = "Inspect and simulate CredKit backend arbitration")]
struct Cli {
    /// Log filter, e.g. `credkit_core=debug`. Falls back to `RUST_LOG`.
    #[arg(long, global = true, env = "CREDKIT_LOG")]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate the arbitration policy and print the decision.
    Plan(PlanArgs),
    /// Run a request through the orchestrator against scripted backends.
    Simulate(SimulateArgs),
    /// Print the default arbitration configuration.
    Config,
}

#[derive(Args)]
struct Inputs {
    /// JSON file with the request context.
    #[arg(long)]
    request: PathBuf,

    /// JSON file with the capability snapshot. Defaults to a capable device.
    #[arg(long)]
    capabilities: Option<PathBuf>,

    /// JSON file with the arbitration configuration.
    #[arg(long, env = "CREDKIT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct PlanArgs {
    #[command(flatten)]
    inputs: Inputs,

    /// Result of the allow-list enumeration, when the policy asks for one.
    #[arg(long, value_enum)]
    enumeration: Option<Enumeration>,
}

#[derive(Args)]
struct SimulateArgs {
    #[command(flatten)]
    inputs: Inputs,

    /// JSON file describing how each backend answers.
    #[arg(long)]
    scenario: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum Enumeration {
    Matched,
    NoMatch,
    Failed,
}

impl From<Enumeration> for EnumerationOutcome {
    fn from(enumeration: Enumeration) -> Self {
        match enumeration {
            Enumeration::Matched => Self::Matched,
            Enumeration::NoMatch => Self::NoMatch,
            Enumeration::Failed => Self::Failed {
                status: AuthenticatorStatus::UnknownError,
            },
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).wrap_err_with(|| format!("parsing {}", path.display()))
}

struct Loaded {
    context: RequestContext,
    capabilities: BackendCapabilitySnapshot,
    config: ArbitrationConfig,
}

impl Inputs {
    fn load(&self) -> Result<Loaded> {
        let context = read_json(&self.request)?;
        let capabilities = match &self.capabilities {
            Some(path) => read_json(path)?,
            None => BackendCapabilitySnapshot::default(),
        };
        let config = match &self.config {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .wrap_err_with(|| format!("reading {}", path.display()))?;
                ArbitrationConfig::from_json(&contents)?
            }
            None => ArbitrationConfig::default(),
        };
        Ok(Loaded {
            context,
            capabilities,
            config,
        })
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn plan(args: &PlanArgs) -> Result<()> {
    let Loaded {
        context,
        capabilities,
        config,
    } = args.inputs.load()?;
    let policy = ArbitrationPolicy::new(config);
    let decision = policy.evaluate(&context, &capabilities);
    match (&decision, args.enumeration) {
        (PolicyDecision::EnumerateThenDecide { .. }, Some(enumeration)) => {
            print_json(&policy.decide_after_enumeration(enumeration.into()))
        }
        (PolicyDecision::EnumerateThenDecide { .. }, None) => {
            tracing::info!("policy needs an enumeration result, pass --enumeration to finish");
            print_json(&decision)
        }
        (PolicyDecision::Plan { plan }, _) => print_json(plan),
    }
}

async fn simulate(args: &SimulateArgs) -> Result<()> {
    let Loaded {
        context,
        capabilities,
        config,
    } = args.inputs.load()?;
    let scenario: Scenario = read_json(&args.scenario)?;

    let orchestrator = Arc::new(CredentialRequestOrchestrator::new(
        Arc::new(ScriptedLegacy(scenario.clone())),
        Arc::new(ScriptedCredentialManager(scenario.clone())),
        Arc::new(ScriptedSecurityChecker(scenario.security_failure.clone())),
        config,
    ));

    if let Some(delay) = scenario.cancel_after_ms {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let accepted = orchestrator.cancel();
            tracing::info!("cancel after {delay}ms accepted: {accepted}");
        });
    }

    match orchestrator.handle_request(context, capabilities).await {
        Ok(response) => print_json(&json!({ "outcome": "success", "response": response })),
        Err(error) => print_json(&json!({
            "outcome": "error",
            "status": error.status(),
            "error": error.to_string(),
        })),
    }
}

fn init_tracing(filter: Option<&str>) {
    let filter = filter.map_or_else(
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        EnvFilter::new,
    );
    // Also routes `log` records from credkit-core into the subscriber.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    match &cli.command {
        Command::Plan(args) => plan(args),
        Command::Simulate(args) => simulate(args).await,
        Command::Config => print_json(&ArbitrationConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_plan_with_enumeration() {
        let cli = Cli::try_parse_from([
            "credkit",
            "plan",
            "--request",
            "request.json",
            "--enumeration",
            "no-match",
        ])
        .unwrap();
        let Command::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        assert_eq!(args.inputs.request, PathBuf::from("request.json"));
        assert!(matches!(args.enumeration, Some(Enumeration::NoMatch)));
    }

    #[test]
    fn test_enumeration_conversion() {
        assert_eq!(
            EnumerationOutcome::from(Enumeration::Failed),
            EnumerationOutcome::Failed {
                status: AuthenticatorStatus::UnknownError
            }
        );
    }
}
