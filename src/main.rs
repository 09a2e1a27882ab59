use clap::{Parser, Subcommand};
use prefixwall::config;
use prefixwall::control::{validate_update, UpdateRuleRequest};
use prefixwall::dataplane::ActionKind;
use prefixwall::telemetry::init_logging;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "prefixwall")]
#[command(about = "Remotely programmable longest-prefix-match packet filter")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the filter daemon
    Run {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Rule utilities
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate config.toml
    Validate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum RuleAction {
    /// Validate a rule offline and print its canonical form
    Check {
        /// Prefix in CIDR notation
        prefix: String,
        /// pass, drop or redirect
        action: ActionKind,
        /// Redirect target
        #[arg(short, long)]
        interface: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config } => cmd_run(&config),
        Commands::Config {
            action: ConfigAction::Validate { config },
        } => cmd_config_validate(&config),
        Commands::Rule {
            action:
                RuleAction::Check {
                    prefix,
                    action,
                    interface,
                },
        } => cmd_rule_check(prefix, action, interface),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(config_path: &PathBuf) -> Result<(), String> {
    let cfg = config::load(config_path).map_err(|e| format!("Failed to load config: {}", e))?;
    init_logging(Some(&cfg.logging));

    info!("Loaded {}", config_path.display());
    let validation = config::validate(&cfg);
    for warning in &validation.warnings {
        tracing::warn!("{}", warning);
    }
    if validation.has_errors() {
        validation.print_diagnostics();
        return Err("Validation failed".to_string());
    }

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create runtime: {}", e))?;
    rt.block_on(prefixwall::daemon::run(cfg))
        .map_err(|e| e.to_string())
}

fn cmd_config_validate(config_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}

fn cmd_rule_check(
    prefix: String,
    action: ActionKind,
    interface: Option<String>,
) -> Result<(), String> {
    let request = UpdateRuleRequest {
        prefix,
        action,
        redirect_interface: interface,
    };
    let (prefix, action) =
        validate_update(&request).map_err(|e| format!("{}: {}", e.code(), e))?;
    println!("{} {}", prefix, action);
    Ok(())
}
