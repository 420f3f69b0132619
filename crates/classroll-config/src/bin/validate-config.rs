//! Config validation CLI tool
//!
//! Validates a classroll configuration file and reports any errors.

use classroll_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a classroll configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match classroll_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", classroll_config::CURRENT_CONFIG_VERSION);
            println!("  Subjects: {}", policy.subjects.len());
            println!(
                "  Roster: preserve_left={}, aging_window={}s",
                policy.roster.preserve_left,
                policy.roster.aging_window.num_seconds()
            );

            if !policy.subjects.is_empty() {
                println!();
                println!("Subjects:");
                for subject in &policy.subjects {
                    let duration = match subject.schedule.duration_minutes() {
                        Some(0) => "invalid duration".to_string(),
                        Some(minutes) => format!("{} min", minutes),
                        None => "incomplete schedule".to_string(),
                    };
                    let active = if subject.schedule.is_active { "" } else { " (inactive)" };
                    println!(
                        "  - {} [{} days/week, {}]: {}{}",
                        subject.id,
                        subject.schedule.days.count(),
                        duration,
                        subject.name,
                        active
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                classroll_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                classroll_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                classroll_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                classroll_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        classroll_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
