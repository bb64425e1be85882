use crate::config::generate::generate_starter_config;
use crate::config::types::{SinkChannel, SourceChannel};
use crate::config::{load_config, user_config_path, WorkflowConfig};
use std::fs;
use std::path::PathBuf;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    // Try ~/.config/cyberflow/workflow.yml first
    let config_path = match user_config_path() {
        Some(user_config) => match user_config.parent().map(fs::create_dir_all) {
            Some(Err(_)) => {
                eprintln!("Warning: Could not create directory for {}", user_config.display());
                eprintln!("Falling back to /etc/cyberflow/workflow.yml");
                None
            }
            _ => Some(user_config),
        },
        None => None,
    };
    let config_path = config_path.unwrap_or_else(|| PathBuf::from("/etc/cyberflow/workflow.yml"));

    if config_path.exists() {
        eprintln!(
            "Error: Config file already exists at {}",
            config_path.display()
        );
        eprintln!("Remove it first or use --stdout to print the config");
        std::process::exit(1);
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config_path, config_content)?;

    println!("Config file written to {}", config_path.display());
    Ok(())
}

pub fn check(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path.ok_or("No config file found. Use --config to specify a path.")?;

    println!("Validating config file: {}", path.display());

    match load_config(&path) {
        Ok(config) => {
            println!("✓ Config is valid");
            print!("{}", summarize(&config));
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Config validation failed:\n{}", e);
            std::process::exit(1);
        }
    }
}

/// Human-readable summary of a validated config.
pub fn summarize(config: &WorkflowConfig) -> String {
    let source = match &config.source.channel {
        SourceChannel::Kafka(cfg) => format!(
            "kafka brokers={} group_id={} topics={}",
            cfg.brokers,
            cfg.group_id,
            cfg.topics.join(",")
        ),
        SourceChannel::File(cfg) => {
            let paths: Vec<String> = cfg.paths.iter().map(|p| p.display().to_string()).collect();
            format!("file paths={} follow={}", paths.join(","), cfg.follow)
        }
        SourceChannel::Memory(cfg) => format!("memory channels={}", cfg.channels.join(",")),
    };
    let destination = match &config.destination.channel {
        SinkChannel::Kafka(cfg) => format!("kafka brokers={} topic={}", cfg.brokers, cfg.topic),
        SinkChannel::File(cfg) => format!("file path={}", cfg.path.display()),
        SinkChannel::Memory(cfg) => format!("memory channel={}", cfg.channel),
    };

    format!(
        "  name:        {}\n  source:      {}\n  window:      {} records or {:?}\n  destination: {}\n  messages:    {} records joined by {:?}\n  flush mode:  {:?} (max {} batches in flight)\n",
        config.name,
        source,
        config.source.batch_size,
        config.source.time_window,
        destination,
        config.destination.batch_size,
        config.destination.output_delimiter,
        config.pipeline.flush_mode,
        config.pipeline.max_in_flight_batches,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    #[test]
    fn test_summary_mentions_channels() {
        let config = load_config_from_str(&generate_starter_config()).unwrap();
        let summary = summarize(&config);
        assert!(summary.contains("my-kafka-workflow"));
        assert!(summary.contains("group_id=cyber-dp"));
        assert!(summary.contains("5s"));
    }
}
