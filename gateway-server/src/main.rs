//! Gateway Server binary: CLI parsing, then hands off to [`gateway_server::run`].

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "gateway-server")]
#[command(about = "Multi-channel messaging gateway: fronts Telegram/Discord for an Agent runtime")]
struct Args {
    /// Path to the YAML configuration file (else GATEWAY_CONFIG_PATH, else the built-in default).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the configured listen host.
    #[arg(long)]
    host: Option<String>,

    /// Override the configured listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Log level filter (overrides GATEWAY_LOG/RUST_LOG for this run).
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Directory for rolling file logs, in addition to stderr.
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Load, resolve, and print the effective configuration (secrets redacted) then exit.
    #[arg(long)]
    print_config: bool,
}

fn redact_secrets(mut value: serde_yaml::Value) -> serde_yaml::Value {
    fn walk(value: &mut serde_yaml::Value) {
        match value {
            serde_yaml::Value::Mapping(map) => {
                for (k, v) in map.iter_mut() {
                    let key = k.as_str().unwrap_or("");
                    if matches!(key, "token" | "password") && v.is_string() {
                        *v = serde_yaml::Value::String("***".to_string());
                    } else {
                        walk(v);
                    }
                }
            }
            serde_yaml::Value::Sequence(seq) => {
                for item in seq {
                    walk(item);
                }
            }
            _ => {}
        }
    }
    walk(&mut value);
    value
}

/// Mirrors `config::load_str`'s substitution pass, used only for `--print-config` since that path
/// intentionally skips full typed deserialization (so a malformed schema can still be inspected).
fn substitute_for_print(value: &mut serde_yaml::Value) {
    match value {
        serde_yaml::Value::String(s) => {
            if let Some(name) = s.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
                if let Ok(resolved) = std::env::var(name) {
                    *s = resolved;
                }
            }
        }
        serde_yaml::Value::Sequence(seq) => seq.iter_mut().for_each(substitute_for_print),
        serde_yaml::Value::Mapping(map) => map.iter_mut().for_each(|(_, v)| substitute_for_print(v)),
        _ => {}
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(level) = &args.log_level {
        std::env::set_var("GATEWAY_LOG", level);
    }

    if args.print_config {
        let path = config::resolve_path(args.config.as_deref());
        let raw = std::fs::read_to_string(&path)?;
        let mut value: serde_yaml::Value = serde_yaml::from_str(&raw)?;
        substitute_for_print(&mut value);
        println!("{}", serde_yaml::to_string(&redact_secrets(value))?);
        return Ok(());
    }

    let _logging_guard = gateway_server::logging::init(args.log_dir.as_deref());

    let mut gateway_config = config::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        gateway_config.gateway.host = host;
    }
    if let Some(port) = args.port {
        gateway_config.gateway.port = port;
    }
    let config_path = config::resolve_path(args.config.as_deref());

    gateway_server::run(gateway_config, config_path).await
}
