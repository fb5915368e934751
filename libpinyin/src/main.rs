use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloudpinyin::{parse_candidates, PinyinConfig, PinyinContext};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cloudpinyin", version, about = "Double pinyin decoding and cloud lookups")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Double pinyin scheme (Microsoft, ZiRanMa, XiaoHe), overrides the config
    #[arg(long, global = true)]
    scheme: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode double pinyin keystrokes; reads lines from stdin when no KEYS are given
    Decode { keys: Vec<String> },
    /// Report whether each KEYS string is complete double pinyin
    Check {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Build the scheme map and list conflicting key pairs
    Conflicts,
    /// Send one cloud request and print the response
    Cloud {
        pinyin: String,
        /// Print parsed candidates instead of the raw body
        #[arg(long)]
        parse: bool,
    },
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_env("CLOUDPINYIN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<PinyinConfig> {
    let mut config = match &cli.config {
        Some(path) => PinyinConfig::load_toml(path)?,
        None => PinyinConfig::default(),
    };
    if let Some(scheme) = &cli.scheme {
        config.double_pinyin_scheme = Some(scheme.clone());
    }
    Ok(config)
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    match &cli.command {
        Command::Decode { keys } => {
            config.use_double_pinyin = true;
            let ctx = PinyinContext::new(config)?;
            if keys.is_empty() {
                let stdin = io::stdin();
                for line in stdin.lock().lines() {
                    let line = line.context("read stdin")?;
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    println!("{}", ctx.preedit(input));
                }
            } else {
                for k in keys {
                    println!("{}", ctx.preedit(k));
                }
            }
        }
        Command::Check { keys } => {
            let ctx = PinyinContext::new(config)?;
            let mut all_valid = true;
            for k in keys {
                let valid = ctx.mapper().is_valid_double_pinyin(k);
                all_valid &= valid;
                println!("{}\t{}", k, if valid { "valid" } else { "invalid" });
            }
            if !all_valid {
                std::process::exit(1);
            }
        }
        Command::Conflicts => {
            let ctx = PinyinContext::new(config)?;
            let mapper = ctx.mapper();
            println!(
                "{} keys, {} mapped pairs, {} conflicts",
                mapper.len(),
                mapper.mapped_pairs(),
                mapper.build_map()
            );
            for c in mapper.conflicts() {
                println!(
                    "  {}{}: {} (dropped {})",
                    c.keys[0], c.keys[1], c.kept, c.rejected
                );
            }
        }
        Command::Cloud { pinyin, parse } => {
            config.cloud.enabled = true;
            let wait = Duration::from_millis(config.cloud.timeout_ms) + Duration::from_secs(1);
            let provider = config.cloud.provider()?;
            let ctx = PinyinContext::new(config)?;
            let (tx, rx) = mpsc::channel();
            ctx.request_correction(pinyin, move |req| {
                let _ = tx.send(req.response_payload().unwrap_or_default().to_string());
            })?;
            let body = rx
                .recv_timeout(wait)
                .context("no cloud response before timeout")?;
            if *parse {
                for (i, c) in parse_candidates(&provider, &body)?.iter().enumerate() {
                    println!("  {}. {} ({:.2})", i + 1, c.text, c.confidence);
                }
            } else {
                println!("{}", body);
            }
        }
    }
    Ok(())
}
