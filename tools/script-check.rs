//! Validate script module images against a sandbox policy
//!
//! Runs the same declaration and bytecode passes the module cache runs, without
//! an engine, and reports the verdict for each file.
//!
//! Usage:
//!   script-check [--config sandbox.toml] [--json] <image>...

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::debug;

use script_sandbox::module::loader::ModuleLoader;
use script_sandbox::module::metadata::{ModuleImage, ScriptImage};
use script_sandbox::module::validation::{self, DenialKind, ValidationResult};
use script_sandbox::utils::init_logging_from_config;
use script_sandbox::{ContentHash, SandboxConfig};

#[derive(Parser, Debug)]
#[command(name = "script-check", about = "Validate script module images against a sandbox policy")]
struct Args {
    /// Sandbox configuration (TOML); defaults apply when omitted
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Emit a JSON report instead of text
    #[arg(long)]
    json: bool,

    /// Script image files
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Report {
    path: PathBuf,
    module: Option<String>,
    hash: String,
    /// Digest from the sidecar file, when present and matching
    sidecar_matches: Option<bool>,
    allowed: bool,
    kind: Option<&'static str>,
    reason: Option<String>,
}

fn check(path: PathBuf, policy: &Arc<script_sandbox::PolicySet>) -> anyhow::Result<Report> {
    let source = ModuleLoader::read_script(&path)?;
    let hash = ContentHash::of(&source.bytes);
    let sidecar_matches = match source.precomputed_hash.as_deref() {
        Some(hex_digest) => Some(ContentHash::from_hex(hex_digest).map_or(false, |h| h == hash)),
        None => None,
    };

    let (module, result) = match ScriptImage::decode(&source.bytes) {
        Ok(image) => {
            debug!("Checking {} ({})", image.name(), path.display());
            let result = validation::validate_module(policy, &image);
            (Some(image.name().to_string()), result)
        }
        Err(e) => (None, ValidationResult::malformed(e.to_string())),
    };

    Ok(Report {
        path,
        module,
        hash: hash.to_hex(),
        sidecar_matches,
        allowed: result.is_allowed(),
        kind: result.kind().map(|kind| match kind {
            DenialKind::Policy => "policy",
            DenialKind::Malformed => "malformed",
        }),
        reason: result.reason().map(str::to_string),
    })
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SandboxConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SandboxConfig::default(),
    };
    init_logging_from_config(Some(&config.logging));
    let policy = Arc::new(config.policy.build());

    let mut reports = Vec::with_capacity(args.images.len());
    for path in args.images {
        let report = check(path.clone(), &policy)
            .with_context(|| format!("checking {}", path.display()))?;
        reports.push(report);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            let verdict = if report.allowed { "OK" } else { "REJECTED" };
            println!(
                "{:<9} {} [{}] {}",
                verdict,
                report.path.display(),
                &report.hash[..12],
                report.module.as_deref().unwrap_or("-")
            );
            if let Some(reason) = &report.reason {
                println!("          {}", reason);
            }
            if report.sidecar_matches == Some(false) {
                println!("          warning: sidecar digest does not match content");
            }
        }
    }

    if reports.iter().all(|r| r.allowed) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
