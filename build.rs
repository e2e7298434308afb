use anyhow::{Context, Result};
use chrono::TimeZone;
use std::env;
use std::fs;
use std::process::Command;
use vergen_gitcl::{Emitter, GitclBuilder};

fn main() -> Result<()> {
    // Generate git information
    let gitcl = GitclBuilder::default()
        .describe(true, true, Some("[0-9]*"))
        .build()?;

    let gitcl_res = Emitter::default()
        .idempotent()
        .fail_on_error()
        .add_instructions(&gitcl)
        .and_then(|emitter| emitter.emit());

    if let Err(e) = gitcl_res {
        eprintln!("error occurred while generating instructions: {e:?}");
        Emitter::default().idempotent().fail_on_error().emit()?;
    }

    // Reproducible builds pin the timestamp
    let now = match env::var("SOURCE_DATE_EPOCH") {
        Ok(val) => {
            let secs = val.parse::<i64>().context("invalid SOURCE_DATE_EPOCH")?;
            chrono::Utc
                .timestamp_opt(secs, 0)
                .single()
                .context("SOURCE_DATE_EPOCH out of range")?
        }
        Err(_) => chrono::Utc::now(),
    };

    println!(
        "cargo:rustc-env=BUILD_TIMESTAMP={}",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let avstream_version = get_avstream_version_from_metadata().unwrap_or_else(|_| {
        read_avstream_version_fallback().unwrap_or_else(|_| "unknown".to_string())
    });
    println!("cargo:rustc-env=AVSTREAM_VERSION={avstream_version}");

    println!("cargo:rerun-if-changed=avstream/Cargo.toml");
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");

    Ok(())
}

/// Looks up the avstream version through cargo metadata, covering both the
/// workspace member and a published dependency.
fn get_avstream_version_from_metadata() -> Result<String> {
    let output = Command::new(env::var("CARGO").unwrap_or_else(|_| "cargo".to_string()))
        .args(["metadata", "--format-version", "1"])
        .output()?;

    if !output.status.success() {
        anyhow::bail!("cargo metadata failed");
    }

    let metadata: serde_json::Value = serde_json::from_slice(&output.stdout)?;

    let packages = metadata["packages"].as_array().into_iter().flatten();
    for package in packages {
        if package["name"].as_str() == Some("avstream") {
            if let Some(version) = package["version"].as_str() {
                return Ok(version.to_string());
            }
        }
    }

    // Resolved ids look like "avstream 0.1.0 (registry+...)"
    let nodes = metadata["resolve"]["nodes"].as_array().into_iter().flatten();
    for node in nodes {
        let Some(id) = node["id"].as_str() else {
            continue;
        };
        let mut parts = id.split(' ');
        if parts.next() == Some("avstream") {
            if let Some(version) = parts.next() {
                return Ok(version.to_string());
            }
        }
    }

    anyhow::bail!("avstream package not found in metadata");
}

/// Fallback: scan avstream/Cargo.toml for its version line.
fn read_avstream_version_fallback() -> Result<String> {
    let toml_content = fs::read_to_string("avstream/Cargo.toml")?;

    for line in toml_content.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("version") {
            if let Some(version) = value.trim_start().strip_prefix('=') {
                return Ok(version.trim().trim_matches('"').trim_matches('\'').to_string());
            }
        }
    }

    anyhow::bail!("Could not find version in avstream/Cargo.toml");
}
