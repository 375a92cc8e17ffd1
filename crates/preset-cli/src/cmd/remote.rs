//! Commands that talk to a running `presetctl serve`.

use crate::output::{print_json, print_table};
use anyhow::{anyhow, Context};
use preset_core::controller::{ExecutionResult, StopResult};
use preset_core::PresetStatus;
use serde::de::DeserializeOwned;

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

fn call<T: DeserializeOwned>(request: ureq::Request) -> anyhow::Result<T> {
    let url = request.url().to_string();
    match request.call() {
        Ok(response) => response
            .into_json::<T>()
            .with_context(|| format!("unexpected response from {url}")),
        Err(ureq::Error::Status(code, response)) => {
            let message = response
                .into_json::<serde_json::Value>()
                .ok()
                .and_then(|v| v["error"].as_str().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {code}"));
            Err(anyhow!("{message}"))
        }
        Err(e) => Err(anyhow!(e).context(format!("could not reach {url}"))),
    }
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

pub fn status(base: &str, preset: Option<&str>, json: bool) -> anyhow::Result<()> {
    let statuses: Vec<PresetStatus> = match preset {
        Some(id) => vec![call(ureq::get(&endpoint(
            base,
            &format!("/api/presets/{id}/status"),
        )))?],
        None => call(ureq::get(&endpoint(base, "/api/presets")))?,
    };

    if json {
        return if preset.is_some() {
            print_json(&statuses[0])
        } else {
            print_json(&statuses)
        };
    }

    if statuses.is_empty() {
        println!("No presets.");
        return Ok(());
    }
    let rows = statuses
        .iter()
        .map(|s| {
            vec![
                s.preset_id.to_string(),
                s.overall_status.to_string(),
                format!("{}/{}", s.summary.executing, s.summary.total),
                s.summary.offline.to_string(),
                s.message.clone(),
            ]
        })
        .collect();
    print_table(&["PRESET", "STATUS", "RUNNING", "OFFLINE", "MESSAGE"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// start / stop
// ---------------------------------------------------------------------------

pub fn start(base: &str, preset: &str, json: bool) -> anyhow::Result<()> {
    let result: ExecutionResult = call(ureq::post(&endpoint(
        base,
        &format!("/api/presets/{preset}/execute"),
    )))?;
    if json {
        return print_json(&result);
    }

    let s = &result.summary;
    println!(
        "Started '{preset}' on {}/{} client(s) ({} online, {} offline).",
        s.executed, s.total, s.online, s.offline
    );
    for w in &result.warnings {
        println!("  warning: {w}");
    }
    Ok(())
}

pub fn stop(base: &str, preset: &str, require_active: bool, json: bool) -> anyhow::Result<()> {
    let mut path = format!("/api/presets/{preset}/stop");
    if require_active {
        path.push_str("?require_active=true");
    }
    let result: StopResult = call(ureq::post(&endpoint(base, &path)))?;
    if json {
        return print_json(&result);
    }

    if result.clients.is_empty() {
        println!("'{preset}' is not running.");
    } else {
        println!("Stopped '{preset}' on {} client(s).", result.stopped);
    }
    for w in &result.warnings {
        println!("  warning: {w}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            endpoint("http://localhost:8080/", "/api/presets"),
            "http://localhost:8080/api/presets"
        );
    }
}
