use anyhow::Result;
use colored::*;
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::output::{print_value, TestResult};
use crate::sse_client::Connection;

pub async fn test_single_shot(
    client: &reqwest::Client,
    base_url: &str,
    channel_id: &str,
) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Single-Shot Fetch ===".bright_cyan().bold());

    println!("{} Fetching current value...", "→".blue());

    let response = client
        .get(format!("{}/counter/{}", base_url, channel_id))
        .send()
        .await?;

    if !response.status().is_success() {
        return Ok(TestResult {
            scenario: "single_shot".to_string(),
            passed: false,
            message: Some(format!("Unexpected status: {}", response.status())),
            duration: start.elapsed(),
        });
    }

    let body: Value = response.json().await?;

    match body["value"].as_u64() {
        Some(value) => {
            println!("{} Received value {}", "✓".green(), value);
            Ok(TestResult {
                scenario: "single_shot".to_string(),
                passed: true,
                message: None,
                duration: start.elapsed(),
            })
        }
        None => {
            println!("{} Response missing numeric value field!", "✗".red());
            Ok(TestResult {
                scenario: "single_shot".to_string(),
                passed: false,
                message: Some(format!("Unexpected body: {}", body)),
                duration: start.elapsed(),
            })
        }
    }
}

pub async fn test_direct_stream(
    client: &reqwest::Client,
    base_url: &str,
    channel_id: &str,
) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Direct Stream ===".bright_cyan().bold());

    println!("{} Establishing SSE connection...", "→".blue());
    let mut connection = Connection::establish(base_url, channel_id)?;

    println!("{} Waiting for initial frame...", "→".blue());
    let initial_value = match connection.wait_for_value(Duration::from_secs(5)).await {
        Ok(value) => {
            print_value(&connection.channel_label, value);
            value
        }
        Err(e) => {
            println!("{} Timeout waiting for initial frame: {}", "✗".red(), e);
            return Ok(TestResult {
                scenario: "direct_stream".to_string(),
                passed: false,
                message: Some(format!("No initial frame: {}", e)),
                duration: start.elapsed(),
            });
        }
    };

    println!("{} Triggering a direct publish...", "→".blue());
    let response = client
        .post(format!("{}/vanilla/counter/{}", base_url, channel_id))
        .send()
        .await?;
    let posted: Value = response.json().await?;
    let posted_value = posted["value"].as_u64().unwrap_or_default();
    println!("{} Publish returned value {}", "✓".green(), posted_value);

    println!("{} Waiting for the pushed update...", "→".blue());
    match connection.wait_for_value(Duration::from_secs(5)).await {
        Ok(pushed_value) => {
            print_value(&connection.channel_label, pushed_value);

            if pushed_value >= initial_value {
                println!("{} Pushed value verified (non-decreasing)", "✓".green());
                Ok(TestResult {
                    scenario: "direct_stream".to_string(),
                    passed: true,
                    message: None,
                    duration: start.elapsed(),
                })
            } else {
                println!("{} Pushed value regressed!", "✗".red());
                Ok(TestResult {
                    scenario: "direct_stream".to_string(),
                    passed: false,
                    message: Some(format!(
                        "Expected value >= {}, got {}",
                        initial_value, pushed_value
                    )),
                    duration: start.elapsed(),
                })
            }
        }
        Err(e) => {
            println!("{} Timeout waiting for pushed update: {}", "✗".red(), e);
            Ok(TestResult {
                scenario: "direct_stream".to_string(),
                passed: false,
                message: Some(format!("Timeout: {}", e)),
                duration: start.elapsed(),
            })
        }
    }
}

pub async fn test_delegated_hold(
    client: &reqwest::Client,
    base_url: &str,
    channel_id: &str,
) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Delegated Hold ===".bright_cyan().bold());

    println!(
        "{} Requesting stream with a provider signature header...",
        "→".blue()
    );

    let response = client
        .get(format!("{}/counter/{}", base_url, channel_id))
        .header("Accept", "text/event-stream")
        .header("Grip-Sig", "test-signature")
        .send()
        .await?;

    let grip_hold = response
        .headers()
        .get("grip-hold")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let grip_channel = response
        .headers()
        .get("grip-channel")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    // The response must terminate; reading the whole body proves it
    let body = response.text().await?;

    let expected_channel = format!("counter-{}", channel_id);
    let mut failures = Vec::new();

    if grip_hold != "stream" {
        failures.push(format!("Grip-Hold: expected 'stream', got '{}'", grip_hold));
    }
    if grip_channel != expected_channel {
        failures.push(format!(
            "Grip-Channel: expected '{}', got '{}'",
            expected_channel, grip_channel
        ));
    }
    if !body.starts_with("data: ") || !body.ends_with("\n\n") {
        failures.push(format!("Body is not one SSE frame: {:?}", body));
    }

    if failures.is_empty() {
        println!("{} Hold headers and initial frame verified", "✓".green());
        Ok(TestResult {
            scenario: "delegated_hold".to_string(),
            passed: true,
            message: None,
            duration: start.elapsed(),
        })
    } else {
        for failure in &failures {
            println!("{} {}", "✗".red(), failure);
        }
        Ok(TestResult {
            scenario: "delegated_hold".to_string(),
            passed: false,
            message: Some(failures.join("; ")),
            duration: start.elapsed(),
        })
    }
}
