use anyhow::Result;
use clap::Parser;
use colored::*;

mod output;
mod scenarios;
mod sse_client;

use output::print_test_summary;

#[derive(Parser)]
#[command(name = "counter-test-client")]
#[command(about = "Live Counter Integration Testing Tool")]
struct Cli {
    /// Base URL of the backend (e.g., http://localhost:3000)
    #[arg(long)]
    base_url: String,

    /// Counter channel id to test against (random when omitted)
    #[arg(long)]
    channel: Option<String>,

    /// Test scenario to run
    #[arg(long, value_enum)]
    scenario: ScenarioChoice,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Test the single-shot JSON fetch
    SingleShot,
    /// Test a direct SSE stream plus a publish round-trip
    DirectStream,
    /// Test the delegated-hold header contract
    DelegatedHold,
    /// Run all tests
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== SETUP PHASE ===".bright_white().bold());

    let channel_id = cli
        .channel
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    println!("{} Using counter channel: {}", "→".blue(), channel_id);

    let client = reqwest::Client::new();

    println!("\n{}", "=== TEST PHASE ===".bright_white().bold());

    let mut results = Vec::new();

    match cli.scenario {
        ScenarioChoice::SingleShot => {
            results.push(scenarios::test_single_shot(&client, &cli.base_url, &channel_id).await?);
        }
        ScenarioChoice::DirectStream => {
            results.push(scenarios::test_direct_stream(&client, &cli.base_url, &channel_id).await?);
        }
        ScenarioChoice::DelegatedHold => {
            results
                .push(scenarios::test_delegated_hold(&client, &cli.base_url, &channel_id).await?);
        }
        ScenarioChoice::All => {
            results.push(scenarios::test_single_shot(&client, &cli.base_url, &channel_id).await?);
            results.push(scenarios::test_direct_stream(&client, &cli.base_url, &channel_id).await?);
            results
                .push(scenarios::test_delegated_hold(&client, &cli.base_url, &channel_id).await?);
        }
    }

    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
