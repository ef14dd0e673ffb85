use anyhow::Result;
use clap::Parser;
use colored::*;

mod api_client;
mod output;
mod scenarios;
mod session;
mod ws_client;

use api_client::ApiClient;
use output::print_test_summary;
use session::SessionUser;
use ws_client::Connection;

#[derive(Parser)]
#[command(name = "ws-test-client")]
#[command(about = "WebSocket Integration Testing Tool")]
struct Cli {
    /// Base URL of the backend (e.g., http://localhost:4000)
    #[arg(long)]
    base_url: String,

    /// User 1 session (format: user_id:session_token, see seed_db output)
    #[arg(long)]
    user1: String,

    /// User 2 session (format: user_id:session_token)
    #[arg(long)]
    user2: String,

    /// Name of the session cookie the backend expects
    #[arg(long, default_value = "SN-session")]
    cookie_name: String,

    /// Chat id used by the group message scenario
    #[arg(long, default_value_t = 1)]
    chat_id: i32,

    /// Test scenario to run
    #[arg(long, value_enum)]
    scenario: ScenarioChoice,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Connect both users and check presence
    ConnectionTest,
    /// User 1 sends a direct message to User 2
    DirectMessage,
    /// User 1 sends a group message seen by everyone
    GroupMessage,
    /// User 1 sends a malformed frame and keeps its connection
    InvalidMessage,
    /// User 2 connects twice and both connections receive a direct message
    MultiDevice,
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

    let user1 = SessionUser::parse(&cli.user1)?;
    let user2 = SessionUser::parse(&cli.user2)?;
    let ws_url = cli
        .base_url
        .replacen("http://", "ws://", 1)
        .replacen("https://", "wss://", 1);

    let api_client = ApiClient::new(reqwest::Client::new(), cli.base_url.clone());

    // Establish WebSocket connections
    println!("\n{} Establishing WebSocket connections...", "→".blue());
    let mut ws1 = Connection::establish(
        &ws_url,
        &user1.cookie(&cli.cookie_name),
        format!("User 1 ({})", user1.user_id),
    )
    .await?;

    let mut ws2 = Connection::establish(
        &ws_url,
        &user2.cookie(&cli.cookie_name),
        format!("User 2 ({})", user2.user_id),
    )
    .await?;

    println!("{} User 1 WebSocket connection established", "✓".green());
    println!("{} User 2 WebSocket connection established", "✓".green());

    // Run test scenarios
    println!("\n{}", "=== TEST PHASE ===".bright_white().bold());

    let mut results = Vec::new();

    if matches!(cli.scenario, ScenarioChoice::ConnectionTest | ScenarioChoice::All) {
        results.push(
            scenarios::test_connection(&user1, &user2, &api_client, &cli.cookie_name).await?,
        );
    }
    if matches!(cli.scenario, ScenarioChoice::DirectMessage | ScenarioChoice::All) {
        results.push(scenarios::test_direct_message(&user1, &user2, &mut ws1, &mut ws2).await?);
    }
    if matches!(cli.scenario, ScenarioChoice::GroupMessage | ScenarioChoice::All) {
        results.push(scenarios::test_group_message(&mut ws1, &mut ws2, cli.chat_id).await?);
    }
    if matches!(cli.scenario, ScenarioChoice::InvalidMessage | ScenarioChoice::All) {
        results.push(
            scenarios::test_invalid_message(&user1, &api_client, &cli.cookie_name, &mut ws1)
                .await?,
        );
    }
    if matches!(cli.scenario, ScenarioChoice::MultiDevice | ScenarioChoice::All) {
        results.push(
            scenarios::test_multi_device(&user2, &ws_url, &cli.cookie_name, &mut ws1, &mut ws2)
                .await?,
        );
    }

    ws1.close().await?;
    ws2.close().await?;

    // Print summary
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
