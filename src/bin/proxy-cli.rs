use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the emo proxy admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin API key; omit when the proxy runs without one
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List recorded requests
    Requests,
    /// List override rules
    Overrides,
    /// Add an override rule
    AddOverride {
        /// Endpoint (path plus query) the rule applies to
        #[arg(long, default_value = "")]
        endpoint: String,
        /// Exact request payload; empty matches any payload
        #[arg(long)]
        payload: Option<String>,
        /// Substring to look for in upstream responses
        #[arg(long)]
        response_lookup: Option<String>,
        /// JSON document merged into matching responses
        #[arg(long)]
        response_override: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", key))?,
        );
    }

    match cli.command {
        Commands::Requests => {
            let res = client
                .get(format!("{}/proxy-api/requests", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Overrides => {
            let res = client
                .get(format!("{}/proxy-api/overrides", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::AddOverride {
            endpoint,
            payload,
            response_lookup,
            response_override,
        } => {
            serde_json::from_str::<Value>(&response_override)
                .map_err(|e| format!("--response-override is not valid JSON: {e}"))?;
            let res = client
                .post(format!("{}/proxy-api/overrides", cli.url))
                .headers(headers)
                .json(&json!({
                    "endpoint_lookup": endpoint,
                    "payload_lookup": payload,
                    "response_lookup": response_lookup,
                    "response_override": response_override,
                }))
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
