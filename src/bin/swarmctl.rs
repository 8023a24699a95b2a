use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "swarmctl")]
#[command(about = "Command line client for the Swarm function provider", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Bearer token for the /system API.
    #[arg(short, long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show provider information
    Info,
    /// Show replica status of a function
    Describe { name: String },
    /// Set the desired replica count of a function
    Scale { name: String, replicas: u64 },
    /// Stream function logs
    Logs {
        name: String,
        #[arg(short, long)]
        follow: bool,
        /// Maximum number of messages
        #[arg(long)]
        tail: Option<i64>,
        /// RFC 3339 start time
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        instance: Option<String>,
        /// Regular expression the message must match
        #[arg(long)]
        pattern: Option<String>,
        /// Keep messages that do not match the pattern
        #[arg(long)]
        invert: bool,
    },
    /// Invoke a function and print its response
    Invoke {
        name: String,
        #[arg(short, long, default_value = "")]
        data: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
    }
    let client = reqwest::Client::builder().default_headers(headers).build()?;

    match cli.command {
        Commands::Info => {
            let res = client.get(format!("{}/system/info", cli.url)).send().await?;
            print_json(res).await?;
        }
        Commands::Describe { name } => {
            let res = client
                .get(format!("{}/system/function/{}", cli.url, name))
                .send()
                .await?;
            print_json(res).await?;
        }
        Commands::Scale { name, replicas } => {
            let res = client
                .post(format!("{}/system/scale-function/{}", cli.url, name))
                .json(&json!({ "serviceName": name, "replicas": replicas }))
                .send()
                .await?;
            if res.status().is_success() {
                println!("Scaled {} to {} replicas", name, replicas);
            } else {
                print_error(res).await;
            }
        }
        Commands::Logs { name, follow, tail, since, instance, pattern, invert } => {
            let mut query = vec![("name", name), ("follow", follow.to_string())];
            if let Some(tail) = tail {
                query.push(("tail", tail.to_string()));
            }
            if let Some(since) = since {
                query.push(("since", since));
            }
            if let Some(instance) = instance {
                query.push(("instance", instance));
            }
            if let Some(pattern) = pattern {
                query.push(("pattern", pattern));
                query.push(("invert", invert.to_string()));
            }

            let res = client
                .get(format!("{}/system/logs", cli.url))
                .query(&query)
                .send()
                .await?;
            if !res.status().is_success() {
                print_error(res).await;
                return Ok(());
            }

            let mut res = res;
            let mut pending = Vec::new();
            while let Some(chunk) = res.chunk().await? {
                pending.extend_from_slice(&chunk);
                while let Some(end) = pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=end).collect();
                    print_log_line(&line)?;
                }
            }
        }
        Commands::Invoke { name, data } => {
            let res = client
                .post(format!("{}/function/{}", cli.url, name))
                .body(data)
                .send()
                .await?;
            let status = res.status();
            let text = res.text().await?;
            if status.is_success() {
                print!("{}", text);
            } else {
                eprintln!("Error: function returned status {}", status);
                eprintln!("Response: {}", text);
            }
        }
    }

    Ok(())
}

fn print_log_line(line: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    let message: Value = serde_json::from_slice(line)?;
    println!(
        "{} {} ({}) {}",
        message["timestamp"].as_str().unwrap_or_default(),
        message["name"].as_str().unwrap_or_default(),
        message["instance"].as_str().unwrap_or_default(),
        message["text"].as_str().unwrap_or_default(),
    );
    Ok(())
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    if !res.status().is_success() {
        print_error(res).await;
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn print_error(res: reqwest::Response) {
    eprintln!("Error: provider returned status {}", res.status());
    if let Ok(text) = res.text().await {
        eprintln!("Response: {}", text);
    }
}
