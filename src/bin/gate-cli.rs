use clap::{Parser, Subcommand};
use serde_json::Value;

use origin_gate::admission::hash_bucket;
use origin_gate::origin::OriginMetadata;
use origin_gate::rules::keys_for;

#[derive(Parser)]
#[command(name = "gate-cli")]
#[command(about = "Operator CLI for the origin gate", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8090", env = "GATE_URL")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the gateway health endpoint
    Health {
        #[arg(long, default_value = "/healthz")]
        path: String,
    },
    /// Dump the gateway metrics
    Metrics {
        #[arg(long, default_value = "/metrics")]
        path: String,
    },
    /// Print the rule keys consulted for an origin, most specific first
    Keys {
        #[arg(long, default_value = "")]
        asn: String,
        #[arg(long, default_value = "")]
        country: String,
        #[arg(long, default_value = "")]
        tsp: String,
    },
    /// Print the drop bucket (0-99) of a client address
    Bucket { ip: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Health { path } => {
            let res = reqwest::get(format!("{}{}", cli.url, path)).await?;
            print_json(res).await?;
        }
        Commands::Metrics { path } => {
            let res = reqwest::get(format!("{}{}", cli.url, path)).await?;
            let status = res.status();
            let text = res.text().await?;
            if !status.is_success() {
                eprintln!("Error: gateway returned status {}", status);
            }
            print!("{}", text);
        }
        Commands::Keys { asn, country, tsp } => {
            let origin = OriginMetadata::normalized(&asn, &country, &tsp, "");
            for key in keys_for(&origin) {
                println!("{}", key);
            }
        }
        Commands::Bucket { ip } => {
            println!("{}", hash_bucket(ip.trim()));
        }
    }

    Ok(())
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
