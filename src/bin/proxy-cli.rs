use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management and test CLI for lc-proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy status
    Status,
    /// List backends and their active connections
    Backends,
    /// Inspect the response cache
    Cache,
    /// Run a dummy backend that answers every connection with a fixed response
    Backend {
        #[arg(short, long)]
        port: u16,

        /// Delay before responding
        #[arg(short, long, default_value_t = 0)]
        delay_ms: u64,

        #[arg(short, long, default_value = "Hello from backend")]
        response: String,
    },
    /// Open concurrent client connections through the proxy
    Clients {
        #[arg(long, default_value = "127.0.0.1:8080")]
        proxy: String,

        #[arg(short, long, default_value_t = 10)]
        count: usize,

        /// Delay between client launches
        #[arg(short, long, default_value_t = 0)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Status => query(&cli.url, &cli.key, "status").await?,
        Commands::Backends => query(&cli.url, &cli.key, "backends").await?,
        Commands::Cache => query(&cli.url, &cli.key, "cache").await?,
        Commands::Backend {
            port,
            delay_ms,
            response,
        } => run_backend(port, Duration::from_millis(delay_ms), response).await?,
        Commands::Clients {
            proxy,
            count,
            interval_ms,
        } => run_clients(&proxy, count, Duration::from_millis(interval_ms)).await,
    }

    Ok(())
}

async fn query(url: &str, key: &str, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);

    let res = reqwest::Client::new()
        .get(format!("{}/admin/{}", url, path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
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

async fn run_backend(port: u16, delay: Duration, response: String) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    println!("Backend listening on port {}", port);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let response = response.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            match socket.read(&mut buf).await {
                Ok(n) if n > 0 => {
                    println!("[{}] {}", peer, String::from_utf8_lossy(&buf[..n]));
                }
                _ => return,
            }
            tokio::time::sleep(delay).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
    }
}

async fn run_clients(proxy: &str, count: usize, interval: Duration) {
    let mut handles = Vec::with_capacity(count);
    for i in 0..count {
        let proxy = proxy.to_string();
        handles.push(tokio::spawn(async move {
            match client_exchange(&proxy, i).await {
                Ok(reply) => println!("client {}: {}", i, reply),
                Err(e) => eprintln!("client {}: {}", i, e),
            }
        }));
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }

    for handle in handles {
        let _ = handle.await;
    }
}

async fn client_exchange(proxy: &str, i: usize) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(proxy).await?;
    stream
        .write_all(format!("Hello from client {}", i).as_bytes())
        .await?;

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;
    Ok(String::from_utf8_lossy(&reply).into_owned())
}
