//! Smoke-test client for a running auth-extproc filter.
//!
//! Opens one processing stream per simulated request, the way Envoy does,
//! and prints the verdict it gets back.

use clap::{Parser, Subcommand};

use auth_extproc::ext_proc::proto::external_processor_client::ExternalProcessorClient;
use auth_extproc::ext_proc::proto::{processing_response::Response, ProcessingRequest};

#[derive(Parser)]
#[command(name = "extproc-probe")]
#[command(about = "Send test events to an auth-extproc filter", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:9000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send request-headers events, optionally carrying an API key
    Headers {
        /// Value for the x-api-key header; omitted entirely when not given
        #[arg(short = 'k', long)]
        api_key: Option<String>,

        /// Number of requests to send, one stream each
        #[arg(short, long, default_value_t = 1)]
        count: u32,
    },
    /// Send a request-body event (never metered)
    Body {
        #[arg(short, long, default_value = "")]
        data: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut client = ExternalProcessorClient::connect(cli.url).await?;

    match cli.command {
        Commands::Headers { api_key, count } => {
            for i in 1..=count {
                let mut headers = vec![(":method", "GET"), (":path", "/")];
                if let Some(key) = &api_key {
                    headers.push(("x-api-key", key.as_str()));
                }
                let verdict = send(&mut client, ProcessingRequest::request_headers(headers)).await?;
                println!("#{i}: {verdict}");
            }
        }
        Commands::Body { data } => {
            let verdict = send(&mut client, ProcessingRequest::request_body(data, true)).await?;
            println!("{verdict}");
        }
    }

    Ok(())
}

async fn send(
    client: &mut ExternalProcessorClient<tonic::transport::Channel>,
    event: ProcessingRequest,
) -> Result<String, Box<dyn std::error::Error>> {
    let mut responses = client
        .process(tokio_stream::iter(vec![event]))
        .await?
        .into_inner();

    let verdict = match responses.message().await? {
        Some(response) => match response.response {
            Some(Response::ImmediateResponse(immediate)) => format!(
                "deny {} {}",
                immediate.status.map(|s| s.code).unwrap_or_default(),
                String::from_utf8_lossy(&immediate.body)
            ),
            Some(_) => "continue".to_string(),
            None => "empty response".to_string(),
        },
        None => "stream closed without a verdict".to_string(),
    };
    Ok(verdict)
}
