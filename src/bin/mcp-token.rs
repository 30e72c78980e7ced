use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::json;
use url::Url;

use mcp_tools_server::config::AuthConfig;
use mcp_tools_server::services::auth::{TokenClient, TokenValidator};
use mcp_tools_server::services::http_client;

/// Obtain a service access token with the OAuth client-credentials grant.
///
/// Reads the same OAUTH_* variables as the server (a `.env` file is honoured).
/// By default prints the token only, so the output can be captured:
///   TOKEN=$(mcp-token)
#[derive(Parser, Debug)]
#[command(name = "mcp-token", version, about)]
struct Args {
    /// Print the cache info (expiry, validity) instead of the token
    #[arg(long, default_value_t = false)]
    info_only: bool,

    /// Also verify the token against the provider's JWKS
    #[arg(long, default_value_t = false)]
    validate: bool,

    /// Call `tools/list` on a running server with the token (e.g. http://localhost:8000)
    #[arg(long, value_name = "URL")]
    server_url: Option<Url>,

    /// Timeout for the server call, in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AuthConfig::from_env().context("loading OAuth configuration")?;

    let http = http_client(config.http_timeout)?;
    let client = TokenClient::new(&config, http.clone());

    let token = client
        .get_access_token()
        .await
        .context("requesting access token")?;

    if args.info_only {
        let info = client.token_info().await;
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{token}");
    }

    if args.validate {
        let validator = TokenValidator::new(&config, http);
        let identity = validator
            .validate(&token)
            .await
            .context("validating access token")?;
        eprintln!(
            "valid: sub={} scopes=[{}] expires_at={}",
            identity.subject,
            identity.scopes.join(" "),
            identity.expires_at.to_rfc3339()
        );
    }

    if let Some(server) = args.server_url {
        let endpoint = server.join("mcp").context("building /mcp URL")?;
        let server_http = http_client(Duration::from_secs(args.timeout))?;
        let response = server_http
            .post(endpoint.clone())
            .bearer_auth(&token)
            .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
            .send()
            .await
            .with_context(|| format!("calling {endpoint}"))?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.context("decoding server response")?;
        if !status.is_success() {
            bail!("{endpoint} returned {status}: {body}");
        }
        eprintln!("{}", serde_json::to_string_pretty(&body)?);
    }

    Ok(())
}
