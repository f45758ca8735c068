use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use conductor_agent::{AgentProtocol, NoopNetworkProvisioner};
use conductor_config::ConductorConfig;
use conductor_core::Conductor;
use conductor_driver::{DriverCatalog, FakeDriver};
use conductor_store::InMemoryStore;
use serde_json::Value;
use uuid::Uuid;

use crate::cli::{NodeCommand, PowerTargetArg, ProvisionTargetArg};
use crate::output;

// ── Serve ──────────────────────────────────────────────────────────────────

pub async fn serve(
    bind: String,
    port: u16,
    hostname: Option<String>,
    conductor_groups: Vec<String>,
    rotate_token: bool,
) -> Result<()> {
    let token_path = default_token_path();
    let token = if rotate_token {
        let t = generate_token();
        write_token(&token_path, &t)?;
        println!("Rotated token (written to {})", token_path.display());
        println!("Token: {t}");
        t
    } else if let Ok(existing) = std::fs::read_to_string(&token_path).map(|s| s.trim().to_string()) {
        if existing.is_empty() {
            let t = generate_token();
            write_token(&token_path, &t)?;
            t
        } else {
            println!("Reusing existing token from {}", token_path.display());
            existing
        }
    } else {
        let t = generate_token();
        write_token(&token_path, &t)?;
        println!("Generated new token (written to {})", token_path.display());
        t
    };

    let config = Arc::new(ConductorConfig::load().context("failed to load configuration")?);
    let store: Arc<dyn conductor_store::StateStore> = Arc::new(InMemoryStore::new());

    let mut catalog = DriverCatalog::new();
    catalog.register(Arc::new(FakeDriver::new()));
    let catalog = Arc::new(catalog);

    let hostname = hostname.unwrap_or_else(default_hostname);
    let conductor_groups = if conductor_groups.is_empty() { vec![String::new()] } else { conductor_groups };

    let conductor = Arc::new(Conductor::new(
        store.clone(),
        catalog.clone(),
        config.clone(),
        Arc::new(NoopNetworkProvisioner),
        hostname.clone(),
        conductor_groups,
    ));
    let agent = Arc::new(AgentProtocol::new(
        store,
        catalog,
        Arc::new(NoopNetworkProvisioner),
        config,
        hostname.clone(),
    ));

    let _loops = conductor.run_periodic_loops();

    let app = conductor_api::build_app(conductor, agent, Arc::new(token));
    let addr = format!("{bind}:{port}");
    println!("Starting conductor API on http://{addr} (hostname={hostname}, driver=fake)");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn default_hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

// ── Node commands ────────────────────────────────────────────────────────────

pub async fn node(command: NodeCommand, remote: Option<String>, token: Option<String>) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let client = authed_client(&token);
    let base = url.trim_end_matches('/');

    match command {
        NodeCommand::List { marker, limit, sort_key, sort_dir, instance_uuid, associated, maintenance } => {
            let mut req = client.get(format!("{base}/nodes"));
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(v) = marker { query.push(("marker", v)); }
            if let Some(v) = limit { query.push(("limit", v.to_string())); }
            if let Some(v) = sort_key { query.push(("sort_key", v)); }
            if let Some(v) = sort_dir { query.push(("sort_dir", v)); }
            if let Some(v) = instance_uuid { query.push(("instance_uuid", v)); }
            if let Some(v) = associated { query.push(("associated", v.to_string())); }
            if let Some(v) = maintenance { query.push(("maintenance", v.to_string())); }
            req = req.query(&query);
            let body: Value = send(req).await?;
            print!("{}", output::render_node_table(&body));
        }

        NodeCommand::Show { uuid } => {
            let body: Value = send(client.get(format!("{base}/nodes/{uuid}"))).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        NodeCommand::Create { driver, name, conductor_group, driver_info, properties, instance_info } => {
            let body = serde_json::json!({
                "driver": driver,
                "name": name,
                "conductor_group": conductor_group,
                "driver_info": parse_json_arg(driver_info.as_deref())?,
                "properties": parse_json_arg(properties.as_deref())?,
                "instance_info": parse_json_arg(instance_info.as_deref())?,
            });
            let created: Value = send(client.post(format!("{base}/nodes")).json(&body)).await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }

        NodeCommand::Patch { uuid, patch } => {
            let ops = read_json_arg(&patch)?;
            let updated: Value = send(client.patch(format!("{base}/nodes/{uuid}")).json(&ops)).await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }

        NodeCommand::Delete { uuid } => {
            send_no_body(client.delete(format!("{base}/nodes/{uuid}"))).await?;
            println!("Deleted {uuid}");
        }

        NodeCommand::States { uuid } => {
            let body: Value = send(client.get(format!("{base}/nodes/{uuid}/states"))).await?;
            print!("{}", output::render_states(&body));
        }

        NodeCommand::Power { uuid, target } => {
            let target = match target {
                PowerTargetArg::On => "on",
                PowerTargetArg::Off => "off",
                PowerTargetArg::Reboot => "reboot",
            };
            send_no_body(
                client
                    .post(format!("{base}/nodes/{uuid}/states/power"))
                    .json(&serde_json::json!({ "target": target })),
            )
            .await?;
            println!("Requested power={target} for {uuid}");
        }

        NodeCommand::Provision { uuid, target } => {
            let target = match target {
                ProvisionTargetArg::Active => "active",
                ProvisionTargetArg::Deleted => "deleted",
            };
            send_no_body(
                client
                    .post(format!("{base}/nodes/{uuid}/states/provision"))
                    .json(&serde_json::json!({ "target": target })),
            )
            .await?;
            println!("Requested provision={target} for {uuid}");
        }

        NodeCommand::ConsoleShow { uuid } => {
            let body: Value = send(client.get(format!("{base}/nodes/{uuid}/states/console"))).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        NodeCommand::ConsoleSet { uuid, enabled } => {
            send_no_body(
                client
                    .post(format!("{base}/nodes/{uuid}/states/console"))
                    .query(&[("enabled", enabled.to_string())]),
            )
            .await?;
            println!("Console enabled={enabled} for {uuid}");
        }

        NodeCommand::VendorPassthru { uuid, method, info } => {
            let info = read_json_arg(&info)?;
            send_no_body(client.post(format!("{base}/nodes/{uuid}/vendor_passthru/{method}")).json(&info)).await?;
            println!("Dispatched {method} to {uuid}");
        }

        NodeCommand::Validate { uuid } => {
            let body: Value = send(client.get(format!("{base}/nodes/{uuid}/validate"))).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }
    Ok(())
}

pub async fn driver_vendor_passthru(
    driver: String,
    method: String,
    info: String,
    remote: Option<String>,
    token: Option<String>,
) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let base = url.trim_end_matches('/');
    let info = read_json_arg(&info)?;
    let body: Value = send(
        authed_client(&token)
            .post(format!("{base}/drivers/{driver}/vendor_passthru/{method}"))
            .json(&info),
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

// ── HTTP helpers ─────────────────────────────────────────────────────────────

async fn send(req: reqwest::RequestBuilder) -> Result<Value> {
    let resp = req.send().await.context("failed to reach conductor API")?;
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        anyhow::bail!("conductor API returned {status}: {body}");
    }
    Ok(body)
}

async fn send_no_body(req: reqwest::RequestBuilder) -> Result<()> {
    let resp = req.send().await.context("failed to reach conductor API")?;
    let status = resp.status();
    if !status.is_success() {
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        anyhow::bail!("conductor API returned {status}: {body}");
    }
    Ok(())
}

/// Parse a JSON object argument, treating a missing value as `{}` and a
/// leading `@` as "read this file instead" (matching `curl -d @file`).
fn parse_json_arg(raw: Option<&str>) -> Result<Value> {
    match raw {
        None => Ok(Value::Object(Default::default())),
        Some(s) => read_json_arg(s),
    }
}

fn read_json_arg(raw: &str) -> Result<Value> {
    let text = if let Some(path) = raw.strip_prefix('@') {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?
    } else {
        raw.to_string()
    };
    serde_json::from_str(&text).context("failed to parse JSON argument")
}

// ── Token / client helpers ───────────────────────────────────────────────────

fn generate_token() -> String {
    let a = Uuid::new_v4().to_string().replace('-', "");
    let b = Uuid::new_v4().to_string().replace('-', "");
    format!("{a}{b}")
}

/// Resolve the bearer token to use: explicit `--token`/`CONDUCTOR_TOKEN`,
/// falling back to the token file `conductor serve` wrote.
fn resolve_token(explicit: Option<String>) -> Result<String> {
    if let Some(t) = explicit {
        return Ok(t);
    }
    let path = default_token_path();
    std::fs::read_to_string(&path).map(|s| s.trim().to_string()).with_context(|| {
        format!(
            "No token provided and could not read token file at {}. \
             Use --token, CONDUCTOR_TOKEN, or run `conductor serve` first.",
            path.display()
        )
    })
}

fn write_token(path: &PathBuf, token: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, token).with_context(|| format!("failed to write token to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }
    Ok(())
}

fn default_token_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".conductor").join("token")
}

fn authed_client(token: &str) -> reqwest::Client {
    let mut headers = reqwest::header::HeaderMap::new();
    let bearer = format!("Bearer {token}");
    headers.insert(
        reqwest::header::AUTHORIZATION,
        reqwest::header::HeaderValue::from_str(&bearer).expect("token contains invalid header characters"),
    );
    reqwest::Client::builder().default_headers(headers).build().expect("failed to build HTTP client")
}

fn server_url(remote: Option<String>) -> String {
    remote.unwrap_or_else(|| "http://localhost:6385".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_arg_defaults_to_empty_object() {
        assert_eq!(parse_json_arg(None).unwrap(), Value::Object(Default::default()));
    }

    #[test]
    fn read_json_arg_parses_inline_json() {
        let v = read_json_arg(r#"{"a": 1}"#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn read_json_arg_rejects_invalid_json() {
        assert!(read_json_arg("not json").is_err());
    }
}
