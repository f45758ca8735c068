use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::AgentError;

type HmacSha1 = Hmac<Sha1>;

/// The three path fragments a signed download URL is built from, either
/// parsed from a direct backend URL or supplied from static configuration.
#[derive(Debug, Clone)]
pub struct ObjectLocation {
    pub path: String,
    pub container: String,
    pub object_id: String,
}

impl ObjectLocation {
    /// Parse `scheme://host/path/container/object_id`, requiring
    /// `object_id` to be a valid UUID.
    pub fn parse_backend_url(url: &str) -> Result<(String, Self), AgentError> {
        let (scheme_host, rest) = url
            .split_once("://")
            .ok_or_else(|| AgentError::InvalidParameterValue(format!("not a URL: {url}")))?;
        let mut parts = rest.splitn(2, '/');
        let host = parts.next().unwrap_or_default();
        let path_rest = parts.next().ok_or_else(|| {
            AgentError::InvalidParameterValue(format!("missing path in URL: {url}"))
        })?;

        let segments: Vec<&str> = path_rest.trim_end_matches('/').split('/').collect();
        if segments.len() < 3 {
            return Err(AgentError::InvalidParameterValue(format!(
                "expected scheme://host/path/container/object_id, got: {url}"
            )));
        }
        let object_id = segments[segments.len() - 1].to_string();
        let container = segments[segments.len() - 2].to_string();
        let path = segments[..segments.len() - 2].join("/");

        uuid::Uuid::parse_str(&object_id).map_err(|_| {
            AgentError::InvalidParameterValue(format!("object_id is not a UUID: {object_id}"))
        })?;

        let scheme_host_url = format!("{scheme_host}://{host}");
        Ok((
            scheme_host_url,
            ObjectLocation { path, container, object_id },
        ))
    }
}

/// Build a Swift-style time-limited signed download URL exactly per
/// spec.md §4.6:
///
/// ```text
/// url_path  = "/{path}/{container}/{object_id}"
/// expires   = floor(now()) + duration
/// methods   = upper(join(allowed_methods, " "))
/// body      = methods + "\n" + expires + "\n" + url_path
/// sig       = lowercase_hex(HMAC_SHA1(shared_secret, body))
/// return    = "{scheme}://{host}{url_path}?temp_url_sig={sig}&temp_url_expires={expires}"
/// ```
pub fn build_signed_url(
    scheme_host: &str,
    location: &ObjectLocation,
    now: chrono::DateTime<chrono::Utc>,
    duration: chrono::Duration,
    shared_secret: Option<&str>,
    allowed_methods: &[String],
) -> Result<String, AgentError> {
    let secret = shared_secret
        .ok_or_else(|| AgentError::InvalidParameterValue("swift_temp_url_key is not set".into()))?;
    if allowed_methods.is_empty() {
        return Err(AgentError::InvalidParameterValue(
            "swift_temp_url_methods is empty".into(),
        ));
    }

    let url_path = format!("/{}/{}/{}", location.path, location.container, location.object_id);
    let expires = now.timestamp() + duration.num_seconds();
    let methods = allowed_methods
        .iter()
        .map(|m| m.to_uppercase())
        .collect::<Vec<_>>()
        .join(" ");
    let body = format!("{methods}\n{expires}\n{url_path}");

    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| AgentError::InvalidParameterValue(e.to_string()))?;
    mac.update(body.as_bytes());
    let sig = hex_lower(&mac.finalize().into_bytes());

    Ok(format!(
        "{scheme_host}{url_path}?temp_url_sig={sig}&temp_url_expires={expires}"
    ))
}

fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
