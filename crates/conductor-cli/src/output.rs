use serde_json::Value;

/// Render a `{"nodes": [...]}` list response as a fixed-width text table.
pub fn render_node_table(body: &Value) -> String {
    let nodes = match body.get("nodes").and_then(Value::as_array) {
        Some(n) => n,
        None => return "No nodes.\n".to_string(),
    };
    if nodes.is_empty() {
        return "No nodes.\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<36}  {:<16}  {:<10}  {:<16}  {}\n",
        "UUID", "DRIVER", "POWER", "PROVISION", "NAME"
    ));
    for node in nodes {
        out.push_str(&format!(
            "{:<36}  {:<16}  {:<10}  {:<16}  {}\n",
            field(node, "uuid"),
            field(node, "driver"),
            field(node, "power_state"),
            field(node, "provision_state"),
            field(node, "name"),
        ));
    }
    out
}

/// Render a single node's states summary.
pub fn render_states(body: &Value) -> String {
    format!(
        "power_state:              {}\ntarget_power_state:       {}\nprovision_state:          {}\ntarget_provision_state:   {}\nlast_error:               {}\n",
        field(body, "power_state"),
        field(body, "target_power_state"),
        field(body, "provision_state"),
        field(body, "target_provision_state"),
        field(body, "last_error"),
    )
}

fn field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "-".to_string(),
        Some(other) => other.to_string(),
    }
}
