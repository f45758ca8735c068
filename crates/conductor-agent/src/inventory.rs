use std::collections::BTreeMap;

use conductor_domain::MacAddress;
use serde_json::Value;

use crate::error::AgentError;

/// Depth-first flatten of a JSON value into `path/segment/0/key -> scalar`
/// form. Arrays contribute a numeric path segment (`interfaces/0/mac`);
/// objects contribute their key. Only leaf scalars (string, number, bool,
/// null) are stored — an empty object or array produces no entries.
///
/// A `BTreeMap` keeps keys sorted, which is what makes `unflatten` followed
/// by `flatten` deterministic (the round-trip law in spec.md §8).
pub fn flatten(value: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into("", value, &mut out);
    out
}

fn flatten_into(path: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let child = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}/{k}")
                };
                flatten_into(&child, v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                let child = if path.is_empty() {
                    i.to_string()
                } else {
                    format!("{path}/{i}")
                };
                flatten_into(&child, v, out);
            }
        }
        leaf => {
            if !path.is_empty() {
                out.insert(path.to_string(), leaf.clone());
            }
        }
    }
}

/// Rebuild the nested structure a path-keyed map was flattened from.
/// A purely-numeric path segment becomes an array index; anything else
/// becomes an object key.
pub fn unflatten(flattened: &BTreeMap<String, Value>) -> Value {
    let mut root = Value::Object(Default::default());
    for (path, leaf) in flattened {
        let segments: Vec<&str> = path.split('/').collect();
        insert_path(&mut root, &segments, leaf.clone());
    }
    root
}

fn insert_path(node: &mut Value, segments: &[&str], leaf: Value) {
    let (head, rest) = match segments.split_first() {
        Some(pair) => pair,
        None => return,
    };

    if rest.is_empty() {
        set_child(node, head, leaf);
        return;
    }

    let next_is_index = rest[0].parse::<usize>().is_ok();
    let child = get_or_create_child(node, head, next_is_index);
    insert_path(child, rest, leaf);
}

fn set_child(node: &mut Value, key: &str, leaf: Value) {
    if let Ok(index) = key.parse::<usize>() {
        let arr = as_array_mut(node);
        while arr.len() <= index {
            arr.push(Value::Null);
        }
        arr[index] = leaf;
    } else {
        let obj = as_object_mut(node);
        obj.insert(key.to_string(), leaf);
    }
}

fn get_or_create_child<'a>(node: &'a mut Value, key: &str, child_is_array: bool) -> &'a mut Value {
    let placeholder = || {
        if child_is_array {
            Value::Array(Vec::new())
        } else {
            Value::Object(Default::default())
        }
    };
    if let Ok(index) = key.parse::<usize>() {
        let arr = as_array_mut(node);
        while arr.len() <= index {
            arr.push(Value::Null);
        }
        if arr[index].is_null() {
            arr[index] = placeholder();
        }
        &mut arr[index]
    } else {
        let obj = as_object_mut(node);
        obj.entry(key.to_string()).or_insert_with(placeholder)
    }
}

fn as_array_mut(node: &mut Value) -> &mut Vec<Value> {
    if !node.is_array() {
        *node = Value::Array(Vec::new());
    }
    node.as_array_mut().unwrap()
}

fn as_object_mut(node: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Default::default());
    }
    node.as_object_mut().unwrap()
}

// ── Lookup payload shapes ────────────────────────────────────────────────

/// The body of an unauthenticated `lookup` call, in any of the three
/// historical shapes the agent may send:
///
/// - v0 (implicit): `{"interfaces": [...]}` at the top level.
/// - v1: `{"version": "1", "interfaces": [...]}`.
/// - v2: `{"version": "2", "inventory": {"interfaces": [...]}}`.
pub struct LookupPayload<'a> {
    raw: &'a Value,
}

impl<'a> LookupPayload<'a> {
    pub fn new(raw: &'a Value) -> Self {
        LookupPayload { raw }
    }

    /// The interfaces array, wherever this payload's version keeps it.
    fn interfaces(&self) -> Option<&'a Vec<Value>> {
        let version = self.raw.get("version").and_then(Value::as_str);
        match version {
            Some("2") => self
                .raw
                .get("inventory")
                .and_then(|inv| inv.get("interfaces"))
                .and_then(Value::as_array),
            _ => self.raw.get("interfaces").and_then(Value::as_array),
        }
    }

    /// The inventory value that gets flattened into `node.extra`. v2 nests
    /// it under `inventory`; v0/v1 treat the whole body as the inventory.
    pub fn inventory(&self) -> &'a Value {
        let version = self.raw.get("version").and_then(Value::as_str);
        match version {
            Some("2") => self.raw.get("inventory").unwrap_or(self.raw),
            _ => self.raw,
        }
    }

    /// Extract and normalize every MAC address present on any interface.
    /// Interfaces with no `mac_address` field are skipped, not an error.
    pub fn mac_addresses(&self) -> Result<Vec<MacAddress>, AgentError> {
        let interfaces = match self.interfaces() {
            Some(v) => v,
            None => return Ok(Vec::new()),
        };
        let mut macs = Vec::new();
        for iface in interfaces {
            let Some(raw_mac) = iface.get("mac_address").and_then(Value::as_str) else {
                continue;
            };
            macs.push(
                MacAddress::parse(raw_mac)
                    .map_err(|e| AgentError::InvalidMac(e.to_string()))?,
            );
        }
        Ok(macs)
    }
}

/// A `(switch_chassis_id, switch_port_id, interface_name)` triple derived
/// from a node's flattened inventory, used by [`crate::network`] to
/// configure the network fabric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapEntry {
    pub switch_chassis_id: String,
    pub switch_port_id: String,
    pub name: Option<String>,
}

/// Extract the port map from a node's flattened `extra` attributes, reading
/// `hardware/interfaces/<n>/switch_chassis_id` and `.../switch_port_id`
/// (optionally `.../name`). Interfaces missing either chassis or port id are
/// skipped; an empty result means no interface carried a complete mapping.
pub fn extract_port_map(
    extra: &std::collections::HashMap<String, Value>,
) -> Result<Vec<PortMapEntry>, AgentError> {
    const PREFIX: &str = "hardware/interfaces/";
    let mut by_index: BTreeMap<usize, (Option<String>, Option<String>, Option<String>)> =
        BTreeMap::new();

    for (path, value) in extra {
        let Some(rest) = path.strip_prefix(PREFIX) else {
            continue;
        };
        let mut segments = rest.splitn(2, '/');
        let Some(index_str) = segments.next() else { continue };
        let Ok(index) = index_str.parse::<usize>() else { continue };
        let Some(field) = segments.next() else { continue };
        let value_str = value.as_str().map(str::to_string);

        let entry = by_index.entry(index).or_default();
        match field {
            "switch_chassis_id" => entry.0 = value_str,
            "switch_port_id" => entry.1 = value_str,
            "name" => entry.2 = value_str,
            _ => {}
        }
    }

    let entries: Vec<PortMapEntry> = by_index
        .into_values()
        .filter_map(|(chassis, port, name)| match (chassis, port) {
            (Some(switch_chassis_id), Some(switch_port_id)) => Some(PortMapEntry {
                switch_chassis_id,
                switch_port_id,
                name,
            }),
            _ => None,
        })
        .collect();

    if entries.is_empty() {
        return Err(AgentError::NoValidPortmaps);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flatten_nested_object_and_array() {
        let value = json!({"a": {"b": ["c", "d"]}});
        let flat = flatten(&value);
        assert_eq!(flat.get("a/b/0").unwrap(), "c");
        assert_eq!(flat.get("a/b/1").unwrap(), "d");
    }

    #[test]
    fn flatten_unflatten_round_trips() {
        let value = json!({
            "hardware": {
                "interfaces": [
                    {"mac_address": "aa:bb:cc:dd:ee:ff", "name": "eth0"},
                    {"mac_address": "11:22:33:44:55:66", "name": "eth1"}
                ]
            }
        });
        let flat = flatten(&value);
        let rebuilt = unflatten(&flat);
        let reflat = flatten(&rebuilt);
        assert_eq!(flat, reflat);
    }

    #[test]
    fn lookup_v0_implicit_reads_top_level_interfaces() {
        let body = json!({"interfaces": [{"mac_address": "AA:BB:CC:DD:EE:FF"}]});
        let payload = LookupPayload::new(&body);
        let macs = payload.mac_addresses().unwrap();
        assert_eq!(macs.len(), 1);
        assert_eq!(macs[0].as_str(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn lookup_v2_reads_nested_inventory_interfaces() {
        let body = json!({
            "version": "2",
            "inventory": {"interfaces": [{"mac_address": "AA:BB:CC:DD:EE:FF", "name": "eth0"}]}
        });
        let payload = LookupPayload::new(&body);
        let macs = payload.mac_addresses().unwrap();
        assert_eq!(macs.len(), 1);
        assert_eq!(macs[0].as_str(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn lookup_v2_empty_interfaces_yields_no_macs() {
        let body = json!({"version": "2", "inventory": {"interfaces": []}});
        let payload = LookupPayload::new(&body);
        assert!(payload.mac_addresses().unwrap().is_empty());
    }

    #[test]
    fn port_map_skips_incomplete_interfaces() {
        let mut extra = std::collections::HashMap::new();
        extra.insert("hardware/interfaces/0/switch_chassis_id".to_string(), json!("chassis-1"));
        extra.insert("hardware/interfaces/0/switch_port_id".to_string(), json!("port-1"));
        extra.insert("hardware/interfaces/0/name".to_string(), json!("eth0"));
        extra.insert("hardware/interfaces/1/switch_chassis_id".to_string(), json!("chassis-2"));

        let map = extract_port_map(&extra).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[0].switch_chassis_id, "chassis-1");
        assert_eq!(map[0].name.as_deref(), Some("eth0"));
    }

    #[test]
    fn port_map_empty_is_no_valid_portmaps() {
        let extra = std::collections::HashMap::new();
        assert!(matches!(extract_port_map(&extra), Err(AgentError::NoValidPortmaps)));
    }
}
