use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const CONTRACT_ID: &str = "svgdeck.oracle_contract";
pub const CONTRACT_VERSION: &str = "1";

/// Attribute injected on every element of the instrumented document. Its value
/// is the element's stable index and is echoed back as `idx` in each record.
pub const INDEX_ATTRIBUTE: &str = "data-style-idx";

/// Computed-style properties the probe reports, in payload order.
pub const STYLE_PROPERTIES: [&str; 11] = [
    "fill",
    "stroke",
    "stroke-width",
    "stroke-dasharray",
    "font-size",
    "font-family",
    "font-weight",
    "text-anchor",
    "marker-start",
    "marker-end",
    "color",
];

const PROBE_SCRIPT_ID: &str = "svgdeck.oracle_probe.v1";

// The probe runs inside the oracle host (a browser page or equivalent), never in
// this process; it is compiled in so hosts and fingerprints cannot drift apart.
const PROBE_SCRIPT_V1: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/probe.js"));

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn has_area(&self) -> bool {
        self.width * self.height != 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ctm {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    #[serde(deserialize_with = "deserialize_index")]
    pub idx: usize,
    #[serde(rename = "tagName", default)]
    pub tag_name: String,
    #[serde(default)]
    pub styles: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub ctm: Option<Ctm>,
    #[serde(rename = "isHidden", default)]
    pub is_hidden: bool,
}

impl ElementRecord {
    pub fn style(&self, name: &str) -> Option<&str> {
        self.styles.get(name).and_then(|v| v.as_deref())
    }
}

// Hosts disagree on whether the index comes back as a number or as the raw
// attribute string; both are accepted.
fn deserialize_index<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawIndex {
        Number(u64),
        Text(String),
    }

    match RawIndex::deserialize(deserializer)? {
        RawIndex::Number(n) => usize::try_from(n).map_err(serde::de::Error::custom),
        RawIndex::Text(s) => s.trim().parse::<usize>().map_err(serde::de::Error::custom),
    }
}

/// Parses the probe output. The probe returns `JSON.stringify(...)`, so some
/// hosts hand back a JSON string wrapping the array; that form is unwrapped.
pub fn parse_payload(json: &str) -> Result<Vec<ElementRecord>, serde_json::Error> {
    let value: Value = serde_json::from_str(json)?;
    match value {
        Value::String(inner) => serde_json::from_str(&inner),
        other => serde_json::from_value(other),
    }
}

#[derive(Debug, Clone)]
pub struct OracleContractMetadata {
    pub contract_id: &'static str,
    pub contract_version: &'static str,
    pub contract_fingerprint_sha256: String,
    pub probe_script_id: &'static str,
    pub probe_script_hash_sha256: String,
    pub index_attribute: &'static str,
    pub style_properties: &'static [&'static str],
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_digest(hasher)
}

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn hash_memoized(cell: &OnceLock<String>, text: &str) -> String {
    cell.get_or_init(|| hex_sha256(text.as_bytes())).clone()
}

static PROBE_SCRIPT_HASH: OnceLock<String> = OnceLock::new();
static CONTRACT_FINGERPRINT: OnceLock<String> = OnceLock::new();

pub fn probe_script_v1() -> &'static str {
    PROBE_SCRIPT_V1
}

pub fn probe_script_v1_hash_sha256() -> String {
    hash_memoized(&PROBE_SCRIPT_HASH, PROBE_SCRIPT_V1)
}

pub fn contract_fingerprint_sha256() -> String {
    CONTRACT_FINGERPRINT
        .get_or_init(|| {
            let mut hasher = Sha256::new();
            hasher.update(CONTRACT_ID.as_bytes());
            hasher.update(b"\n");
            hasher.update(CONTRACT_VERSION.as_bytes());
            hasher.update(b"\n");
            hasher.update(INDEX_ATTRIBUTE.as_bytes());
            hasher.update(b"\n");
            hasher.update(STYLE_PROPERTIES.join(",").as_bytes());
            hasher.update(b"\n");
            hasher.update(PROBE_SCRIPT_ID.as_bytes());
            hasher.update(b"\n");
            hasher.update(probe_script_v1_hash_sha256().as_bytes());
            hex_digest(hasher)
        })
        .clone()
}

pub fn metadata() -> OracleContractMetadata {
    OracleContractMetadata {
        contract_id: CONTRACT_ID,
        contract_version: CONTRACT_VERSION,
        contract_fingerprint_sha256: contract_fingerprint_sha256(),
        probe_script_id: PROBE_SCRIPT_ID,
        probe_script_hash_sha256: probe_script_v1_hash_sha256(),
        index_attribute: INDEX_ATTRIBUTE,
        style_properties: &STYLE_PROPERTIES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_fingerprint_is_stable_and_nonempty() {
        let a = contract_fingerprint_sha256();
        let b = contract_fingerprint_sha256();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, probe_script_v1_hash_sha256());
    }

    #[test]
    fn metadata_reports_contract_identity() {
        let meta = metadata();
        assert_eq!(meta.contract_id, CONTRACT_ID);
        assert_eq!(meta.contract_version, CONTRACT_VERSION);
        assert_eq!(meta.index_attribute, "data-style-idx");
        assert_eq!(meta.style_properties.len(), 11);
        assert_eq!(meta.probe_script_hash_sha256.len(), 64);
    }

    #[test]
    fn probe_script_reports_every_style_property() {
        let script = probe_script_v1();
        assert!(script.contains(INDEX_ATTRIBUTE));
        for prop in STYLE_PROPERTIES {
            assert!(
                script.contains(&format!("\"{prop}\"")),
                "probe is missing property {prop}"
            );
        }
    }

    #[test]
    fn parses_payload_with_numeric_and_string_indices() {
        let json = r#"[
            {"idx": 3, "tagName": "rect", "styles": {"fill": "rgb(255, 0, 0)", "stroke": null},
             "attrs": {"x": "1"}, "bbox": {"x": 1, "y": 2, "width": 3, "height": 4},
             "ctm": {"a": 1, "b": 0, "c": 0, "d": 1, "e": 5, "f": 6}, "isHidden": false},
            {"idx": "7", "tagName": "path", "styles": {}, "attrs": {}, "bbox": null,
             "ctm": null, "isHidden": true}
        ]"#;
        let records = parse_payload(json).expect("payload");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].idx, 3);
        assert_eq!(records[0].style("fill"), Some("rgb(255, 0, 0)"));
        assert_eq!(records[0].style("stroke"), None);
        assert_eq!(records[0].ctm.map(|m| m.e), Some(5.0));
        assert!(records[0].bbox.is_some_and(|b| b.has_area()));
        assert_eq!(records[1].idx, 7);
        assert!(records[1].is_hidden);
        assert!(records[1].bbox.is_none());
    }

    #[test]
    fn parses_string_wrapped_payload() {
        let inner = r#"[{"idx":"0","tagName":"svg"}]"#;
        let wrapped = serde_json::to_string(inner).expect("wrap");
        let records = parse_payload(&wrapped).expect("payload");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tag_name, "svg");
        assert!(!records[0].is_hidden);
    }

    #[test]
    fn rejects_non_numeric_index() {
        let err = parse_payload(r#"[{"idx":"abc"}]"#);
        assert!(err.is_err());
    }
}
