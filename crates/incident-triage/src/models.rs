//! Typed handoff records: the incident fetched from the ticketing system and
//! the analysis an agent produces for it.
//!
//! | Type             | Produced by       | Consumed by               |
//! |------------------|-------------------|---------------------------|
//! | `Incident`       | ticketing client  | every analysis agent      |
//! | `AnalysisResult` | one analysis agent| assistant, report output  |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{TriageError, TriageResult};

/// One row of a Table API response.
pub type Row = Map<String, Value>;

// ── Incident ────────────────────────────────────────────────────────────────

/// A ticket from the ITSM `incident` table.
///
/// ServiceNow serializes almost every column as a string (`"priority": "3"`)
/// and reference columns either as a bare sys_id or as a
/// `{"link": ..., "value": ...}` object, so the optional and numeric fields go
/// through lenient deserializers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Internal identifier (`sys_id`).
    #[serde(rename(deserialize = "sys_id"))]
    pub id: String,
    /// Human-facing ticket number, e.g. `INC0012345`.
    pub number: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub short_description: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub description: String,
    /// Affected configuration item, if any.
    #[serde(default, deserialize_with = "lenient::reference")]
    pub configuration_item: Option<String>,
    #[serde(
        rename(deserialize = "related_ci"),
        default,
        deserialize_with = "lenient::string_list"
    )]
    pub related_configuration_items: Vec<String>,
    #[serde(default, deserialize_with = "lenient::reference")]
    pub application: Option<String>,
    #[serde(deserialize_with = "lenient::integer")]
    pub priority: i64,
    #[serde(deserialize_with = "lenient::integer")]
    pub state: i64,
}

impl Incident {
    /// Build an incident from a raw Table API row.
    ///
    /// Missing `sys_id`/`number`, or an unparseable `priority`/`state`, is a
    /// fetch-layer error rather than a partially populated record.
    pub fn from_row(row: &Row) -> TriageResult<Self> {
        let sys_id = row
            .get("sys_id")
            .and_then(Value::as_str)
            .unwrap_or("<missing sys_id>")
            .to_string();

        let incident: Incident = serde_json::from_value(Value::Object(row.clone()))
            .map_err(|e| TriageError::MalformedRecord(format!("incident {sys_id}: {e}")))?;

        if incident.id.trim().is_empty() {
            return Err(TriageError::MalformedRecord(
                "incident row has an empty sys_id".into(),
            ));
        }
        if incident.number.trim().is_empty() {
            return Err(TriageError::MalformedRecord(format!(
                "incident {sys_id}: empty number"
            )));
        }
        Ok(incident)
    }
}

// ── AnalysisResult ──────────────────────────────────────────────────────────

/// Output of exactly one agent for exactly one incident.
///
/// Fields are private so the confidence clamp cannot be bypassed; use
/// [`AnalysisResult::new`] or deserialize from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAnalysisResult")]
pub struct AnalysisResult {
    incident_id: String,
    agent_name: String,
    findings: Vec<String>,
    recommendations: Vec<String>,
    confidence: f64,
}

/// Wire shape with every field required; missing fields fail deserialization.
#[derive(Deserialize)]
struct RawAnalysisResult {
    incident_id: String,
    agent_name: String,
    findings: Vec<String>,
    recommendations: Vec<String>,
    confidence: f64,
}

impl TryFrom<RawAnalysisResult> for AnalysisResult {
    type Error = TriageError;

    fn try_from(raw: RawAnalysisResult) -> Result<Self, Self::Error> {
        AnalysisResult::new(
            raw.incident_id,
            raw.agent_name,
            raw.findings,
            raw.recommendations,
            raw.confidence,
        )
    }
}

impl AnalysisResult {
    /// Construct a result, clamping `confidence` into `[0.0, 1.0]`.
    ///
    /// # Errors
    ///
    /// `Validation` if `confidence` is NaN or `agent_name` is empty.
    pub fn new(
        incident_id: impl Into<String>,
        agent_name: impl Into<String>,
        findings: Vec<String>,
        recommendations: Vec<String>,
        confidence: f64,
    ) -> TriageResult<Self> {
        if confidence.is_nan() {
            return Err(TriageError::Validation("confidence is NaN".into()));
        }
        let agent_name = agent_name.into();
        if agent_name.trim().is_empty() {
            return Err(TriageError::Validation("agent_name is empty".into()));
        }
        Ok(Self {
            incident_id: incident_id.into(),
            agent_name,
            findings,
            recommendations,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }

    /// Parse a JSON value, reporting missing or mistyped fields as `Validation`.
    pub fn from_json(value: Value) -> TriageResult<Self> {
        serde_json::from_value(value).map_err(|e| TriageError::Validation(e.to_string()))
    }

    pub fn incident_id(&self) -> &str {
        &self.incident_id
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn findings(&self) -> &[String] {
        &self.findings
    }

    pub fn recommendations(&self) -> &[String] {
        &self.recommendations
    }

    /// Always within `[0.0, 1.0]`.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

// ── Lenient ServiceNow field decoding ───────────────────────────────────────

pub(crate) mod lenient {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Reference columns: `"abc"`, `""` (unset), `null`, or `{"value": "abc", "link": ...}`.
    pub(crate) fn reference_value(value: Value) -> Option<String> {
        match value {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s),
            Value::Object(mut obj) => match obj.remove("value") {
                Some(inner) => reference_value(inner),
                None => None,
            },
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn reference<'de, D>(d: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(reference_value(Value::deserialize(d)?))
    }

    pub fn text<'de, D>(d: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => reference_value(other).unwrap_or_default(),
        })
    }

    pub fn integer<'de, D>(d: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(d)? {
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| D::Error::custom(format!("expected an integer, got {n}"))),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| D::Error::custom(format!("expected an integer, got {s:?}"))),
            other => Err(D::Error::custom(format!("expected an integer, got {other}"))),
        }
    }

    /// Accepts a JSON array or a comma-separated string (the Table API's list format).
    pub fn string_list<'de, D>(d: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items.into_iter().filter_map(reference_value).collect(),
            Value::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        })
    }
}
