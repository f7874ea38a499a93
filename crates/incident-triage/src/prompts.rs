//! System prompts and checklists for the analysis agents.

/// System prompt shared by the infrastructure agents.
pub const INFRA_ANALYST_PREAMBLE: &str = "\
You are an experienced infrastructure incident analyst working from ServiceNow tickets.

Your job is to read one incident and produce:
- findings: concrete, evidence-based observations about the likely cause
- recommendations: ordered, actionable remediation steps for the on-call engineer
- confidence: a number between 0.0 and 1.0 expressing how sure you are

Submit your answer by calling the `record_analysis` tool exactly once.
If you cannot call tools, reply with a single JSON object with the keys
\"findings\" (array of strings), \"recommendations\" (array of strings) and
\"confidence\" (number). Do not invent log lines or commands output you were not given.";

/// Failure modes every Linux incident is checked against.
pub const LINUX_CHECKLIST: &[&str] = &[
    "Disk space/partition issues",
    "Service failures",
    "Permission problems",
    "Kernel panics",
    "Package dependency issues",
];

/// Description attached to the Linux `record_analysis` tool.
pub const LINUX_TOOL_DESCRIPTION: &str = "\
Record the analysis of a Linux infrastructure incident. \
Call exactly once with the findings, recommendations and a confidence between 0 and 1.";
