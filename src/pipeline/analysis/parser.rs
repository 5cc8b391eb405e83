//! Narrator reply parsing.
//!
//! The vision service answers in free text that loosely follows the
//! `health_status:` / `disease_name:` / `treatment:` template. Parsing is
//! line-based and tolerant; normalization then applies fixed defaulting
//! rules so the caller always gets a consistent `NarratorFindings`.

use super::types::{HealthStatus, NarratorFindings};

/// Care list used when a healthy reply carries no treatment text.
pub const DEFAULT_HEALTHY_CARE: &str = "1. Continue regular watering\n\
     2. Maintain appropriate sunlight exposure\n\
     3. Apply balanced fertilizer as needed";

/// Remediation list used when any other reply carries no treatment text.
pub const DEFAULT_REMEDIATION: &str = "1. Remove affected parts\n\
     2. Apply appropriate fungicide/pesticide\n\
     3. Improve air circulation\n\
     4. Adjust watering practices\n\
     5. Consult with a local agricultural extension service";

pub const UNIDENTIFIED_DISEASE: &str = "unidentified disease";
pub const NO_DISEASE: &str = "none";

const HEALTH_STATUS_KEY: &str = "health_status:";
const DISEASE_NAME_KEY: &str = "disease_name:";
const TREATMENT_KEY: &str = "treatment:";

/// Raw field values pulled out of a reply, before any defaulting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReply {
    /// Lowercased, trimmed.
    pub health_status: Option<String>,
    pub disease_name: Option<String>,
    pub treatment: String,
}

/// Parse and normalize a narrator reply in one step.
pub fn interpret_narrator_reply(reply: &str) -> NarratorFindings {
    normalize_reply(parse_narrator_reply(reply))
}

/// Split a reply into its template fields.
///
/// A field line is any line containing its key (case-insensitive); the value
/// is everything after the line's first colon. Treatment starts on the line
/// containing `treatment:` and runs to the end of the reply.
pub fn parse_narrator_reply(reply: &str) -> ParsedReply {
    let mut parsed = ParsedReply::default();
    let mut treatment_lines: Vec<&str> = Vec::new();
    let mut capturing_treatment = false;

    for line in reply.trim().lines() {
        let lower = line.to_lowercase();

        if lower.contains(HEALTH_STATUS_KEY) {
            parsed.health_status = Some(value_after_colon(line).to_lowercase());
        } else if lower.contains(DISEASE_NAME_KEY) {
            parsed.disease_name = Some(value_after_colon(line).to_string());
        }

        if lower.contains(TREATMENT_KEY) {
            capturing_treatment = true;
            let inline = value_after_colon(line);
            if !inline.is_empty() {
                treatment_lines.push(inline);
            }
        } else if capturing_treatment {
            treatment_lines.push(line.trim());
        }
    }

    parsed.treatment = treatment_lines.join("\n");
    parsed
}

/// Apply the defaulting rules, in order:
/// 1. undecided status: `diseased` if a real disease name is present, else `unknown`
/// 2. `diseased` without a real disease name: `unidentified disease`
/// 3. `healthy`: disease is always `none`
/// 4. empty treatment: default list for the status
pub fn normalize_reply(parsed: ParsedReply) -> NarratorFindings {
    let raw_status = parsed.health_status.unwrap_or_default();
    let mut disease_name = parsed.disease_name.unwrap_or_default();
    let names_disease = is_real_disease(&disease_name);

    let health_status = match HealthStatus::from_decisive(&raw_status) {
        Some(status) => status,
        None if names_disease => HealthStatus::Diseased,
        None => HealthStatus::Unknown,
    };

    match health_status {
        HealthStatus::Diseased if !names_disease => {
            disease_name = UNIDENTIFIED_DISEASE.to_string();
        }
        HealthStatus::Healthy => {
            disease_name = NO_DISEASE.to_string();
        }
        // "none" is reserved for healthy.
        HealthStatus::Unknown if !names_disease => {
            disease_name = HealthStatus::Unknown.as_str().to_string();
        }
        _ => {}
    }

    let treatment_recommendations = if parsed.treatment.trim().is_empty() {
        match health_status {
            HealthStatus::Healthy => DEFAULT_HEALTHY_CARE.to_string(),
            _ => DEFAULT_REMEDIATION.to_string(),
        }
    } else {
        parsed.treatment
    };

    NarratorFindings {
        health_status,
        disease_name,
        treatment_recommendations,
    }
}

fn value_after_colon(line: &str) -> &str {
    line.split_once(':').map(|(_, v)| v.trim()).unwrap_or("")
}

fn is_real_disease(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case(NO_DISEASE)
}
