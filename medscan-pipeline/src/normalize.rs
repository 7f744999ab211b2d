//! Normalization of free-form model text into strict analysis records.
//!
//! The model is instructed to answer with strict JSON, but in practice the
//! text arrives wrapped in code fences, prefixed with prose, or using the
//! localized field names older prompts trained it on. Normalization always
//! produces a record: recover a JSON object, honor the `wrong_image_type`
//! marker, canonicalize legacy field names, deserialize strictly, apply
//! document-type defaults, and fall back to a fixed per-language record when
//! nothing can be recovered.

use serde_json::Value;
use tracing::{debug, warn};

use crate::language::Language;
use crate::records::{
    AnalysisRecord, DocumentType, PrescriptionRecord, ReportRecord, WrongImageType,
    fallback_record,
};

/// Legacy localized field names older prompt revisions elicited, mapped to
/// the canonical English identifiers. A bounded compatibility shim: deleting
/// this table must not touch the core normalization logic.
const LEGACY_FIELD_NAMES: &[(&str, &str)] = &[
    // Hindi
    ("दवाइयाँ", "medicines"),
    ("निदान", "indication"),
    ("अवस्था/गंभीरता", "stage"),
    ("जेनेरिक विकल्प", "generics"),
    // Marathi
    ("औषधे", "medicines"),
    ("अंदाजित टप्पा/गंभीरता", "stage"),
    ("जेनेरिक पर्याय", "generics"),
    // English synonyms some model revisions produce
    ("estimated_stage_severity", "stage"),
    ("generic_alternatives", "generics"),
];

/// Values in a generics list that count as "nothing usable".
const PLACEHOLDER_GENERICS: &[&str] = &["-", "unknown", "", "null"];

/// Parse the model's raw text into the strict record shape for `doc_type`.
/// Never fails: unrecoverable input yields the per-language fallback record.
pub fn normalize(raw: &str, doc_type: DocumentType, lang: Language) -> AnalysisRecord {
    let Some(parsed) = recover_json_object(raw) else {
        warn!(doc_type = doc_type.as_str(), "no JSON object in model output, using fallback");
        return fallback_record(doc_type, lang);
    };

    if let Some(marker) = wrong_image_type(&parsed, doc_type) {
        debug!(doc_type = doc_type.as_str(), "model flagged wrong document type");
        return AnalysisRecord::WrongImageType(marker);
    }

    let canonical = canonicalize_field_names(parsed);

    match doc_type {
        DocumentType::Prescription => normalize_prescription(canonical, lang),
        DocumentType::Report => normalize_report(canonical, lang),
    }
}

fn normalize_prescription(value: Value, lang: Language) -> AnalysisRecord {
    let mut record: PrescriptionRecord = match serde_json::from_value(value) {
        Ok(record) => record,
        Err(e) => {
            warn!("prescription output failed schema validation: {}", e);
            return fallback_record(DocumentType::Prescription, lang);
        }
    };

    if record.indication.trim().is_empty() {
        record.indication = "unknown".to_string();
    }
    if record.stage.trim().is_empty() {
        record.stage = "unknown".to_string();
    }
    if generics_unusable(&record.generics) {
        record.generics = vec![lang.generics_unavailable().to_string()];
    }
    record.language = lang.code().to_string();

    AnalysisRecord::Prescription(record)
}

fn normalize_report(value: Value, lang: Language) -> AnalysisRecord {
    let mut record: ReportRecord = match serde_json::from_value(value) {
        Ok(record) => record,
        Err(e) => {
            warn!("report output failed schema validation: {}", e);
            return fallback_record(DocumentType::Report, lang);
        }
    };

    if record.diseases.is_empty() {
        record.diseases = vec!["Unknown".to_string()];
    }
    if record.stage.trim().is_empty() {
        record.stage = "mild".to_string();
    }
    record.language = lang.code().to_string();

    AnalysisRecord::Report(record)
}

/// A generics list is unusable when it is empty or holds a single
/// placeholder token the model emits instead of admitting it found nothing.
fn generics_unusable(generics: &[String]) -> bool {
    match generics {
        [] => true,
        [only] => {
            let trimmed = only.trim();
            PLACEHOLDER_GENERICS
                .iter()
                .any(|p| trimmed.eq_ignore_ascii_case(p))
        }
        _ => false,
    }
}

fn wrong_image_type(parsed: &Value, doc_type: DocumentType) -> Option<WrongImageType> {
    if parsed.get("error").and_then(Value::as_str) != Some(WrongImageType::MARKER) {
        return None;
    }
    let message = parsed
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(default_mismatch_message(doc_type))
        .to_string();
    Some(WrongImageType::new(message))
}

fn default_mismatch_message(doc_type: DocumentType) -> &'static str {
    match doc_type {
        DocumentType::Prescription => {
            "This image does not appear to be a prescription. Please upload a prescription \
             image with medicine names, dosages, and doctor's signature."
        }
        DocumentType::Report => {
            "This image does not appear to be a lab report. Please upload a lab report image \
             with test results, values, and normal ranges."
        }
    }
}

/// Move known legacy keys onto their canonical names. A canonical key already
/// present always wins.
fn canonicalize_field_names(parsed: Value) -> Value {
    match parsed {
        Value::Object(mut map) => {
            for (legacy, canonical) in LEGACY_FIELD_NAMES {
                if map.contains_key(*canonical) {
                    continue;
                }
                if let Some(value) = map.remove(*legacy) {
                    map.insert((*canonical).to_string(), value);
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}

/// Recover a JSON object from free-form model text: strip code fences, try a
/// direct parse, then fall back to the first balanced `{...}` span.
fn recover_json_object(raw: &str) -> Option<Value> {
    let candidate = strip_code_fences(raw).trim();

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
        return Some(value);
    }

    let span = first_balanced_object(candidate)?;
    match serde_json::from_str::<Value>(span) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Return the content inside the first ```...``` fence, tolerating a `json`
/// language tag; text without fences comes back untouched.
fn strip_code_fences(raw: &str) -> &str {
    let Some(open) = raw.find("```") else {
        return raw;
    };
    let after_open = &raw[open + 3..];
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    }
}

/// Locate the first balanced `{...}` span, ignoring braces inside JSON
/// strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Flag;

    fn prescription(raw: &str, lang: Language) -> AnalysisRecord {
        normalize(raw, DocumentType::Prescription, lang)
    }

    fn report(raw: &str, lang: Language) -> AnalysisRecord {
        normalize(raw, DocumentType::Report, lang)
    }

    #[test]
    fn well_formed_prescription_passes_through() {
        let raw = r#"{"medicines":[{"brand":"Crocin","generic":"Paracetamol"}],
                      "indication":"fever","generics":["Paracetamol"],"stage":"mild"}"#;
        let AnalysisRecord::Prescription(record) = prescription(raw, Language::En) else {
            panic!("expected prescription record");
        };
        assert_eq!(record.medicines.len(), 1);
        assert_eq!(record.medicines[0].brand.as_deref(), Some("Crocin"));
        assert_eq!(record.indication, "fever");
        assert_eq!(record.generics, vec!["Paracetamol"]);
        assert_eq!(record.stage, "mild");
        assert_eq!(record.language, "en");
    }

    #[test]
    fn empty_generics_gets_language_sentinel() {
        for lang in [Language::En, Language::Hi, Language::Mr] {
            let raw = r#"{"medicines":[],"indication":"fever","generics":[],"stage":"mild"}"#;
            let AnalysisRecord::Prescription(record) = prescription(raw, lang) else {
                panic!("expected prescription record");
            };
            assert_eq!(record.generics, vec![lang.generics_unavailable().to_string()]);
        }
    }

    #[test]
    fn placeholder_generics_token_gets_sentinel() {
        for token in ["-", "unknown", "", "null"] {
            let raw = format!(
                r#"{{"medicines":[],"indication":"x","generics":["{token}"],"stage":"mild"}}"#
            );
            let AnalysisRecord::Prescription(record) = prescription(&raw, Language::En) else {
                panic!("expected prescription record");
            };
            assert_eq!(record.generics, vec![Language::En.generics_unavailable()]);
        }
    }

    #[test]
    fn empty_diseases_defaults_to_unknown() {
        let raw = r#"{"diseases":[],"stage":"moderate","abnormalities":[]}"#;
        let AnalysisRecord::Report(record) = report(raw, Language::En) else {
            panic!("expected report record");
        };
        assert_eq!(record.diseases, vec!["Unknown"]);
        assert_eq!(record.stage, "moderate");
    }

    #[test]
    fn missing_report_stage_defaults_to_mild() {
        let raw = r#"{"diseases":["anemia"],"abnormalities":[]}"#;
        let AnalysisRecord::Report(record) = report(raw, Language::En) else {
            panic!("expected report record");
        };
        assert_eq!(record.stage, "mild");
    }

    #[test]
    fn code_fences_are_stripped() {
        let inner = r#"{"diseases":["anemia"],"stage":"mild","abnormalities":[]}"#;
        let fenced = format!("```json\n{inner}\n```");
        assert_eq!(report(&fenced, Language::En), report(inner, Language::En));
    }

    #[test]
    fn balanced_object_extracted_from_surrounding_prose() {
        let raw = r#"Here is the result:
            {"medicines":[],"indication":"fever","generics":["Paracetamol"],"stage":"mild"}
            Let me know if you need anything else."#;
        let AnalysisRecord::Prescription(record) = prescription(raw, Language::En) else {
            panic!("expected prescription record");
        };
        assert_eq!(record.indication, "fever");
    }

    #[test]
    fn braces_inside_strings_do_not_break_extraction() {
        let raw = r#"note {"diseases":["high {sugar}"],"stage":"mild","abnormalities":[]} end"#;
        let AnalysisRecord::Report(record) = report(raw, Language::En) else {
            panic!("expected report record");
        };
        assert_eq!(record.diseases, vec!["high {sugar}"]);
    }

    #[test]
    fn unparsable_text_yields_language_fallback_not_error() {
        for lang in [Language::En, Language::Hi, Language::Mr] {
            let record = prescription("I could not read this image at all.", lang);
            assert_eq!(record, fallback_record(DocumentType::Prescription, lang));
        }
        let record = report("total nonsense", Language::En);
        assert_eq!(record, fallback_record(DocumentType::Report, Language::En));
    }

    #[test]
    fn wrong_image_type_short_circuits() {
        let raw = r#"{"error":"wrong_image_type","message":"That is a lab report."}"#;
        let record = prescription(raw, Language::En);
        let AnalysisRecord::WrongImageType(marker) = record else {
            panic!("expected error variant");
        };
        assert_eq!(marker.error, "wrong_image_type");
        assert_eq!(marker.message, "That is a lab report.");
    }

    #[test]
    fn wrong_image_type_without_message_uses_default() {
        let raw = r#"{"error":"wrong_image_type"}"#;
        let AnalysisRecord::WrongImageType(marker) = report(raw, Language::En) else {
            panic!("expected error variant");
        };
        assert!(marker.message.contains("lab report"));
    }

    #[test]
    fn legacy_hindi_field_names_are_recognized() {
        let raw = r#"{"दवाइयाँ":[{"brand":"Crocin"}],"निदान":"बुखार",
                      "जेनेरिक विकल्प":["पैरासिटामोल"],"अवस्था/गंभीरता":"हल्का"}"#;
        let AnalysisRecord::Prescription(record) = prescription(raw, Language::Hi) else {
            panic!("expected prescription record");
        };
        assert_eq!(record.indication, "बुखार");
        assert_eq!(record.generics, vec!["पैरासिटामोल"]);
        assert_eq!(record.stage, "हल्का");
        assert_eq!(record.language, "hi");
    }

    #[test]
    fn legacy_marathi_field_names_are_recognized() {
        let raw = r#"{"औषधे":[],"निदान":"ताप","जेनेरिक पर्याय":["पॅरासिटामॉल"],
                      "अंदाजित टप्पा/गंभीरता":"सौम्य"}"#;
        let AnalysisRecord::Prescription(record) = prescription(raw, Language::Mr) else {
            panic!("expected prescription record");
        };
        assert_eq!(record.stage, "सौम्य");
        assert_eq!(record.generics, vec!["पॅरासिटामॉल"]);
    }

    #[test]
    fn canonical_names_win_over_legacy_duplicates() {
        let raw = r#"{"generics":["Paracetamol"],"generic_alternatives":["Ibuprofen"],
                      "indication":"fever","stage":"mild"}"#;
        let AnalysisRecord::Prescription(record) = prescription(raw, Language::En) else {
            panic!("expected prescription record");
        };
        assert_eq!(record.generics, vec!["Paracetamol"]);
    }

    #[test]
    fn structural_mismatch_rejects_to_fallback() {
        // medicines as a string violates the schema outright.
        let raw = r#"{"medicines":"Crocin","indication":"fever","generics":[],"stage":"mild"}"#;
        let record = prescription(raw, Language::En);
        assert_eq!(record, fallback_record(DocumentType::Prescription, Language::En));
    }

    #[test]
    fn abnormality_flags_parse_leniently() {
        let raw = r#"{"diseases":["anemia"],"stage":"mild","abnormalities":[
            {"test":"Hb","value":"9.1","range":"12-15","flag":"low"},
            {"test":"WBC","value":"high-ish","range":"", "flag":"elevated"}]}"#;
        let AnalysisRecord::Report(record) = report(raw, Language::En) else {
            panic!("expected report record");
        };
        assert_eq!(record.abnormalities[0].flag, Flag::Low);
        assert_eq!(record.abnormalities[1].flag, Flag::Unknown);
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = r#"{"medicines":[{"brand":"Crocin","generic":"Paracetamol"}],
                      "indication":"fever","generics":[],"stage":"mild"}"#;
        let first = prescription(raw, Language::Hi);
        let reserialized = serde_json::to_string(&first).unwrap();
        let second = prescription(&reserialized, Language::Hi);
        assert_eq!(first, second);

        let raw = r#"{"diseases":[],"abnormalities":[]}"#;
        let first = report(raw, Language::En);
        let reserialized = serde_json::to_string(&first).unwrap();
        let second = report(&reserialized, Language::En);
        assert_eq!(first, second);
    }

    #[test]
    fn requested_language_always_tags_the_record() {
        let raw = r#"{"diseases":["anemia"],"stage":"mild","abnormalities":[],"language":"de"}"#;
        let AnalysisRecord::Report(record) = report(raw, Language::Mr) else {
            panic!("expected report record");
        };
        assert_eq!(record.language, "mr");
    }
}
