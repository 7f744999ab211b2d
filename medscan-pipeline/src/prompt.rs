//! Prompt construction for the generative model.
//!
//! Builders are pure: same OCR text, language, and document type always yield
//! the same instruction string, so they are testable without network access.
//! Each template carries four parts: the output-language directive, the
//! document-type validation instructions (the `wrong_image_type` escape
//! hatch), the output schema, and the OCR text as a lower-priority hint —
//! the attached images are the primary evidence.

use crate::language::Language;
use crate::records::DocumentType;

pub fn build_prompt(doc_type: DocumentType, ocr_text: &str, lang: Language) -> String {
    match doc_type {
        DocumentType::Prescription => prescription_prompt(ocr_text, lang),
        DocumentType::Report => report_prompt(ocr_text, lang),
    }
}

fn prescription_prompt(ocr_text: &str, lang: Language) -> String {
    format!(
        "You are a medical assistant. You will receive prescription image(s) and OCR text.\n\
         \n\
         CRITICAL LANGUAGE REQUIREMENT: {directive}\n\
         Use English field names (\"medicines\", \"indication\", \"generics\", \"stage\") \
         but write every field value in {name}.\n\
         \n\
         IMPORTANT: First, validate that this is actually a prescription image. Look for:\n\
         - Doctor's prescription pad/letterhead\n\
         - Medicine names with dosages and instructions\n\
         - Doctor's signature\n\
         - Patient information\n\
         - Rx symbol or prescription format\n\
         \n\
         If this is NOT a prescription (e.g., lab report, medical certificate, random image), return:\n\
         {{\n\
           \"error\": \"wrong_image_type\",\n\
           \"message\": \"This image does not appear to be a prescription. Please upload a \
         prescription image with medicine names, dosages, and doctor's signature.\"\n\
         }}\n\
         \n\
         If this IS a prescription, respond with STRICT JSON ONLY (no markdown, no code fences) \
         using this schema:\n\
         {{\n\
           \"medicines\": [{{\"brand\": string, \"generic\": string}}],\n\
           \"indication\": string,\n\
           \"generics\": [string],\n\
           \"stage\": string\n\
         }}\n\
         \n\
         Rules:\n\
         - If a medicine has both brand and generic names, include both; otherwise fill the \
         field that is known.\n\
         - For indication, extract the main diagnosis and explain it in simple terms in {name}.\n\
         - {generic_rule}\n\
         - Common medicines like paracetamol, amoxicillin, ibuprofen, omeprazole, and cetirizine \
         always have generic equivalents (Crocin -> Paracetamol, Brufen -> Ibuprofen, \
         Pantop -> Pantoprazole).\n\
         - For stage, choose from [mild, moderate, severe, critical] based on medicines, dosage, \
         and frequency, and express it in {name}.\n\
         - NEVER leave \"generics\" empty or return \"-\". Always provide either generic names \
         or the not-available message.\n\
         - Make all responses user-friendly and easy to understand for patients.\n\
         \n\
         Use the image content as the primary evidence; the OCR text below is a noisy hint.\n\
         OCR_TEXT:\n\
         {ocr_text}",
        directive = lang.directive(),
        name = lang.display_name(),
        generic_rule = generic_rule(lang),
        ocr_text = ocr_text,
    )
}

fn report_prompt(ocr_text: &str, lang: Language) -> String {
    format!(
        "You are a medical assistant. You will receive lab report image(s) and OCR text.\n\
         \n\
         CRITICAL LANGUAGE REQUIREMENT: {directive}\n\
         Use English field names but write every field value in {name}.\n\
         \n\
         IMPORTANT: First, validate that this is actually a lab report image. Look for:\n\
         - Laboratory test results\n\
         - Test parameters with normal ranges\n\
         - Numerical values with units (mg/dL, mmol/L, etc.)\n\
         - Laboratory or hospital name\n\
         - Test date and patient information\n\
         \n\
         If this is NOT a lab report (e.g., prescription, medical certificate, random image), return:\n\
         {{\n\
           \"error\": \"wrong_image_type\",\n\
           \"message\": \"This image does not appear to be a lab report. Please upload a lab \
         report image with test results, values, and normal ranges.\"\n\
         }}\n\
         \n\
         If this IS a lab report, respond with STRICT JSON ONLY (no markdown, no code fences) \
         using this schema:\n\
         {{\n\
           \"diseases\": [string],\n\
           \"stage\": string,\n\
           \"abnormalities\": [{{\"test\": string, \"value\": string, \"range\": string, \
         \"flag\": \"high|low|normal|unknown\"}}],\n\
           \"language\": \"en|hi|mr\"\n\
         }}\n\
         \n\
         Rules:\n\
         - Likely diseases: explain conditions in simple terms in {name}; never return null, \
         and always output at least one disease guess if reasonable.\n\
         - Stage: choose from [mild, moderate, severe, critical] based on the values and explain \
         what it means in {name}.\n\
         - Abnormalities: for each abnormal value, explain what it indicates in {name}.\n\
         - Make all responses user-friendly and easy to understand for patients.\n\
         \n\
         Use the image content as the primary evidence; the OCR text below is a noisy hint.\n\
         OCR_TEXT:\n\
         {ocr_text}",
        directive = lang.directive(),
        name = lang.display_name(),
        ocr_text = ocr_text,
    )
}

fn generic_rule(lang: Language) -> String {
    format!(
        "For generic alternatives, provide the generic names of the medicines in {name}. Only \
         return [\"{sentinel}\"] if the medicine is a very specific brand-name drug with no known \
         generic equivalent (like some biologics, orphan drugs, or very new medications).",
        name = lang.display_name(),
        sentinel = lang.generics_unavailable(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prescription_prompt_is_deterministic() {
        let a = build_prompt(DocumentType::Prescription, "Tab Crocin 500mg", Language::En);
        let b = build_prompt(DocumentType::Prescription, "Tab Crocin 500mg", Language::En);
        assert_eq!(a, b);
    }

    #[test]
    fn prompts_embed_ocr_text_and_schema() {
        let prompt = build_prompt(DocumentType::Prescription, "Tab Crocin 500mg", Language::En);
        assert!(prompt.contains("Tab Crocin 500mg"));
        assert!(prompt.contains("\"medicines\""));
        assert!(prompt.contains("\"generics\""));
        assert!(prompt.contains("wrong_image_type"));

        let prompt = build_prompt(DocumentType::Report, "Hb 9.1 g/dL", Language::En);
        assert!(prompt.contains("Hb 9.1 g/dL"));
        assert!(prompt.contains("\"diseases\""));
        assert!(prompt.contains("\"abnormalities\""));
        assert!(prompt.contains("wrong_image_type"));
    }

    #[test]
    fn prompts_carry_language_directive() {
        for lang in [Language::En, Language::Hi, Language::Mr] {
            let prompt = build_prompt(DocumentType::Report, "", lang);
            assert!(prompt.contains(lang.directive()));
        }
    }

    #[test]
    fn prescription_prompt_names_language_sentinel() {
        let prompt = build_prompt(DocumentType::Prescription, "", Language::Hi);
        assert!(prompt.contains(Language::Hi.generics_unavailable()));
    }
}
