use serde::{Deserialize, Serialize};

/// Languages the pipeline can analyze in. Anything else collapses to English.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    En,
    Hi,
    Mr,
}

impl Language {
    /// Lenient parse of a request-supplied language code. Missing or
    /// unsupported codes default to English rather than failing the request.
    pub fn parse(code: Option<&str>) -> Self {
        match code.map(|c| c.trim().to_ascii_lowercase()).as_deref() {
            Some("hi") => Language::Hi,
            Some("mr") => Language::Mr,
            _ => Language::En,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
            Language::Mr => "mr",
        }
    }

    /// Tesseract traineddata model for this language.
    pub fn tesseract_model(&self) -> &'static str {
        match self {
            Language::En => "eng",
            Language::Hi => "hin",
            Language::Mr => "mar",
        }
    }

    /// Human-readable name used inside prompt templates.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Hi => "Hindi",
            Language::Mr => "Marathi",
        }
    }

    /// Sentinel substituted when a prescription has no usable generics.
    pub fn generics_unavailable(&self) -> &'static str {
        match self {
            Language::En => "Generic medicine not available",
            Language::Hi => "जेनेरिक दवा उपलब्ध नहीं है",
            Language::Mr => "जेनेरिक औषध उपलब्ध नाही",
        }
    }

    /// Fallback indication when no structured output could be recovered.
    pub fn indication_fallback(&self) -> &'static str {
        match self {
            Language::En => "Unable to determine condition",
            Language::Hi => "रोग निर्धारित नहीं कर सकते",
            Language::Mr => "रोग ठरवू शकत नाही",
        }
    }

    /// Fallback stage when no structured output could be recovered.
    pub fn stage_fallback(&self) -> &'static str {
        match self {
            Language::En => "Unable to determine severity",
            Language::Hi => "गंभीरता निर्धारित नहीं कर सकते",
            Language::Mr => "गंभीरता ठरवू शकत नाही",
        }
    }

    /// Output-language directive embedded in every prompt. Field names stay
    /// English; values must be in the target language.
    pub fn directive(&self) -> &'static str {
        match self {
            Language::En => {
                "You MUST respond in English with clear, user-friendly language. \
                 All text must be in English."
            }
            Language::Hi => {
                "You MUST respond in Hindi with clear, user-friendly language. \
                 All text must be in Hindi. Translate all medical terms to Hindi. \
                 Use Hindi script (देवनागरी) for all responses."
            }
            Language::Mr => {
                "You MUST respond in Marathi with clear, user-friendly language. \
                 All text must be in Marathi. Translate all medical terms to Marathi. \
                 Use Marathi script for all responses."
            }
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::En
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
