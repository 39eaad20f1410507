//! Normalization of the analysis service's loose response shapes.
//!
//! Each of `brand`, `model`, and `colorway` may arrive as a bare string or
//! as `{value, confidence}`. The untagged [`RawField`] union captures both
//! shapes at the serde boundary; [`normalize`] coerces them to the
//! canonical [`AiField`], substituting a documented default confidence
//! when the service omits one. Downstream code never sees the raw shape.

use serde::{Deserialize, Serialize};

/// Default confidence for primary fields (brand, model) when absent.
pub const PRIMARY_DEFAULT_CONFIDENCE: f64 = 0.8;

/// Default confidence for secondary fields (colorway) when absent.
pub const SECONDARY_DEFAULT_CONFIDENCE: f64 = 0.7;

// ---------------------------------------------------------------------------
// Raw wire shapes
// ---------------------------------------------------------------------------

/// One extracted field as the service actually sends it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawField {
    /// `{"value": "Nike", "confidence": 0.93}` (confidence optional).
    Detailed {
        value: String,
        confidence: Option<f64>,
    },
    /// `"Nike"`
    Bare(String),
}

/// The raw `POST /analyze` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAnalysis {
    pub brand: Option<RawField>,
    pub model: Option<RawField>,
    pub colorway: Option<RawField>,
    pub processed_image_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Canonical shapes
// ---------------------------------------------------------------------------

/// One extracted field in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiField {
    pub value: String,
    pub confidence: f64,
}

/// The normalized extraction result persisted onto the asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<AiField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<AiField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colorway: Option<AiField>,
}

/// A complete normalized analysis outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub metadata: AiMetadata,
    pub processed_image_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Coerce one raw field to canonical form.
///
/// A provided confidence is clamped into `0.0..=1.0`; an absent one is
/// replaced by `default_confidence`.
fn normalize_field(raw: RawField, default_confidence: f64) -> AiField {
    match raw {
        RawField::Bare(value) => AiField {
            value,
            confidence: default_confidence,
        },
        RawField::Detailed { value, confidence } => AiField {
            value,
            confidence: confidence
                .map(|c| c.clamp(0.0, 1.0))
                .unwrap_or(default_confidence),
        },
    }
}

/// Normalize a raw response into the canonical [`Analysis`].
pub fn normalize(raw: RawAnalysis) -> Analysis {
    Analysis {
        metadata: AiMetadata {
            brand: raw
                .brand
                .map(|f| normalize_field(f, PRIMARY_DEFAULT_CONFIDENCE)),
            model: raw
                .model
                .map(|f| normalize_field(f, PRIMARY_DEFAULT_CONFIDENCE)),
            colorway: raw
                .colorway
                .map(|f| normalize_field(f, SECONDARY_DEFAULT_CONFIDENCE)),
        },
        processed_image_url: raw.processed_image_url,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> RawAnalysis {
        serde_json::from_str(json).expect("response should deserialize")
    }

    #[test]
    fn bare_strings_get_default_confidence() {
        let analysis = normalize(parse(r#"{"brand": "Nike", "model": "Air Max"}"#));

        assert_eq!(
            analysis.metadata.brand,
            Some(AiField {
                value: "Nike".into(),
                confidence: PRIMARY_DEFAULT_CONFIDENCE,
            })
        );
        assert_eq!(
            analysis.metadata.model,
            Some(AiField {
                value: "Air Max".into(),
                confidence: PRIMARY_DEFAULT_CONFIDENCE,
            })
        );
        assert_eq!(analysis.metadata.colorway, None);
    }

    #[test]
    fn detailed_shape_keeps_reported_confidence() {
        let analysis = normalize(parse(
            r#"{"brand": {"value": "Adidas", "confidence": 0.93}}"#,
        ));
        assert_eq!(
            analysis.metadata.brand,
            Some(AiField {
                value: "Adidas".into(),
                confidence: 0.93,
            })
        );
    }

    #[test]
    fn detailed_shape_without_confidence_falls_back() {
        let analysis = normalize(parse(r#"{"colorway": {"value": "Bred"}}"#));
        assert_eq!(
            analysis.metadata.colorway,
            Some(AiField {
                value: "Bred".into(),
                confidence: SECONDARY_DEFAULT_CONFIDENCE,
            })
        );
    }

    #[test]
    fn mixed_shapes_in_one_response() {
        let analysis = normalize(parse(
            r#"{
                "brand": "New Balance",
                "model": {"value": "990v6", "confidence": 0.71},
                "colorway": "Grey",
                "processed_image_url": "https://cdn.example/990.webp"
            }"#,
        ));
        assert_eq!(analysis.metadata.brand.unwrap().confidence, 0.8);
        assert_eq!(analysis.metadata.model.unwrap().confidence, 0.71);
        assert_eq!(analysis.metadata.colorway.unwrap().confidence, 0.7);
        assert_eq!(
            analysis.processed_image_url.as_deref(),
            Some("https://cdn.example/990.webp")
        );
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let analysis = normalize(parse(r#"{"brand": {"value": "Puma", "confidence": 1.7}}"#));
        assert_eq!(analysis.metadata.brand.unwrap().confidence, 1.0);

        let analysis = normalize(parse(r#"{"brand": {"value": "Puma", "confidence": -0.2}}"#));
        assert_eq!(analysis.metadata.brand.unwrap().confidence, 0.0);
    }

    #[test]
    fn empty_response_normalizes_to_empty_metadata() {
        let analysis = normalize(parse("{}"));
        assert_eq!(analysis.metadata, AiMetadata::default());
        assert_eq!(analysis.processed_image_url, None);
    }
}
