use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{OcradError, Result};

/// Caller-facing recognition options.
///
/// Names are kept as plain strings here and checked by [`validate`], which is
/// the single place unknown filter or transform names are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionOptions {
    pub invert: bool,
    pub raw: bool,
    pub verbose: bool,
    pub numeric: bool,
    #[serde(deserialize_with = "one_or_many")]
    pub filters: Vec<String>,
    pub transform: Option<String>,
    pub scale: Option<f64>,
}

impl RecognitionOptions {
    /// Apply the implied settings: verbose output or a line callback needs the
    /// raw report, and numeric mode replaces any filter list.
    pub fn normalized(mut self, has_line_callback: bool) -> Self {
        if self.verbose || has_line_callback {
            self.raw = true;
        }
        if self.numeric {
            self.filters = vec![FilterName::NumbersOnly.as_str().to_string()];
        }
        self
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(name)) => vec![name],
        Some(OneOrMany::Many(names)) => names,
        None => Vec::new(),
    })
}

/// Character-set filters understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterName {
    Letters,
    LettersOnly,
    Numbers,
    NumbersOnly,
    SameHeight,
    UpperNum,
    UpperNumOnly,
}

impl FilterName {
    pub const ALL: [FilterName; 7] = [
        FilterName::Letters,
        FilterName::LettersOnly,
        FilterName::Numbers,
        FilterName::NumbersOnly,
        FilterName::SameHeight,
        FilterName::UpperNum,
        FilterName::UpperNumOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterName::Letters => "letters",
            FilterName::LettersOnly => "letters_only",
            FilterName::Numbers => "numbers",
            FilterName::NumbersOnly => "numbers_only",
            FilterName::SameHeight => "same_height",
            FilterName::UpperNum => "upper_num",
            FilterName::UpperNumOnly => "upper_num_only",
        }
    }
}

impl FromStr for FilterName {
    type Err = OcradError;

    fn from_str(s: &str) -> Result<Self> {
        FilterName::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| OcradError::Validation(format!("Invalid filter: {s:?}")))
    }
}

impl fmt::Display for FilterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page transformations applied before recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformName {
    None,
    Rotate90,
    Rotate180,
    Rotate270,
    MirrorLr,
    MirrorTb,
    MirrorD1,
    MirrorD2,
}

impl TransformName {
    pub const ALL: [TransformName; 8] = [
        TransformName::None,
        TransformName::Rotate90,
        TransformName::Rotate180,
        TransformName::Rotate270,
        TransformName::MirrorLr,
        TransformName::MirrorTb,
        TransformName::MirrorD1,
        TransformName::MirrorD2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransformName::None => "none",
            TransformName::Rotate90 => "rotate90",
            TransformName::Rotate180 => "rotate180",
            TransformName::Rotate270 => "rotate270",
            TransformName::MirrorLr => "mirror_lr",
            TransformName::MirrorTb => "mirror_tb",
            TransformName::MirrorD1 => "mirror_d1",
            TransformName::MirrorD2 => "mirror_d2",
        }
    }
}

impl FromStr for TransformName {
    type Err = OcradError;

    fn from_str(s: &str) -> Result<Self> {
        TransformName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| OcradError::Validation(format!("Invalid transformation: {s:?}")))
    }
}

impl fmt::Display for TransformName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated engine configuration instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Load the staged raster, optionally inverting it.
    LoadImage { invert: bool },
    /// Have the engine write its full report to the staged export target.
    ExportRaw,
    AddFilter(FilterName),
    SetTransform(TransformName),
    Scale(i32),
    Utf8Output,
    Recognize,
}

/// Ordered directives for one session. Only [`validate`] builds one, so the
/// sequence always loads the image first and ends with `Utf8Output, Recognize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePlan {
    directives: Vec<Directive>,
}

impl EnginePlan {
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    pub fn exports_raw(&self) -> bool {
        self.directives.contains(&Directive::ExportRaw)
    }
}

/// Round half up, the way the engine bindings have always rounded scale.
fn round_scale(scale: f64) -> Result<i32> {
    if !scale.is_finite() {
        return Err(OcradError::Validation(format!("Invalid scale: {scale}")));
    }
    let rounded = (scale + 0.5).floor();
    if rounded < i32::MIN as f64 || rounded > i32::MAX as f64 {
        return Err(OcradError::Validation(format!("Invalid scale: {scale}")));
    }
    Ok(rounded as i32)
}

/// Check every name and produce the directive sequence. Nothing reaches the
/// engine unless the whole option set is valid.
pub fn validate(options: &RecognitionOptions) -> Result<EnginePlan> {
    let mut directives = vec![Directive::LoadImage {
        invert: options.invert,
    }];

    if options.raw {
        directives.push(Directive::ExportRaw);
    }

    for name in &options.filters {
        directives.push(Directive::AddFilter(name.parse()?));
    }

    if let Some(transform) = options.transform.as_deref() {
        directives.push(Directive::SetTransform(transform.parse()?));
    }

    if let Some(scale) = options.scale {
        let factor = round_scale(scale)?;
        if factor != 0 {
            directives.push(Directive::Scale(factor));
        }
    }

    directives.push(Directive::Utf8Output);
    directives.push(Directive::Recognize);

    Ok(EnginePlan { directives })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_filter_name_round_trips() {
        for filter in FilterName::ALL {
            assert_eq!(filter.as_str().parse::<FilterName>().unwrap(), filter);
        }
    }

    #[test]
    fn test_every_transform_name_round_trips() {
        for transform in TransformName::ALL {
            assert_eq!(transform.as_str().parse::<TransformName>().unwrap(), transform);
        }
    }

    #[test]
    fn test_filter_rejects_variants_and_empty() {
        for bad in ["", "Letters", "LETTERS_ONLY", "numbers-only", " numbers", "digits"] {
            let err = bad.parse::<FilterName>().unwrap_err();
            assert!(matches!(err, OcradError::Validation(_)), "{bad:?}");
        }
    }

    #[test]
    fn test_transform_rejects_variants_and_empty() {
        for bad in ["", "None", "rotate45", "ROTATE90", "mirror-lr"] {
            let err = bad.parse::<TransformName>().unwrap_err();
            assert!(matches!(err, OcradError::Validation(_)), "{bad:?}");
        }
    }

    #[test]
    fn test_validation_error_names_offender() {
        let options = RecognitionOptions {
            filters: vec!["letters".into(), "emoji".into()],
            ..Default::default()
        };
        let err = validate(&options).unwrap_err();
        assert!(err.to_string().contains("emoji"));
    }

    #[test]
    fn test_plain_plan() {
        let plan = validate(&RecognitionOptions::default()).unwrap();
        assert_eq!(
            plan.directives(),
            &[
                Directive::LoadImage { invert: false },
                Directive::Utf8Output,
                Directive::Recognize
            ]
        );
        assert!(!plan.exports_raw());
    }

    #[test]
    fn test_full_plan_order() {
        let options = RecognitionOptions {
            invert: true,
            raw: true,
            filters: vec!["letters".into(), "same_height".into()],
            transform: Some("rotate90".into()),
            scale: Some(2.4),
            ..Default::default()
        };
        let plan = validate(&options).unwrap();
        assert_eq!(
            plan.directives(),
            &[
                Directive::LoadImage { invert: true },
                Directive::ExportRaw,
                Directive::AddFilter(FilterName::Letters),
                Directive::AddFilter(FilterName::SameHeight),
                Directive::SetTransform(TransformName::Rotate90),
                Directive::Scale(2),
                Directive::Utf8Output,
                Directive::Recognize,
            ]
        );
        assert!(plan.exports_raw());
    }

    #[test]
    fn test_scale_rounds_half_up() {
        assert_eq!(round_scale(2.5).unwrap(), 3);
        assert_eq!(round_scale(2.49).unwrap(), 2);
        assert_eq!(round_scale(-2.5).unwrap(), -2);
        assert!(round_scale(f64::NAN).is_err());
        assert!(round_scale(f64::INFINITY).is_err());
    }

    fn scale_directive(scale: f64) -> Option<i32> {
        let options = RecognitionOptions {
            scale: Some(scale),
            ..Default::default()
        };
        validate(&options)
            .unwrap()
            .directives()
            .iter()
            .find_map(|d| match d {
                Directive::Scale(factor) => Some(*factor),
                _ => None,
            })
    }

    #[test]
    fn test_zero_scale_is_omitted() {
        assert_eq!(scale_directive(0.0), None);
    }

    #[test]
    fn test_scale_rounding_to_zero_is_omitted() {
        assert_eq!(scale_directive(0.3), None);
        assert_eq!(scale_directive(-0.4), None);
        assert_eq!(scale_directive(0.5), Some(1));
        assert_eq!(scale_directive(-1.2), Some(-1));
    }

    #[test]
    fn test_numeric_overrides_filters() {
        let options = RecognitionOptions {
            numeric: true,
            filters: vec!["letters".into()],
            ..Default::default()
        }
        .normalized(false);
        assert_eq!(options.filters, vec!["numbers_only".to_string()]);
    }

    #[test]
    fn test_verbose_or_line_callback_implies_raw() {
        let verbose = RecognitionOptions {
            verbose: true,
            ..Default::default()
        }
        .normalized(false);
        assert!(verbose.raw);

        let with_callback = RecognitionOptions::default().normalized(true);
        assert!(with_callback.raw);

        let plain = RecognitionOptions::default().normalized(false);
        assert!(!plain.raw);
    }

    #[test]
    fn test_deserialize_single_filter() {
        let options: RecognitionOptions =
            serde_json::from_str(r#"{"filters": "numbers", "scale": 3}"#).unwrap();
        assert_eq!(options.filters, vec!["numbers".to_string()]);
        assert_eq!(options.scale, Some(3.0));
        assert!(!options.invert);
    }

    #[test]
    fn test_deserialize_filter_list() {
        let options: RecognitionOptions =
            serde_json::from_str(r#"{"invert": true, "filters": ["letters", "upper_num"]}"#)
                .unwrap();
        assert!(options.invert);
        assert_eq!(options.filters, vec!["letters", "upper_num"]);
    }

    #[test]
    fn test_empty_names_fail_validation() {
        let transform = RecognitionOptions {
            transform: Some(String::new()),
            ..Default::default()
        };
        assert!(matches!(
            validate(&transform),
            Err(OcradError::Validation(_))
        ));

        let filter = RecognitionOptions {
            filters: vec![String::new()],
            ..Default::default()
        };
        assert!(matches!(validate(&filter), Err(OcradError::Validation(_))));
    }
}
