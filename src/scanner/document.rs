//! Document classification and payload selection.
//!
//! Not every byte of an imaging file defines its clinical content. Two
//! copies of the same CT slice exported on different days differ in their
//! metadata but carry identical pixel data. This module decides, per
//! document type, which element(s) define "the same content".
//!
//! # Rule table
//!
//! Classification is driven by an ordered table of [`ClassificationRule`]s,
//! evaluated first to last against the dataset's SOP Class UID. The first
//! matching rule wins. [`DEFAULT_RULES`] ends with a catch-all image rule, so
//! unknown SOP classes are treated as images.
//!
//! | kind | match | payload |
//! |---|---|---|
//! | EncapsulatedDocument | Encapsulated PDF Storage | (0042,0011) |
//! | StructuredReport | SR prefix | (0040,A730) |
//! | StructuredTherapyPlan | RT Structure Set Storage | (3006,0020) + (3006,0039) + (3006,0080) |
//! | Waveform | waveform prefix | every (5400,1010), in document order |
//! | ImageLike | anything else | (7FE0,0010), top level |
//!
//! A missing or zero-length payload never produces a digest.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dicom::parser::sop_class;
use crate::dicom::tags::{
    CONTENT_SEQUENCE, ENCAPSULATED_DOCUMENT, PIXEL_DATA, ROI_CONTOUR_SEQUENCE,
    RT_ROI_OBSERVATIONS_SEQUENCE, STRUCTURE_SET_ROI_SEQUENCE, WAVEFORM_DATA,
};
use crate::dicom::uids::{
    ENCAPSULATED_PDF_STORAGE, RT_STRUCTURE_SET_STORAGE, STRUCTURED_REPORT_PREFIX, WAVEFORM_PREFIX,
};
use crate::dicom::{Dataset, Tag};

/// Kind of document, derived from its SOP Class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Images, and any SOP class without a more specific rule
    ImageLike,
    /// Encapsulated PDF
    EncapsulatedDocument,
    /// Structured report
    StructuredReport,
    /// RT Structure Set
    StructuredTherapyPlan,
    /// Waveform (ECG, audio, ...)
    Waveform,
    /// No rule matched (only possible with a custom table)
    Unrecognized,
}

impl DocumentKind {
    /// All kinds, in reporting order.
    pub const ALL: [DocumentKind; 6] = [
        Self::ImageLike,
        Self::EncapsulatedDocument,
        Self::StructuredReport,
        Self::StructuredTherapyPlan,
        Self::Waveform,
        Self::Unrecognized,
    ];
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ImageLike => "image",
            Self::EncapsulatedDocument => "encapsulated document",
            Self::StructuredReport => "structured report",
            Self::StructuredTherapyPlan => "RT structure set",
            Self::Waveform => "waveform",
            Self::Unrecognized => "unrecognized",
        };
        f.pad(name)
    }
}

/// How a rule matches a SOP Class UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SopMatch {
    /// Exact UID equality
    Exact(&'static str),
    /// UID starts with the given root (including its trailing dot)
    Prefix(&'static str),
    /// Matches every UID, including the empty one
    Any,
}

impl SopMatch {
    /// Whether `sop_class` satisfies this matcher.
    #[must_use]
    pub fn matches(self, sop_class: &str) -> bool {
        match self {
            Self::Exact(uid) => sop_class == uid,
            Self::Prefix(root) => sop_class.starts_with(root),
            Self::Any => true,
        }
    }
}

/// Which bytes of a dataset are hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSelector {
    /// One top-level element.
    Element(Tag),
    /// Every occurrence of a tag: top level first, then inside sequence items
    /// in document order.
    Nested(Tag),
    /// Several top-level elements in the given order. Absent or empty
    /// elements are skipped.
    Concatenated(&'static [Tag]),
}

impl PayloadSelector {
    /// Select the payload regions, or `None` if nothing non-empty is present.
    #[must_use]
    pub fn select<'d>(&self, dataset: &'d dyn Dataset) -> Option<Vec<&'d [u8]>> {
        let regions: Vec<&[u8]> = match *self {
            Self::Element(tag) => dataset.raw_bytes(tag).into_iter().collect(),
            Self::Nested(tag) => dataset
                .raw_bytes(tag)
                .into_iter()
                .chain(dataset.nested_raw_bytes(tag))
                .collect(),
            Self::Concatenated(tags) => tags
                .iter()
                .filter_map(|&tag| dataset.raw_bytes(tag))
                .collect(),
        };

        let regions: Vec<&[u8]> = regions.into_iter().filter(|r| !r.is_empty()).collect();
        if regions.is_empty() {
            None
        } else {
            Some(regions)
        }
    }
}

/// One row of the classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationRule {
    /// Kind assigned when the rule matches
    pub kind: DocumentKind,
    /// SOP Class matcher
    pub matcher: SopMatch,
    /// Payload hashed for this kind
    pub payload: PayloadSelector,
}

const RT_STRUCTURE_SET_PAYLOAD: &[Tag] = &[
    STRUCTURE_SET_ROI_SEQUENCE,
    ROI_CONTOUR_SEQUENCE,
    RT_ROI_OBSERVATIONS_SEQUENCE,
];

/// Default classification table, highest priority first.
pub static DEFAULT_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        kind: DocumentKind::EncapsulatedDocument,
        matcher: SopMatch::Exact(ENCAPSULATED_PDF_STORAGE),
        payload: PayloadSelector::Element(ENCAPSULATED_DOCUMENT),
    },
    ClassificationRule {
        kind: DocumentKind::StructuredReport,
        matcher: SopMatch::Prefix(STRUCTURED_REPORT_PREFIX),
        payload: PayloadSelector::Element(CONTENT_SEQUENCE),
    },
    ClassificationRule {
        kind: DocumentKind::StructuredTherapyPlan,
        matcher: SopMatch::Exact(RT_STRUCTURE_SET_STORAGE),
        payload: PayloadSelector::Concatenated(RT_STRUCTURE_SET_PAYLOAD),
    },
    ClassificationRule {
        kind: DocumentKind::Waveform,
        matcher: SopMatch::Prefix(WAVEFORM_PREFIX),
        payload: PayloadSelector::Nested(WAVEFORM_DATA),
    },
    ClassificationRule {
        kind: DocumentKind::ImageLike,
        matcher: SopMatch::Any,
        payload: PayloadSelector::Element(PIXEL_DATA),
    },
];

/// Result of classifying one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified<'d> {
    /// Document kind
    pub kind: DocumentKind,
    /// Regions to hash, in order; `None` when the payload is missing or empty
    pub payload: Option<Vec<&'d [u8]>>,
}

/// Table-driven classifier.
#[derive(Debug, Clone)]
pub struct DocumentClassifier {
    rules: Cow<'static, [ClassificationRule]>,
}

impl Default for DocumentClassifier {
    fn default() -> Self {
        Self {
            rules: Cow::Borrowed(DEFAULT_RULES),
        }
    }
}

impl DocumentClassifier {
    /// Classifier using a custom rule table, evaluated in order.
    #[must_use]
    pub fn with_rules(rules: Vec<ClassificationRule>) -> Self {
        Self {
            rules: Cow::Owned(rules),
        }
    }

    /// The active rule table.
    #[must_use]
    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Determine the kind of `dataset` and select its hashable regions.
    #[must_use]
    pub fn classify<'d>(&self, dataset: &'d dyn Dataset) -> Classified<'d> {
        let sop = sop_class(dataset);
        match self.rules.iter().find(|rule| rule.matcher.matches(sop)) {
            Some(rule) => Classified {
                kind: rule.kind,
                payload: rule.payload.select(dataset),
            },
            None => {
                log::trace!("No classification rule for SOP class {sop:?}");
                Classified {
                    kind: DocumentKind::Unrecognized,
                    payload: None,
                }
            }
        }
    }
}
