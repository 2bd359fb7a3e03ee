//! Element tags used by the decoder and the classifier.

use super::Tag;

/// (0002,0002) Media Storage SOP Class UID, file meta group.
pub const MEDIA_STORAGE_SOP_CLASS_UID: Tag = Tag(0x0002, 0x0002);
/// (0002,0010) Transfer Syntax UID, file meta group.
pub const TRANSFER_SYNTAX_UID: Tag = Tag(0x0002, 0x0010);
/// (0008,0016) SOP Class UID.
pub const SOP_CLASS_UID: Tag = Tag(0x0008, 0x0016);
/// (0010,0020) Patient ID.
pub const PATIENT_ID: Tag = Tag(0x0010, 0x0020);

/// (0040,A730) Content Sequence of a structured report.
pub const CONTENT_SEQUENCE: Tag = Tag(0x0040, 0xA730);
/// (0042,0011) Encapsulated Document.
pub const ENCAPSULATED_DOCUMENT: Tag = Tag(0x0042, 0x0011);

/// (3006,0020) Structure Set ROI Sequence.
pub const STRUCTURE_SET_ROI_SEQUENCE: Tag = Tag(0x3006, 0x0020);
/// (3006,0039) ROI Contour Sequence.
pub const ROI_CONTOUR_SEQUENCE: Tag = Tag(0x3006, 0x0039);
/// (3006,0080) RT ROI Observations Sequence.
pub const RT_ROI_OBSERVATIONS_SEQUENCE: Tag = Tag(0x3006, 0x0080);

/// (5400,0100) Waveform Sequence.
pub const WAVEFORM_SEQUENCE: Tag = Tag(0x5400, 0x0100);
/// (5400,1010) Waveform Data, found inside Waveform Sequence items.
pub const WAVEFORM_DATA: Tag = Tag(0x5400, 0x1010);

/// (7FE0,0010) Pixel Data.
pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);

/// (FFFE,E000) Item.
pub const ITEM: Tag = Tag(0xFFFE, 0xE000);
/// (FFFE,E00D) Item Delimitation Item.
pub const ITEM_DELIMITATION: Tag = Tag(0xFFFE, 0xE00D);
/// (FFFE,E0DD) Sequence Delimitation Item.
pub const SEQUENCE_DELIMITATION: Tag = Tag(0xFFFE, 0xE0DD);
