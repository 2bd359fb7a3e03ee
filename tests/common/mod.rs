//! Builders for small synthetic Part-10 files.
//!
//! Everything is explicit VR little endian with defined lengths, which is
//! what most archives contain and all the decoder needs to exercise the
//! classification rules.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use dicomdupe::dicom::tags::{
    CONTENT_SEQUENCE, ENCAPSULATED_DOCUMENT, ITEM, PATIENT_ID, PIXEL_DATA,
    ROI_CONTOUR_SEQUENCE, RT_ROI_OBSERVATIONS_SEQUENCE, SOP_CLASS_UID, STRUCTURE_SET_ROI_SEQUENCE,
    TRANSFER_SYNTAX_UID, WAVEFORM_DATA, WAVEFORM_SEQUENCE,
};
use dicomdupe::dicom::uids::{
    BASIC_TEXT_SR_STORAGE, CT_IMAGE_STORAGE, ENCAPSULATED_PDF_STORAGE, EXPLICIT_VR_LITTLE_ENDIAN,
    RT_STRUCTURE_SET_STORAGE, TWELVE_LEAD_ECG_WAVEFORM_STORAGE,
};
use dicomdupe::dicom::{Tag, Vr};

const PREAMBLE_LEN: usize = 128;

fn pad_even(mut value: Vec<u8>, pad: u8) -> Vec<u8> {
    if value.len() % 2 == 1 {
        value.push(pad);
    }
    value
}

/// One explicit VR little endian element.
pub fn element(tag: Tag, vr: &[u8; 2], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&tag.0.to_le_bytes());
    out.extend_from_slice(&tag.1.to_le_bytes());
    out.extend_from_slice(vr);
    if Vr(*vr).has_long_length() {
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    } else {
        out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    }
    out.extend_from_slice(value);
    out
}

/// A UID element, NUL padded.
pub fn uid(tag: Tag, value: &str) -> Vec<u8> {
    element(tag, b"UI", &pad_even(value.as_bytes().to_vec(), 0))
}

/// A short string element, space padded.
pub fn text(tag: Tag, vr: &[u8; 2], value: &str) -> Vec<u8> {
    element(tag, vr, &pad_even(value.as_bytes().to_vec(), b' '))
}

/// A defined-length sequence whose items are the given encoded datasets.
pub fn sequence(tag: Tag, items: &[Vec<u8>]) -> Vec<u8> {
    let mut value = Vec::new();
    for item in items {
        value.extend_from_slice(&ITEM.0.to_le_bytes());
        value.extend_from_slice(&ITEM.1.to_le_bytes());
        value.extend_from_slice(&(item.len() as u32).to_le_bytes());
        value.extend_from_slice(item);
    }
    element(tag, b"SQ", &value)
}

/// Wrap a dataset body in preamble, magic and file meta.
pub fn part10(body: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; PREAMBLE_LEN];
    out.extend_from_slice(b"DICM");
    out.extend(uid(TRANSFER_SYNTAX_UID, EXPLICIT_VR_LITTLE_ENDIAN));
    out.extend_from_slice(body);
    out
}

/// A CT image with the given patient and pixel bytes.
pub fn ct_image(patient_id: &str, pixels: &[u8]) -> Vec<u8> {
    let mut body = uid(SOP_CLASS_UID, CT_IMAGE_STORAGE);
    body.extend(text(PATIENT_ID, b"LO", patient_id));
    body.extend(element(PIXEL_DATA, b"OW", pixels));
    part10(&body)
}

/// An image with an unknown SOP class, which classifies as image-like.
pub fn custom_image(sop_class: &str, pixels: &[u8]) -> Vec<u8> {
    let mut body = uid(SOP_CLASS_UID, sop_class);
    body.extend(element(PIXEL_DATA, b"OB", pixels));
    part10(&body)
}

/// An encapsulated PDF.
pub fn encapsulated_pdf(patient_id: &str, document: &[u8]) -> Vec<u8> {
    let mut body = uid(SOP_CLASS_UID, ENCAPSULATED_PDF_STORAGE);
    body.extend(text(PATIENT_ID, b"LO", patient_id));
    body.extend(element(ENCAPSULATED_DOCUMENT, b"OB", document));
    part10(&body)
}

/// A basic text SR whose content sequence holds one item with `content`.
pub fn structured_report(patient_id: &str, content: &str) -> Vec<u8> {
    let item = text(Tag(0x0040, 0xA160), b"UT", content);
    let mut body = uid(SOP_CLASS_UID, BASIC_TEXT_SR_STORAGE);
    body.extend(text(PATIENT_ID, b"LO", patient_id));
    body.extend(sequence(CONTENT_SEQUENCE, &[item]));
    part10(&body)
}

/// An RT structure set. `None` leaves that sequence out.
pub fn rt_structure_set(
    patient_id: &str,
    rois: Option<&str>,
    contours: Option<&str>,
    observations: Option<&str>,
) -> Vec<u8> {
    let mut body = uid(SOP_CLASS_UID, RT_STRUCTURE_SET_STORAGE);
    body.extend(text(PATIENT_ID, b"LO", patient_id));
    let fields = [
        (STRUCTURE_SET_ROI_SEQUENCE, rois),
        (ROI_CONTOUR_SEQUENCE, contours),
        (RT_ROI_OBSERVATIONS_SEQUENCE, observations),
    ];
    for (tag, content) in fields {
        if let Some(content) = content {
            let item = text(Tag(0x3006, 0x0026), b"LO", content);
            body.extend(sequence(tag, &[item]));
        }
    }
    part10(&body)
}

/// A 12-lead ECG with one waveform item per channel block.
pub fn ecg(patient_id: &str, blocks: &[&[u8]]) -> Vec<u8> {
    let items: Vec<Vec<u8>> = blocks
        .iter()
        .map(|samples| element(WAVEFORM_DATA, b"OW", samples))
        .collect();
    let mut body = uid(SOP_CLASS_UID, TWELVE_LEAD_ECG_WAVEFORM_STORAGE);
    body.extend(text(PATIENT_ID, b"LO", patient_id));
    body.extend(sequence(WAVEFORM_SEQUENCE, &items));
    part10(&body)
}

/// Write `bytes` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, bytes: &[u8]) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, bytes).unwrap();
    path
}
