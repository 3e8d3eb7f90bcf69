//! Stand-in files handed out when a protected document is saved.
//!
//! None of these payloads is derived from document content. They are cosmetic: a
//! determined user can still capture the screen.

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

const RANDOM_PAYLOAD_LEN: usize = 2048;
const GARBLED_NOISE_LEN: usize = 512;
const NULL_PADDING_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoyKind {
    /// Bogus header, random bytes, a trailing notice
    GarbledPdf,
    /// A header and end marker with nothing between
    EmptyPdf,
    /// Plain-text access notice
    TextNotice,
    /// Plausible objects around a bogus cross-reference table
    BrokenStructure,
    /// Random bytes
    RandomBinary,
}

impl DecoyKind {
    pub const ALL: [DecoyKind; 5] = [
        DecoyKind::GarbledPdf,
        DecoyKind::EmptyPdf,
        DecoyKind::TextNotice,
        DecoyKind::BrokenStructure,
        DecoyKind::RandomBinary,
    ];

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::TextNotice => "text/plain",
            Self::RandomBinary => "application/octet-stream",
            _ => "application/pdf",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DecoyArtifact {
    pub kind: DecoyKind,
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for DecoyArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoyArtifact")
            .field("kind", &self.kind)
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl DecoyArtifact {
    /// Builds a decoy of a randomly chosen kind.
    pub fn random(original_file_name: &str) -> Self {
        let mut rng = rand::thread_rng();
        let kind = *DecoyKind::ALL.choose(&mut rng).unwrap_or(&DecoyKind::TextNotice);
        Self::generate(kind, original_file_name, &mut rng)
    }

    pub fn generate<R: Rng + ?Sized>(kind: DecoyKind, original_file_name: &str, rng: &mut R) -> Self {
        let stamp = Utc::now().to_rfc3339();
        let bytes = match kind {
            DecoyKind::GarbledPdf => {
                let mut bytes = b"%PDF-9.9\n%\xff\xfe\xfd corrupted stream\n".to_vec();
                bytes.extend(random_bytes(rng, GARBLED_NOISE_LEN));
                bytes.extend_from_slice(
                    format!("\n% ACCESS DENIED - this copy is not readable ({stamp})\n%%EOF\n")
                        .as_bytes(),
                );
                bytes
            }
            DecoyKind::EmptyPdf => b"%PDF-1.4\n%%EOF\n".to_vec(),
            DecoyKind::TextNotice => format!(
                "ACCESS DENIED\n\n\
                 This document is protected and cannot be downloaded.\n\
                 Requested file: {original_file_name}\n\
                 Attempted at: {stamp}\n"
            )
            .into_bytes(),
            DecoyKind::BrokenStructure => {
                let mut bytes = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n"
                    .to_vec();
                bytes.extend(std::iter::repeat(0u8).take(NULL_PADDING_LEN));
                bytes.extend_from_slice(
                    b"\nxref\n0 999\nthis-is-not-a-table\ntrailer\n<< /Root 99 0 R /Size 0 >>\nstartxref\n987654321\n%%EOF\n",
                );
                bytes
            }
            DecoyKind::RandomBinary => random_bytes(rng, RANDOM_PAYLOAD_LEN),
        };

        Self {
            kind,
            file_name: decoy_file_name(original_file_name),
            mime_type: kind.mime_type(),
            bytes,
        }
    }
}

pub fn decoy_file_name(original_file_name: &str) -> String {
    let name = original_file_name.trim();
    let name = if name.is_empty() { "document.pdf" } else { name };
    format!("ACCESS_DENIED_{name}")
}

fn random_bytes<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rng.fill_bytes(&mut bytes);
    bytes
}
