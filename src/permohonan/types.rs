// Legalization request records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing stage of a request, as the API encodes it (1..=7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum PermohonanStatus {
    /// Submitted, waiting for review
    Submitted,
    Verified,
    Signed,
    ReadyForPickup,
    PickedUp,
    Rejected,
    Cancelled,
    Unknown(u8),
}

impl PermohonanStatus {
    pub const ALL: [PermohonanStatus; 7] = [
        PermohonanStatus::Submitted,
        PermohonanStatus::Verified,
        PermohonanStatus::Signed,
        PermohonanStatus::ReadyForPickup,
        PermohonanStatus::PickedUp,
        PermohonanStatus::Rejected,
        PermohonanStatus::Cancelled,
    ];

    pub fn code(self) -> u8 {
        u8::from(self)
    }

    /// Label shown to staff. Unknown codes read as "Menunggu".
    pub fn label(self) -> &'static str {
        match self {
            PermohonanStatus::Submitted | PermohonanStatus::Unknown(_) => "Menunggu",
            PermohonanStatus::Verified => "Diverifikasi",
            PermohonanStatus::Signed => "Ditandatangani",
            PermohonanStatus::ReadyForPickup => "Siap Diambil",
            PermohonanStatus::PickedUp => "Sudah Diambil",
            PermohonanStatus::Rejected => "Ditolak",
            PermohonanStatus::Cancelled => "Dibatalkan",
        }
    }
}

impl From<u8> for PermohonanStatus {
    fn from(code: u8) -> Self {
        match code {
            1 => PermohonanStatus::Submitted,
            2 => PermohonanStatus::Verified,
            3 => PermohonanStatus::Signed,
            4 => PermohonanStatus::ReadyForPickup,
            5 => PermohonanStatus::PickedUp,
            6 => PermohonanStatus::Rejected,
            7 => PermohonanStatus::Cancelled,
            other => PermohonanStatus::Unknown(other),
        }
    }
}

impl From<PermohonanStatus> for u8 {
    fn from(status: PermohonanStatus) -> Self {
        match status {
            PermohonanStatus::Submitted => 1,
            PermohonanStatus::Verified => 2,
            PermohonanStatus::Signed => 3,
            PermohonanStatus::ReadyForPickup => 4,
            PermohonanStatus::PickedUp => 5,
            PermohonanStatus::Rejected => 6,
            PermohonanStatus::Cancelled => 7,
            PermohonanStatus::Unknown(code) => code,
        }
    }
}

impl fmt::Display for PermohonanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Applicant account attached to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestUser {
    pub id: u64,
    pub name: String,
    pub email: String,
}

/// One legalization request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permohonan {
    pub id: u64,
    pub user_id: u64,
    #[serde(default)]
    pub username: String,
    pub nomor_ijazah: String,
    pub jumlah_lembar: u32,
    #[serde(default)]
    pub keperluan: String,
    /// Uploaded scan of the diploma
    #[serde(default)]
    pub file: String,
    /// Verified (stamped) copy, once staff verified the request
    #[serde(default)]
    pub file_ijazah_verified: Option<String>,
    /// Public URL of the upload, when the API resolves one
    #[serde(default)]
    pub file_url: Option<String>,
    pub status: PermohonanStatus,
    /// Server-rendered status label
    #[serde(rename = "statusText", default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(default)]
    pub tanggal_diambil: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub user: Option<RequestUser>,
}

impl Permohonan {
    /// Submission time, if the API sent a parseable timestamp
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }

    /// Applicant display name: the linked account, else the username
    pub fn applicant(&self) -> &str {
        self.user
            .as_ref()
            .map(|u| u.name.as_str())
            .unwrap_or(self.username.as_str())
    }

    /// Status label, preferring the text the server sent
    pub fn status_label(&self) -> &str {
        self.status_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| self.status.label())
    }

    /// Only requests still waiting for review can be verified or rejected
    pub fn can_review(&self) -> bool {
        self.status == PermohonanStatus::Submitted
    }

    /// Location of a stored document, `None` when the request has none
    pub fn document(&self, kind: DocumentKind) -> Option<&str> {
        let upload = non_empty(Some(self.file.as_str()));
        let verified = non_empty(self.file_ijazah_verified.as_deref());
        match kind {
            DocumentKind::Current => verified
                .or_else(|| non_empty(self.file_url.as_deref()))
                .or(upload),
            DocumentKind::Original => upload,
            DocumentKind::Verified => verified,
        }
    }

    /// File name a downloaded document is saved under
    pub fn document_file_name(&self, kind: DocumentKind) -> String {
        let name = format!("ijazah_{}_{}.pdf", self.nomor_ijazah, self.username);
        match kind {
            DocumentKind::Current => name,
            DocumentKind::Original => format!("original_{}", name),
            DocumentKind::Verified => format!("verified_{}", name),
        }
    }
}

/// Which copy of the diploma scan to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentKind {
    /// Verified copy if there is one, else the upload
    #[default]
    Current,
    /// The applicant's upload
    Original,
    /// The stamped copy
    Verified,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// Parse an RFC 3339 timestamp (Z suffix or offset)
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Pagination block of a list response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    pub current_page: u32,
    pub total: u64,
    pub per_page: u32,
    pub last_page: u32,
}

/// Decoded list response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PermohonanPage {
    pub items: Vec<Permohonan>,
    pub meta: Option<PageMeta>,
}

/// Count of requests per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub submitted: usize,
    pub verified: usize,
    pub signed: usize,
    pub ready_for_pickup: usize,
    pub picked_up: usize,
    pub rejected: usize,
    pub cancelled: usize,
    pub unknown: usize,
}

impl StatusCounts {
    pub fn tally(items: &[Permohonan]) -> Self {
        let mut counts = Self {
            total: items.len(),
            ..Self::default()
        };
        for item in items {
            match item.status {
                PermohonanStatus::Submitted => counts.submitted += 1,
                PermohonanStatus::Verified => counts.verified += 1,
                PermohonanStatus::Signed => counts.signed += 1,
                PermohonanStatus::ReadyForPickup => counts.ready_for_pickup += 1,
                PermohonanStatus::PickedUp => counts.picked_up += 1,
                PermohonanStatus::Rejected => counts.rejected += 1,
                PermohonanStatus::Cancelled => counts.cancelled += 1,
                PermohonanStatus::Unknown(_) => counts.unknown += 1,
            }
        }
        counts
    }

    pub fn count(&self, status: PermohonanStatus) -> usize {
        match status {
            PermohonanStatus::Submitted => self.submitted,
            PermohonanStatus::Verified => self.verified,
            PermohonanStatus::Signed => self.signed,
            PermohonanStatus::ReadyForPickup => self.ready_for_pickup,
            PermohonanStatus::PickedUp => self.picked_up,
            PermohonanStatus::Rejected => self.rejected,
            PermohonanStatus::Cancelled => self.cancelled,
            PermohonanStatus::Unknown(_) => self.unknown,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample(id: u64, status: u8) -> Permohonan {
    Permohonan {
        id,
        user_id: 100 + id,
        username: format!("mhs{}", id),
        nomor_ijazah: format!("IJZ-2024-{:04}", id),
        jumlah_lembar: 2,
        keperluan: "Melamar pekerjaan".to_string(),
        file: format!("uploads/ijazah/{}.pdf", id),
        file_ijazah_verified: None,
        file_url: None,
        status: PermohonanStatus::from(status),
        status_text: None,
        tanggal_diambil: None,
        created_at: Some("2025-01-12T10:30:00.000000Z".to_string()),
        updated_at: None,
        user: None,
    }
}
