// Legalization request review
// Records, response decoding and the staff-facing API

mod decode;
mod service;
mod types;

pub use decode::{decode_list, decode_record, ActionReply};
pub use service::{PermohonanApi, DEFAULT_PER_PAGE};
pub use types::{
    DocumentKind, PageMeta, Permohonan, PermohonanPage, PermohonanStatus, RequestUser,
    StatusCounts,
};
