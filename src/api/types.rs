//! Response shapes owned by the backend.
//!
//! Field names follow the backend's JSON; optional annotation fields
//! (`*_name`, `*_details`) are only present on expanded responses.

use serde::{Deserialize, Serialize};

/// Standard page envelope for list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
  pub count: u64,
  #[serde(default)]
  pub next: Option<String>,
  #[serde(default)]
  pub previous: Option<String>,
  pub results: Vec<T>,
}

impl<T> Paginated<T> {
  /// Number of pages implied by `count` at the given page size.
  pub fn total_pages(&self, page_size: u64) -> u64 {
    self.count.div_ceil(page_size.max(1))
  }

  /// Whether a page exists after `page` (1-based).
  pub fn has_page_after(&self, page: u64, page_size: u64) -> bool {
    page < self.total_pages(page_size)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
  pub id: u64,
  pub name: String,
  pub code: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub head_of_department: Option<u64>,
  #[serde(default)]
  pub head_of_department_name: Option<String>,
  pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
  pub id: u64,
  pub code: String,
  pub name: String,
  pub building: u64,
  #[serde(default)]
  pub building_name: Option<String>,
  pub room_type: u64,
  #[serde(default)]
  pub room_type_name: Option<String>,
  pub floor: String,
  pub capacity: u32,
  pub has_projector: bool,
  pub has_computer: bool,
  pub has_whiteboard: bool,
  pub is_laboratory: bool,
  pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSession {
  pub id: u64,
  pub schedule: u64,
  pub course: u64,
  pub room: u64,
  pub teacher: u64,
  pub time_slot: u64,
  #[serde(default)]
  pub specific_date: Option<String>,
  pub session_type: String,
  pub expected_students: u32,
  #[serde(default)]
  pub notes: Option<String>,
  pub is_cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
  pub id: u64,
  pub schedule_session: u64,
  pub conflict_type: String,
  #[serde(default)]
  pub conflicting_session: Option<u64>,
  pub description: String,
  pub severity: Severity,
  pub is_resolved: bool,
  #[serde(default)]
  pub resolution_notes: Option<String>,
  pub detected_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}
