//! Typed service wrappers over the batching client.
//!
//! Thin CRUD facades for the dashboard's main resources. Reads go through
//! the coalescer; writes go straight to the client and invalidate the
//! affected cached responses.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::api::{endpoints, ApiClient, Conflict, Paginated, Params, Room, ScheduleSession};
use crate::coalesce::{ListOptions, RequestCoalescer};
use crate::error::ApiError;

fn decode<T: DeserializeOwned>(endpoint: &str, value: Value) -> Result<T, ApiError> {
  serde_json::from_value(value).map_err(|e| ApiError::Decode {
    endpoint: endpoint.to_string(),
    message: e.to_string(),
  })
}

/// Room CRUD and availability search.
pub struct RoomService<C: ApiClient> {
  coalescer: RequestCoalescer<C>,
}

impl<C: ApiClient> RoomService<C> {
  pub fn new(coalescer: RequestCoalescer<C>) -> Self {
    Self { coalescer }
  }

  /// One page of rooms, with the next page prefetched in the background.
  pub async fn list(&self, page: u64, filters: Params) -> Result<Paginated<Room>, ApiError> {
    self
      .coalescer
      .get_optimized_list(
        endpoints::ROOMS,
        ListOptions {
          page,
          filters,
          ..ListOptions::default()
        },
      )
      .await
  }

  /// A single room by id, coalesced with concurrent identical requests.
  pub async fn get(&self, id: u64) -> Result<Room, ApiError> {
    let endpoint = format!("{}{}/", endpoints::ROOMS, id);
    let raw = self.coalescer.batch_get(&endpoint, None).await?;
    decode(&endpoint, (*raw).clone())
  }

  pub async fn create(&self, data: &Value) -> Result<Room, ApiError> {
    let raw = self.coalescer.client().post(endpoints::ROOMS, data).await?;
    self.coalescer.invalidate_queries(&[endpoints::ROOMS]);
    decode(endpoints::ROOMS, raw)
  }

  pub async fn update(&self, id: u64, data: &Value) -> Result<Room, ApiError> {
    let endpoint = format!("{}{}/", endpoints::ROOMS, id);
    let raw = self.coalescer.client().patch(&endpoint, data).await?;
    self.coalescer.invalidate_queries(&[endpoints::ROOMS]);
    decode(&endpoint, raw)
  }

  pub async fn delete(&self, id: u64) -> Result<(), ApiError> {
    let endpoint = format!("{}{}/", endpoints::ROOMS, id);
    self.coalescer.client().delete(&endpoint).await?;
    self.coalescer.invalidate_queries(&[endpoints::ROOMS]);
    Ok(())
  }

  /// Rooms free for a given slot (backend-side search).
  pub async fn search_available(&self, criteria: &Value) -> Result<Vec<Room>, ApiError> {
    let raw = self
      .coalescer
      .client()
      .post(endpoints::ROOM_SEARCH, criteria)
      .await?;
    decode(endpoints::ROOM_SEARCH, raw)
  }
}

/// Schedule sessions and conflicts.
pub struct ScheduleService<C: ApiClient> {
  coalescer: RequestCoalescer<C>,
}

impl<C: ApiClient> ScheduleService<C> {
  pub fn new(coalescer: RequestCoalescer<C>) -> Self {
    Self { coalescer }
  }

  /// One page of sessions for a schedule.
  pub async fn sessions(
    &self,
    schedule_id: u64,
    page: u64,
  ) -> Result<Paginated<ScheduleSession>, ApiError> {
    let filters = Params::from([("schedule".to_string(), schedule_id.into())]);
    self
      .coalescer
      .get_optimized_list(
        endpoints::SCHEDULE_SESSIONS,
        ListOptions {
          page,
          filters,
          ..ListOptions::default()
        },
      )
      .await
  }

  /// Unresolved conflicts, coalesced across dashboard panels.
  pub async fn unresolved_conflicts(&self) -> Result<Paginated<Conflict>, ApiError> {
    let params = Params::from([("is_resolved".to_string(), false.into())]);
    let raw = self
      .coalescer
      .batch_get(endpoints::CONFLICTS, Some(params))
      .await?;
    decode(endpoints::CONFLICTS, (*raw).clone())
  }

  /// Mark a conflict resolved and drop stale conflict responses.
  pub async fn resolve_conflict(&self, id: u64, notes: &str) -> Result<Conflict, ApiError> {
    let endpoint = format!("{}{}/", endpoints::CONFLICTS, id);
    let body = json!({
      "is_resolved": true,
      "resolution_notes": notes,
    });

    let raw = self.coalescer.client().patch(&endpoint, &body).await?;
    self.coalescer.invalidate_queries(&[endpoints::CONFLICTS]);
    decode(&endpoint, raw)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use std::collections::HashMap;
  use std::sync::Mutex;
  use std::time::Duration;

  /// Minimal scripted client for service-level tests.
  #[derive(Default)]
  struct ScriptedClient {
    gets: HashMap<String, Value>,
    patches: HashMap<String, Value>,
    invalidations: Mutex<Vec<String>>,
  }

  #[async_trait]
  impl ApiClient for ScriptedClient {
    async fn get(&self, endpoint: &str, _params: Option<&Params>) -> Result<Value, ApiError> {
      self.gets.get(endpoint).cloned().ok_or(ApiError::Status {
        endpoint: endpoint.to_string(),
        status: 404,
        message: "not scripted".to_string(),
      })
    }

    async fn post(&self, endpoint: &str, _body: &Value) -> Result<Value, ApiError> {
      Err(ApiError::Status {
        endpoint: endpoint.to_string(),
        status: 405,
        message: "not scripted".to_string(),
      })
    }

    async fn patch(&self, endpoint: &str, _body: &Value) -> Result<Value, ApiError> {
      self.patches.get(endpoint).cloned().ok_or(ApiError::Status {
        endpoint: endpoint.to_string(),
        status: 404,
        message: "not scripted".to_string(),
      })
    }

    async fn delete(&self, _endpoint: &str) -> Result<(), ApiError> {
      Ok(())
    }

    fn invalidate_cache(&self, pattern: &str) {
      self.invalidations.lock().unwrap().push(pattern.to_string());
    }
  }

  fn room_json(id: u64) -> Value {
    json!({
      "id": id,
      "code": format!("A-{}", id),
      "name": format!("Salle A{}", id),
      "building": 1,
      "room_type": 1,
      "floor": "1",
      "capacity": 30,
      "has_projector": true,
      "has_computer": false,
      "has_whiteboard": true,
      "is_laboratory": false,
      "is_active": true
    })
  }

  #[tokio::test]
  async fn lists_and_decodes_rooms() {
    let mut client = ScriptedClient::default();
    client.gets.insert(
      endpoints::ROOMS.to_string(),
      json!({"count": 1, "next": null, "previous": null, "results": [room_json(1)]}),
    );

    let service = RoomService::new(RequestCoalescer::new(client));
    let page = service.list(1, Params::new()).await.unwrap();

    assert_eq!(page.count, 1);
    assert_eq!(page.results[0].code, "A-1");
  }

  #[tokio::test]
  async fn gets_a_single_room_through_the_batch_window() {
    let mut client = ScriptedClient::default();
    client
      .gets
      .insert(format!("{}7/", endpoints::ROOMS), room_json(7));

    let service = RoomService::new(
      RequestCoalescer::new(client).with_batch_delay(Duration::from_millis(5)),
    );
    let room = service.get(7).await.unwrap();

    assert_eq!(room.id, 7);
  }

  #[tokio::test]
  async fn resolving_a_conflict_invalidates_cached_conflicts() {
    let mut client = ScriptedClient::default();
    client.patches.insert(
      format!("{}3/", endpoints::CONFLICTS),
      json!({
        "id": 3,
        "schedule_session": 12,
        "conflict_type": "room_overlap",
        "description": "chevauchement",
        "severity": "high",
        "is_resolved": true,
        "resolution_notes": "salle changée",
        "detected_at": "2026-02-10T09:00:00Z"
      }),
    );

    let coalescer = RequestCoalescer::new(client);
    let service = ScheduleService::new(coalescer.clone());

    let conflict = service.resolve_conflict(3, "salle changée").await.unwrap();
    assert!(conflict.is_resolved);

    let invalidations = coalescer.client().invalidations.lock().unwrap();
    assert_eq!(invalidations.as_slice(), [endpoints::CONFLICTS]);
  }
}
