use color_eyre::Result;
use tracing::{debug, info};

use super::SyncClient;
use crate::api::requests::CreateEventRequest;
use crate::api::types::Event;
use crate::api::Transport;
use crate::cache::{CacheStore, CalendarMode, QueryKey, Resource};

/// Id of an event that has not been created on the server yet.
pub const PLACEHOLDER_EVENT_ID: &str = "0";

fn placeholder_event(request: &CreateEventRequest) -> Event {
  Event {
    id: PLACEHOLDER_EVENT_ID.to_string(),
    title: request.summary.clone().unwrap_or_default(),
    body: request.description.clone().unwrap_or_default(),
    datetime_start: request.datetime_start.clone(),
    datetime_end: request.datetime_end.clone(),
    ..Default::default()
  }
}

impl<T: Transport, S: CacheStore> SyncClient<T, S> {
  /// Create a calendar event, showing it in the calendar view whose
  /// window starts at `window_start`.
  pub async fn create_event(&self, request: &CreateEventRequest, window_start: &str) -> Result<()> {
    info!(start = %request.datetime_start, "creating event");
    let key = QueryKey::events(CalendarMode::Calendar, window_start);
    let event = placeholder_event(request);
    if self
      .cache
      .mutate(&key, |events: &mut Vec<Event>| events.push(event))
      .is_none()
    {
      debug!(key = %key, "event window not cached");
    }

    let result = self.api.create_event(request).await;
    self.settle(&[QueryKey::from(Resource::Events)]).await;
    result.map(|_| ())
  }

  /// Unlink an account from the backend.
  pub async fn delete_linked_account(&self, account_id: &str) -> Result<()> {
    info!(account_id = %account_id, "deleting linked account");
    let result = self.api.delete_linked_account(account_id).await;
    self.settle(&[QueryKey::linked_accounts()]).await;
    result.map(|_| ())
  }
}
