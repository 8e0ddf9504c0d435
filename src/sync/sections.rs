use color_eyre::Result;
use tracing::{debug, info};

use super::SyncClient;
use crate::api::requests::SectionRequest;
use crate::api::types::{TaskSection, PLACEHOLDER_SECTION_ID};
use crate::api::Transport;
use crate::cache::{CacheStore, QueryKey};

/// Insert an empty placeholder section before the trailing done section.
fn insert_placeholder(sections: &mut Vec<TaskSection>, name: &str) -> bool {
  let section = TaskSection {
    id: PLACEHOLDER_SECTION_ID.to_string(),
    name: name.to_string(),
    is_done: false,
    tasks: Vec::new(),
  };
  let at = sections.len().saturating_sub(1);
  sections.insert(at, section);
  true
}

fn rename(sections: &mut [TaskSection], section_id: &str, name: &str) -> bool {
  match sections.iter_mut().find(|s| s.id == section_id) {
    Some(section) => {
      section.name = name.to_string();
      true
    }
    None => false,
  }
}

fn remove(sections: &mut Vec<TaskSection>, section_id: &str) -> bool {
  match sections.iter().position(|s| s.id == section_id) {
    Some(index) => {
      sections.remove(index);
      true
    }
    None => false,
  }
}

impl<T: Transport, S: CacheStore> SyncClient<T, S> {
  pub async fn create_section(&self, name: &str) -> Result<()> {
    info!(name = %name, "creating section");
    self
      .cache
      .mutate(&QueryKey::tasks(), |sections: &mut Vec<TaskSection>| {
        insert_placeholder(sections, name)
      });

    let request = SectionRequest {
      name: name.to_string(),
    };
    let result = self.api.create_section(&request).await;
    self.settle(&[QueryKey::tasks()]).await;
    result.map(|_| ())
  }

  pub async fn rename_section(&self, section_id: &str, name: &str) -> Result<()> {
    info!(section_id = %section_id, "renaming section");
    let renamed = self
      .cache
      .mutate(&QueryKey::tasks(), |sections: &mut Vec<TaskSection>| {
        rename(sections, section_id, name)
      });
    if renamed != Some(true) {
      debug!(section_id = %section_id, "section not cached");
    }

    let request = SectionRequest {
      name: name.to_string(),
    };
    let result = self.api.modify_section(section_id, &request).await;
    self.settle(&[QueryKey::tasks()]).await;
    result.map(|_| ())
  }

  pub async fn delete_section(&self, section_id: &str) -> Result<()> {
    info!(section_id = %section_id, "deleting section");
    let removed = self
      .cache
      .mutate(&QueryKey::tasks(), |sections: &mut Vec<TaskSection>| {
        remove(sections, section_id)
      });
    if removed != Some(true) {
      debug!(section_id = %section_id, "section not cached");
    }

    let result = self.api.delete_section(section_id).await;
    self.settle(&[QueryKey::tasks()]).await;
    result.map(|_| ())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::testing::FakeTransport;
  use crate::sync::testing::*;
  use serde_json::{json, Value};

  fn sections() -> Vec<TaskSection> {
    vec![
      section("today", "Today", &["t1"]),
      section("done", "Done", &["d1"]),
    ]
  }

  #[test]
  fn test_placeholder_goes_before_done_section() {
    let mut sections = sections();
    insert_placeholder(&mut sections, "Someday");
    let ids: Vec<&str> = sections.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["today", "-1", "done"]);
    assert!(sections[1].tasks.is_empty());
  }

  #[test]
  fn test_placeholder_into_empty_list() {
    let mut sections = Vec::new();
    insert_placeholder(&mut sections, "First");
    assert_eq!(sections[0].id, PLACEHOLDER_SECTION_ID);
  }

  #[test]
  fn test_rename_and_remove_miss_are_noops() {
    let mut sections = sections();
    assert!(!rename(&mut sections, "nope", "x"));
    assert!(!remove(&mut sections, "nope"));
    assert_eq!(sections, self::sections());
  }

  #[tokio::test]
  async fn test_create_section_request_and_patch() {
    let transport = FakeTransport::new();
    let client = client(&transport);
    load_tasks(&transport, &client, &sections()).await;
    transport.respond("/sections/create/", Value::Null);
    transport.fail("/tasks/v3/", "offline");

    client.create_section("Someday").await.unwrap();

    let cached = cached_tasks(&client);
    assert_eq!(cached[1].name, "Someday");
    assert_eq!(cached[1].id, "-1");
    let sent = transport.requests_to("/sections/create/");
    assert_eq!(sent[0].body, Some(json!({"name": "Someday"})));
  }

  #[tokio::test]
  async fn test_delete_section_splices_and_settles() {
    let transport = FakeTransport::new();
    let client = client(&transport);
    load_tasks(&transport, &client, &sections()).await;
    transport.respond("/sections/delete/today/", Value::Null);
    transport.fail("/tasks/v3/", "offline");

    client.delete_section("today").await.unwrap();

    let cached = cached_tasks(&client);
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].id, "done");
    assert_eq!(transport.requests_to("/tasks/v3/").len(), 2);
  }

  #[tokio::test]
  async fn test_rename_section() {
    let transport = FakeTransport::new();
    let client = client(&transport);
    load_tasks(&transport, &client, &sections()).await;
    transport.respond("/sections/modify/today/", Value::Null);
    transport.fail("/tasks/v3/", "offline");

    client.rename_section("today", "Now").await.unwrap();

    assert_eq!(cached_tasks(&client)[0].name, "Now");
    let sent = transport.requests_to("/sections/modify/today/");
    assert_eq!(sent[0].body, Some(json!({"name": "Now"})));
  }
}
