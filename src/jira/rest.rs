//! [`JiraApi`] over the Jira REST API (`/rest/api/2` and `/rest/agile/1.0`).

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};

use super::api::{JiraApi, SearchPage};
use super::api_types::{
  ApiBoardsResponse, ApiCreatedIssue, ApiSearchResponse, ApiSprint, ApiSprintsResponse, ApiUser,
};
use super::payload::{IssuePayload, SprintPayload};
use super::types::{SprintState, User};

const SPRINT_PAGE_SIZE: u64 = 50;

/// Authenticated Jira REST client
#[derive(Clone)]
pub struct RestApi {
  http: Client,
  base: Url,
  username: String,
  password: String,
  /// Requested in searches so sprint membership comes back with each issue
  sprints_field: String,
}

impl RestApi {
  pub fn new(config: &Config) -> Result<Self> {
    let mut base = Url::parse(&config.endpoint)
      .map_err(|e| Error::InvalidConfig(format!("invalid endpoint {}: {}", config.endpoint, e)))?;
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    let http = Client::builder()
      .user_agent(concat!("kong/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self {
      http,
      base,
      username: config.username.clone(),
      password: config.password.clone(),
      sprints_field: config.custom_fields.sprints.clone(),
    })
  }

  fn url(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path)
      .map_err(|e| Error::InvalidConfig(format!("invalid endpoint path {}: {}", path, e)))
  }

  /// Send an authenticated request, turning non-2xx answers into
  /// [`Error::Remote`] with the raw body.
  async fn send(&self, request: RequestBuilder) -> Result<Response> {
    let response = request
      .basic_auth(&self.username, Some(&self.password))
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(Error::remote(status.as_u16(), body));
    }
    Ok(response)
  }
}

#[async_trait]
impl JiraApi for RestApi {
  async fn search(&self, jql: &str, start_at: u64, max_results: u32) -> Result<SearchPage> {
    debug!(jql, start_at, max_results, "search page");
    let fields = format!("summary,status,priority,{}", self.sprints_field);
    let start_at = start_at.to_string();
    let max_results = max_results.to_string();
    let request = self.http.get(self.url("rest/api/2/search")?).query(&[
      ("jql", jql),
      ("startAt", start_at.as_str()),
      ("maxResults", max_results.as_str()),
      ("expand", "transitions"),
      ("fields", fields.as_str()),
    ]);

    let response: ApiSearchResponse = self.send(request).await?.json().await?;
    Ok(SearchPage {
      issues: response.issues,
      total: response.total,
    })
  }

  async fn create_issue(&self, payload: &IssuePayload) -> Result<String> {
    let request = self.http.post(self.url("rest/api/2/issue")?).json(payload);
    let created: ApiCreatedIssue = self.send(request).await?.json().await?;
    Ok(created.key)
  }

  async fn transition_issue(&self, key: &str, transition_id: &str) -> Result<()> {
    let endpoint = format!("rest/api/2/issue/{}/transitions", key);
    let body = json!({
      "transition": {
        "id": transition_id
      }
    });
    self
      .send(self.http.post(self.url(&endpoint)?).json(&body))
      .await?;
    Ok(())
  }

  async fn boards_for_project(&self, project: &str) -> Result<Vec<u64>> {
    let request = self
      .http
      .get(self.url("rest/agile/1.0/board")?)
      .query(&[("projectKeyOrId", project)]);
    let response: ApiBoardsResponse = self.send(request).await?.json().await?;
    Ok(response.values.into_iter().map(|b| b.id).collect())
  }

  async fn sprints_for_board(
    &self,
    board_id: u64,
    states: &[SprintState],
  ) -> Result<Vec<ApiSprint>> {
    let state = states
      .iter()
      .map(|s| match s {
        SprintState::Active => "active",
        SprintState::Future => "future",
        SprintState::Closed => "closed",
      })
      .collect::<Vec<_>>()
      .join(",");
    let endpoint = format!("rest/agile/1.0/board/{}/sprint", board_id);

    let max_results = SPRINT_PAGE_SIZE.to_string();
    let mut all_sprints = Vec::new();
    let mut start_at = 0u64;

    loop {
      let page_start = start_at.to_string();
      let request = self.http.get(self.url(&endpoint)?).query(&[
        ("state", state.as_str()),
        ("startAt", page_start.as_str()),
        ("maxResults", max_results.as_str()),
      ]);
      let response: ApiSprintsResponse = self.send(request).await?.json().await?;

      let count = response.values.len() as u64;
      all_sprints.extend(response.values);

      if response.is_last || count == 0 {
        break;
      }
      start_at += count;
    }

    Ok(all_sprints)
  }

  async fn current_user(&self) -> Result<User> {
    let request = self.http.get(self.url("rest/api/2/myself")?);
    let user: ApiUser = self.send(request).await?.json().await?;
    Ok(user.into())
  }

  async fn move_to_backlog(&self, keys: &[String]) -> Result<()> {
    let body = json!({ "issues": keys });
    self
      .send(
        self
          .http
          .post(self.url("rest/agile/1.0/backlog/issue")?)
          .json(&body),
      )
      .await?;
    Ok(())
  }

  async fn create_sprint(&self, sprint: &SprintPayload) -> Result<()> {
    self
      .send(self.http.post(self.url("rest/agile/1.0/sprint")?).json(sprint))
      .await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::test_config;
  use crate::jira::payload::IssuePayloadBuilder;
  use crate::jira::types::NewIssue;
  use serde_json::json;
  use wiremock::matchers::{basic_auth, body_json, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  async fn api_for(server: &MockServer) -> RestApi {
    let mut config = test_config();
    config.endpoint = server.uri();
    RestApi::new(&config).unwrap()
  }

  #[tokio::test]
  async fn test_search_sends_paging_and_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/rest/api/2/search"))
      .and(basic_auth("king", "banana"))
      .and(query_param("jql", "project = KONG"))
      .and(query_param("startAt", "2"))
      .and(query_param("maxResults", "2"))
      .and(query_param("expand", "transitions"))
      .and(query_param(
        "fields",
        "summary,status,priority,customfield_10020",
      ))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "startAt": 2,
        "maxResults": 2,
        "total": 5,
        "issues": [
          {
            "key": "KONG-3",
            "fields": {
              "summary": "The epic clash between two titans",
              "status": {"name": "Done", "statusCategory": {"key": "done"}},
              "priority": {"name": "Major"},
              "customfield_10020": [{"id": 12, "state": "active"}]
            },
            "transitions": [
              {"id": "1", "to": {"name": "To Do", "description": "Ticket has yet to be started."}}
            ]
          }
        ]
      })))
      .expect(1)
      .mount(&server)
      .await;

    let page = api_for(&server)
      .await
      .search("project = KONG", 2, 2)
      .await
      .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.issues.len(), 1);
    assert_eq!(page.issues[0].key, "KONG-3");
    assert_eq!(page.issues[0].transitions[0].to.name, "To Do");
  }

  #[tokio::test]
  async fn test_error_carries_raw_body() {
    let server = MockServer::start().await;
    let body = r#"{"errorMessages":["The value 'NOPE' does not exist for the field 'project'."],"errors":{}}"#;
    Mock::given(method("GET"))
      .and(path("/rest/api/2/search"))
      .respond_with(ResponseTemplate::new(400).set_body_string(body))
      .mount(&server)
      .await;

    let err = api_for(&server)
      .await
      .search("project = NOPE", 0, 100)
      .await
      .unwrap_err();
    match err {
      Error::Remote { status, body: got } => {
        assert_eq!(status, 400);
        assert_eq!(got, body);
      }
      other => panic!("expected remote error, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_boards_for_project() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/rest/agile/1.0/board"))
      .and(query_param("projectKeyOrId", "KONG"))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(json!({"values": [{"id": 7}, {"id": 9}]})),
      )
      .mount(&server)
      .await;

    let boards = api_for(&server)
      .await
      .boards_for_project("KONG")
      .await
      .unwrap();
    assert_eq!(boards, vec![7, 9]);
  }

  #[tokio::test]
  async fn test_transition_issue_posts_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/rest/api/2/issue/KONG-1/transitions"))
      .and(body_json(json!({"transition": {"id": "2"}})))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;

    api_for(&server)
      .await
      .transition_issue("KONG-1", "2")
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn test_sprints_follow_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/rest/agile/1.0/board/7/sprint"))
      .and(query_param("state", "active,future"))
      .and(query_param("startAt", "0"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "isLast": false,
        "values": [{"id": 1, "name": "Kong 4/1", "state": "active", "endDate": "2024-04-15T00:00:00.000Z"}]
      })))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/rest/agile/1.0/board/7/sprint"))
      .and(query_param("startAt", "1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "isLast": true,
        "values": [{"id": 2, "name": "Kong 4/15", "state": "future"}]
      })))
      .mount(&server)
      .await;

    let sprints = api_for(&server)
      .await
      .sprints_for_board(7, &[SprintState::Active, SprintState::Future])
      .await
      .unwrap();
    let ids: Vec<u64> = sprints.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 2]);
  }

  #[tokio::test]
  async fn test_create_issue_returns_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/rest/api/2/issue"))
      .respond_with(
        ResponseTemplate::new(201).set_body_json(json!({"id": "10001", "key": "KONG-42"})),
      )
      .mount(&server)
      .await;

    let config = test_config();
    let user = User::default();
    let payload = IssuePayloadBuilder::new(&config, &user).build(&NewIssue {
      issue_type: "Story".into(),
      summary: "Add command to list issues".into(),
      ..Default::default()
    });
    let key = api_for(&server)
      .await
      .create_issue(&payload)
      .await
      .unwrap();
    assert_eq!(key, "KONG-42");
  }
}
