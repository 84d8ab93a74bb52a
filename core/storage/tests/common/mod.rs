//! Stateful fake of the Drive folder endpoints for contract tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use accredify_storage::gdrive::{DriveClient, DriveConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeFolder {
    pub id: String,
    pub name: String,
    pub parent: String,
}

#[derive(Default)]
struct State {
    folders: Vec<FakeFolder>,
    next_id: u32,
    lookups: Vec<(String, String)>,
    listings: Vec<String>,
    creates: Vec<(String, String)>,
}

/// In-memory folder tree answering `files.list` and `files.create`.
#[derive(Clone, Default)]
pub struct FakeDrive {
    state: Arc<Mutex<State>>,
    lookup_delay: Duration,
}

impl FakeDrive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every lookup response, widening race windows.
    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = delay;
        self
    }

    pub fn seed_folder(&self, id: &str, name: &str, parent: &str) {
        self.state.lock().unwrap().folders.push(FakeFolder {
            id: id.to_string(),
            name: name.to_string(),
            parent: parent.to_string(),
        });
    }

    pub fn folders(&self) -> Vec<FakeFolder> {
        self.state.lock().unwrap().folders.clone()
    }

    /// `(parent, name)` of every name lookup, in arrival order.
    pub fn lookups(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().lookups.clone()
    }

    /// Parents of every child-folder listing.
    pub fn listings(&self) -> Vec<String> {
        self.state.lock().unwrap().listings.clone()
    }

    /// `(parent, name)` of every create, in arrival order.
    pub fn creates(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().creates.clone()
    }

    pub async fn mount(&self, server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(FakeList(self.clone()))
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/drive/v3/files"))
            .respond_with(FakeCreate(self.clone()))
            .mount(server)
            .await;
    }
}

struct FakeList(FakeDrive);

impl Respond for FakeList {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let q = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "q")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        let lits = literals(&q);

        let mut state = self.0.state.lock().unwrap();
        let (files, delay): (Vec<FakeFolder>, Duration) = if q.starts_with("name = ") {
            let (name, parent) = (lits[0].clone(), lits[1].clone());
            state.lookups.push((parent.clone(), name.clone()));
            let found = state
                .folders
                .iter()
                .filter(|f| f.parent == parent && f.name == name)
                .take(1)
                .cloned()
                .collect();
            (found, self.0.lookup_delay)
        } else {
            let parent = lits[0].clone();
            state.listings.push(parent.clone());
            let mut found: Vec<FakeFolder> = state
                .folders
                .iter()
                .filter(|f| f.parent == parent)
                .cloned()
                .collect();
            found.sort_by(|a, b| a.name.cmp(&b.name));
            (found, Duration::ZERO)
        };

        let files: Vec<serde_json::Value> = files
            .into_iter()
            .map(|f| serde_json::json!({"id": f.id, "name": f.name, "mimeType": FOLDER_MIME}))
            .collect();

        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({ "files": files }))
            .set_delay(delay)
    }
}

struct FakeCreate(FakeDrive);

impl Respond for FakeCreate {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };
        if body["mimeType"] != FOLDER_MIME {
            return ResponseTemplate::new(400).set_body_string("not a folder create");
        }
        let name = body["name"].as_str().unwrap_or_default().to_string();
        let parent = body["parents"][0].as_str().unwrap_or_default().to_string();

        let mut state = self.0.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("folder-{}", state.next_id);
        state.creates.push((parent.clone(), name.clone()));
        state.folders.push(FakeFolder {
            id: id.clone(),
            name: name.clone(),
            parent,
        });

        ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": id, "name": name}))
    }
}

/// Unescape every single-quoted literal in a Drive query.
pub fn literals(q: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = q.chars();
    while let Some(ch) = chars.next() {
        if ch != '\'' {
            continue;
        }
        let mut lit = String::new();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(next) = chars.next() {
                        lit.push(next);
                    }
                }
                '\'' => break,
                _ => lit.push(c),
            }
        }
        out.push(lit);
    }
    out
}

pub fn client_for(server: &MockServer) -> DriveClient {
    DriveClient::new(DriveConfig::with_base_url(&server.uri())).unwrap()
}
