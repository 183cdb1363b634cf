#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use driveindex_engine::http::{HttpRequest, HttpResponse, Method, Transport};
use driveindex_engine::Result;

pub const ROOT: &str = "https://idx.example.workers.dev/0:/root/";

const HEAD_PAD: &str = "0123456789abcdefghijklmn";
const TAIL_PAD: &str = "opqrstuvwxyz01234567";

/// Apply the index's scrambling to a listing body: pad, then reverse the whole string.
pub fn scramble(json: &str) -> String {
    let framed = format!("{HEAD_PAD}{}{TAIL_PAD}", STANDARD.encode(json.as_bytes()));
    framed.chars().rev().collect()
}

pub fn video(id: &str, name: &str, size: Option<&str>) -> serde_json::Value {
    let mut file = serde_json::json!({
        "mimeType": "video/x-matroska",
        "id": id,
        "name": name,
    });
    if let Some(size) = size {
        file["size"] = serde_json::Value::String(size.to_string());
    }
    file
}

pub fn folder(id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({
        "mimeType": "application/vnd.google-apps.folder",
        "id": id,
        "name": name,
    })
}

pub fn image(id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({ "mimeType": "image/jpeg", "id": id, "name": name })
}

pub fn child(parent: &str, name: &str) -> String {
    format!("{}{name}/", parent)
}

/// In-memory index origin. Listing folders answer form POSTs with scrambled pages;
/// anything unknown is a 404.
#[derive(Default)]
pub struct FakeIndex {
    plain: bool,
    folders: HashMap<String, Vec<Vec<serde_json::Value>>>,
    statuses: HashMap<String, u16>,
    endless: HashSet<String>,
    raw: HashMap<String, (u16, String)>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve listings unscrambled.
    pub fn plain(mut self) -> Self {
        self.plain = true;
        self
    }

    pub fn folder(self, address: &str, files: Vec<serde_json::Value>) -> Self {
        self.paged_folder(address, vec![files])
    }

    pub fn paged_folder(mut self, address: &str, pages: Vec<Vec<serde_json::Value>>) -> Self {
        self.folders.insert(address.to_string(), pages);
        self
    }

    pub fn status(mut self, address: &str, status: u16) -> Self {
        self.statuses.insert(address.to_string(), status);
        self
    }

    /// A folder whose every page points at another page.
    pub fn endless(mut self, address: &str) -> Self {
        self.endless.insert(address.to_string());
        self
    }

    /// Fixed response for an exact url (view pages, `id2path`, `futoken`).
    pub fn raw(mut self, url: &str, status: u16, body: &str) -> Self {
        self.raw.insert(url.to_string(), (status, body.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn posts_to(&self, address: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == Method::Post && r.url == address)
            .count()
    }

    fn encode(&self, json: String) -> Vec<u8> {
        if self.plain {
            json.into_bytes()
        } else {
            scramble(&json).into_bytes()
        }
    }

    fn listing(&self, request: &HttpRequest) -> HttpResponse {
        let form: HashMap<String, String> =
            url::form_urlencoded::parse(request.body.as_deref().unwrap_or("").as_bytes())
                .into_owned()
                .collect();
        let token = form.get("page_token").cloned().unwrap_or_default();
        let index: usize = form
            .get("page_index")
            .and_then(|v| v.parse().ok())
            .unwrap_or(usize::MAX);
        let expected = if token.is_empty() {
            0
        } else {
            token.trim_start_matches("tok").parse().unwrap_or(usize::MAX)
        };
        if form.get("password").map(String::as_str) != Some("") || index != expected {
            return respond(400, b"bad form".to_vec());
        }

        if self.endless.contains(&request.url) {
            let body = serde_json::json!({
                "nextPageToken": format!("tok{}", index + 1),
                "data": { "files": [] },
            });
            return respond(200, self.encode(body.to_string()));
        }

        let Some(pages) = self.folders.get(&request.url) else {
            return respond(404, b"not found".to_vec());
        };
        let Some(files) = pages.get(index) else {
            return respond(400, b"page out of range".to_vec());
        };
        let next = if index + 1 < pages.len() {
            serde_json::Value::String(format!("tok{}", index + 1))
        } else {
            serde_json::Value::Null
        };
        let body = serde_json::json!({
            "nextPageToken": next,
            "data": { "files": files },
        });
        respond(200, self.encode(body.to_string()))
    }
}

fn respond(status: u16, body: Vec<u8>) -> HttpResponse {
    HttpResponse {
        status,
        body,
        set_cookies: Vec::new(),
    }
}

impl Transport for FakeIndex {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(status) = self.statuses.get(&request.url) {
            return Ok(respond(*status, b"status override".to_vec()));
        }
        if let Some((status, body)) = self.raw.get(&request.url) {
            return Ok(respond(*status, body.clone().into_bytes()));
        }
        if request.method == Method::Post
            && (self.folders.contains_key(&request.url) || self.endless.contains(&request.url))
        {
            return Ok(self.listing(request));
        }
        Ok(respond(404, b"not found".to_vec()))
    }
}
