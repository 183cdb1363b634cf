use crate::names::format_file_size;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// One level of the remote store. `address` is the POST target for listings and
/// always ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryHandle {
    pub id: String,
    pub address: String,
    pub referer: String,
}

impl DirectoryHandle {
    pub fn new(id: impl Into<String>, address: impl Into<String>, referer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: ensure_trailing_slash(&address.into()),
            referer: referer.into(),
        }
    }

    /// Root handle where the folder address doubles as its own id and referer.
    pub fn root(address: &str) -> Self {
        let address = ensure_trailing_slash(address);
        Self::new(address.clone(), address.clone(), address)
    }

    pub fn child(&self, entry: &Entry) -> Self {
        let address = ensure_trailing_slash(&join_url(&self.address, &entry.name));
        let id = if entry.id.is_empty() {
            address.clone()
        } else {
            entry.id.clone()
        };
        Self {
            id,
            referer: address.clone(),
            address,
        }
    }

    pub fn file_url(&self, name: &str) -> String {
        join_url(&self.address, name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Folder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub id: String,
    pub name: String,
    pub kind: EntryKind,
    pub media_type: String,
    pub size_bytes: Option<u64>,
    pub modified_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub entries: Vec<Entry>,
    pub next_cursor: Option<String>,
}

/// Decoded listing body: `{nextPageToken?, data: {files: [...]}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingBody {
    #[serde(default)]
    pub next_page_token: Option<String>,
    pub data: ListingData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub files: Vec<ListingFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingFile {
    pub mime_type: String,
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub modified_time: Option<String>,
    // Some indexes send the size as a string, others as a number.
    #[serde(default)]
    pub size: Option<serde_json::Value>,
}

impl From<ListingFile> for Entry {
    fn from(file: ListingFile) -> Self {
        let kind = if file.mime_type.ends_with("folder") {
            EntryKind::Folder
        } else {
            EntryKind::File
        };
        let size_bytes = match file.size {
            Some(serde_json::Value::Number(n)) => n.as_u64(),
            Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        Entry {
            id: file.id,
            name: file.name,
            kind,
            media_type: file.mime_type,
            size_bytes,
            modified_at: file.modified_time,
        }
    }
}

impl From<ListingBody> for Page {
    fn from(body: ListingBody) -> Self {
        Page {
            entries: body.data.files.into_iter().map(Entry::from).collect(),
            next_cursor: body.next_page_token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafResult {
    pub display_name: String,
    pub raw_reference: String,
    pub path: String,
    pub size_bytes: Option<u64>,
    pub ordinal: u32,
    /// Number parsed from the title (`Show - 07`, `Show - S01E07`), else `ordinal`.
    pub episode_number: f32,
}

impl LeafResult {
    /// Secondary line shown next to an episode, e.g. `2.00 GB • /Show/Season 2`.
    pub fn info_label(&self) -> String {
        let size = self.size_bytes.map(format_file_size).unwrap_or_default();
        format!("{size} • /{}", self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVideo {
    pub playback_url: String,
    pub display_label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Single,
    Multi,
}

/// How a stored reference is interpreted before crawling begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkDescriptor {
    Single {
        url: String,
        info: Option<String>,
    },
    Multi {
        url: String,
        info: Option<String>,
        fragment: Option<String>,
    },
    SearchRef {
        id: String,
        parent_url: String,
        referer: String,
        kind: TargetKind,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredLink {
    #[serde(rename = "type")]
    kind: String,
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fragment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSearchRef {
    id: String,
    url: String,
    referer: String,
    #[serde(rename = "type")]
    kind: TargetKind,
}

impl LinkDescriptor {
    pub fn from_json(raw: &str) -> Result<Self> {
        let stored: StoredLink = serde_json::from_str(raw)
            .map_err(|e| EngineError::InvalidDescriptor(format!("{e}: {raw}")))?;
        match stored.kind.as_str() {
            "single" => Ok(Self::Single {
                url: stored.url,
                info: stored.info,
            }),
            "multi" => Ok(Self::Multi {
                url: stored.url,
                info: stored.info,
                fragment: stored.fragment,
            }),
            "search" => {
                let inner: StoredSearchRef = serde_json::from_str(&stored.url)
                    .map_err(|e| EngineError::InvalidDescriptor(format!("search ref: {e}")))?;
                Ok(Self::SearchRef {
                    id: inner.id,
                    parent_url: inner.url,
                    referer: inner.referer,
                    kind: inner.kind,
                })
            }
            other => Err(EngineError::InvalidDescriptor(format!(
                "unknown descriptor type: {other}"
            ))),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let stored = match self {
            Self::Single { url, info } => StoredLink {
                kind: "single".to_string(),
                url: url.clone(),
                info: info.clone(),
                fragment: None,
            },
            Self::Multi {
                url,
                info,
                fragment,
            } => StoredLink {
                kind: "multi".to_string(),
                url: url.clone(),
                info: info.clone(),
                fragment: fragment.clone(),
            },
            Self::SearchRef {
                id,
                parent_url,
                referer,
                kind,
            } => StoredLink {
                kind: "search".to_string(),
                url: serde_json::to_string(&StoredSearchRef {
                    id: id.clone(),
                    url: parent_url.clone(),
                    referer: referer.clone(),
                    kind: *kind,
                })?,
                info: None,
                fragment: None,
            },
        };
        Ok(serde_json::to_string(&stored)?)
    }
}

pub fn join_url(base: &str, name: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        name.trim_start_matches('/')
    )
}

pub fn ensure_trailing_slash(value: &str) -> String {
    if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_handle_joins_name_and_keeps_trailing_slash() {
        let root = DirectoryHandle::root("https://idx.example.workers.dev/0:/Anime");
        assert_eq!(root.address, "https://idx.example.workers.dev/0:/Anime/");
        let entry = Entry {
            id: "abc".to_string(),
            name: "Season 2".to_string(),
            kind: EntryKind::Folder,
            media_type: "application/vnd.google-apps.folder".to_string(),
            size_bytes: None,
            modified_at: None,
        };
        let child = root.child(&entry);
        assert_eq!(child.address, "https://idx.example.workers.dev/0:/Anime/Season 2/");
        assert_eq!(child.referer, child.address);
        assert_eq!(child.id, "abc");
    }

    #[test]
    fn listing_file_size_accepts_strings_and_numbers() {
        let body: ListingBody = serde_json::from_str(
            r#"{"nextPageToken":null,"data":{"files":[
                {"mimeType":"video/x-matroska","id":"1","name":"a.mkv","size":"2000000000"},
                {"mimeType":"video/mp4","id":"2","name":"b.mp4","size":42},
                {"mimeType":"application/vnd.google-apps.folder","id":"3","name":"c"}
            ]}}"#,
        )
        .expect("listing");
        let page = Page::from(body);
        assert_eq!(page.next_cursor, None);
        assert_eq!(page.entries[0].size_bytes, Some(2_000_000_000));
        assert_eq!(page.entries[1].size_bytes, Some(42));
        assert_eq!(page.entries[2].kind, EntryKind::Folder);
    }

    #[test]
    fn search_descriptor_nests_its_reference_as_json() {
        let desc = LinkDescriptor::SearchRef {
            id: "xyz".to_string(),
            parent_url: "https://idx.example.workers.dev/0:".to_string(),
            referer: "https://idx.example.workers.dev/0:search?q=show".to_string(),
            kind: TargetKind::Multi,
        };
        let raw = desc.to_json().expect("json");
        let outer: serde_json::Value = serde_json::from_str(&raw).expect("outer");
        assert_eq!(outer["type"], "search");
        assert!(outer["url"].as_str().unwrap().contains("\"type\":\"multi\""));
        assert_eq!(LinkDescriptor::from_json(&raw).expect("parse"), desc);
    }

    #[test]
    fn info_label_combines_size_and_path() {
        let leaf = LeafResult {
            display_name: "Show - 01".to_string(),
            raw_reference: "https://idx.example.workers.dev/0:/Show/a.mkv".to_string(),
            path: "Show/Season 2".to_string(),
            size_bytes: Some(2_000_000_000),
            ordinal: 1,
            episode_number: 1.0,
        };
        assert_eq!(leaf.info_label(), "2.00 GB • /Show/Season 2");
    }

    #[test]
    fn unknown_descriptor_type_is_rejected() {
        let err = LinkDescriptor::from_json(r#"{"type":"weird","url":"x"}"#).unwrap_err();
        assert!(matches!(err, EngineError::InvalidDescriptor(_)));
    }
}
