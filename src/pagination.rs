use crate::auth::{check_auth_status, AuthContext};
use crate::codec::PayloadScheme;
use crate::http::{form_encode, HttpRequest, Transport, FORM_CONTENT_TYPE};
use crate::models::{ensure_trailing_slash, DirectoryHandle, Page};
use crate::{EngineError, Result};
use url::Url;

pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// Everything needed to talk to one index origin: transport, credentials, payload
/// scheme and the per-directory page bound.
pub struct ListingClient<'a> {
    pub transport: &'a dyn Transport,
    pub auth: &'a AuthContext,
    pub scheme: &'a PayloadScheme,
    pub max_pages: usize,
}

impl<'a> ListingClient<'a> {
    pub fn new(transport: &'a dyn Transport, auth: &'a AuthContext, scheme: &'a PayloadScheme) -> Self {
        Self {
            transport,
            auth,
            scheme,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Lazily page through a folder. `None` and `Some("")` both start at the first page.
    pub fn walk(&self, handle: &DirectoryHandle, start_cursor: Option<&str>) -> PageWalker<'_, 'a> {
        PageWalker::new(
            self,
            ListingTarget {
                address: handle.address.clone(),
                referer: handle.referer.clone(),
                lead: "password=".to_string(),
            },
            start_cursor,
        )
    }

    /// Page through search hits under `drive_root` (e.g. `https://host/0:`).
    pub fn search(&self, drive_root: &str, query: &str, start_cursor: Option<&str>) -> PageWalker<'_, 'a> {
        let address = search_address(drive_root);
        PageWalker::new(
            self,
            ListingTarget {
                referer: format!("{address}?q={}", form_encode(query)),
                address,
                lead: format!("q={}", form_encode(query)),
            },
            start_cursor,
        )
    }

    /// POST a form body to an index endpoint with the XHR header set the origin expects.
    pub fn post_form(&self, address: &str, referer: &str, body: String) -> Result<Vec<u8>> {
        let request = self
            .auth
            .apply(xhr_request(address, referer, body)?);
        let response = self.transport.execute(&request)?;
        for header in &response.set_cookies {
            self.auth.cookies.absorb_set_cookie(header);
        }
        check_auth_status(address, response.status)?;
        if response.status == 404 {
            return Err(EngineError::Traversal {
                address: address.to_string(),
                reason: "folder not found".to_string(),
            });
        }
        if !response.is_success() {
            return Err(EngineError::Status {
                url: address.to_string(),
                status: response.status,
            });
        }
        Ok(response.body)
    }
}

/// `<drive root>search`, where the drive root is the part before the first path
/// segment ending in `:`.
pub fn search_address(drive_root: &str) -> String {
    let trimmed = drive_root.trim_end_matches('/');
    if trimmed.ends_with("search") {
        trimmed.to_string()
    } else {
        format!("{trimmed}search")
    }
}

pub fn xhr_request(address: &str, referer: &str, body: String) -> Result<HttpRequest> {
    let parsed = Url::parse(address)?;
    let host = parsed
        .host_str()
        .ok_or_else(|| EngineError::InvalidUrl(address.to_string()))?;
    let host = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Ok(HttpRequest::post_form(address, body)
        .header("Accept", "*/*")
        .header("Content-Type", FORM_CONTENT_TYPE)
        .header("Host", host.clone())
        .header("Origin", format!("https://{host}"))
        .header("Referer", form_encode(referer))
        .header("X-Requested-With", "XMLHttpRequest"))
}

struct ListingTarget {
    address: String,
    referer: String,
    lead: String,
}

/// Iterator over the pages of one listing. Ends after the first page without a
/// cursor, after the first error, or with a traversal error once the page bound is hit.
pub struct PageWalker<'c, 'a> {
    client: &'c ListingClient<'a>,
    target: ListingTarget,
    cursor: Option<String>,
    page_index: u32,
    pages_fetched: usize,
    failed: bool,
}

impl<'c, 'a> PageWalker<'c, 'a> {
    fn new(client: &'c ListingClient<'a>, target: ListingTarget, start_cursor: Option<&str>) -> Self {
        Self {
            client,
            target,
            cursor: Some(start_cursor.unwrap_or("").to_string()),
            page_index: 0,
            pages_fetched: 0,
            failed: false,
        }
    }

    pub fn address(&self) -> &str {
        &self.target.address
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    fn fetch(&self, cursor: &str) -> Result<Page> {
        let body = format!(
            "{}&page_token={}&page_index={}",
            self.target.lead,
            form_encode(cursor),
            self.page_index
        );
        let raw = self
            .client
            .post_form(&self.target.address, &self.target.referer, body)?;
        self.client.scheme.decode_listing(&raw)
    }
}

impl Iterator for PageWalker<'_, '_> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let cursor = self.cursor.take()?;
        if self.pages_fetched >= self.client.max_pages {
            self.failed = true;
            return Some(Err(EngineError::Traversal {
                address: self.target.address.clone(),
                reason: format!("exceeded {} pages", self.client.max_pages),
            }));
        }
        match self.fetch(&cursor) {
            Ok(page) => {
                self.pages_fetched += 1;
                self.page_index += 1;
                self.cursor = page.next_cursor.clone();
                Some(Ok(page))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Root part of an index url up to and including the drive segment (`/0:`).
pub fn drive_root(address: &str) -> String {
    let address = ensure_trailing_slash(address);
    let Some(scheme_end) = address.find("://") else {
        return address;
    };
    let path_start = address[scheme_end + 3..]
        .find('/')
        .map(|i| i + scheme_end + 3)
        .unwrap_or(address.len());
    match address[path_start..].find(":/") {
        Some(i) => address[..path_start + i + 1].to_string(),
        None => address[..path_start].to_string(),
    }
}
