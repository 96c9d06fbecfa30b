//! Open Library adapter.
//!
//! Upstream search documents and work records come in a loose JSON shape;
//! this module turns them into [`BookCard`]s and [`CatalogDetail`]s. The
//! upstream has no prices, so a stable mock price is derived from the title.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bookshelf_kernel::settings::CatalogSettings;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use super::models::{BookCard, BookSource, Category};
use crate::error::BookshelfError;
use crate::query::{self, CatalogGate, ListParams, Page};

const UNTITLED: &str = "Untitled";
const UNKNOWN_AUTHOR: &str = "Unknown";
const DEFAULT_UPSTREAM_ERROR: &str = "OpenLibrary error";

/// Read-only access to the external catalog.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// One upstream page of search results, already mapped to cards.
    async fn search(&self, term: &str, page: usize) -> Result<Vec<BookCard>, BookshelfError>;

    /// Work details by catalog id. Any non-success answer is `NotFound`.
    async fn detail(&self, id: &str) -> Result<CatalogDetail, BookshelfError>;
}

/// Run the catalog list pipeline: gate, fetch one upstream page, filter,
/// sort, cut to `limit`.
pub async fn search_page(
    catalog: &dyn CatalogProvider,
    params: &ListParams,
) -> Result<Page<BookCard>, BookshelfError> {
    if let CatalogGate::Empty { message } = query::catalog_gate(&params.q) {
        return Ok(Page::empty(params, message));
    }

    let cards = catalog.search(params.term(), params.page).await?;
    Ok(query::run(cards, params, BookSource::Catalog))
}

/// Canonical detail payload for a catalog work.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDetail {
    pub id: String,
    pub title: String,
    pub description: String,
    pub cover_image: Option<String>,
    pub thumbnail: String,
    pub subjects: Vec<String>,
    pub category: Category,
    pub price: f64,
    pub first_publish_date: Option<String>,
    pub author_keys: Vec<String>,
}

/// Cover image URL scheme.
#[derive(Debug, Clone)]
pub struct Covers {
    pub base_url: String,
    pub placeholder_url: String,
}

impl Covers {
    pub fn from_settings(settings: &CatalogSettings) -> Self {
        Self {
            base_url: settings.covers_base_url.trim_end_matches('/').to_string(),
            placeholder_url: settings.placeholder_url.clone(),
        }
    }

    /// Medium-size cover for `cover_id`.
    pub fn url(&self, cover_id: i64) -> String {
        format!("{}/b/id/{}-M.jpg", self.base_url, cover_id)
    }

    pub fn thumbnail(&self, cover_id: Option<i64>) -> String {
        cover_id
            .map(|id| self.url(id))
            .unwrap_or_else(|| self.placeholder_url.clone())
    }
}

/// Deterministic stand-in price: `max(5, (len mod 40) + 5)`, length in
/// UTF-16 code units.
pub fn mock_price(title: &str) -> f64 {
    let len = title.encode_utf16().count();
    ((len % 40) + 5).max(5) as f64
}

/// Keyword rules, checked in order; the first hit wins.
const CATEGORY_RULES: &[(Category, &[&str])] = &[
    (Category::Technology, &["technology", "computer", "programming"]),
    (Category::Science, &["science"]),
    (Category::History, &["history"]),
    (Category::Fantasy, &["fantasy", "fiction"]),
    (Category::Biography, &["biography", "biographical"]),
];

pub fn infer_category(subject: Option<&str>) -> Category {
    let Some(subject) = subject else {
        return Category::Other;
    };
    let lower = subject.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Other)
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub docs: Vec<SearchDoc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchDoc {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author_name: Option<Vec<String>>,
    #[serde(default)]
    pub cover_i: Option<i64>,
    #[serde(default)]
    pub subject: Option<Vec<String>>,
    #[serde(default)]
    pub edition_key: Option<Vec<String>>,
}

impl SearchDoc {
    /// Trailing segment of `/works/<id>`, else the first edition key.
    fn catalog_id(&self) -> Option<String> {
        self.key
            .as_deref()
            .and_then(|key| key.rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.edition_key
                    .as_ref()
                    .and_then(|keys| keys.first())
                    .filter(|id| !id.is_empty())
                    .cloned()
            })
    }

    /// Map into a card; documents without any usable id are dropped.
    pub fn into_card(self, covers: &Covers) -> Option<BookCard> {
        let id = self.catalog_id()?;
        // Only a missing title is replaced; an empty one is passed through.
        let price = mock_price(self.title.as_deref().unwrap_or_default());
        let title = self.title.unwrap_or_else(|| UNTITLED.to_string());

        Some(BookCard {
            id,
            title,
            price,
            thumbnail: covers.thumbnail(self.cover_i),
            author: self
                .author_name
                .and_then(|names| names.into_iter().next())
                .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            category: infer_category(
                self.subject
                    .as_ref()
                    .and_then(|s| s.first())
                    .map(String::as_str),
            ),
            source: BookSource::Catalog,
        })
    }
}

/// Work descriptions are either a bare string or `{type, value}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TextValue {
    Plain(String),
    Typed { value: String },
}

impl TextValue {
    fn into_text(self) -> String {
        match self {
            TextValue::Plain(text) | TextValue::Typed { value: text } => text,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct KeyRef {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct WorkAuthor {
    #[serde(default)]
    pub author: Option<KeyRef>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WorkRecord {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<TextValue>,
    #[serde(default)]
    pub covers: Option<Vec<i64>>,
    #[serde(default)]
    pub subjects: Option<Vec<String>>,
    #[serde(default)]
    pub authors: Option<Vec<WorkAuthor>>,
    #[serde(default)]
    pub first_publish_date: Option<String>,
}

impl WorkRecord {
    pub fn into_detail(self, id: &str, covers: &Covers) -> CatalogDetail {
        let price = mock_price(self.title.as_deref().unwrap_or_default());
        let subjects = self.subjects.unwrap_or_default();
        // Negative ids mark missing covers upstream.
        let cover_id = self
            .covers
            .unwrap_or_default()
            .into_iter()
            .find(|id| *id > 0);

        CatalogDetail {
            id: id.to_string(),
            title: self.title.unwrap_or_else(|| UNTITLED.to_string()),
            description: self.description.map(TextValue::into_text).unwrap_or_default(),
            cover_image: cover_id.map(|c| covers.url(c)),
            thumbnail: covers.thumbnail(cover_id),
            category: infer_category(subjects.first().map(String::as_str)),
            subjects,
            price,
            first_publish_date: self.first_publish_date,
            author_keys: self
                .authors
                .unwrap_or_default()
                .into_iter()
                .filter_map(|a| a.author.map(|r| r.key))
                .collect(),
        }
    }
}

/// `CatalogProvider` backed by the Open Library JSON API.
pub struct OpenLibraryClient {
    client: Client,
    base_url: Url,
    covers: Covers,
}

impl OpenLibraryClient {
    pub fn new(settings: &CatalogSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .user_agent(settings.user_agent.clone())
            .build()
            .context("failed to build catalog HTTP client")?;

        let base_url = Url::parse(&settings.base_url)
            .with_context(|| format!("invalid catalog base url '{}'", settings.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("catalog base url '{}' cannot be a base", settings.base_url);
        }

        Ok(Self {
            client,
            base_url,
            covers: Covers::from_settings(settings),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base url can carry path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl CatalogProvider for OpenLibraryClient {
    async fn search(&self, term: &str, page: usize) -> Result<Vec<BookCard>, BookshelfError> {
        let mut url = self.endpoint(&["search.json"]);
        url.query_pairs_mut()
            .append_pair("q", term)
            .append_pair("page", &page.to_string());

        tracing::debug!(%url, "catalog search");
        let response = self.client.get(url).send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = upstream_message(&body);
            tracing::warn!(status = status.as_u16(), %message, "catalog search failed");
            return Err(BookshelfError::UpstreamUnavailable {
                status: Some(status.as_u16()),
                message,
            });
        }

        let body: SearchResponse = response.json().await.map_err(|err| {
            BookshelfError::UpstreamUnavailable {
                status: Some(status.as_u16()),
                message: format!("unreadable catalog response: {err}"),
            }
        })?;

        Ok(body
            .docs
            .into_iter()
            .filter_map(|doc| doc.into_card(&self.covers))
            .collect())
    }

    async fn detail(&self, id: &str) -> Result<CatalogDetail, BookshelfError> {
        let url = self.endpoint(&["works", &format!("{id}.json")]);

        tracing::debug!(%url, "catalog detail");
        let response = self.client.get(url).send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), id, "catalog detail not available");
            return Err(BookshelfError::not_found(id));
        }

        let work: WorkRecord = response.json().await.map_err(|err| {
            BookshelfError::UpstreamUnavailable {
                status: Some(status.as_u16()),
                message: format!("unreadable catalog work: {err}"),
            }
        })?;

        Ok(work.into_detail(id, &self.covers))
    }
}

fn transport_error(err: reqwest::Error) -> BookshelfError {
    tracing::warn!(error = %err, "catalog unreachable");
    BookshelfError::UpstreamUnavailable {
        status: err.status().map(|s| s.as_u16()),
        message: err.to_string(),
    }
}

/// Prefer the upstream JSON `error` field, then the raw body, then a default.
fn upstream_message(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json) => json
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or(DEFAULT_UPSTREAM_ERROR)
            .to_string(),
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => DEFAULT_UPSTREAM_ERROR.to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{card, covers, FakeCatalog};
    use super::*;
    use axum::{extract::Path, http::StatusCode as AxumStatus, routing::get, Json, Router};
    use serde_json::json;

    #[test]
    fn mock_price_is_stable_and_bounded() {
        assert_eq!(mock_price("Dune"), 9.0);
        assert_eq!(mock_price("Dune"), mock_price("Dune"));
        assert_eq!(mock_price(""), 5.0);
        assert_eq!(mock_price(&"x".repeat(40)), 5.0);
        assert_eq!(mock_price(&"x".repeat(39)), 44.0);
    }

    #[test]
    fn mock_price_counts_utf16_units() {
        // One astral-plane character is two UTF-16 units.
        assert_eq!(mock_price("𝔸"), 7.0);
        assert_eq!(mock_price("é"), 6.0);
    }

    #[test]
    fn category_rules_are_ordered() {
        assert_eq!(infer_category(Some("Computer Science Fiction")), Category::Technology);
        assert_eq!(infer_category(Some("Science fiction")), Category::Science);
        assert_eq!(infer_category(Some("World HISTORY")), Category::History);
        assert_eq!(infer_category(Some("Fiction")), Category::Fantasy);
        assert_eq!(infer_category(Some("Biographical novels")), Category::Biography);
        assert_eq!(infer_category(Some("Cooking")), Category::Other);
        assert_eq!(infer_category(None), Category::Other);
    }

    #[test]
    fn search_docs_map_to_cards() {
        let response: SearchResponse = serde_json::from_value(json!({
            "numFound": 3,
            "docs": [
                {
                    "key": "/works/OL893415W",
                    "title": "Dune",
                    "author_name": ["Frank Herbert", "Someone Else"],
                    "cover_i": 11481354,
                    "subject": ["Science fiction", "Fantasy"]
                },
                { "edition_key": ["OL123M"], "subject": [] },
                { "title": "No identifier at all" }
            ]
        }))
        .unwrap();

        let cards: Vec<_> = response
            .docs
            .into_iter()
            .filter_map(|d| d.into_card(&covers()))
            .collect();
        assert_eq!(cards.len(), 2);

        let dune = &cards[0];
        assert_eq!(dune.id, "OL893415W");
        assert_eq!(dune.title, "Dune");
        assert_eq!(dune.price, 9.0);
        assert_eq!(dune.author, "Frank Herbert");
        assert_eq!(dune.category, Category::Science);
        assert_eq!(
            dune.thumbnail,
            "https://covers.openlibrary.org/b/id/11481354-M.jpg"
        );
        assert_eq!(dune.source, BookSource::Catalog);

        let bare = &cards[1];
        assert_eq!(bare.id, "OL123M");
        assert_eq!(bare.title, "Untitled");
        assert_eq!(bare.price, 5.0);
        assert_eq!(bare.author, "Unknown");
        assert_eq!(bare.category, Category::Other);
        assert_eq!(bare.thumbnail, "https://placehold.co/300x400");
    }

    #[test]
    fn empty_titles_pass_through_and_missing_ones_are_untitled() {
        let empty: SearchDoc =
            serde_json::from_value(json!({ "key": "/works/OL1W", "title": "" })).unwrap();
        let card = empty.into_card(&covers()).unwrap();
        assert_eq!(card.title, "");
        assert_eq!(card.price, 5.0);

        let missing: SearchDoc = serde_json::from_value(json!({ "key": "/works/OL2W" })).unwrap();
        assert_eq!(missing.into_card(&covers()).unwrap().title, "Untitled");

        let empty: WorkRecord = serde_json::from_value(json!({ "title": "" })).unwrap();
        let detail = empty.into_detail("OL1W", &covers());
        assert_eq!(detail.title, "");
        assert_eq!(detail.price, 5.0);
    }

    #[test]
    fn work_records_accept_both_description_shapes() {
        let typed: WorkRecord = serde_json::from_value(json!({
            "title": "Dune",
            "description": { "type": "/type/text", "value": "Desert planet." },
            "covers": [-1, 42],
            "subjects": ["Fantasy"],
            "authors": [{ "author": { "key": "/authors/OL79034A" } }],
            "first_publish_date": "1965"
        }))
        .unwrap();
        let detail = typed.into_detail("OL893415W", &covers());
        assert_eq!(detail.description, "Desert planet.");
        assert_eq!(
            detail.cover_image.as_deref(),
            Some("https://covers.openlibrary.org/b/id/42-M.jpg")
        );
        assert_eq!(detail.category, Category::Fantasy);
        assert_eq!(detail.author_keys, vec!["/authors/OL79034A"]);
        assert_eq!(detail.price, 9.0);

        let plain: WorkRecord =
            serde_json::from_value(json!({ "description": "Plain text" })).unwrap();
        let detail = plain.into_detail("OL1W", &covers());
        assert_eq!(detail.description, "Plain text");
        assert_eq!(detail.title, "Untitled");
        assert_eq!(detail.cover_image, None);
    }

    #[test]
    fn upstream_messages_prefer_json_error() {
        assert_eq!(upstream_message(r#"{"error": "bad query"}"#), "bad query");
        assert_eq!(upstream_message(r#"{"other": 1}"#), DEFAULT_UPSTREAM_ERROR);
        assert_eq!(upstream_message("gateway exploded"), "gateway exploded");
        assert_eq!(upstream_message(""), DEFAULT_UPSTREAM_ERROR);
    }

    #[tokio::test]
    async fn short_terms_never_reach_upstream() {
        let catalog = FakeCatalog::with_cards(vec![card("OL1W", "Dune", "Frank Herbert", Category::Fantasy)]);
        for term in ["", " ", "a", "du", "  xy  "] {
            let params = ListParams {
                q: term.to_string(),
                ..ListParams::default()
            };
            let page = search_page(&catalog, &params).await.unwrap();
            assert!(page.data.is_empty());
            assert_eq!(page.total, 0);
        }
        assert_eq!(catalog.searches(), 0);
    }

    #[tokio::test]
    async fn search_page_filters_sorts_and_cuts() {
        let catalog = FakeCatalog::with_cards(vec![
            card("OL1W", "Zen", "A", Category::Other),
            card("OL2W", "Dune", "B", Category::Fantasy),
            card("OL3W", "Children of Dune", "B", Category::Fantasy),
            card("OL4W", "Dune Messiah", "B", Category::Fantasy),
        ]);
        let params = ListParams {
            q: "dune".into(),
            category: Some(Category::Fantasy),
            limit: 2,
            ..ListParams::default()
        };

        let page = search_page(&catalog, &params).await.unwrap();
        assert_eq!(page.total, 3);
        let titles: Vec<_> = page.data.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Children of Dune", "Dune"]);
        assert_eq!(catalog.searches(), 1);
    }

    #[tokio::test]
    async fn upstream_failures_surface_verbatim() {
        let catalog = FakeCatalog {
            fail_with: Some(503),
            ..FakeCatalog::default()
        };
        let params = ListParams {
            q: "dune".into(),
            ..ListParams::default()
        };
        let err = search_page(&catalog, &params).await.unwrap_err();
        assert!(matches!(
            err,
            BookshelfError::UpstreamUnavailable { status: Some(503), .. }
        ));
    }

    async fn spawn_upstream() -> String {
        let app = Router::new()
            .route(
                "/search.json",
                get(|axum::extract::Query(q): axum::extract::Query<std::collections::HashMap<String, String>>| async move {
                    if q.get("q").map(String::as_str) == Some("boom") {
                        return (AxumStatus::INTERNAL_SERVER_ERROR, Json(json!({ "error": "solr down" })));
                    }
                    (
                        AxumStatus::OK,
                        Json(json!({
                            "docs": [{
                                "key": "/works/OL45804W",
                                "title": q.get("q").cloned().unwrap_or_default(),
                                "author_name": ["Tester"],
                                "subject": ["History of testing"]
                            }]
                        })),
                    )
                }),
            )
            .route(
                "/works/{file}",
                get(|Path(file): Path<String>| async move {
                    if file == "OL45804W.json" {
                        (AxumStatus::OK, Json(json!({ "title": "Fantastic Mr Fox" })))
                    } else {
                        (AxumStatus::NOT_FOUND, Json(json!({ "error": "notfound" })))
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client_for(base_url: String) -> OpenLibraryClient {
        OpenLibraryClient::new(&CatalogSettings {
            base_url,
            timeout_ms: 2000,
            ..CatalogSettings::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn open_library_client_maps_search_results() {
        let client = client_for(spawn_upstream().await);

        let cards = client.search("the fox", 2).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].id, "OL45804W");
        assert_eq!(cards[0].title, "the fox");
        assert_eq!(cards[0].category, Category::History);

        let err = client.search("boom", 1).await.unwrap_err();
        match err {
            BookshelfError::UpstreamUnavailable { status, message } => {
                assert_eq!(status, Some(500));
                assert_eq!(message, "solr down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn open_library_client_detail_maps_missing_to_not_found() {
        let client = client_for(spawn_upstream().await);

        let detail = client.detail("OL45804W").await.unwrap();
        assert_eq!(detail.title, "Fantastic Mr Fox");
        assert_eq!(detail.id, "OL45804W");

        assert!(client.detail("OL0W").await.unwrap_err().is_not_found());
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let settings = CatalogSettings {
            base_url: "not a url".into(),
            ..CatalogSettings::default()
        };
        assert!(OpenLibraryClient::new(&settings).is_err());
    }
}
