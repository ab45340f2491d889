//! Course catalog search.
//!
//! Queries the catalog search API for courses in one department that carry
//! any of the configured feature tags, newest runs first, and turns every
//! run slug into a course URL on the courseware site.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use url::Url;

use ocwharvest_shared::{CatalogConfig, HarvestError, Result};

/// User-Agent string for catalog requests.
const USER_AGENT: &str = concat!("ocwharvest/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow for a search request.
const MAX_REDIRECTS: usize = 3;

// ---------------------------------------------------------------------------
// Response shape
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Hits,
}

#[derive(Debug, Default, Deserialize)]
struct Hits {
    #[serde(default)]
    total: Option<Total>,
    #[serde(default)]
    hits: Vec<Hit>,
}

/// Older search backends report a bare count, newer ones an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Total {
    Count(u64),
    Object { value: u64 },
}

impl Total {
    fn value(&self) -> u64 {
        match self {
            Total::Count(n) | Total::Object { value: n } => *n,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source", default)]
    source: Source,
}

#[derive(Debug, Default, Deserialize)]
struct Source {
    #[serde(default)]
    runs: Vec<Run>,
}

#[derive(Debug, Deserialize)]
struct Run {
    #[serde(default)]
    slug: Option<String>,
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Build the search request body for one page of results.
pub fn build_search_payload(config: &CatalogConfig, from: usize, size: usize) -> Value {
    let feature_terms: Vec<Value> = config
        .feature_tags
        .iter()
        .map(|tag| json!({ "term": { "course_feature_tags": tag } }))
        .collect();

    json!({
        "from": from,
        "size": size,
        "post_filter": {
            "bool": {
                "must": [
                    { "bool": { "should": [{ "term": { "object_type.keyword": "course" } }] } },
                    { "bool": { "should": [{ "term": { "offered_by": "OCW" } }] } },
                    { "bool": { "should": [{ "term": { "topics": config.department } }] } },
                    { "bool": { "should": [{ "term": { "department_name": config.department } }] } },
                    { "bool": { "should": feature_terms } }
                ]
            }
        },
        "sort": [{
            "runs.best_start_date": {
                "order": "desc",
                "nested": { "path": "runs" }
            }
        }]
    })
}

/// Search the catalog and return course URLs in result order.
///
/// Pages through results until a page comes back empty, the reported total
/// is reached, or `max_courses` URLs have been collected. Duplicate URLs are
/// returned once; a run slug that does not form a URL is skipped.
#[instrument(skip_all, fields(department = %config.department))]
pub async fn search_courses(config: &CatalogConfig) -> Result<Vec<String>> {
    let client = build_client(config)?;
    let site = Url::parse(&config.site_host)
        .map_err(|e| HarvestError::config(format!("invalid site host {}: {e}", config.site_host)))?;

    let page_size = config.page_size.max(1) as usize;
    let mut urls: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut from = 0usize;

    loop {
        let size = match config.max_courses {
            Some(max) => page_size.min(max.saturating_sub(urls.len()).max(1)),
            None => page_size,
        };
        let page = fetch_page(&client, &config.api_url, &build_search_payload(config, from, size)).await?;
        let hit_count = page.hits.hits.len();
        debug!(from, hits = hit_count, "search page received");

        for slug in page
            .hits
            .hits
            .iter()
            .flat_map(|hit| hit.source.runs.iter())
            .filter_map(|run| run.slug.as_deref())
            .filter(|slug| !slug.is_empty())
        {
            let url = match course_url(&site, slug) {
                Ok(url) => url,
                Err(e) => {
                    warn!(%slug, error = %e, "skipping unusable run slug");
                    continue;
                }
            };
            if seen.insert(url.clone()) {
                urls.push(url);
            }
        }

        from += hit_count;
        let total_reached = page
            .hits
            .total
            .as_ref()
            .is_some_and(|total| from as u64 >= total.value());
        let max_reached = config.max_courses.is_some_and(|max| urls.len() >= max);

        if hit_count == 0 || total_reached || max_reached {
            break;
        }
    }

    if let Some(max) = config.max_courses {
        urls.truncate(max);
    }

    info!(courses = urls.len(), "catalog search complete");
    Ok(urls)
}

/// Join a run slug onto the site root.
fn course_url(site: &Url, slug: &str) -> Result<String> {
    let joined = site
        .join(slug.trim_start_matches('/'))
        .map_err(|e| HarvestError::parse(format!("bad course slug {slug:?}: {e}")))?;
    Ok(joined.as_str().trim_end_matches('/').to_string())
}

fn build_client(config: &CatalogConfig) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| HarvestError::Network(format!("failed to build HTTP client: {e}")))
}

async fn fetch_page(client: &Client, api_url: &str, payload: &Value) -> Result<SearchResponse> {
    let response = client
        .post(api_url)
        .json(payload)
        .send()
        .await
        .map_err(|e| HarvestError::Network(format!("{api_url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(HarvestError::Network(format!("{api_url}: HTTP {status}")));
    }

    response
        .json::<SearchResponse>()
        .await
        .map_err(|e| HarvestError::parse(format!("{api_url}: invalid search response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> CatalogConfig {
        CatalogConfig {
            api_url: format!("{}/api/v0/search/", server.uri()),
            site_host: "https://ocw.mit.edu/".into(),
            department: "Mechanical Engineering".into(),
            feature_tags: vec!["Lecture Notes".into(), "Readings".into()],
            page_size: 2,
            max_courses: None,
            timeout_secs: 5,
        }
    }

    fn hits(slugs: &[&str], total: u64) -> Value {
        let hits: Vec<Value> = slugs
            .iter()
            .map(|slug| json!({ "_source": { "runs": [{ "slug": slug }] } }))
            .collect();
        json!({ "hits": { "total": { "value": total }, "hits": hits } })
    }

    #[test]
    fn payload_carries_filters_and_paging() {
        let config = CatalogConfig {
            api_url: String::new(),
            site_host: "https://ocw.mit.edu/".into(),
            department: "Physics".into(),
            feature_tags: vec!["Readings".into()],
            page_size: 100,
            max_courses: None,
            timeout_secs: 30,
        };
        let payload = build_search_payload(&config, 200, 100);

        assert_eq!(payload["from"], 200);
        assert_eq!(payload["size"], 100);
        let must = payload["post_filter"]["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 5);
        assert_eq!(must[3]["bool"]["should"][0]["term"]["department_name"], "Physics");
        assert_eq!(must[4]["bool"]["should"][0]["term"]["course_feature_tags"], "Readings");
        assert_eq!(payload["sort"][0]["runs.best_start_date"]["order"], "desc");
    }

    #[test]
    fn slugs_join_onto_site_root() {
        let site = Url::parse("https://ocw.mit.edu/").unwrap();
        assert_eq!(
            course_url(&site, "courses/2-003sc-engineering-dynamics-fall-2011").unwrap(),
            "https://ocw.mit.edu/courses/2-003sc-engineering-dynamics-fall-2011"
        );
        assert_eq!(
            course_url(&site, "/courses/x/").unwrap(),
            "https://ocw.mit.edu/courses/x"
        );
    }

    #[test]
    fn bare_total_is_accepted() {
        let parsed: SearchResponse =
            serde_json::from_value(json!({ "hits": { "total": 7, "hits": [] } })).unwrap();
        assert_eq!(parsed.hits.total.map(|t| t.value()), Some(7));
    }

    #[tokio::test]
    async fn pages_until_total_reached() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v0/search/"))
            .and(body_partial_json(json!({ "from": 0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(hits(&["courses/a", "courses/b"], 3)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v0/search/"))
            .and(body_partial_json(json!({ "from": 2 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(hits(&["courses/c"], 3)))
            .expect(1)
            .mount(&server)
            .await;

        let urls = search_courses(&config_for(&server)).await.unwrap();
        assert_eq!(
            urls,
            vec![
                "https://ocw.mit.edu/courses/a",
                "https://ocw.mit.edu/courses/b",
                "https://ocw.mit.edu/courses/c",
            ]
        );
    }

    #[tokio::test]
    async fn empty_page_stops_and_duplicates_collapse() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "from": 0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": { "hits": [
                    { "_source": { "runs": [{ "slug": "courses/a" }, { "slug": "" }, { "slug": "courses/a" }] } },
                    { "_source": {} }
                ] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "from": 2 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(hits(&[], 0)))
            .mount(&server)
            .await;

        let urls = search_courses(&config_for(&server)).await.unwrap();
        assert_eq!(urls, vec!["https://ocw.mit.edu/courses/a"]);
    }

    #[tokio::test]
    async fn malformed_slug_is_skipped() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "from": 0 })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(hits(&["courses/a", "http://[oops", "courses/b"], 3)),
            )
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.page_size = 3;
        let urls = search_courses(&config).await.unwrap();
        assert_eq!(
            urls,
            vec!["https://ocw.mit.edu/courses/a", "https://ocw.mit.edu/courses/b"]
        );
    }

    #[tokio::test]
    async fn max_courses_caps_results() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hits(&["courses/a", "courses/b"], 50)))
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.max_courses = Some(1);
        let urls = search_courses(&config).await.unwrap();
        assert_eq!(urls, vec!["https://ocw.mit.edu/courses/a"]);
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = search_courses(&config_for(&server)).await.unwrap_err();
        assert!(matches!(err, HarvestError::Network(_)));
        assert!(err.to_string().contains("503"));
    }
}
