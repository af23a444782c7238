//! Scripted [`HttpFetcher`] for tests and offline runs.
//!
//! Records every requested URL and replays canned responses, either from a
//! queue or from a handler that inspects the URL.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use crate::transport::{HttpFetcher, RawResponse};

type Handler = Box<dyn Fn(&Url) -> RawResponse + Send + Sync>;

enum Script {
    Queue {
        responses: VecDeque<RawResponse>,
        fallback: Option<RawResponse>,
    },
    Handler(Handler),
}

pub struct ScriptedFetcher {
    script: Mutex<Script>,
    requests: Mutex<Vec<Url>>,
}

impl fmt::Debug for ScriptedFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedFetcher")
            .field("requests", &self.requests().len())
            .finish()
    }
}

impl ScriptedFetcher {
    /// Replay `responses` in order; once drained, answer with an empty page.
    pub fn new(responses: Vec<RawResponse>) -> Self {
        Self::from_script(Script::Queue {
            responses: responses.into(),
            fallback: None,
        })
    }

    /// Answer every request with the same response.
    pub fn repeating(response: RawResponse) -> Self {
        Self::from_script(Script::Queue {
            responses: VecDeque::new(),
            fallback: Some(response),
        })
    }

    /// Compute each response from the requested URL.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&Url) -> RawResponse + Send + Sync + 'static,
    {
        Self::from_script(Script::Handler(Box::new(handler)))
    }

    fn from_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<Url> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Value of query parameter `name` for each recorded request.
    pub fn param_values(&self, name: &str) -> Vec<Option<String>> {
        self.requests()
            .iter()
            .map(|url| {
                url.query_pairs()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.into_owned())
            })
            .collect()
    }
}

#[async_trait]
impl HttpFetcher for ScriptedFetcher {
    async fn get(&self, url: &Url) -> RawResponse {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.clone());
        }
        let mut script = match self.script.lock() {
            Ok(guard) => guard,
            Err(_) => return RawResponse::status(0, "scripted fetcher poisoned"),
        };
        match &mut *script {
            Script::Queue {
                responses,
                fallback,
            } => responses
                .pop_front()
                .or_else(|| fallback.clone())
                .unwrap_or_else(|| RawResponse::ok("{}")),
            Script::Handler(handler) => handler(url),
        }
    }
}

/// Body of a web results page with `count` items starting at `start`.
///
/// `next` is the continuation token, omitted when `None`.
pub fn web_page(domain: &str, start: u32, count: u32, next: Option<u32>) -> String {
    let items: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            let n = start + i;
            serde_json::json!({
                "title": format!("Result {}", n),
                "link": format!("https://{}/page/{}", domain, n),
                "snippet": format!("Snippet {}", n),
                "displayLink": domain,
            })
        })
        .collect();
    let mut body = serde_json::json!({ "items": items });
    if let Some(next) = next {
        body["queries"] = serde_json::json!({ "nextPage": [{ "startIndex": next }] });
    }
    body.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_empty_page() {
        let fetcher = ScriptedFetcher::new(vec![RawResponse::status(503, "")]);
        let url = Url::parse("https://search.test/v1?start=1").unwrap();

        assert_eq!(fetcher.get(&url).await.status, 503);
        assert_eq!(fetcher.get(&url).await.body, "{}");
        assert_eq!(fetcher.param_values("start"), vec![Some("1".into()), Some("1".into())]);
    }

    #[tokio::test]
    async fn test_handler_sees_url() {
        let fetcher = ScriptedFetcher::with_handler(|url| {
            RawResponse::ok(url.query().unwrap_or_default().to_string())
        });
        let url = Url::parse("https://search.test/v1?q=x").unwrap();
        assert_eq!(fetcher.get(&url).await.body, "q=x");
    }

    #[test]
    fn test_web_page_shape() {
        let body: serde_json::Value =
            serde_json::from_str(&web_page("a.com", 11, 2, Some(13))).unwrap();
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
        assert_eq!(body["items"][0]["link"], "https://a.com/page/11");
        assert_eq!(body["queries"]["nextPage"][0]["startIndex"], 13);
    }
}
