//! Scripted in-process network for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use folio_core::Error;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};

use crate::fetch::Network;
use crate::request::{ResponseSource, WorkerRequest, WorkerResponse};

#[derive(Clone)]
enum Script {
    Respond { status: u16, body: String },
    Fail,
}

/// A `Network` that answers from a table keyed by canonical URL.
///
/// Unknown URLs answer 404. `set_offline(true)` fails every request.
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Script::Respond { status, body: body.to_string() });
    }

    pub fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), Script::Fail);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| u.as_str() == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &WorkerRequest) -> Result<WorkerResponse, Error> {
        let url = request.url.as_str().to_string();
        self.calls.lock().unwrap().push(url.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::HttpError(format!("network error: offline ({url})")));
        }

        let script = self.routes.lock().unwrap().get(&url).cloned();
        let (status, body) = match script {
            Some(Script::Respond { status, body }) => (status, body),
            Some(Script::Fail) => return Err(Error::HttpError(format!("network error: scripted failure ({url})"))),
            None => (404, "not found".to_string()),
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        Ok(WorkerResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            body: Bytes::from(body),
            source: ResponseSource::Network,
        })
    }
}
