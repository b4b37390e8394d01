//! Scripted in-memory batch transport shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use gcpbatch::gcp::multipart::{HttpCall, HttpReply};
use gcpbatch::requests::BatchTransport;
use gcpbatch::resource::{ApiRequest, Catalog, Method};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const BASE: &str = "https://compute.googleapis.com/compute/v1/";
pub const BATCH_URL: &str = "https://compute.googleapis.com/batch/compute/v1";

/// Replies per `"METHOD relative/path?query"` route. Each route pops its
/// queue until one reply is left, which then repeats.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<HttpReply>>>,
    batches: Mutex<Vec<Vec<String>>>,
    fail_batches: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, key: &str, body: Value) -> &Self {
        self.reply(key, HttpReply::json(200, &body))
    }

    pub fn reply(&self, key: &str, reply: HttpReply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Fail the next `n` batches as a whole
    pub fn fail_next_batches(&self, n: usize) {
        self.fail_batches.store(n, Ordering::SeqCst);
    }

    /// Routes of every call, grouped per batch
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    fn answer(&self, key: &str) -> HttpReply {
        let mut routes = self.routes.lock().unwrap();
        let Some(queue) = routes.get_mut(key) else {
            return HttpReply::json(
                404,
                &json!({"error": {"code": 404, "message": format!("no route for {}", key), "status": "NOT_FOUND"}}),
            );
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

pub fn route_key(call: &HttpCall) -> String {
    format!("{} {}", call.method, call.url.trim_start_matches(BASE))
}

#[async_trait]
impl BatchTransport for ScriptedTransport {
    async fn send_batch(
        &self,
        _batch_url: &str,
        calls: &[HttpCall],
    ) -> anyhow::Result<Vec<Option<HttpReply>>> {
        let keys: Vec<String> = calls.iter().map(route_key).collect();
        self.batches.lock().unwrap().push(keys.clone());

        let failing = self.fail_batches.load(Ordering::SeqCst);
        if failing > 0 {
            self.fail_batches.store(failing - 1, Ordering::SeqCst);
            anyhow::bail!("connection reset by peer");
        }

        Ok(keys.iter().map(|key| Some(self.answer(key))).collect())
    }
}

pub fn request(service: &str, method: Method, payload: Value) -> ApiRequest {
    Catalog::builtin()
        .request("compute", service, method, payload.as_object().cloned().unwrap())
        .unwrap()
}

pub fn zone_link(zone: &str) -> String {
    format!("{}projects/p/zones/{}", BASE, zone)
}

pub fn instance_link(zone: &str, name: &str) -> String {
    format!("{}projects/p/zones/{}/instances/{}", BASE, zone, name)
}

/// Zonal compute operation in `status`
pub fn zonal_operation(name: &str, zone: &str, target: &str, status: &str) -> Value {
    json!({
        "kind": "compute#operation",
        "name": name,
        "zone": zone_link(zone),
        "status": status,
        "targetLink": instance_link(zone, target),
        "selfLink": format!("{}/operations/{}", zone_link(zone), name),
    })
}

pub fn instance(zone: &str, name: &str) -> Value {
    json!({
        "kind": "compute#instance",
        "name": name,
        "zone": zone_link(zone),
        "selfLink": instance_link(zone, name),
    })
}

pub fn insert_instance(zone: &str, name: &str) -> ApiRequest {
    request(
        "instances",
        Method::Insert,
        json!({"project": "p", "zone": zone, "instanceResource": {"name": name}}),
    )
}

/// Records ticks and narration
#[derive(Default)]
pub struct RecordingProgress {
    pub ticks: AtomicUsize,
    pub messages: Mutex<Vec<String>>,
}

impl gcpbatch::requests::ProgressTracker for RecordingProgress {
    fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }

    fn status(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

impl RecordingProgress {
    pub fn ticks(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}
