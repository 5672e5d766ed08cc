//! Copy-to-removable-media correlation.
//!
//! Remembers file reads by content hash and reports a write of the same
//! content to removable media as a `copyToRemovable` event.

use crate::error::{Error, Result};
use crate::object::{
    catalog, query_interface, read_all, ClassId, CommandProcessor, DataReceiver, FinalConstruct, Object,
    StreamPtr,
};
use crate::scenario::{Priority, ThreadPool};
use crate::variant::{FromVariant, Variant};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

pub const CLSID_REMOVABLE_COPY_CORRELATOR: ClassId = 0x5D3E_8B20;

pub const EVENT_FILE_READ: &str = "fileRead";
pub const EVENT_FILE_WRITE: &str = "fileWrite";
pub const EVENT_COPY_TO_REMOVABLE: &str = "copyToRemovable";

const DEFAULT_PURGE_TIMEOUT_MS: i64 = 10 * 60 * 1000;
const DEFAULT_PURGE_MASK: u64 = 0xFF;

struct ReadEntry {
    path: String,
    time: i64,
}

#[derive(Default)]
struct State {
    reads: HashMap<String, ReadEntry>,
    events: u64,
}

impl State {
    /// Drop reads older than `now - timeout`; returns the number removed
    fn purge(&mut self, now: i64, timeout: i64) -> usize {
        let before = self.reads.len();
        let threshold = now.saturating_sub(timeout);
        self.reads.retain(|_, entry| entry.time >= threshold);
        before - self.reads.len()
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn sha256_hex(stream: &StreamPtr) -> Result<String> {
    let data = read_all(stream.as_ref())?;
    Ok(format!("{:x}", Sha256::digest(&data)))
}

/// Config: `{"receiver": catalog name | object, "purgeTimeout"?: ms, "purgeMask"?: int}`
#[derive(Default)]
pub struct RemovableCopyCorrelator {
    receiver: Variant,
    purge_timeout: i64,
    purge_mask: u64,
    state: Arc<Mutex<State>>,
    hashed: Arc<AtomicU64>,
    pool: Option<ThreadPool>,
}

impl FinalConstruct for RemovableCopyCorrelator {
    fn final_construct(&mut self, config: &Variant) -> Result<()> {
        let config = config.as_dict().ok_or_else(|| {
            Error::invalid_argument(format!("configuration must be a dictionary, got <{}>", config.value_type()))
        })?;

        let receiver = config.require("receiver")?;
        if receiver.as_str().is_none() && receiver.as_object().is_none() {
            return Err(Error::invalid_argument(format!(
                "field <receiver> must be a catalog name or an object, got <{}>",
                receiver.value_type()
            )));
        }
        self.receiver = receiver.clone();

        self.purge_timeout = int_field(config.get("purgeTimeout"), "purgeTimeout", DEFAULT_PURGE_TIMEOUT_MS)?;
        if self.purge_timeout < 0 {
            return Err(Error::invalid_argument(format!("purgeTimeout must not be negative, got {}", self.purge_timeout)));
        }
        let mask = int_field(config.get("purgeMask"), "purgeMask", DEFAULT_PURGE_MASK as i64)?;
        self.purge_mask = u64::try_from(mask)
            .map_err(|_| Error::invalid_argument(format!("purgeMask must not be negative, got {mask}")))?;

        self.pool = Some(ThreadPool::new("correlator", 1, Priority::Low)?);
        Ok(())
    }
}

fn int_field(value: Option<&Variant>, name: &str, default: i64) -> Result<i64> {
    match value {
        None => Ok(default),
        Some(v) => v.as_int().ok_or_else(|| {
            Error::type_error(format!("field <{name}> must be an integer, got <{}>", v.value_type()))
        }),
    }
}

impl RemovableCopyCorrelator {
    pub fn from_config(config: &Variant) -> Result<Self> {
        let mut correlator = Self::default();
        correlator.final_construct(config)?;
        Ok(correlator)
    }

    /// Number of remembered reads
    pub fn entries(&self) -> usize {
        self.state.lock().reads.len()
    }

    /// Remove expired reads now; returns how many were removed
    pub fn purge(&self) -> usize {
        let removed = self.state.lock().purge(now_ms(), self.purge_timeout);
        if removed > 0 {
            debug!(removed, "correlator cache purged");
        }
        removed
    }

    /// Wait for scheduled purge tasks
    pub fn wait_idle(&self) {
        if let Some(pool) = &self.pool {
            pool.drain();
        }
    }

    fn handle(&self, event: &Variant) -> Result<()> {
        let kind = event
            .get("type")
            .and_then(Variant::as_str)
            .ok_or_else(|| Error::invalid_argument("event has no <type>"))?;
        let path = event
            .get("path")
            .and_then(Variant::as_str)
            .ok_or_else(|| Error::invalid_argument("event has no <path>"))?;
        let time = event.get("time").and_then(Variant::as_int).unwrap_or_else(now_ms);

        match kind {
            EVENT_FILE_READ => {
                let hash = self.content_hash(event)?;
                let Some(hash) = hash.as_str() else {
                    return Ok(());
                };
                self.state.lock().reads.insert(
                    hash.to_string(),
                    ReadEntry {
                        path: path.to_string(),
                        time,
                    },
                );
            }
            EVENT_FILE_WRITE => {
                if !event.get("removable").and_then(Variant::as_bool).unwrap_or(false) {
                    return Ok(());
                }
                let hash = self.content_hash(event)?;
                let Some(hash) = hash.as_str() else {
                    return Ok(());
                };
                let source = self.state.lock().reads.get(hash).map(|entry| entry.path.clone());
                if let Some(source) = source {
                    self.emit(crate::dict! {
                        "type" => EVENT_COPY_TO_REMOVABLE,
                        "id" => uuid::Uuid::new_v4().to_string(),
                        "source" => source,
                        "destination" => path,
                        "hash" => hash,
                        "time" => time,
                    });
                }
            }
            other => debug!(event_type = other, "event ignored"),
        }
        Ok(())
    }

    /// `hash` field when present, otherwise SHA-256 of `content` computed on first access
    fn content_hash(&self, event: &Variant) -> Result<Variant> {
        if let Some(hash) = event.get("hash") {
            return Ok(Variant::from(String::from_variant(hash)));
        }
        let stream = event
            .get("content")
            .and_then(Variant::as_stream)
            .cloned()
            .ok_or_else(|| Error::invalid_argument("event has neither <hash> nor <content>"))?;
        let hashed = Arc::clone(&self.hashed);
        Ok(Variant::deferred(move || {
            hashed.fetch_add(1, Ordering::Relaxed);
            match sha256_hex(&stream) {
                Ok(hash) => Variant::from(hash),
                Err(e) => {
                    warn!(error = %e, "can't hash file content");
                    Variant::Null
                }
            }
        }))
    }

    fn emit(&self, event: Variant) {
        let receiver = match &self.receiver {
            Variant::String(name) => catalog::global().query_object(name),
            other => other
                .as_object()
                .cloned()
                .ok_or_else(|| Error::invalid_argument("receiver is not an object")),
        };
        match receiver.and_then(|obj| query_interface::<dyn DataReceiver>(&obj)) {
            Ok(receiver) => {
                info!(event = %event, "copy to removable media detected");
                receiver.put(&event);
            }
            Err(e) => warn!(error = %e, "can't deliver correlation event"),
        }
    }

    fn schedule_purge(&self) {
        let Some(pool) = &self.pool else {
            return;
        };
        let state: Weak<Mutex<State>> = Arc::downgrade(&self.state);
        let timeout = self.purge_timeout;
        let scheduled = pool.run(move || {
            if let Some(state) = state.upgrade() {
                let removed = state.lock().purge(now_ms(), timeout);
                debug!(removed, "scheduled purge finished");
            }
        });
        if let Err(e) = scheduled {
            warn!(error = %e, "can't schedule purge");
        }
    }
}

impl DataReceiver for RemovableCopyCorrelator {
    fn put(&self, data: &Variant) {
        if let Err(e) = self.handle(data) {
            warn!(code = e.code(), error = %e, "can't correlate event");
        }
        let events = {
            let mut state = self.state.lock();
            state.events += 1;
            state.events
        };
        if events & self.purge_mask == 0 {
            self.schedule_purge();
        }
    }
}

impl CommandProcessor for RemovableCopyCorrelator {
    fn execute(&self, command: &Variant, _params: &Variant) -> Result<Variant> {
        match command.convert::<String>().as_str() {
            "purge" => Ok(Variant::from(self.purge() as i64)),
            "getStatistic" => Ok(crate::dict! {
                "entries" => self.entries() as i64,
                "hashed" => self.hashed.load(Ordering::Relaxed) as i64,
            }),
            other => Err(Error::not_supported(format!(
                "RemovableCopyCorrelator doesn't support command <{other}>"
            ))),
        }
    }
}

impl Object for RemovableCopyCorrelator {
    fn class_id(&self) -> ClassId {
        CLSID_REMOVABLE_COPY_CORRELATOR
    }

    fn command_processor(self: Arc<Self>) -> Option<Arc<dyn CommandProcessor>> {
        Some(self)
    }

    fn data_receiver(self: Arc<Self>) -> Option<Arc<dyn DataReceiver>> {
        Some(self)
    }
}
