use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::FederationConfig;
use crate::error::FederationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Suspended { attempts: u32 },
}

/// Delivers messages to peer nodes and remembers which peers are down.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    client: reqwest::Client,
    config: FederationConfig,

    /// Our own authorities as lowercased `host:port`. Seeded from the public
    /// URI and listen address, extended with Host headers seen at ingestion.
    self_authorities: Mutex<HashSet<String>>,

    /// Suspended destinations: uri -> suspended until
    suspended: Mutex<HashMap<String, DateTime<Utc>>>,

    /// Bounds concurrent deliveries across all messages
    permits: Arc<Semaphore>,
}

/// Deliveries started for one message.
pub struct DispatchBatch {
    pub tasks: Vec<(String, JoinHandle<DeliveryOutcome>)>,
}

impl DispatchBatch {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every delivery. A task that panicked is reported as an error.
    pub async fn join(self) -> Vec<(String, Result<DeliveryOutcome, FederationError>)> {
        let (uris, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let results = join_all(handles).await;
        uris.into_iter()
            .zip(results)
            .map(|(uri, result)| (uri, result.map_err(FederationError::from)))
            .collect()
    }
}

impl Dispatcher {
    pub fn new(config: FederationConfig) -> Result<Self, FederationError> {
        let mut self_authorities = HashSet::new();
        if let Some(uri) = &config.self_uri {
            let url = Url::parse(uri).map_err(|_| FederationError::rejected(uri, "own URI does not parse"))?;
            self_authorities.extend(authority_key(&url));
        }
        let port = config.listen_port;
        match config.listen_host.trim() {
            "" | "0.0.0.0" | "::" | "[::]" => {
                for host in ["127.0.0.1", "localhost", "[::1]", "0.0.0.0"] {
                    self_authorities.insert(format!("{host}:{port}"));
                }
            }
            host => {
                let host = if host.contains(':') && !host.starts_with('[') {
                    format!("[{host}]")
                } else {
                    host.to_string()
                };
                self_authorities.insert(format!("{}:{port}", host.to_ascii_lowercase()));
            }
        }
        debug!(?self_authorities, "self-loop authorities");
        let client = reqwest::Client::builder().build()?;
        let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));

        Ok(Self {
            inner: Arc::new(DispatcherInner {
                client,
                config,
                self_authorities: Mutex::new(self_authorities),
                suspended: Mutex::new(HashMap::new()),
                permits,
            }),
        })
    }

    pub fn config(&self) -> &FederationConfig {
        &self.inner.config
    }

    /// Checks a destination before delivery. See [`Dispatcher::validate_at`].
    pub fn validate(&self, uri: &str) -> Result<Url, FederationError> {
        self.validate_at(uri, Utc::now())
    }

    /// Refuses blank or unparsable URIs, our own authority, and destinations
    /// suspended past `now`. An expired suspension is cleared here.
    pub fn validate_at(&self, uri: &str, now: DateTime<Utc>) -> Result<Url, FederationError> {
        let url = self.parse_destination(uri)?;

        let mut suspended = self
            .inner
            .suspended
            .lock()
            .map_err(|_| FederationError::rejected(uri, "suspension map poisoned"))?;
        if let Some(until) = suspended.get(uri) {
            if *until > now {
                return Err(FederationError::rejected(uri, "suspended"));
            }
            suspended.remove(uri);
            debug!(%uri, "suspension expired");
        }
        Ok(url)
    }

    /// Validation for destinations stored on rules: absolute http(s) and not ourselves.
    pub fn check_destination(&self, uri: &str) -> Result<(), FederationError> {
        let url = self.parse_destination(uri)?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            _ => Err(FederationError::rejected(uri, "scheme must be http or https")),
        }
    }

    fn parse_destination(&self, uri: &str) -> Result<Url, FederationError> {
        if uri.trim().is_empty() {
            return Err(FederationError::rejected(uri, "blank"));
        }
        let url = Url::parse(uri.trim()).map_err(|_| FederationError::rejected(uri, "unparsable"))?;
        let own = self
            .inner
            .self_authorities
            .lock()
            .map_err(|_| FederationError::rejected(uri, "authority set poisoned"))?;
        if authority_key(&url).is_some_and(|key| own.contains(&key)) {
            return Err(FederationError::rejected(uri, "self-loop"));
        }
        Ok(url)
    }

    /// Records a `Host` header value a client used to reach us. Without a
    /// port, plain http is assumed.
    pub fn add_self_authority(&self, host: &str) {
        let host = host.trim();
        if host.is_empty() {
            return;
        }
        let Some(key) = Url::parse(&format!("http://{host}/")).ok().as_ref().and_then(authority_key) else {
            debug!(%host, "ignoring unparsable Host header");
            return;
        };
        let Ok(mut own) = self.inner.self_authorities.lock() else {
            warn!("authority set poisoned");
            return;
        };
        if own.insert(key) {
            info!(%host, "learned own authority");
        }
    }

    pub fn is_suspended(&self, uri: &str) -> bool {
        self.inner
            .suspended
            .lock()
            .map(|s| s.get(uri).is_some_and(|until| *until > Utc::now()))
            .unwrap_or(false)
    }

    fn set_suspended(&self, uri: &str, until: Option<DateTime<Utc>>) {
        let Ok(mut suspended) = self.inner.suspended.lock() else {
            warn!(%uri, "suspension map poisoned");
            return;
        };
        match until {
            Some(until) => {
                suspended.insert(uri.to_string(), until);
            }
            None => {
                suspended.remove(uri);
            }
        }
    }

    /// POSTs `body` as XML, retrying with a fixed delay. After the last
    /// failed attempt the destination is suspended.
    pub async fn deliver(&self, uri: &str, url: Url, body: Bytes) -> DeliveryOutcome {
        let config = &self.inner.config;
        let attempts = config.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            debug!(%uri, attempt, "delivering");
            let result = self
                .inner
                .client
                .post(url.clone())
                .header(CONTENT_TYPE, "text/xml")
                .body(body.clone())
                .send()
                .await
                .and_then(|resp| resp.error_for_status());

            match result {
                Ok(_) => {
                    self.set_suspended(uri, None);
                    info!(%uri, attempt, "delivered");
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(e) => {
                    debug!(%uri, attempt, "delivery attempt failed: {e}");
                    if attempt < attempts && !config.retry_delay.is_zero() {
                        tokio::time::sleep(config.retry_delay).await;
                    }
                }
            }
        }

        let until = Utc::now() + config.suspension;
        self.set_suspended(uri, Some(until));
        warn!(%uri, attempts, %until, "destination suspended");
        DeliveryOutcome::Suspended { attempts }
    }

    /// Starts one delivery task per valid destination. Rejected destinations
    /// are logged and skipped.
    pub fn dispatch(&self, uris: Vec<String>, body: Bytes) -> DispatchBatch {
        let mut tasks = Vec::with_capacity(uris.len());
        for uri in uris {
            let url = match self.validate(&uri) {
                Ok(url) => url,
                Err(e) => {
                    warn!("skipping destination: {e}");
                    continue;
                }
            };

            let dispatcher = self.clone();
            let permits = self.inner.permits.clone();
            let body = body.clone();
            let task_uri = uri.clone();
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                dispatcher.deliver(&task_uri, url, body).await
            });
            tasks.push((uri, handle));
        }
        DispatchBatch { tasks }
    }
}

/// `host:port` with the scheme's default port filled in, lowercased.
fn authority_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(format!("{}:{port}", host.to_ascii_lowercase()))
}
