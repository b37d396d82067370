// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OPC UA sink
//!
//! Forwards decoded samples to the site OPC UA server. Tag names are
//! resolved through a node descriptor (`opcua_json_files/nodes.json`)
//! maintained by the out-of-process node manager; the bridge only ever reads
//! that file. The sink never reconnects: a failed write demotes the owning
//! loop to CSV-only for the rest of the process lifetime, keeping reconnect
//! latency out of the 10 ms cycle budget.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use opcua::client::prelude::*;
use opcua::sync::RwLock;
use serde::Deserialize;
use tokio::task;
use tokio::time::{sleep, timeout};

use crate::acquisition::value::TagValue;

/// Shared node descriptor produced by the node manager container.
pub const DEFAULT_DESCRIPTOR_PATH: &str = "opcua_json_files/nodes.json";

/// Ceiling on both the server connect and the descriptor-file wait.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Poll step while waiting for the descriptor file to appear.
const DESCRIPTOR_POLL: Duration = Duration::from_secs(2);

/// One entry of the node descriptor: OPC UA node id and the numeric
/// variant-type the node expects.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeEntry {
    pub node_id: String,
    pub data_type: u32,
}

/// Tag-name → node lookup table loaded from the shared descriptor.
#[derive(Debug, Default)]
pub struct NodeMapper {
    nodes: HashMap<String, NodeEntry>,
}

impl NodeMapper {
    /// Load the descriptor file. The bridge never writes it back; `reload`
    /// is the operator's pass-through request to the node manager and is
    /// only recorded here.
    pub fn from_file(path: &Path, reload: bool) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read node descriptor {:?}", path))?;
        let nodes: HashMap<String, NodeEntry> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse node descriptor {:?}", path))?;
        info!(
            "Loaded {} OPC UA nodes from {:?} (reload requested: {})",
            nodes.len(),
            path,
            reload
        );
        Ok(NodeMapper { nodes })
    }

    pub fn get(&self, tag_name: &str) -> Option<&NodeEntry> {
        self.nodes.get(tag_name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Wait for the descriptor file to appear, polling every couple of seconds
/// up to the connect ceiling. Returns false on timeout or cancellation.
pub async fn wait_for_descriptor(path: &Path, cancel: &AtomicBool) -> bool {
    let mut waited = Duration::ZERO;
    while !path.exists() {
        if cancel.load(Ordering::Relaxed) || waited >= CONNECT_TIMEOUT {
            return false;
        }
        debug!("Waiting for node descriptor {:?}", path);
        sleep(DESCRIPTOR_POLL).await;
        waited += DESCRIPTOR_POLL;
    }
    true
}

/// Seam between the acquisition loop and the OPC UA client library, so
/// failure scenarios can be driven by a scripted stand-in under test.
#[async_trait::async_trait]
pub trait OpcuaLink: Send {
    /// Connect and load the node mapper. Failure leaves the loop in CSV
    /// fallback; it is not retried.
    async fn connect(&mut self, url: &str, reload: bool, cancel: &AtomicBool) -> Result<()>;

    /// Write one cycle's values in order. Any error demotes the loop.
    async fn write_all(&mut self, entries: Vec<(String, TagValue)>) -> Result<()>;

    /// Close the session if one is open.
    fn disconnect(&mut self);
}

/// Production [`OpcuaLink`] backed by [`OpcuaSink`].
pub struct OpcuaEndpoint {
    descriptor_path: PathBuf,
    sink: Option<OpcuaSink>,
}

impl OpcuaEndpoint {
    pub fn new(descriptor_path: PathBuf) -> Self {
        OpcuaEndpoint {
            descriptor_path,
            sink: None,
        }
    }
}

impl Default for OpcuaEndpoint {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_DESCRIPTOR_PATH))
    }
}

#[async_trait::async_trait]
impl OpcuaLink for OpcuaEndpoint {
    async fn connect(&mut self, url: &str, reload: bool, cancel: &AtomicBool) -> Result<()> {
        let sink = OpcuaSink::connect(url, self.descriptor_path.clone(), reload, cancel).await?;
        self.sink = Some(sink);
        Ok(())
    }

    async fn write_all(&mut self, entries: Vec<(String, TagValue)>) -> Result<()> {
        match &self.sink {
            Some(sink) => sink.write_all(entries).await,
            None => bail!("OPC UA session is not connected"),
        }
    }

    fn disconnect(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.disconnect();
        }
    }
}

/// Connected OPC UA session plus the node lookup table.
pub struct OpcuaSink {
    session: Arc<RwLock<Session>>,
    mapper: NodeMapper,
}

impl OpcuaSink {
    /// Connect to `url` (60 s ceiling), wait for the node descriptor and
    /// load the mapper. Any failure leaves the caller in CSV fallback.
    pub async fn connect(
        url: &str,
        descriptor_path: PathBuf,
        reload: bool,
        cancel: &AtomicBool,
    ) -> Result<Self> {
        let endpoint_url = url.to_string();
        let connect = task::spawn_blocking(move || connect_session(&endpoint_url));
        let session = timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| anyhow!("OPC UA connect to {} timed out after 60 s", url))?
            .context("OPC UA connect task failed")??;
        info!("Connected to OPC UA server at {}", url);

        if !wait_for_descriptor(&descriptor_path, cancel).await {
            bail!(
                "Node descriptor {:?} did not appear within 60 s",
                descriptor_path
            );
        }
        let mapper = NodeMapper::from_file(&descriptor_path, reload)?;

        Ok(OpcuaSink {
            session,
            mapper,
        })
    }

    /// Write one cycle's values, tag-name addressed, in the given order.
    /// Tags without a descriptor entry are skipped with a warning; any
    /// transport or status-code failure is an error and demotes the loop.
    pub async fn write_all(&self, entries: Vec<(String, TagValue)>) -> Result<()> {
        let mut nodes_to_write = Vec::with_capacity(entries.len());
        for (tag_name, value) in &entries {
            let entry = match self.mapper.get(tag_name) {
                Some(entry) => entry,
                None => {
                    warn!("Tag '{}' has no OPC UA node mapping, skipping", tag_name);
                    continue;
                }
            };
            let node_id = NodeId::from_str(&entry.node_id)
                .map_err(|_| anyhow!("Invalid node id '{}' for tag '{}'", entry.node_id, tag_name))?;
            nodes_to_write.push(WriteValue {
                node_id,
                attribute_id: AttributeId::Value as u32,
                index_range: UAString::null(),
                value: DataValue::value_only(cast_variant(value, entry.data_type)),
            });
        }
        if nodes_to_write.is_empty() {
            return Ok(());
        }

        let session = Arc::clone(&self.session);
        let results = task::spawn_blocking(move || session.read().write(&nodes_to_write))
            .await
            .context("OPC UA write task failed")?
            .map_err(|status| anyhow!("OPC UA write request failed: {}", status))?;

        for status in results {
            if status.is_bad() {
                bail!("OPC UA server rejected a write: {}", status);
            }
        }
        Ok(())
    }

    /// Close the session. Errors during close are dropped.
    pub fn disconnect(&self) {
        self.session.read().disconnect();
        debug!("OPC UA session disconnected");
    }
}

/// Blocking connect with an anonymous session on the unsecured endpoint.
fn connect_session(url: &str) -> Result<Arc<RwLock<Session>>> {
    let mut client = ClientBuilder::new()
        .application_name("fins-opcua-bridge")
        .application_uri("urn:fins-opcua-bridge")
        .product_uri("urn:fins-opcua-bridge")
        .trust_server_certs(true)
        .create_sample_keypair(true)
        .session_retry_limit(0)
        .client()
        .ok_or_else(|| anyhow!("Invalid OPC UA client configuration"))?;

    client
        .connect_to_endpoint(
            (
                url,
                SecurityPolicy::None.to_str(),
                MessageSecurityMode::None,
                UserTokenPolicy::anonymous(),
            ),
            IdentityToken::Anonymous,
        )
        .map_err(|status| anyhow!("OPC UA connect failed: {}", status))
}

/// Cast a decoded value to the variant type the node expects, following the
/// numeric type ids of the OPC UA standard.
fn cast_variant(value: &TagValue, data_type: u32) -> Variant {
    match data_type {
        1 => Variant::Boolean(as_bool(value)),
        2 => Variant::SByte(as_i64(value) as i8),
        3 => Variant::Byte(as_i64(value) as u8),
        4 => Variant::Int16(as_i64(value) as i16),
        5 => Variant::UInt16(as_i64(value) as u16),
        6 => Variant::Int32(as_i64(value) as i32),
        7 => Variant::UInt32(as_i64(value) as u32),
        8 => Variant::Int64(as_i64(value)),
        9 => Variant::UInt64(as_i64(value) as u64),
        10 => Variant::Float(as_f64(value) as f32),
        11 => Variant::Double(as_f64(value)),
        12 => Variant::String(UAString::from(value.to_csv_field())),
        _ => natural_variant(value),
    }
}

/// Variant matching the decoded type when the descriptor's type id is
/// unknown.
fn natural_variant(value: &TagValue) -> Variant {
    match value {
        TagValue::Bool(b) => Variant::Boolean(*b),
        TagValue::Channel(w) => Variant::UInt16(*w),
        TagValue::Int16(v) => Variant::Int16(*v),
        TagValue::Uint16(v) => Variant::UInt16(*v),
        TagValue::Int32(v) => Variant::Int32(*v),
        TagValue::Uint32(v) => Variant::UInt32(*v),
        TagValue::Real32(v) => Variant::Float(*v),
        TagValue::Text(s) => Variant::String(UAString::from(s.as_str())),
    }
}

fn as_bool(value: &TagValue) -> bool {
    match value {
        TagValue::Bool(b) => *b,
        other => as_i64(other) != 0,
    }
}

fn as_i64(value: &TagValue) -> i64 {
    match value {
        TagValue::Bool(true) => 1,
        TagValue::Bool(false) => 0,
        TagValue::Channel(w) => i64::from(*w),
        TagValue::Int16(v) => i64::from(*v),
        TagValue::Uint16(v) => i64::from(*v),
        TagValue::Int32(v) => i64::from(*v),
        TagValue::Uint32(v) => i64::from(*v),
        TagValue::Real32(v) => *v as i64,
        TagValue::Text(_) => 0,
    }
}

fn as_f64(value: &TagValue) -> f64 {
    match value {
        TagValue::Real32(v) => f64::from(*v),
        other => as_i64(other) as f64,
    }
}
