// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Locating the device node that implements a processing function.
//!
//! The kernel offers no "give me the encoder" call. Instead each media root
//! exposes a graph of entities, pads, links and interfaces, and the video node
//! that streams to the encoder is found by walking that graph:
//!
//! ```text
//!  interface ──(interface link)──► I/O entity ──► source pad ──(data link)──► sink pad ──► encoder entity
//!      │
//!      └─ major:minor ─► /dev/videoN
//! ```
//!
//! [`resolve`] performs that walk on one [`MediaGraph`]; [`discover`] runs it
//! over every candidate root a [`MediaBus`] enumerates.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use tracing::{debug, info};
use v4l2_enc_sys as sys;

use crate::{Error, Result, transport::Transport};

/// The function tag of a media entity (`MEDIA_ENT_F_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityFunction(pub u32);

impl EntityFunction {
    pub const ENCODER: EntityFunction = EntityFunction(sys::MEDIA_ENT_F_PROC_VIDEO_ENCODER);
    pub const DECODER: EntityFunction = EntityFunction(sys::MEDIA_ENT_F_PROC_VIDEO_DECODER);
    pub const IO_V4L: EntityFunction = EntityFunction(sys::MEDIA_ENT_F_IO_V4L);
}

impl fmt::Display for EntityFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            EntityFunction::ENCODER => f.write_str("video encoder"),
            EntityFunction::DECODER => f.write_str("video decoder"),
            EntityFunction::IO_V4L => f.write_str("V4L I/O"),
            EntityFunction(other) => write!(f, "function {other:#x}"),
        }
    }
}

/// Character device numbers of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevNode {
    pub major: u32,
    pub minor: u32,
}

impl fmt::Display for DevNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub id: u32,
    pub name: String,
    pub function: EntityFunction,
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub id: u32,
    pub intf_type: u32,
    pub flags: u32,
    pub devnode: DevNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pad {
    pub id: u32,
    pub entity_id: u32,
    pub flags: u32,
    pub index: u32,
}

impl Pad {
    pub fn is_sink(&self) -> bool {
        self.flags & sys::MEDIA_PAD_FL_SINK != 0
    }

    pub fn is_source(&self) -> bool {
        self.flags & sys::MEDIA_PAD_FL_SOURCE != 0
    }
}

/// A data link joins two pads; an interface link joins an interface to an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub id: u32,
    pub source_id: u32,
    pub sink_id: u32,
    pub flags: u32,
}

impl Link {
    pub fn is_enabled(&self) -> bool {
        self.flags & sys::MEDIA_LNK_FL_ENABLED != 0
    }

    pub fn is_interface_link(&self) -> bool {
        self.flags & sys::MEDIA_LNK_FL_LINK_TYPE == sys::MEDIA_LNK_FL_INTERFACE_LINK
    }
}

/// An immutable snapshot of one media root's topology, keyed by object id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaGraph {
    version: u64,
    entities: BTreeMap<u32, Entity>,
    interfaces: BTreeMap<u32, Interface>,
    pads: BTreeMap<u32, Pad>,
    links: BTreeMap<u32, Link>,
}

impl MediaGraph {
    pub fn from_parts(
        version: u64,
        entities: impl IntoIterator<Item = Entity>,
        interfaces: impl IntoIterator<Item = Interface>,
        pads: impl IntoIterator<Item = Pad>,
        links: impl IntoIterator<Item = Link>,
    ) -> Self {
        Self {
            version,
            entities: entities.into_iter().map(|e| (e.id, e)).collect(),
            interfaces: interfaces.into_iter().map(|i| (i.id, i)).collect(),
            pads: pads.into_iter().map(|p| (p.id, p)).collect(),
            links: links.into_iter().map(|l| (l.id, l)).collect(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entity(&self, id: u32) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn interface(&self, id: u32) -> Option<&Interface> {
        self.interfaces.get(&id)
    }

    pub fn pad(&self, id: u32) -> Option<&Pad> {
        self.pads.get(&id)
    }

    pub fn link(&self, id: u32) -> Option<&Link> {
        self.links.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.values()
    }

    pub fn pads(&self) -> impl Iterator<Item = &Pad> {
        self.pads.values()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// True when any of the four collections is empty; such a snapshot cannot
    /// describe a streaming device.
    pub fn is_incomplete(&self) -> bool {
        self.entities.is_empty()
            || self.interfaces.is_empty()
            || self.pads.is_empty()
            || self.links.is_empty()
    }
}

/// Identity of a media root (`MEDIA_IOC_DEVICE_INFO`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaDeviceInfo {
    pub driver: String,
    pub model: String,
    pub serial: String,
    pub bus_info: String,
    pub media_version: u32,
    pub hw_revision: u32,
    pub driver_version: u32,
}

/// What a [`MediaBus`] reads from one candidate root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaSnapshot {
    pub info: MediaDeviceInfo,
    pub graph: MediaGraph,
}

/// The pair of nodes an encoder session is opened on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevice {
    /// The media root the graph was read from; requests are allocated here.
    pub control_node_path: PathBuf,
    /// The video node streaming to the resolved entity.
    pub video_node_path: PathBuf,
}

/// The device-graph service: enumerates media roots, snapshots their topology,
/// names device nodes and opens the resolved pair.
pub trait MediaBus {
    type Transport: Transport;

    /// Media roots to try, in order.
    fn candidates(&mut self) -> Result<Vec<PathBuf>>;

    fn snapshot(&mut self, root: &Path) -> Result<MediaSnapshot>;

    /// Maps a character device number to its path under `/dev`.
    fn devnode_path(&self, devnode: DevNode) -> Result<PathBuf>;

    fn open(&mut self, device: &ResolvedDevice) -> Result<Self::Transport>;
}

/// Resolves the video node implementing `function` in one media graph.
///
/// Walks entity → sink pad → feeding data link → source pad → interface link →
/// interface, then names the interface's device node through `bus`. The first
/// entity (lowest id) carrying `function` is used; there is no fallback search.
///
/// # Errors
///
/// [`Error::NotFound`] if the graph is incomplete or any step of the walk is
/// missing. Errors from `bus` naming the device node are propagated.
pub fn resolve<B: MediaBus + ?Sized>(
    graph: &MediaGraph,
    root: &Path,
    function: EntityFunction,
    bus: &B,
) -> Result<ResolvedDevice> {
    if graph.is_incomplete() {
        return Err(Error::NotFound(format!(
            "{}: topology snapshot is incomplete",
            root.display()
        )));
    }

    let entity = graph
        .entities()
        .find(|e| e.function == function)
        .ok_or_else(|| Error::NotFound(format!("no {function} entity")))?;

    let sink_pad = graph
        .pads()
        .find(|p| p.entity_id == entity.id && p.is_sink())
        .ok_or_else(|| Error::NotFound(format!("entity '{}' has no sink pad", entity.name)))?;

    let data_link = graph
        .links()
        .find(|l| l.sink_id == sink_pad.id)
        .ok_or_else(|| Error::NotFound(format!("no link feeds pad {}", sink_pad.id)))?;

    let source_pad = graph.pad(data_link.source_id).ok_or_else(|| {
        Error::NotFound(format!(
            "link {} references missing pad {}",
            data_link.id, data_link.source_id
        ))
    })?;

    // Interface links terminate on the entity itself, not on a pad.
    let interface_link = graph
        .links()
        .find(|l| l.sink_id == source_pad.entity_id)
        .ok_or_else(|| {
            Error::NotFound(format!(
                "no interface link to entity {}",
                source_pad.entity_id
            ))
        })?;

    let interface = graph.interface(interface_link.source_id).ok_or_else(|| {
        Error::NotFound(format!(
            "link {} references missing interface {}",
            interface_link.id, interface_link.source_id
        ))
    })?;

    let video_node_path = bus.devnode_path(interface.devnode)?;
    debug!(
        root = %root.display(),
        entity = %entity.name,
        devnode = %interface.devnode,
        video = %video_node_path.display(),
        "Resolved {function}"
    );

    Ok(ResolvedDevice {
        control_node_path: root.to_path_buf(),
        video_node_path,
    })
}

/// Tries every candidate root on `bus` until one resolves `function`.
///
/// Roots that cannot be read, whose driver does not match `driver_filter`, or
/// whose graph does not resolve are skipped.
///
/// # Errors
///
/// [`Error::DeviceNotFound`] once all candidates are exhausted. Failing to
/// enumerate candidates at all is propagated as is.
pub fn discover<B: MediaBus + ?Sized>(
    bus: &mut B,
    function: EntityFunction,
    driver_filter: Option<&str>,
) -> Result<ResolvedDevice> {
    for root in bus.candidates()? {
        let snapshot = match bus.snapshot(&root) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(root = %root.display(), "Skipping unreadable media root: {e}");
                continue;
            }
        };

        if let Some(driver) = driver_filter
            && snapshot.info.driver != driver
        {
            debug!(
                root = %root.display(),
                driver = %snapshot.info.driver,
                "Skipping media root with non-matching driver"
            );
            continue;
        }

        match resolve(&snapshot.graph, &root, function, bus) {
            Ok(resolved) => {
                info!(
                    driver = %snapshot.info.driver,
                    model = %snapshot.info.model,
                    control = %resolved.control_node_path.display(),
                    video = %resolved.video_node_path.display(),
                    "Found {function}"
                );
                return Ok(resolved);
            }
            Err(Error::NotFound(reason)) => {
                debug!(root = %root.display(), "No {function}: {reason}");
            }
            Err(e) => {
                debug!(root = %root.display(), "Resolving {function} failed: {e}");
            }
        }
    }
    Err(Error::DeviceNotFound)
}
