// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Media roots under `/dev`, named through `/sys/dev/char`.

use std::{
    os::fd::{AsFd, AsRawFd, BorrowedFd},
    path::{Path, PathBuf},
};

use tracing::trace;
use v4l2_enc_sys as sys;

use crate::{
    Error, Result,
    device::{V4l2Device, c_chars, ioctl, open_node},
    topology::{
        DevNode, Entity, EntityFunction, Interface, Link, MediaBus, MediaDeviceInfo, MediaGraph,
        MediaSnapshot, Pad, ResolvedDevice,
    },
};

/// The device-graph service of a Linux host.
///
/// Candidates are the `mediaN` nodes in the device directory, in numeric
/// order. A `major:minor` pair is named by the `DEVNAME` entry of its sysfs
/// `uevent` file.
#[derive(Debug, Clone)]
pub struct SysfsMediaBus {
    dev_dir: PathBuf,
    sys_char_dir: PathBuf,
}

impl Default for SysfsMediaBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SysfsMediaBus {
    pub fn new() -> Self {
        Self::with_roots("/dev", "/sys/dev/char")
    }

    /// Uses alternative device and sysfs character-device directories.
    pub fn with_roots(dev_dir: impl Into<PathBuf>, sys_char_dir: impl Into<PathBuf>) -> Self {
        Self {
            dev_dir: dev_dir.into(),
            sys_char_dir: sys_char_dir.into(),
        }
    }
}

/// Extracts `DEVNAME` from a sysfs `uevent` file.
pub(crate) fn uevent_devname(uevent: &str) -> Option<&str> {
    uevent
        .lines()
        .find_map(|line| line.strip_prefix("DEVNAME="))
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn media_index(name: &str) -> Option<u32> {
    name.strip_prefix("media")?.parse().ok()
}

fn g_topology(fd: BorrowedFd<'_>, topology: &mut sys::media_v2_topology) -> Result<()> {
    let fd = fd.as_raw_fd();
    let topology: *mut sys::media_v2_topology = topology;
    // SAFETY: callers leave each array pointer null or pointing at as many
    // entries as its count says.
    ioctl::retry("MEDIA_IOC_G_TOPOLOGY", || unsafe {
        ioctl::media_g_topology(fd, topology)
    })
}

fn read_topology(fd: BorrowedFd<'_>) -> Result<MediaGraph> {
    // Null arrays only report counts.
    let mut topology = sys::media_v2_topology::default();
    g_topology(fd, &mut topology)?;

    let mut entities = vec![sys::media_v2_entity::default(); topology.num_entities as usize];
    let mut interfaces =
        vec![sys::media_v2_interface::default(); topology.num_interfaces as usize];
    let mut pads = vec![sys::media_v2_pad::default(); topology.num_pads as usize];
    let mut links = vec![sys::media_v2_link::default(); topology.num_links as usize];
    topology.ptr_entities = entities.as_mut_ptr() as u64;
    topology.ptr_interfaces = interfaces.as_mut_ptr() as u64;
    topology.ptr_pads = pads.as_mut_ptr() as u64;
    topology.ptr_links = links.as_mut_ptr() as u64;

    g_topology(fd, &mut topology)?;

    // The graph may have shrunk between the two calls.
    entities.truncate(topology.num_entities as usize);
    interfaces.truncate(topology.num_interfaces as usize);
    pads.truncate(topology.num_pads as usize);
    links.truncate(topology.num_links as usize);

    Ok(MediaGraph::from_parts(
        topology.topology_version,
        entities.iter().map(|e| Entity {
            id: e.id,
            name: c_chars(&e.name),
            function: EntityFunction(e.function),
            flags: e.flags,
        }),
        interfaces.iter().map(|i| Interface {
            id: i.id,
            intf_type: i.intf_type,
            flags: i.flags,
            // SAFETY: every interface type reported by the kernel is a devnode.
            devnode: unsafe {
                DevNode {
                    major: i.__bindgen_anon_1.devnode.major,
                    minor: i.__bindgen_anon_1.devnode.minor,
                }
            },
        }),
        pads.iter().map(|p| Pad {
            id: p.id,
            entity_id: p.entity_id,
            flags: p.flags,
            index: p.index,
        }),
        links.iter().map(|l| Link {
            id: l.id,
            source_id: l.source_id,
            sink_id: l.sink_id,
            flags: l.flags,
        }),
    ))
}

impl MediaBus for SysfsMediaBus {
    type Transport = V4l2Device;

    fn candidates(&mut self) -> Result<Vec<PathBuf>> {
        let mut roots: Vec<(u32, PathBuf)> = std::fs::read_dir(&self.dev_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let index = media_index(entry.file_name().to_str()?)?;
                Some((index, entry.path()))
            })
            .collect();
        roots.sort();
        trace!(count = roots.len(), "Enumerated media roots");
        Ok(roots.into_iter().map(|(_, path)| path).collect())
    }

    fn snapshot(&mut self, root: &Path) -> Result<MediaSnapshot> {
        let fd = open_node(root, false)?;

        let mut info = sys::media_device_info::default();
        let raw_fd = fd.as_raw_fd();
        // SAFETY: media_device_info carries no pointers.
        ioctl::retry("MEDIA_IOC_DEVICE_INFO", || unsafe {
            ioctl::media_device_info(raw_fd, &mut info)
        })?;
        let graph = read_topology(fd.as_fd())?;

        Ok(MediaSnapshot {
            info: MediaDeviceInfo {
                driver: c_chars(&info.driver),
                model: c_chars(&info.model),
                serial: c_chars(&info.serial),
                bus_info: c_chars(&info.bus_info),
                media_version: info.media_version,
                hw_revision: info.hw_revision,
                driver_version: info.driver_version,
            },
            graph,
        })
    }

    fn devnode_path(&self, devnode: DevNode) -> Result<PathBuf> {
        let uevent_path = self.sys_char_dir.join(devnode.to_string()).join("uevent");
        let uevent = std::fs::read_to_string(&uevent_path).map_err(|e| {
            Error::NotFound(format!("device node {devnode} ({}): {e}", uevent_path.display()))
        })?;
        let name = uevent_devname(&uevent)
            .ok_or_else(|| Error::NotFound(format!("device node {devnode} has no DEVNAME")))?;
        Ok(self.dev_dir.join(name))
    }

    fn open(&mut self, device: &ResolvedDevice) -> Result<V4l2Device> {
        V4l2Device::open(device)
    }
}
