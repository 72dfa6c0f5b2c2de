//! Maps acquisition ports onto probe sites and builds the channel groups used
//! by spike-sorting geometry consumers.
//!
//! Mapping runs in a fixed order: site table, grouping, dead-channel removal,
//! then geometry. Geometry and adjacency are only ever computed on the
//! surviving members so that positions line up with the member list.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::types::*;

/// Physical site number (1-based) to logical channel index.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteTable {
    sites: BTreeMap<usize, Option<usize>>,
}

impl SiteTable {
    /// A table with sites `1..=max_chans`, all unconnected.
    pub fn new(max_chans: usize) -> Self {
        Self {
            sites: (1..=max_chans).map(|site| (site, None)).collect(),
        }
    }

    pub fn max_chans(&self) -> usize {
        self.sites.len()
    }

    /// Logical channel wired to `site`, if any.
    pub fn channel(&self, site: usize) -> Option<usize> {
        self.sites.get(&site).copied().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<usize>)> + '_ {
        self.sites.iter().map(|(&site, &ch)| (site, ch))
    }

    /// Sites that received a logical channel, in site order.
    pub fn connected(&self) -> Vec<usize> {
        self.iter()
            .filter_map(|(site, ch)| ch.map(|_| site))
            .collect()
    }

    /// Sites that never received a logical channel, in site order.
    pub fn unconnected(&self) -> Vec<usize> {
        self.iter()
            .filter_map(|(site, ch)| ch.is_none().then_some(site))
            .collect()
    }
}

/// Builds the site table from the wiring order.
///
/// The position of a port in `ports` is its logical channel index. Every port
/// must appear once, map to a site in `1..=max_chans`, and no two ports may
/// share a site.
pub fn build_site_table(
    ports: &[String],
    port_map: &HashMap<String, usize>,
    max_chans: usize,
) -> Result<SiteTable> {
    let mut table = SiteTable::new(max_chans);
    let mut owner: HashMap<usize, &str> = HashMap::new();

    for (ch, port) in ports.iter().enumerate() {
        let site = *port_map
            .get(port)
            .ok_or_else(|| ExportError::UnknownPort(port.clone()))?;
        if site == 0 || site > max_chans {
            return Err(ExportError::SiteOutOfRange {
                port: port.clone(),
                site,
                max: max_chans,
            });
        }
        if let Some(first) = owner.insert(site, port) {
            if first == port.as_str() {
                return Err(ExportError::DuplicatePort(port.clone()));
            }
            return Err(ExportError::DuplicateSite {
                site,
                first: first.to_string(),
                second: port.clone(),
            });
        }
        table.sites.insert(site, Some(ch));
    }

    Ok(table)
}

/// One site within a channel group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMember {
    /// Logical channel index, `None` for a dead site
    pub channel: Option<usize>,
    /// Physical site number
    pub site: usize,
    /// (x, y) in micrometres, filled in by [`build_geometries`]
    pub position: Option<[f64; 2]>,
}

/// A cluster of physically adjacent sites.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelGroup {
    pub members: Vec<GroupMember>,
    /// Adjacent logical channel pairs
    pub graph: Vec<(usize, usize)>,
}

impl ChannelGroup {
    /// Logical channel indices of the live members, in member order.
    pub fn channels(&self) -> Vec<usize> {
        self.members.iter().filter_map(|m| m.channel).collect()
    }
}

/// Channel groups keyed by group number.
pub type ChannelGroups = BTreeMap<usize, ChannelGroup>;

/// Layout rules for one probe family.
///
/// Implementors describe where each site sits and which group it belongs to.
/// Grouping and geometry are derived from those through the provided methods.
pub trait ProbeLayout {
    fn name(&self) -> &str;

    /// Number of sites on the probe, numbered from 1.
    fn n_sites(&self) -> usize;

    /// Group (shank) that `site` belongs to.
    fn group_of(&self, site: usize) -> usize;

    /// (x, y) of `site` in micrometres.
    fn site_position(&self, site: usize) -> [f64; 2];

    /// Sites closer than this are connected in the adjacency graph.
    fn adjacency_radius(&self) -> f64;

    /// Partitions the probe's sites into channel groups.
    ///
    /// Sites not wired to any port are kept as dead members. A wired site the
    /// probe does not have is rejected.
    fn group(&self, table: &SiteTable) -> Result<ChannelGroups> {
        if let Some(site) = table.connected().into_iter().find(|&s| s > self.n_sites()) {
            return Err(ExportError::SiteNotOnProbe {
                site,
                probe: self.name().to_string(),
            });
        }

        let mut groups = ChannelGroups::new();
        for site in 1..=self.n_sites() {
            groups
                .entry(self.group_of(site))
                .or_default()
                .members
                .push(GroupMember {
                    channel: table.channel(site),
                    site,
                    position: None,
                });
        }
        Ok(groups)
    }

    /// Coordinates for each member of `group`, in member order.
    fn geometry(&self, group: &ChannelGroup) -> Vec<[f64; 2]> {
        group
            .members
            .iter()
            .map(|m| self.site_position(m.site))
            .collect()
    }
}

/// Single-shank probe with evenly spaced sites.
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    pub name: String,
    pub n_sites: usize,
    pub pitch: f64,
}

impl ProbeLayout for Linear {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_sites(&self) -> usize {
        self.n_sites
    }

    fn group_of(&self, _site: usize) -> usize {
        0
    }

    fn site_position(&self, site: usize) -> [f64; 2] {
        [0.0, (site - 1) as f64 * self.pitch]
    }

    fn adjacency_radius(&self) -> f64 {
        2.0 * self.pitch
    }
}

/// Several identical linear shanks side by side, one group per shank.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiShank {
    pub name: String,
    pub shanks: usize,
    pub sites_per_shank: usize,
    pub pitch: f64,
    pub shank_spacing: f64,
}

impl ProbeLayout for MultiShank {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_sites(&self) -> usize {
        self.shanks * self.sites_per_shank
    }

    fn group_of(&self, site: usize) -> usize {
        (site - 1) / self.sites_per_shank
    }

    fn site_position(&self, site: usize) -> [f64; 2] {
        let row = (site - 1) % self.sites_per_shank;
        [
            self.group_of(site) as f64 * self.shank_spacing,
            row as f64 * self.pitch,
        ]
    }

    fn adjacency_radius(&self) -> f64 {
        2.0 * self.pitch
    }
}

/// Single shank with sites in staggered columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Polytrode {
    pub name: String,
    pub n_sites: usize,
    pub columns: usize,
    pub pitch: f64,
}

impl ProbeLayout for Polytrode {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_sites(&self) -> usize {
        self.n_sites
    }

    fn group_of(&self, _site: usize) -> usize {
        0
    }

    fn site_position(&self, site: usize) -> [f64; 2] {
        let col = (site - 1) % self.columns;
        let row = (site - 1) / self.columns;
        let stagger = if col % 2 == 1 { self.pitch / 2.0 } else { 0.0 };
        [col as f64 * self.pitch, row as f64 * self.pitch + stagger]
    }

    fn adjacency_radius(&self) -> f64 {
        1.5 * self.pitch
    }
}

fn parse_num<T: std::str::FromStr>(id: &str, s: &str) -> Result<T> {
    s.parse()
        .map_err(|_| ExportError::UnknownProbe(id.to_string()))
}

/// Picks the probe family for an identifier such as `A1x16-5mm-50-177`,
/// `A4x8-5mm-200-400-177` or `A1x32-Poly3-5mm-25s-177`.
pub fn layout_for(id: &str) -> Result<Box<dyn ProbeLayout>> {
    let unknown = || ExportError::UnknownProbe(id.to_string());
    let parts: Vec<&str> = id.split('-').collect();

    let (shanks, sites) = parts
        .first()
        .and_then(|p| p.strip_prefix('A'))
        .and_then(|p| p.split_once('x'))
        .ok_or_else(unknown)?;
    let shanks: usize = parse_num(id, shanks)?;
    let sites: usize = parse_num(id, sites)?;
    if shanks == 0 || sites == 0 {
        return Err(unknown());
    }

    if let Some(columns) = parts.get(1).and_then(|p| p.strip_prefix("Poly")) {
        let pitch = parts
            .get(3)
            .and_then(|p| p.strip_suffix('s'))
            .ok_or_else(unknown)?;
        let columns: usize = parse_num(id, columns)?;
        if shanks != 1 || columns == 0 {
            return Err(unknown());
        }
        return Ok(Box::new(Polytrode {
            name: id.to_string(),
            n_sites: sites,
            columns,
            pitch: parse_num(id, pitch)?,
        }));
    }

    if !parts.get(1).is_some_and(|p| p.ends_with("mm")) {
        return Err(unknown());
    }
    let pitch: f64 = parse_num(id, parts.get(2).ok_or_else(unknown)?)?;

    if shanks == 1 {
        Ok(Box::new(Linear {
            name: id.to_string(),
            n_sites: sites,
            pitch,
        }))
    } else {
        let spacing = parts.get(3).ok_or_else(unknown)?;
        Ok(Box::new(MultiShank {
            name: id.to_string(),
            shanks,
            sites_per_shank: sites,
            pitch,
            shank_spacing: parse_num(id, spacing)?,
        }))
    }
}

/// Drops dead members and any group left without live members.
pub fn clean_dead_channels(groups: ChannelGroups) -> ChannelGroups {
    groups
        .into_iter()
        .filter_map(|(id, mut group)| {
            group.members.retain(|m| m.channel.is_some());
            group.graph.clear();
            if group.members.is_empty() {
                log::debug!("Channel group {} has no connected sites", id);
                None
            } else {
                Some((id, group))
            }
        })
        .collect()
}

/// Attaches positions and the adjacency graph to every member.
pub fn build_geometries(layout: &dyn ProbeLayout, mut groups: ChannelGroups) -> ChannelGroups {
    let radius = layout.adjacency_radius() + 1e-9;

    for group in groups.values_mut() {
        let positions = layout.geometry(group);
        for (member, pos) in group.members.iter_mut().zip(&positions) {
            member.position = Some(*pos);
        }

        let mut graph = Vec::new();
        for (i, a) in group.members.iter().enumerate() {
            for (j, b) in group.members.iter().enumerate().skip(i + 1) {
                let (pa, pb) = (positions[i], positions[j]);
                let dist = ((pa[0] - pb[0]).powi(2) + (pa[1] - pb[1]).powi(2)).sqrt();
                if let (Some(ca), Some(cb), true) = (a.channel, b.channel, dist <= radius) {
                    graph.push((ca, cb));
                }
            }
        }
        group.graph = graph;
    }

    groups
}

/// Full mapping: site table, grouping, dead-channel removal, geometry.
pub fn map_probe(
    layout: &dyn ProbeLayout,
    ports: &[String],
    port_map: &HashMap<String, usize>,
    max_chans: usize,
) -> Result<ChannelGroups> {
    let table = build_site_table(ports, port_map, max_chans)?;
    log::debug!(
        "Probe {}: {} connected sites, {} unconnected",
        layout.name(),
        table.connected().len(),
        table.unconnected().len()
    );

    let groups = layout.group(&table)?;
    let groups = clean_dead_channels(groups);
    Ok(build_geometries(layout, groups))
}
