//! Functional coverage: cover points with explicit bins, crosses over points, a text
//! report and XML export.
//!
//! Items are named with dotted paths (`top.cross.ab`); every path prefix acts as a group
//! whose size and coverage are the sums over the items below it.

use prettytable::{row, Table};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::TbError;
use crate::TbResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bin {
    Int(u32),
    Label(&'static str),
}

impl fmt::Display for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bin::Int(i) => write!(f, "{}", i),
            Bin::Label(l) => write!(f, "{}", l),
        }
    }
}

impl From<u32> for Bin {
    fn from(v: u32) -> Self {
        Bin::Int(v)
    }
}

impl From<&'static str> for Bin {
    fn from(v: &'static str) -> Self {
        Bin::Label(v)
    }
}

#[derive(Debug)]
enum Item {
    Point {
        bins: Vec<Bin>,
        hits: Vec<u64>,
    },
    Cross {
        items: Vec<String>,
        // cartesian product of the crossed points' bins
        bins: Vec<Vec<Bin>>,
        hits: Vec<u64>,
    },
}

impl Item {
    fn hits(&self) -> &[u64] {
        match self {
            Item::Point { hits, .. } | Item::Cross { hits, .. } => hits,
        }
    }

    fn bin_labels(&self) -> Vec<String> {
        match self {
            Item::Point { bins, .. } => bins.iter().map(Bin::to_string).collect(),
            Item::Cross { bins, .. } => bins
                .iter()
                .map(|combo| {
                    let parts: Vec<String> = combo.iter().map(Bin::to_string).collect();
                    format!("({})", parts.join(", "))
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct CoverDb {
    items: BTreeMap<String, Item>,
}

impl CoverDb {
    pub fn new() -> Self {
        CoverDb::default()
    }

    /// Declares a cover point; declaring an existing name again keeps its hits.
    pub fn cover_point(&mut self, name: &str, bins: &[Bin]) {
        self.items
            .entry(name.to_string())
            .or_insert_with(|| Item::Point {
                bins: bins.to_vec(),
                hits: vec![0; bins.len()],
            });
    }

    /// Declares a cross over already declared cover points.
    pub fn cover_cross(&mut self, name: &str, items: &[&str]) -> TbResult<()> {
        if self.items.contains_key(name) {
            return Ok(());
        }
        let mut combos: Vec<Vec<Bin>> = vec![Vec::new()];
        for item in items {
            let bins = match self.items.get(*item) {
                Some(Item::Point { bins, .. }) => bins,
                _ => return Err(TbError::UnknownCoverItem(item.to_string())),
            };
            combos = combos
                .iter()
                .flat_map(|prefix| {
                    bins.iter().map(move |bin| {
                        let mut combo = prefix.clone();
                        combo.push(*bin);
                        combo
                    })
                })
                .collect();
        }
        let hits = vec![0; combos.len()];
        self.items.insert(
            name.to_string(),
            Item::Cross {
                items: items.iter().map(|s| s.to_string()).collect(),
                bins: combos,
                hits,
            },
        );
        Ok(())
    }

    /// Records one sample. Every listed point counts its value if it has a matching bin;
    /// crosses whose points all appear in `values` count the combination.
    pub fn sample(&mut self, values: &[(&str, Bin)]) -> TbResult<()> {
        for (name, value) in values {
            match self.items.get_mut(*name) {
                Some(Item::Point { bins, hits }) => {
                    if let Some(idx) = bins.iter().position(|b| b == value) {
                        hits[idx] += 1;
                    }
                }
                _ => return Err(TbError::UnknownCoverItem(name.to_string())),
            }
        }
        for item in self.items.values_mut() {
            let Item::Cross { items, bins, hits } = item else {
                continue;
            };
            let combo: Option<Vec<Bin>> = items
                .iter()
                .map(|i| values.iter().find(|(n, _)| *n == i.as_str()).map(|(_, v)| *v))
                .collect();
            if let Some(combo) = combo {
                if let Some(idx) = bins.iter().position(|b| *b == combo) {
                    hits[idx] += 1;
                }
            }
        }
        Ok(())
    }

    fn under<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Item> + 'a {
        self.items
            .iter()
            .filter(move |(n, _)| is_under(n, name))
            .map(|(_, item)| item)
    }

    /// Number of bins of the item, or of all items below a group name.
    pub fn size(&self, name: &str) -> usize {
        self.under(name).map(|i| i.hits().len()).sum()
    }

    /// Number of bins hit at least once.
    pub fn coverage(&self, name: &str) -> usize {
        self.under(name)
            .map(|i| i.hits().iter().filter(|&&h| h > 0).count())
            .sum()
    }

    pub fn cover_percentage(&self, name: &str) -> f64 {
        match self.size(name) {
            0 => 0.0,
            size => 100.0 * self.coverage(name) as f64 / size as f64,
        }
    }

    pub fn hits(&self, name: &str, bin: Bin) -> Option<u64> {
        match self.items.get(name)? {
            Item::Point { bins, hits } => bins.iter().position(|b| *b == bin).map(|i| hits[i]),
            Item::Cross { .. } => None,
        }
    }

    pub fn cross_hits(&self, name: &str, combo: &[Bin]) -> Option<u64> {
        match self.items.get(name)? {
            Item::Cross { bins, hits, .. } => {
                bins.iter().position(|b| b == combo).map(|i| hits[i])
            }
            Item::Point { .. } => None,
        }
    }

    // every group and item name, parents before children
    fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = Vec::new();
        for name in self.items.keys() {
            let mut path = String::new();
            for seg in name.split('.') {
                if !path.is_empty() {
                    path.push('.');
                }
                path.push_str(seg);
                if !nodes.contains(&path) {
                    nodes.push(path.clone());
                }
            }
        }
        nodes
    }

    /// Tabular report of every group and item, optionally listing per-bin hits.
    pub fn report(&self, bins: bool) -> String {
        let mut table = Table::new();
        table.set_titles(row!["Name", "Size", "Covered", "Coverage"]);
        for node in self.nodes() {
            let depth = node.matches('.').count();
            table.add_row(row![
                format!("{}{}", "  ".repeat(depth), node),
                self.size(&node),
                self.coverage(&node),
                format!("{:.2}%", self.cover_percentage(&node))
            ]);
            if !bins {
                continue;
            }
            if let Some(item) = self.items.get(&node) {
                for (label, hits) in item.bin_labels().iter().zip(item.hits()) {
                    table.add_row(row![
                        format!("{}  bin {}", "  ".repeat(depth + 1), label),
                        "",
                        hits,
                        ""
                    ]);
                }
            }
        }
        table.to_string()
    }

    /// Writes the database as nested XML, one element per dotted name segment.
    pub fn export_to_xml(&self, path: &Path) -> TbResult<()> {
        let file = BufWriter::new(File::create(path)?);
        let mut writer = Writer::new_with_indent(file, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let nodes = self.nodes();
        for root in nodes.iter().filter(|n| !n.contains('.')) {
            self.write_node(&mut writer, &nodes, root)?;
        }
        writer.into_inner().flush()?;
        Ok(())
    }

    fn write_node<W: Write>(
        &self,
        writer: &mut Writer<W>,
        nodes: &[String],
        name: &str,
    ) -> TbResult<()> {
        let tag = name.rsplit('.').next().unwrap_or(name);
        let size = self.size(name).to_string();
        let coverage = self.coverage(name).to_string();
        let percentage = format!("{:.2}", self.cover_percentage(name));
        let mut start = BytesStart::new(tag);
        start.push_attribute(("abs_name", name));
        start.push_attribute(("size", size.as_str()));
        start.push_attribute(("coverage", coverage.as_str()));
        start.push_attribute(("cover_percentage", percentage.as_str()));
        writer.write_event(Event::Start(start))?;

        if let Some(item) = self.items.get(name) {
            for (label, hits) in item.bin_labels().iter().zip(item.hits()) {
                let hits = hits.to_string();
                let mut bin = BytesStart::new("bin");
                bin.push_attribute(("bin", label.as_str()));
                bin.push_attribute(("hits", hits.as_str()));
                writer.write_event(Event::Empty(bin))?;
            }
        }
        let depth = name.matches('.').count() + 1;
        for child in nodes
            .iter()
            .filter(|n| is_under(n, name) && n.matches('.').count() == depth)
        {
            self.write_node(writer, nodes, child)?;
        }
        writer.write_event(Event::End(BytesEnd::new(tag)))?;
        Ok(())
    }
}

fn is_under(item: &str, group: &str) -> bool {
    item == group
        || (item.len() > group.len()
            && item.starts_with(group)
            && item.as_bytes()[group.len()] == b'.')
}
