use crate::consumer::{GroupOffsets, LogConsumer};
use crate::frame;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tributary_core::{
    error::{Result, TributaryError},
    LogConfig,
};

/// File-based partitioned change log
pub struct FileChangeLog {
    config: LogConfig,
    /// Next offset per topic-partition, filled lazily from disk
    ends: Mutex<HashMap<(String, i32), i64>>,
}

impl FileChangeLog {
    /// Open or create a change log
    pub fn open(config: LogConfig) -> Result<Self> {
        std::fs::create_dir_all(config.base_dir.join("topics"))?;
        std::fs::create_dir_all(config.base_dir.join("groups"))?;

        Ok(Self {
            config,
            ends: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    pub(crate) fn partition_path(base_dir: &Path, topic: &str, partition: i32) -> PathBuf {
        base_dir
            .join("topics")
            .join(topic)
            .join(format!("{:05}.log", partition))
    }

    pub(crate) fn group_path(base_dir: &Path, group: &str) -> PathBuf {
        base_dir.join("groups").join(format!("{}.json", group))
    }

    /// Append one message and return its offset
    pub fn append(
        &self,
        topic: &str,
        partition: i32,
        key: Option<&[u8]>,
        value: Option<&[u8]>,
    ) -> Result<i64> {
        validate_name("topic", topic)?;
        if partition < 0 {
            return Err(TributaryError::Config(format!(
                "partition must be non-negative, got {}",
                partition
            )));
        }

        let path = Self::partition_path(&self.config.base_dir, topic, partition);
        let mut ends = self.ends.lock();
        let slot = (topic.to_string(), partition);
        let offset = match ends.get(&slot) {
            Some(next) => *next,
            None => scan_end(&path)?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        frame::write_entry(&mut writer, offset, key, value)?;
        writer.flush()?;

        ends.insert(slot, offset + 1);
        Ok(offset)
    }

    /// Offset the next append to this partition will receive
    pub fn end_offset(&self, topic: &str, partition: i32) -> Result<i64> {
        let slot = (topic.to_string(), partition);
        if let Some(next) = self.ends.lock().get(&slot) {
            return Ok(*next);
        }
        scan_end(&Self::partition_path(&self.config.base_dir, topic, partition))
    }

    /// Topics with at least one partition file
    pub fn topics(&self) -> Result<Vec<String>> {
        let mut topics = list_dir(&self.config.base_dir.join("topics"), |entry| {
            entry.path().is_dir()
        })?;
        topics.sort();
        Ok(topics)
    }

    pub fn partitions(&self, topic: &str) -> Result<Vec<i32>> {
        partitions_of(&self.config.base_dir, topic)
    }

    /// Consumer group names with a committed offsets file
    pub fn groups(&self) -> Result<Vec<String>> {
        let mut groups: Vec<String> = list_dir(&self.config.base_dir.join("groups"), |entry| {
            entry.path().extension().is_some_and(|ext| ext == "json")
        })?
        .into_iter()
        .filter_map(|name| name.strip_suffix(".json").map(str::to_string))
        .collect();
        groups.sort();
        Ok(groups)
    }

    /// Committed next-offsets of a group, keyed by `topic:partition`
    pub fn committed_offsets(&self, group: &str) -> Result<BTreeMap<String, i64>> {
        validate_name("group", group)?;
        let offsets = GroupOffsets::load(&Self::group_path(&self.config.base_dir, group), group)?;
        Ok(offsets.offsets)
    }

    /// Join `group` and consume `topics`, resuming from committed offsets
    pub fn subscribe<S: AsRef<str>>(&self, group: &str, topics: &[S]) -> Result<LogConsumer> {
        validate_name("group", group)?;
        let topics = topics
            .iter()
            .map(|t| {
                validate_name("topic", t.as_ref())?;
                Ok(t.as_ref().to_string())
            })
            .collect::<Result<Vec<_>>>()?;

        LogConsumer::new(self.config.base_dir.clone(), group.to_string(), topics)
    }
}

pub(crate) fn partitions_of(base_dir: &Path, topic: &str) -> Result<Vec<i32>> {
    let dir = base_dir.join("topics").join(topic);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut partitions: Vec<i32> = list_dir(&dir, |entry| {
        entry.path().extension().is_some_and(|ext| ext == "log")
    })?
    .into_iter()
    .filter_map(|name| name.strip_suffix(".log").and_then(|p| p.parse().ok()))
    .collect();
    partitions.sort_unstable();
    Ok(partitions)
}

fn list_dir(dir: &Path, keep: impl Fn(&std::fs::DirEntry) -> bool) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if keep(&entry) {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Next offset of a partition file, by walking its entries
fn scan_end(path: &Path) -> Result<i64> {
    if !path.exists() {
        return Ok(0);
    }
    let data = std::fs::read(path)?;
    let mut pos = 0;
    let mut next = 0;
    while let Some((entry, used)) = frame::read_entry(&data[pos..])? {
        next = entry.offset + 1;
        pos += used;
    }
    if pos != data.len() {
        tracing::warn!(
            "Ignoring {} trailing bytes of incomplete entry in {}",
            data.len() - pos,
            path.display()
        );
    }
    Ok(next)
}

pub(crate) fn validate_name(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(TributaryError::Config(format!(
            "invalid {} name '{}': use ASCII letters, digits, '.', '_' or '-'",
            kind, name
        )))
    }
}
