use crate::frame;
use crate::store::{partitions_of, FileChangeLog};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tributary_core::{
    error::{Result, TributaryError},
    ChangeStream, Position, SourceMessage,
};

/// Committed offsets of one consumer group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct GroupOffsets {
    pub group: String,
    /// `topic:partition` -> next offset to read
    pub offsets: BTreeMap<String, i64>,
}

impl GroupOffsets {
    pub(crate) fn load(path: &Path, group: &str) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                group: group.to_string(),
                offsets: BTreeMap::new(),
            });
        }
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| {
            TributaryError::Stream(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Write via temp file + rename so a crash never leaves a torn file
    fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn slot(topic: &str, partition: i32) -> String {
        format!("{}:{}", topic, partition)
    }
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    /// Next offset to hand out
    next_offset: i64,
    /// File position of the first entry not yet consumed
    byte_pos: u64,
}

/// A consumer-group member reading a set of topics
///
/// Fetch positions run ahead of committed offsets; only [`ChangeStream::commit`]
/// moves what a restarted consumer sees.
pub struct LogConsumer {
    base_dir: PathBuf,
    group: String,
    topics: Vec<String>,
    offsets: GroupOffsets,
    cursors: BTreeMap<(String, i32), Cursor>,
    /// Rotates the first partition served by each poll
    next_start: usize,
}

impl LogConsumer {
    pub(crate) fn new(base_dir: PathBuf, group: String, topics: Vec<String>) -> Result<Self> {
        let offsets = GroupOffsets::load(&FileChangeLog::group_path(&base_dir, &group), &group)?;
        let mut consumer = Self {
            base_dir,
            group,
            topics,
            offsets,
            cursors: BTreeMap::new(),
            next_start: 0,
        };
        consumer.refresh_partitions()?;
        tracing::info!(
            "Consumer group '{}' subscribed to {} topics ({} partitions)",
            consumer.group,
            consumer.topics.len(),
            consumer.cursors.len()
        );
        Ok(consumer)
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Pick up partitions created since the last poll
    fn refresh_partitions(&mut self) -> Result<()> {
        for topic in &self.topics {
            for partition in partitions_of(&self.base_dir, topic)? {
                let key = (topic.clone(), partition);
                if !self.cursors.contains_key(&key) {
                    let slot = GroupOffsets::slot(topic, partition);
                    let next_offset = self.offsets.offsets.get(&slot).copied().unwrap_or(0);
                    self.cursors.insert(
                        key,
                        Cursor {
                            next_offset,
                            byte_pos: 0,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn read_partition(
        &self,
        topic: &str,
        partition: i32,
        cursor: &mut Cursor,
        budget: usize,
        out: &mut Vec<SourceMessage>,
    ) -> Result<()> {
        let path = FileChangeLog::partition_path(&self.base_dir, topic, partition);
        let mut file = std::fs::File::open(&path)?;
        file.seek(SeekFrom::Start(cursor.byte_pos))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let mut pos = 0;
        let mut taken = 0;
        while taken < budget {
            let Some((entry, used)) = frame::read_entry(&data[pos..])? else {
                break;
            };
            pos += used;
            if entry.offset < cursor.next_offset {
                continue;
            }
            cursor.next_offset = entry.offset + 1;
            out.push(SourceMessage {
                topic: topic.to_string(),
                partition,
                offset: entry.offset,
                key: entry.key,
                value: entry.value,
            });
            taken += 1;
        }
        cursor.byte_pos += pos as u64;
        Ok(())
    }
}

impl ChangeStream for LogConsumer {
    fn poll(&mut self, max: usize) -> Result<Vec<SourceMessage>> {
        self.refresh_partitions()?;

        let keys: Vec<(String, i32)> = self.cursors.keys().cloned().collect();
        let mut out = Vec::new();
        if keys.is_empty() || max == 0 {
            return Ok(out);
        }

        let start = self.next_start % keys.len();
        self.next_start = self.next_start.wrapping_add(1);

        for i in 0..keys.len() {
            let budget = max - out.len();
            if budget == 0 {
                break;
            }
            let (topic, partition) = &keys[(start + i) % keys.len()];
            let mut cursor = self.cursors[&(topic.clone(), *partition)];
            self.read_partition(topic, *partition, &mut cursor, budget, &mut out)?;
            self.cursors.insert((topic.clone(), *partition), cursor);
        }

        Ok(out)
    }

    fn commit(&mut self, position: &Position) -> Result<()> {
        let slot = GroupOffsets::slot(&position.topic, position.partition);
        self.offsets.offsets.insert(slot, position.offset + 1);
        self.offsets
            .save(&FileChangeLog::group_path(&self.base_dir, &self.group))?;
        tracing::trace!("Group '{}' committed {}", self.group, position);
        Ok(())
    }

    fn seek_to_committed(&mut self) -> Result<()> {
        for ((topic, partition), cursor) in self.cursors.iter_mut() {
            let slot = GroupOffsets::slot(topic, *partition);
            *cursor = Cursor {
                next_offset: self.offsets.offsets.get(&slot).copied().unwrap_or(0),
                byte_pos: 0,
            };
        }
        Ok(())
    }

    fn committed(&self, topic: &str, partition: i32) -> Result<Option<i64>> {
        Ok(self
            .offsets
            .offsets
            .get(&GroupOffsets::slot(topic, partition))
            .copied())
    }
}
