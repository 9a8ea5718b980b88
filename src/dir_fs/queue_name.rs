//! Queue entry names `<prefix><n>` and the order they are dequeued
//! in.

use std::cmp::Ordering;

use itertools::Itertools;

/// A file name in a queue directory, ordered the way the queue is
/// consumed: generated names by their sequence number (numerically,
/// so that `FSList-10` comes after `FSList-9`), followed by any other
/// names in plain string order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueName {
    file_name: String,
    sequence: Option<u64>,
}

impl QueueName {
    pub fn parse(prefix: &str, file_name: &str) -> Self {
        let sequence = sequence_number(prefix, file_name);
        Self {
            file_name: file_name.to_owned(),
            sequence,
        }
    }

    pub fn generated(prefix: &str, sequence: u64) -> Self {
        Self {
            file_name: format!("{prefix}{sequence}"),
            sequence: Some(sequence),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// `None` for names that were not generated by a queue with this
    /// prefix
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }
}

impl PartialOrd for QueueName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueName {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.sequence, other.sequence) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.file_name.cmp(&other.file_name)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.file_name.cmp(&other.file_name),
        }
    }
}

/// The digits after `prefix`, if that's all there is. An empty
/// suffix counts as 0.
pub fn sequence_number(prefix: &str, file_name: &str) -> Option<u64> {
    let suffix = file_name.strip_prefix(prefix)?;
    if suffix.is_empty() {
        Some(0)
    } else if suffix.bytes().all(|b| b.is_ascii_digit()) {
        suffix.parse().ok()
    } else {
        None
    }
}

/// Name for the entry after all of `existing`, or `None` if the
/// highest sequence number is already `u64::MAX`.
pub fn next_name<'n>(
    prefix: &str,
    existing: impl IntoIterator<Item = &'n str>,
) -> Option<QueueName> {
    let highest = existing
        .into_iter()
        .filter_map(|name| sequence_number(prefix, name))
        .max()
        .unwrap_or(0);
    Some(QueueName::generated(prefix, highest.checked_add(1)?))
}

/// `file_names` in the order they are to be dequeued.
pub fn queue_order(prefix: &str, file_names: impl IntoIterator<Item = String>) -> Vec<QueueName> {
    file_names
        .into_iter()
        .map(|name| QueueName::parse(prefix, &name))
        .sorted()
        .collect()
}
