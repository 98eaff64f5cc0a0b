//! Partitioning by instrument model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::table::{Record, Table};

/// All records sharing one model code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub model_code: String,
    /// Test columns of the table the partition was cut from.
    pub test_columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Non-missing values of `test`, in record order.
    pub fn values(&self, test: &str) -> Vec<f64> {
        self.records.iter().filter_map(|r| r.value(test)).collect()
    }
}

/// Disjoint partitions in order of first appearance of each model code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionSet {
    partitions: Vec<Partition>,
}

impl PartitionSet {
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Partition> {
        self.partitions.iter()
    }

    pub fn as_slice(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn get(&self, model_code: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.model_code == model_code)
    }

    pub fn model_codes(&self) -> Vec<&str> {
        self.partitions
            .iter()
            .map(|p| p.model_code.as_str())
            .collect()
    }

    pub fn total_records(&self) -> usize {
        self.partitions.iter().map(Partition::len).sum()
    }

    /// Keep only the partition for `model_code`.
    pub fn retain_model(&mut self, model_code: &str) {
        self.partitions.retain(|p| p.model_code == model_code);
    }
}

impl IntoIterator for PartitionSet {
    type Item = Partition;
    type IntoIter = std::vec::IntoIter<Partition>;

    fn into_iter(self) -> Self::IntoIter {
        self.partitions.into_iter()
    }
}

/// Split a table into per-model partitions.
///
/// Every record lands in exactly one partition; none is dropped or
/// duplicated. Records with an empty model code form their own partition.
pub fn partition_by_model(table: Table) -> PartitionSet {
    let Table {
        test_columns,
        records,
        ..
    } = table;

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut partitions: Vec<Partition> = Vec::new();

    for record in records {
        let slot = match index.get(&record.model_code) {
            Some(&i) => i,
            None => {
                index.insert(record.model_code.clone(), partitions.len());
                partitions.push(Partition {
                    model_code: record.model_code.clone(),
                    test_columns: test_columns.clone(),
                    records: Vec::new(),
                });
                partitions.len() - 1
            }
        };
        partitions[slot].records.push(record);
    }

    PartitionSet { partitions }
}
